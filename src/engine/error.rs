//! Error types for the engine core.
//!
//! Errors are grouped by concern (queues, tasks, quests, components, entities,
//! configuration) and converge into [`EngineError`], which frame-level code
//! returns through [`EngineResult`].
//!
//! ## Conventions
//!
//! * Recoverable misuse (submitting a task twice, reading a column the current
//!   phase did not declare, using a stale entity handle) is reported through
//!   these types and never panics.
//! * Broken internal invariants (component columns of different lengths) are
//!   `debug_assert!`ed where they could arise and surfaced as
//!   [`ComponentError::MisalignedColumns`] by explicit validation.

use std::fmt;

use thiserror::Error;

use crate::engine::entity::EntityId;
use crate::engine::phase::UpdatePhase;
use crate::engine::types::{AccessMode, EntityKindId, QuestId};


/// Returned by [`AtomicQueue::push`](crate::engine::queue::AtomicQueue::push)
/// when every slot is occupied.
///
/// The rejected value is handed back so the caller can retry or run it inline.
pub struct QueueFull<T> {
    /// The value that could not be enqueued.
    pub value: T,
    /// Capacity of the queue that rejected it.
    pub capacity: usize,
}

impl<T> QueueFull<T> {
    /// Returns the rejected value.
    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> fmt::Debug for QueueFull<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueFull")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl<T> fmt::Display for QueueFull<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue is full (capacity {})", self.capacity)
    }
}

impl<T> std::error::Error for QueueFull<T> {}

/// Errors raised by the task system.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The task system was used before `initialize` or after `release`.
    #[error("task system is not initialized")]
    NotInitialized,

    /// `initialize` was called on a running task system.
    #[error("task system is already initialized")]
    AlreadyInitialized,

    /// The task was submitted while a previous submission had not completed.
    #[error("task `{name}` is still in flight")]
    StillInFlight {
        /// Task name.
        name: String,
    },

    /// The priority queue for the task had no free slot.
    #[error("task queue is full (capacity {capacity}), task `{name}` rejected")]
    QueueFull {
        /// Task name.
        name: String,
        /// Capacity of the rejecting queue.
        capacity: usize,
    },

    /// A worker thread could not be spawned.
    #[error("failed to spawn task executor: {0}")]
    SpawnFailed(#[from] std::io::Error),

    /// The multithreading configuration was rejected.
    #[error(transparent)]
    Configuration(#[from] ConfigError),
}

/// Errors raised by the quest system.
#[derive(Debug, Error)]
pub enum QuestError {
    /// No quest is registered under the identifier.
    #[error("quest {0:?} is not registered")]
    Unregistered(QuestId),

    /// A quest with the same identifier already exists.
    #[error("quest {0:?} is already registered")]
    AlreadyRegistered(QuestId),

    /// The quest is still running from an earlier request.
    #[error("quest {0:?} is already in progress")]
    AlreadyInProgress(QuestId),

    /// The quest was marked unavailable by its subsystem.
    #[error("quest {0:?} is unavailable")]
    Unavailable(QuestId),

    /// Submitting the quest task failed.
    #[error(transparent)]
    Task(#[from] TaskError),
}

/// Errors raised by component registration and column access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComponentError {
    /// The component registry has no identifiers left.
    #[error("component registry is full ({cap} types)")]
    RegistryFull {
        /// Registry capacity.
        cap: usize,
    },

    /// The entity kind identifier does not name a table.
    #[error("unknown entity kind {0:?}")]
    UnknownKind(EntityKindId),

    /// Every entity kind identifier is taken.
    #[error("entity kind limit reached ({cap} kinds)")]
    KindLimit {
        /// Kind capacity.
        cap: usize,
    },

    /// An entity kind with the same name already exists.
    #[error("entity kind `{0}` is already registered")]
    DuplicateKind(String),

    /// A table builder listed the same component type twice.
    #[error("component `{component}` listed twice for entity kind `{kind}`")]
    DuplicateColumn {
        /// Entity kind name.
        kind: String,
        /// Type name.
        component: &'static str,
    },

    /// The entity kind has no column for the component type.
    #[error("entity kind `{kind}` has no `{component}` column")]
    MissingColumn {
        /// Entity kind name.
        kind: String,
        /// Type name.
        component: &'static str,
    },

    /// Two distinct mutable borrows of the same column were requested.
    #[error("column `{component}` requested twice in one mutable borrow")]
    AliasedColumns {
        /// Type name.
        component: &'static str,
    },

    /// A components index past the end of the table was returned.
    #[error("components index {index} out of bounds (len {len})")]
    IndexOutOfBounds {
        /// Offending index.
        index: usize,
        /// Current table length.
        len: usize,
    },

    /// The current update phase does not permit this access.
    #[error("{mode:?} access to `{component}` is not declared for phase {phase:?}")]
    AccessDenied {
        /// Type name.
        component: &'static str,
        /// Active phase.
        phase: UpdatePhase,
        /// Requested access.
        mode: AccessMode,
    },

    /// Columns of one table have diverged in length.
    #[error("column `{column}` of entity kind `{kind}` has {actual} slots, expected {expected}")]
    MisalignedColumns {
        /// Entity kind name.
        kind: String,
        /// Type name of the diverging column.
        column: &'static str,
        /// Length of the owner column.
        expected: usize,
        /// Length of the diverging column.
        actual: usize,
    },
}

/// Errors raised by the entity system.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityError {
    /// The handle refers to a destroyed entity or an old generation.
    #[error("entity {0:?} is stale")]
    Stale(EntityId),

    /// Component work failed while processing an entity request.
    #[error(transparent)]
    Component(#[from] ComponentError),
}

/// Configuration validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// `hardware_threads` was set to zero.
    #[error("hardware thread override must be at least 1")]
    ZeroHardwareThreads,
}

/// Aggregate error returned by frame-level engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Task system failure.
    #[error(transparent)]
    Task(#[from] TaskError),

    /// Quest system failure.
    #[error(transparent)]
    Quest(#[from] QuestError),

    /// Component storage failure.
    #[error(transparent)]
    Component(#[from] ComponentError),

    /// Entity system failure.
    #[error(transparent)]
    Entity(#[from] EntityError),

    /// Invalid configuration.
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    /// A subsystem reported a failure of its own.
    #[error("subsystem `{subsystem}` failed: {message}")]
    Subsystem {
        /// Subsystem name.
        subsystem: &'static str,
        /// Failure description.
        message: String,
    },
}

/// Convenience result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
