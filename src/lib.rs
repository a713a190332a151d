//! # Hearth Engine
//!
//! Core of a real-time game engine: dense Structure-of-Arrays component
//! storage addressed by per-entity components indices, and a cooperative
//! task scheduler built on a bounded lock-free queue and a fixed worker pool.
//!
//! ## Design Goals
//! - Component data laid out per entity kind in parallel columns
//! - Per-frame work expressed as reusable tasks and daily quests
//! - Explicit ownership: one [`Engine`] context, no global singletons
//! - Declared component access per update phase, checked at runtime
//!
//! Rendering, physics, audio and asset import live outside this crate; they
//! plug in as [`Subsystem`]s that enqueue tasks and read or write component
//! columns.

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![deny(dead_code)]

pub mod engine;
pub mod profiling;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

pub use engine::context::{
    Engine,
    FnSubsystem,
    FrameReport,
    SetupContext,
    Subsystem,
    UpdateContext,
};

pub use engine::config::{
    EngineConfiguration,
    IdlePolicy,
    MultithreadingConfiguration,
};

pub use engine::queue::{AtomicQueue, QueueMode};

pub use engine::task::{Task, TaskFunction, TaskPriority, WaitMode};
pub use engine::task_system::{TaskSystem, TaskSystemStatistics};
pub use engine::quest::{QuestState, QuestSystem};

pub use engine::component::{Component, ComponentDesc, ComponentRegistry};
pub use engine::table::{Column, ColumnStorage, ComponentTable, TableBuilder};
pub use engine::manager::{ComponentManager, PhaseComponents};
pub use engine::phase::{PhasePermissions, UpdatePhase};

pub use engine::entity::{
    EntityId,
    EntityInitializer,
    EntitySystem,
    EntityUpdateReport,
    InitializationContext,
};

pub use engine::error::{
    ComponentError,
    ConfigError,
    EngineError,
    EngineResult,
    EntityError,
    QuestError,
    QueueFull,
    TaskError,
};

pub use engine::types::{
    AccessMode,
    AccessSets,
    ComponentID,
    ComponentsIndex,
    EntityKindId,
    QuestId,
    Signature,
    ENTITY_KIND_CAP,
};

pub use profiling::profiler;

// ─────────────────────────────────────────────────────────────────────────────
// Prelude
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used engine types.
///
/// Import with:
/// ```rust
/// use hearth_engine::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        ComponentManager,
        ComponentTable,
        Engine,
        EngineConfiguration,
        EngineResult,
        EntityId,
        EntityKindId,
        EntitySystem,
        FnSubsystem,
        QuestId,
        QuestSystem,
        Subsystem,
        Task,
        TaskPriority,
        TaskSystem,
        UpdateContext,
        UpdatePhase,
        WaitMode,
    };
}
