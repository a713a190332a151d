//! Daily quests: named, reusable per-frame tasks.
//!
//! A subsystem registers each of its recurring jobs once, under a
//! [`QuestId`], and then asks for it to be carried out every frame. The quest
//! system keeps the task and tracks a [`QuestState`] per quest so that a quest
//! is never running twice at the same time.
//!
//! State machine:
//!
//! ```text
//! Unavailable <-> Available -> InProgress -> Complete
//!                     ^                          |
//!                     +------ pre_update --------+
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::engine::error::{QuestError, TaskError};
use crate::engine::task::{Task, TaskPriority, WaitMode};
use crate::engine::task_system::TaskSystem;
use crate::engine::types::QuestId;


/// Lifecycle state of a daily quest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum QuestState {
    /// Preconditions are not met; carrying it out is refused.
    Unavailable = 0,
    /// Ready to be carried out.
    Available = 1,
    /// Submitted or running.
    InProgress = 2,
    /// Finished this frame.
    Complete = 3,
}

impl QuestState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => QuestState::Unavailable,
            1 => QuestState::Available,
            2 => QuestState::InProgress,
            _ => QuestState::Complete,
        }
    }
}

struct DailyQuest {
    name: String,
    state: Arc<AtomicU8>,
    task: Task,
}

impl DailyQuest {
    fn state(&self) -> QuestState {
        QuestState::from_raw(self.state.load(Ordering::Acquire))
    }

    fn store(&self, state: QuestState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn claim(&self, previous: QuestState) -> bool {
        self.state
            .compare_exchange(
                previous as u8,
                QuestState::InProgress as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    // Undoes `claim` unless the state moved on meanwhile.
    fn release_claim(&self, previous: QuestState) {
        let _ = self.state.compare_exchange(
            QuestState::InProgress as u8,
            previous as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

/// Registry of daily quests.
#[derive(Default)]
pub struct QuestSystem {
    quests: RwLock<HashMap<QuestId, Arc<DailyQuest>>>,
}

impl QuestSystem {
    /// Creates an empty quest system.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `function` as the daily quest `id`.
    ///
    /// The quest starts [`QuestState::Available`] and waits by blocking.
    pub fn register_daily_quest<F>(
        &self,
        id: QuestId,
        name: impl Into<String>,
        function: F,
    ) -> Result<(), QuestError>
    where
        F: FnMut() + Send + 'static,
    {
        self.register_daily_quest_with(id, name, WaitMode::Block, function)
    }

    /// Registers a daily quest with an explicit wait mode.
    pub fn register_daily_quest_with<F>(
        &self,
        id: QuestId,
        name: impl Into<String>,
        wait_mode: WaitMode,
        mut function: F,
    ) -> Result<(), QuestError>
    where
        F: FnMut() + Send + 'static,
    {
        let mut quests = self.quests.write().unwrap_or_else(PoisonError::into_inner);
        if quests.contains_key(&id) {
            return Err(QuestError::AlreadyRegistered(id));
        }

        let name = name.into();
        let state = Arc::new(AtomicU8::new(QuestState::Available as u8));
        let body_state = Arc::clone(&state);
        let task = Task::with_options(name.clone(), TaskPriority::High, wait_mode, move || {
            body_state.store(QuestState::InProgress as u8, Ordering::Release);
            function();
            body_state.store(QuestState::Complete as u8, Ordering::Release);
        });

        log::debug!("registered daily quest {id:?} `{name}`");
        quests.insert(id, Arc::new(DailyQuest { name, state, task }));
        Ok(())
    }

    fn quest(&self, id: QuestId) -> Result<Arc<DailyQuest>, QuestError> {
        self.quests
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(QuestError::Unregistered(id))
    }

    /// Submits quest `id` to `tasks`.
    ///
    /// Refused if the quest is unregistered, unavailable or still running.
    pub fn carry_out_daily_quest(&self, id: QuestId, tasks: &TaskSystem) -> Result<(), QuestError> {
        let quest = self.quest(id)?;

        // A body that panicked never reached `Complete`; the finished task
        // is what tells whether the quest is really still running.
        if !quest.task.is_executed() {
            return Err(QuestError::AlreadyInProgress(id));
        }
        let previous = quest.state();
        if previous == QuestState::Unavailable {
            return Err(QuestError::Unavailable(id));
        }

        // Only the caller that moves the quest out of `previous` submits it.
        if !quest.claim(previous) {
            return Err(QuestError::AlreadyInProgress(id));
        }
        match tasks.execute_task(&quest.task) {
            Ok(()) => Ok(()),
            Err(TaskError::StillInFlight { .. }) => Err(QuestError::AlreadyInProgress(id)),
            Err(error) => {
                quest.release_claim(previous);
                Err(error.into())
            }
        }
    }

    /// Blocks until quest `id` has finished its current run.
    pub fn wait_for_daily_quest(&self, id: QuestId) -> Result<(), QuestError> {
        let quest = self.quest(id)?;
        quest.task.wait();
        Ok(())
    }

    /// Re-arms every completed quest for the next frame.
    pub fn pre_update(&self) {
        let quests = self.quests.read().unwrap_or_else(PoisonError::into_inner);
        for quest in quests.values() {
            let _ = quest.state.compare_exchange(
                QuestState::Complete as u8,
                QuestState::Available as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
    }

    /// Marks quest `id` as ready to be carried out.
    pub fn set_available(&self, id: QuestId) -> Result<(), QuestError> {
        self.transition(id, QuestState::Available)
    }

    /// Marks quest `id` as blocked by unmet preconditions.
    pub fn set_unavailable(&self, id: QuestId) -> Result<(), QuestError> {
        self.transition(id, QuestState::Unavailable)
    }

    fn transition(&self, id: QuestId, state: QuestState) -> Result<(), QuestError> {
        let quest = self.quest(id)?;
        if !quest.task.is_executed() {
            return Err(QuestError::AlreadyInProgress(id));
        }
        quest.store(state);
        Ok(())
    }

    /// Current state of quest `id`.
    pub fn state(&self, id: QuestId) -> Option<QuestState> {
        self.quest(id).ok().map(|quest| quest.state())
    }

    /// Name of quest `id`.
    pub fn name(&self, id: QuestId) -> Option<String> {
        self.quest(id).ok().map(|quest| quest.name.clone())
    }

    /// Number of registered quests.
    pub fn len(&self) -> usize {
        self.quests.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` if no quest is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for QuestSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuestSystem").field("quests", &self.len()).finish()
    }
}
