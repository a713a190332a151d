//! Engine configuration.
//!
//! Configuration is plain data: it is built by the game (or deserialized from
//! whatever format the game uses) and handed to
//! [`Engine::initialize`](crate::engine::context::Engine::initialize). The
//! core never reads files or environment variables on its own.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::error::ConfigError;
use crate::engine::task::WaitMode;
use crate::engine::types::{ENGINE_RESERVED_TASK_SLOTS, FALLBACK_HARDWARE_THREADS};


/// What an executor does when both task queues are empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdlePolicy {
    /// Busy-spin with a CPU relax hint.
    Spin,
    /// Yield the time slice to the OS scheduler.
    Yield,
    /// Sleep for a fixed duration between polls.
    Sleep(Duration),
}

impl Default for IdlePolicy {
    fn default() -> Self {
        IdlePolicy::Yield
    }
}

impl IdlePolicy {
    /// Performs one idle step.
    #[inline]
    pub fn idle(self) {
        match self {
            IdlePolicy::Spin => std::hint::spin_loop(),
            IdlePolicy::Yield => std::thread::yield_now(),
            IdlePolicy::Sleep(duration) => std::thread::sleep(duration),
        }
    }
}

/// Settings for the task system.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultithreadingConfiguration {
    /// Overrides hardware thread detection, e.g. to simulate a smaller machine.
    pub hardware_threads: Option<usize>,
    /// Extra queue slots per priority for game-side tasks.
    pub additional_task_slots: usize,
    /// Executor behaviour on empty queues.
    pub idle_policy: IdlePolicy,
    /// Wait mode given to tasks created without an explicit one.
    pub default_wait_mode: WaitMode,
}

impl MultithreadingConfiguration {
    /// Rejects settings the task system cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hardware_threads == Some(0) {
            return Err(ConfigError::ZeroHardwareThreads);
        }
        Ok(())
    }

    /// Hardware threads to plan for: the override if set, otherwise the
    /// detected parallelism, otherwise [`FALLBACK_HARDWARE_THREADS`].
    pub fn resolve_hardware_threads(&self) -> usize {
        if let Some(threads) = self.hardware_threads {
            return threads;
        }
        match std::thread::available_parallelism() {
            Ok(threads) => threads.get(),
            Err(error) => {
                log::warn!(
                    "hardware thread detection failed ({error}), assuming {FALLBACK_HARDWARE_THREADS}"
                );
                FALLBACK_HARDWARE_THREADS
            }
        }
    }

    /// Number of executor threads for `hardware_threads`: one fewer than the
    /// hardware threads, leaving the main thread free, but never zero.
    pub fn executors_for(hardware_threads: usize) -> usize {
        hardware_threads.saturating_sub(1).max(1)
    }

    /// Slots per priority queue for `executors` workers.
    pub fn queue_slots_for(&self, executors: usize) -> usize {
        executors + ENGINE_RESERVED_TASK_SLOTS + self.additional_task_slots
    }
}

/// Top-level engine configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfiguration {
    /// Task system settings.
    pub multithreading: MultithreadingConfiguration,
}

impl EngineConfiguration {
    /// Validates every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.multithreading.validate()
    }
}
