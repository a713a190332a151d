//! Units of work executed by the task system.
//!
//! A [`Task`] is a cheap, cloneable handle to a boxed closure plus a completion
//! signal. The same task can be submitted repeatedly (this is how daily quests
//! and per-frame subsystem jobs are modelled), but only once it has completed
//! its previous run.
//!
//! ## Completion protocol
//!
//! * A task starts out *executed*, so waiting on a task that was never
//!   submitted returns immediately.
//! * Submission flips the flag to not-executed; the flip is a compare-and-swap,
//!   so a second submission of an in-flight task is detected and refused.
//! * After the closure returns (or panics, on an executor) the flag is set with
//!   release ordering and blocked waiters are notified.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crossbeam_utils::Backoff;
use serde::{Deserialize, Serialize};

use crate::engine::error::TaskError;
use crate::profiling::profiler;


/// Boxed task body.
pub type TaskFunction = Box<dyn FnMut() + Send + 'static>;

/// Queue a task is dispatched to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    /// Drained before any low priority task.
    #[default]
    High,
    /// Background work.
    Low,
}

/// How a thread waits for a task to complete.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitMode {
    /// Spin with exponential backoff, yielding once the backoff saturates.
    Spin,
    /// Sleep on a condition variable.
    #[default]
    Block,
}

struct TaskState {
    name: String,
    priority: TaskPriority,
    wait_mode: WaitMode,
    function: Mutex<TaskFunction>,
    executed: AtomicBool,
    panicked: AtomicBool,
    signal: Mutex<()>,
    completed: Condvar,
}

impl TaskState {
    fn complete(&self) {
        self.executed.store(true, Ordering::Release);
        let _signal = self.signal.lock().unwrap_or_else(PoisonError::into_inner);
        self.completed.notify_all();
    }
}

/// Shared handle to a unit of work.
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use hearth_engine::Task;
///
/// let counter = Arc::new(AtomicUsize::new(0));
/// let c = counter.clone();
/// let task = Task::new("count", move || {
///     c.fetch_add(1, Ordering::Relaxed);
/// });
///
/// task.execute().unwrap();
/// assert!(task.is_executed());
/// assert_eq!(counter.load(Ordering::Relaxed), 1);
/// ```
#[derive(Clone)]
pub struct Task {
    inner: Arc<TaskState>,
}

impl Task {
    /// Creates a high priority, blocking-wait task.
    pub fn new<F>(name: impl Into<String>, function: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        Self::with_options(name, TaskPriority::High, WaitMode::Block, function)
    }

    /// Creates a task with explicit priority and wait mode.
    pub fn with_options<F>(
        name: impl Into<String>,
        priority: TaskPriority,
        wait_mode: WaitMode,
        function: F,
    ) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        Self::from_boxed(name.into(), priority, wait_mode, Box::new(function))
    }

    pub(crate) fn from_boxed(
        name: String,
        priority: TaskPriority,
        wait_mode: WaitMode,
        function: TaskFunction,
    ) -> Self {
        Self {
            inner: Arc::new(TaskState {
                name,
                priority,
                wait_mode,
                function: Mutex::new(function),
                executed: AtomicBool::new(true),
                panicked: AtomicBool::new(false),
                signal: Mutex::new(()),
                completed: Condvar::new(),
            }),
        }
    }

    /// Returns a copy of this task with a different priority.
    ///
    /// Only meaningful before the task is shared; the closure moves over.
    pub fn with_priority(self, priority: TaskPriority) -> Self {
        let wait_mode = self.inner.wait_mode;
        self.rebuild(priority, wait_mode)
    }

    /// Returns a copy of this task with a different default wait mode.
    pub fn with_wait_mode(self, wait_mode: WaitMode) -> Self {
        let priority = self.inner.priority;
        self.rebuild(priority, wait_mode)
    }

    fn rebuild(self, priority: TaskPriority, wait_mode: WaitMode) -> Self {
        match Arc::try_unwrap(self.inner) {
            Ok(state) => {
                let function = state
                    .function
                    .into_inner()
                    .unwrap_or_else(PoisonError::into_inner);
                Self::from_boxed(state.name, priority, wait_mode, function)
            }
            Err(shared) => {
                // Another handle exists; the body cannot be moved out, so the
                // new task forwards to the shared one.
                let target = Task { inner: shared };
                let name = target.inner.name.clone();
                Self::from_boxed(
                    name,
                    priority,
                    wait_mode,
                    Box::new(move || target.run_body()),
                )
            }
        }
    }

    /// Task name, used in logs and profiles.
    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Queue this task is dispatched to.
    #[inline]
    pub fn priority(&self) -> TaskPriority {
        self.inner.priority
    }

    /// Wait mode used by [`wait`](Self::wait).
    #[inline]
    pub fn wait_mode(&self) -> WaitMode {
        self.inner.wait_mode
    }

    /// Returns `true` once the most recent submission has finished.
    #[inline]
    pub fn is_executed(&self) -> bool {
        self.inner.executed.load(Ordering::Acquire)
    }

    /// Returns `true` if the last run on an executor panicked.
    #[inline]
    pub fn panicked(&self) -> bool {
        self.inner.panicked.load(Ordering::Acquire)
    }

    /// Returns `true` if both handles refer to the same task.
    #[inline]
    pub fn ptr_eq(&self, other: &Task) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Runs the task on the calling thread and signals completion.
    ///
    /// Refused with [`TaskError::StillInFlight`] while the task is queued or
    /// running elsewhere. A panic in the body propagates to the caller; waiters
    /// are still released.
    pub fn execute(&self) -> Result<(), TaskError> {
        struct CompleteOnDrop<'a>(&'a TaskState);
        impl Drop for CompleteOnDrop<'_> {
            fn drop(&mut self) {
                self.0.complete();
            }
        }

        if !self.try_begin() {
            return Err(TaskError::StillInFlight {
                name: self.inner.name.clone(),
            });
        }
        let _complete = CompleteOnDrop(&self.inner);
        self.run_body();
        Ok(())
    }

    /// Runs the task, catching a panic in the body.
    ///
    /// Returns `false` if the body panicked. Completion is signalled either way.
    pub(crate) fn execute_isolated(&self) -> bool {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run_body()));
        let succeeded = outcome.is_ok();
        if !succeeded {
            log::error!("task `{}` panicked", self.inner.name);
        }
        self.inner.panicked.store(!succeeded, Ordering::Release);
        self.inner.complete();
        succeeded
    }

    fn run_body(&self) {
        let _span = profiler::span(&self.inner.name);
        log::trace!("executing task `{}`", self.inner.name);
        let mut function = self
            .inner
            .function
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        (function)();
    }

    /// Marks the task as in flight; fails if it already is.
    pub(crate) fn try_begin(&self) -> bool {
        self.inner
            .executed
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Undoes [`try_begin`](Self::try_begin) for a task that was never queued.
    pub(crate) fn cancel_begin(&self) {
        self.inner.complete();
    }

    /// Replaces the body with a no-op, dropping whatever it captured.
    pub(crate) fn clear_function(&self) {
        let mut function = self
            .inner
            .function
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *function = Box::new(|| {});
    }

    /// Waits for completion using the task's default [`WaitMode`].
    pub fn wait(&self) {
        self.wait_for(self.inner.wait_mode);
    }

    /// Waits for completion using `mode`.
    pub fn wait_for(&self, mode: WaitMode) {
        match mode {
            WaitMode::Spin => {
                let backoff = Backoff::new();
                while !self.is_executed() {
                    backoff.snooze();
                }
            }
            WaitMode::Block => {
                if self.is_executed() {
                    return;
                }
                let mut signal = self
                    .inner
                    .signal
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                while !self.is_executed() {
                    signal = self
                        .inner
                        .completed
                        .wait(signal)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    /// Blocks for at most `timeout`; returns whether the task completed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut signal = self
            .inner
            .signal
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while !self.is_executed() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            signal = self
                .inner
                .completed
                .wait_timeout(signal, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.inner.name)
            .field("priority", &self.inner.priority)
            .field("executed", &self.is_executed())
            .finish_non_exhaustive()
    }
}
