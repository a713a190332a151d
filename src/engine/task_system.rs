//! Fixed worker pool draining two priority task queues.
//!
//! ## Purpose
//!
//! The [`TaskSystem`] owns one executor thread per hardware thread minus one
//! (the main thread keeps its own core) and two [`AtomicQueue`]s of [`Task`]s,
//! one per [`TaskPriority`]. Any thread may submit; executors pop high
//! priority work first, then low priority work, and idle according to the
//! configured [`IdlePolicy`] when both queues are empty.
//!
//! ## Lifecycle
//!
//! `initialize` → `execute_task`* → `release`. Tasks still queued when
//! `release` is called are drained by the executors before they exit, so
//! every accepted submission eventually completes. Dropping the system
//! releases it.
//!
//! ## Failure model
//!
//! * Submitting a task that is still in flight is refused.
//! * A full queue refuses the task and leaves it completed, so waiting on it
//!   cannot hang.
//! * A panicking task body is caught on the executor, logged and counted; the
//!   executor keeps running.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_utils::Backoff;

use crate::engine::config::{IdlePolicy, MultithreadingConfiguration};
use crate::engine::error::TaskError;
use crate::engine::queue::{AtomicQueue, QueueMode};
use crate::engine::task::{Task, TaskFunction, TaskPriority, WaitMode};
use crate::profiling::profiler;


/// Counters describing task system activity since initialization.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TaskSystemStatistics {
    /// Tasks accepted by `execute_task`.
    pub submitted: u64,
    /// Tasks run to completion (including panicked ones).
    pub executed: u64,
    /// Tasks whose body panicked.
    pub panicked: u64,
}

struct Shared {
    running: AtomicBool,
    high: AtomicQueue<Task>,
    low: AtomicQueue<Task>,
    idle_policy: IdlePolicy,
    submitted: AtomicU64,
    executed: AtomicU64,
    panicked: AtomicU64,
}

impl Shared {
    fn queue(&self, priority: TaskPriority) -> &AtomicQueue<Task> {
        match priority {
            TaskPriority::High => &self.high,
            TaskPriority::Low => &self.low,
        }
    }

    fn pop_any(&self) -> Option<Task> {
        self.high.pop().or_else(|| self.low.pop())
    }

    fn run(&self, task: Task) {
        if !task.execute_isolated() {
            self.panicked.fetch_add(1, Ordering::Relaxed);
        }
        self.executed.fetch_add(1, Ordering::Relaxed);
    }
}

fn run_executor(shared: Arc<Shared>, index: usize) {
    profiler::set_thread_name(&format!("task executor {index}"));
    log::debug!("task executor {index} started");

    let backoff = Backoff::new();
    loop {
        if let Some(task) = shared.pop_any() {
            shared.run(task);
            backoff.reset();
            continue;
        }

        if !shared.running.load(Ordering::Acquire) {
            break;
        }

        if backoff.is_completed() {
            shared.idle_policy.idle();
        } else {
            backoff.snooze();
        }
    }

    log::debug!("task executor {index} stopped");
}

struct BatchPtr<T> {
    start: *mut T,
    len: usize,
}

// SAFETY: each batch pointer covers a disjoint sub-slice that only one task
// touches, and `parallel_for` outlives every task it creates.
unsafe impl<T: Send> Send for BatchPtr<T> {}

impl<T> BatchPtr<T> {
    /// # Safety
    /// The originating slice must still be borrowed and no other reference to
    /// this range may exist.
    unsafe fn as_mut_slice<'a>(&self) -> &'a mut [T] {
        // SAFETY: forwarded to the caller.
        unsafe { std::slice::from_raw_parts_mut(self.start, self.len) }
    }
}

/// Pool of task executor threads.
pub struct TaskSystem {
    shared: Option<Arc<Shared>>,
    workers: Vec<JoinHandle<()>>,
    hardware_threads: usize,
    default_wait_mode: WaitMode,
}

impl Default for TaskSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskSystem {
    /// Creates an uninitialized task system.
    pub fn new() -> Self {
        Self {
            shared: None,
            workers: Vec::new(),
            hardware_threads: 0,
            default_wait_mode: WaitMode::default(),
        }
    }

    /// Creates and initializes a task system in one step.
    pub fn with_configuration(
        configuration: &MultithreadingConfiguration,
    ) -> Result<Self, TaskError> {
        let mut system = Self::new();
        system.initialize(configuration)?;
        Ok(system)
    }

    /// Detects the hardware, sizes the queues and spawns the executors.
    pub fn initialize(
        &mut self,
        configuration: &MultithreadingConfiguration,
    ) -> Result<(), TaskError> {
        if self.shared.is_some() {
            return Err(TaskError::AlreadyInitialized);
        }
        configuration.validate()?;

        let hardware_threads = configuration.resolve_hardware_threads();
        let executors = MultithreadingConfiguration::executors_for(hardware_threads);
        let slots = configuration.queue_slots_for(executors);

        let shared = Arc::new(Shared {
            running: AtomicBool::new(true),
            high: AtomicQueue::new(slots, QueueMode::Multiple, QueueMode::Multiple),
            low: AtomicQueue::new(slots, QueueMode::Multiple, QueueMode::Multiple),
            idle_policy: configuration.idle_policy,
            submitted: AtomicU64::new(0),
            executed: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
        });

        let mut workers = Vec::with_capacity(executors);
        for index in 0..executors {
            let worker_shared = Arc::clone(&shared);
            let spawned = std::thread::Builder::new()
                .name(format!("hearth-executor-{index}"))
                .spawn(move || run_executor(worker_shared, index));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(error) => {
                    shared.running.store(false, Ordering::Release);
                    for handle in workers {
                        let _ = handle.join();
                    }
                    log::error!("failed to spawn task executor {index}: {error}");
                    return Err(TaskError::SpawnFailed(error));
                }
            }
        }

        log::info!(
            "task system initialized: {hardware_threads} hardware threads, {executors} executors, {} slots per queue",
            shared.high.capacity()
        );

        self.shared = Some(shared);
        self.workers = workers;
        self.hardware_threads = hardware_threads;
        self.default_wait_mode = configuration.default_wait_mode;
        Ok(())
    }

    /// Returns `true` between `initialize` and `release`.
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.shared.is_some()
    }

    /// Hardware threads the system was sized for.
    #[inline]
    pub fn hardware_threads(&self) -> usize {
        self.hardware_threads
    }

    /// Number of executor threads.
    #[inline]
    pub fn number_of_task_executors(&self) -> usize {
        self.workers.len()
    }

    /// Slots per priority queue, or 0 when uninitialized.
    pub fn queue_capacity(&self) -> usize {
        self.shared.as_ref().map_or(0, |shared| shared.high.capacity())
    }

    /// Wait mode for tasks created through [`create_task`](Self::create_task).
    #[inline]
    pub fn default_wait_mode(&self) -> WaitMode {
        self.default_wait_mode
    }

    /// Creates a task carrying the configured default wait mode.
    pub fn create_task<F>(&self, name: impl Into<String>, priority: TaskPriority, function: F) -> Task
    where
        F: FnMut() + Send + 'static,
    {
        Task::with_options(name, priority, self.default_wait_mode, function)
    }

    fn shared(&self) -> Result<&Arc<Shared>, TaskError> {
        self.shared.as_ref().ok_or(TaskError::NotInitialized)
    }

    /// Queues `task` for execution on an executor.
    ///
    /// Fails if the task has not completed its previous submission or the
    /// queue for its priority is full. In both cases nothing is queued.
    pub fn execute_task(&self, task: &Task) -> Result<(), TaskError> {
        let shared = self.shared()?;

        if !task.try_begin() {
            log::warn!("refusing to resubmit in-flight task `{}`", task.name());
            return Err(TaskError::StillInFlight {
                name: task.name().to_owned(),
            });
        }

        let queue = shared.queue(task.priority());
        match queue.push(task.clone()) {
            Ok(()) => {
                shared.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(full) => {
                let rejected = full.into_inner();
                rejected.cancel_begin();
                log::warn!(
                    "task queue full ({} slots), rejected `{}`",
                    queue.capacity(),
                    rejected.name()
                );
                Err(TaskError::QueueFull {
                    name: rejected.name().to_owned(),
                    capacity: queue.capacity(),
                })
            }
        }
    }

    /// Executes one queued task of `priority` on the calling thread.
    ///
    /// Returns `false` if that queue was empty.
    pub fn do_work(&self, priority: TaskPriority) -> bool {
        let Some(shared) = self.shared.as_ref() else {
            return false;
        };
        match shared.queue(priority).pop() {
            Some(task) => {
                shared.run(task);
                true
            }
            None => false,
        }
    }

    fn do_any_work(&self) -> bool {
        self.do_work(TaskPriority::High) || self.do_work(TaskPriority::Low)
    }

    /// Waits for `task`, executing queued work on the calling thread meanwhile.
    pub fn wait_helping(&self, task: &Task) {
        let backoff = Backoff::new();
        while !task.is_executed() {
            if self.do_any_work() {
                backoff.reset();
            } else {
                backoff.snooze();
            }
        }
    }

    /// Splits `data` into batches of `batch_size` elements and runs `function`
    /// on every batch in parallel, passing each batch its starting offset.
    ///
    /// A `batch_size` of 0 picks one batch per executor. Returns the number of
    /// batches. All batches have finished when this returns; a batch whose
    /// queue slot was unavailable runs on the calling thread. If any batch
    /// panicked, the panic is re-raised here after every batch finished.
    pub fn parallel_for<T, F>(
        &self,
        data: &mut [T],
        batch_size: usize,
        function: F,
    ) -> Result<usize, TaskError>
    where
        T: Send,
        F: Fn(&mut [T], usize) + Sync,
    {
        self.shared()?;
        if data.is_empty() {
            return Ok(0);
        }

        let batch_size = if batch_size == 0 {
            data.len().div_ceil(self.number_of_task_executors().max(1))
        } else {
            batch_size
        };

        let batch_count = data.len().div_ceil(batch_size);
        let function = &function;
        let mut tasks = Vec::with_capacity(batch_count);
        let mut panicked = false;

        for (batch_index, batch) in data.chunks_mut(batch_size).enumerate() {
            let offset = batch_index * batch_size;
            let batch = BatchPtr {
                start: batch.as_mut_ptr(),
                len: batch.len(),
            };

            let body: Box<dyn FnMut() + Send + '_> = Box::new(move || {
                // SAFETY: batches are disjoint and `data` stays borrowed until
                // every task below has completed.
                let slice = unsafe { batch.as_mut_slice() };
                function(slice, offset);
            });
            // SAFETY: every task is waited on and its body cleared before this
            // function returns, so nothing borrowed outlives the call.
            let body: TaskFunction = unsafe {
                std::mem::transmute::<Box<dyn FnMut() + Send + '_>, TaskFunction>(body)
            };

            let task = Task::from_boxed(
                format!("parallel_for batch {batch_index}"),
                TaskPriority::High,
                WaitMode::Spin,
                body,
            );

            match self.execute_task(&task) {
                Ok(()) => tasks.push(task),
                Err(TaskError::QueueFull { .. }) => {
                    panicked |= !task.execute_isolated();
                    task.clear_function();
                }
                Err(error) => {
                    for queued in &tasks {
                        self.wait_helping(queued);
                        queued.clear_function();
                    }
                    task.clear_function();
                    return Err(error);
                }
            }
        }

        for task in &tasks {
            self.wait_helping(task);
            panicked |= task.panicked();
            task.clear_function();
        }

        if panicked {
            panic!("parallel_for: a batch panicked");
        }
        Ok(batch_count)
    }

    /// Activity counters.
    pub fn statistics(&self) -> TaskSystemStatistics {
        self.shared
            .as_ref()
            .map_or_else(TaskSystemStatistics::default, |shared| TaskSystemStatistics {
                submitted: shared.submitted.load(Ordering::Relaxed),
                executed: shared.executed.load(Ordering::Relaxed),
                panicked: shared.panicked.load(Ordering::Relaxed),
            })
    }

    /// Stops the executors after they drain the queues and joins them.
    ///
    /// Idempotent; the system can be initialized again afterwards.
    pub fn release(&mut self) {
        let Some(shared) = self.shared.take() else {
            return;
        };

        shared.running.store(false, Ordering::Release);
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::error!("task executor terminated abnormally");
            }
        }

        // Work submitted after the executors observed shutdown.
        while let Some(task) = shared.pop_any() {
            shared.run(task);
        }

        log::info!(
            "task system released: {} submitted, {} executed, {} panicked",
            shared.submitted.load(Ordering::Relaxed),
            shared.executed.load(Ordering::Relaxed),
            shared.panicked.load(Ordering::Relaxed)
        );
    }
}

impl Drop for TaskSystem {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for TaskSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSystem")
            .field("initialized", &self.is_initialized())
            .field("hardware_threads", &self.hardware_threads)
            .field("executors", &self.workers.len())
            .field("queue_capacity", &self.queue_capacity())
            .finish()
    }
}
