use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::time::Duration;

use hearth_engine::{
    IdlePolicy, MultithreadingConfiguration, Task, TaskError, TaskPriority, TaskSystem, WaitMode,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn configuration(hardware_threads: usize) -> MultithreadingConfiguration {
    MultithreadingConfiguration {
        hardware_threads: Some(hardware_threads),
        ..Default::default()
    }
}

/// Occupies the only executor of a two-thread system until the returned
/// barrier is waited on.
fn park_executor(system: &TaskSystem) -> Arc<Barrier> {
    let gate = Arc::new(Barrier::new(2));
    let started = Arc::new(AtomicBool::new(false));
    let (g, s) = (gate.clone(), started.clone());
    let blocker = Task::new("blocker", move || {
        s.store(true, Ordering::SeqCst);
        g.wait();
    });
    system.execute_task(&blocker).unwrap();
    while !started.load(Ordering::SeqCst) {
        std::thread::yield_now();
    }
    gate
}

#[test]
fn hundred_counter_tasks_all_run_before_release_returns() {
    init_logging();
    let mut system = TaskSystem::with_configuration(&configuration(4)).unwrap();
    assert_eq!(system.hardware_threads(), 4);
    assert_eq!(system.number_of_task_executors(), 3);

    let counter = Arc::new(AtomicUsize::new(0));
    let tasks: Vec<Task> = (0..100)
        .map(|i| {
            let counter = counter.clone();
            Task::new(format!("count {i}"), move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();

    for task in &tasks {
        system.execute_task(task).unwrap();
    }

    system.release();
    assert!(!system.is_initialized());
    assert_eq!(counter.load(Ordering::SeqCst), 100);
    assert!(tasks.iter().all(Task::is_executed));
}

#[test]
fn executor_count_is_never_zero() {
    let system = TaskSystem::with_configuration(&configuration(1)).unwrap();
    assert_eq!(system.number_of_task_executors(), 1);
}

#[test]
fn zero_hardware_threads_is_rejected() {
    let error = TaskSystem::with_configuration(&configuration(0)).unwrap_err();
    assert!(matches!(error, TaskError::Configuration(_)));
}

#[test]
fn queue_is_sized_from_executors_and_reserved_slots() {
    let mut config = configuration(4);
    config.additional_task_slots = 100;
    let system = TaskSystem::with_configuration(&config).unwrap();
    // 3 executors + 64 reserved + 100 additional, rounded to a power of two.
    assert_eq!(system.queue_capacity(), 256);
}

#[test]
fn double_initialize_is_rejected() {
    let mut system = TaskSystem::with_configuration(&configuration(2)).unwrap();
    assert!(matches!(
        system.initialize(&configuration(2)),
        Err(TaskError::AlreadyInitialized)
    ));
}

#[test]
fn uninitialized_system_refuses_tasks() {
    let system = TaskSystem::new();
    let task = Task::new("orphan", || {});
    assert!(matches!(
        system.execute_task(&task),
        Err(TaskError::NotInitialized)
    ));
    assert!(task.is_executed());
}

#[test]
fn fresh_task_counts_as_executed() {
    let task = Task::new("never submitted", || {});
    assert!(task.is_executed());
    task.wait();
    task.wait_for(WaitMode::Spin);
    assert!(task.wait_timeout(Duration::from_millis(1)));
}

#[test]
fn task_is_reusable_after_completion() {
    let system = TaskSystem::with_configuration(&configuration(2)).unwrap();
    let counter = Arc::new(AtomicUsize::new(0));
    let c = counter.clone();
    let task = Task::new("repeat", move || {
        c.fetch_add(1, Ordering::SeqCst);
    });

    for _ in 0..10 {
        system.execute_task(&task).unwrap();
        task.wait();
    }
    assert_eq!(counter.load(Ordering::SeqCst), 10);
}

#[test]
fn resubmitting_an_in_flight_task_is_refused() {
    let system = TaskSystem::with_configuration(&configuration(2)).unwrap();
    let gate = Arc::new(Barrier::new(2));
    let g = gate.clone();
    let task = Task::new("blocked", move || {
        g.wait();
    });

    system.execute_task(&task).unwrap();
    assert!(matches!(
        system.execute_task(&task),
        Err(TaskError::StillInFlight { .. })
    ));

    gate.wait();
    task.wait();
    assert!(task.is_executed());
}

#[test]
fn running_a_queued_task_inline_is_refused() {
    let system = TaskSystem::with_configuration(&configuration(2)).unwrap();
    let gate = park_executor(&system);
    let runs = Arc::new(AtomicUsize::new(0));
    let r = runs.clone();
    let task = Task::new("queued", move || {
        r.fetch_add(1, Ordering::SeqCst);
    });

    system.execute_task(&task).unwrap();
    match task.execute() {
        Err(TaskError::StillInFlight { name }) => assert_eq!(name, "queued"),
        other => panic!("expected StillInFlight, got {other:?}"),
    }
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    gate.wait();
    task.wait();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    task.execute().unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert!(task.is_executed());
}

#[test]
fn full_queue_rejects_and_leaves_task_completed() {
    let system = TaskSystem::with_configuration(&configuration(2)).unwrap();
    let capacity = system.queue_capacity();
    let gate = park_executor(&system);

    let fillers: Vec<Task> = (0..capacity)
        .map(|i| Task::new(format!("filler {i}"), || {}))
        .collect();
    for filler in &fillers {
        system.execute_task(filler).unwrap();
    }

    let rejected = Task::new("one too many", || {});
    match system.execute_task(&rejected) {
        Err(TaskError::QueueFull { capacity: reported, .. }) => assert_eq!(reported, capacity),
        other => panic!("expected QueueFull, got {other:?}"),
    }
    assert!(rejected.is_executed(), "rejected task must not look in flight");

    // Low priority has its own queue.
    let low = Task::with_options("low lane", TaskPriority::Low, WaitMode::Block, || {});
    system.execute_task(&low).unwrap();

    gate.wait();
    for filler in &fillers {
        filler.wait();
    }
    low.wait();
}

#[test]
fn spin_and_block_waits_both_observe_completion() {
    let system = TaskSystem::with_configuration(&configuration(3)).unwrap();
    for mode in [WaitMode::Spin, WaitMode::Block] {
        let done = Arc::new(AtomicUsize::new(0));
        let d = done.clone();
        let task = Task::with_options("sleepy", TaskPriority::Low, mode, move || {
            std::thread::sleep(Duration::from_millis(20));
            d.store(1, Ordering::SeqCst);
        });
        system.execute_task(&task).unwrap();
        task.wait();
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }
}

#[test]
fn wait_timeout_reports_unfinished_task() {
    let system = TaskSystem::with_configuration(&configuration(2)).unwrap();
    let gate = Arc::new(Barrier::new(2));
    let g = gate.clone();
    let task = Task::new("held", move || {
        g.wait();
    });
    system.execute_task(&task).unwrap();

    assert!(!task.wait_timeout(Duration::from_millis(20)));
    gate.wait();
    assert!(task.wait_timeout(Duration::from_secs(5)));
}

#[test]
fn high_priority_runs_before_low_priority_on_the_same_executor() {
    let system = TaskSystem::with_configuration(&configuration(2)).unwrap();
    let gate = park_executor(&system);

    let order = Arc::new(Mutex::new(Vec::new()));
    let make = |label: &'static str, priority: TaskPriority| {
        let order = order.clone();
        Task::with_options(label, priority, WaitMode::Block, move || {
            order.lock().unwrap().push(label);
        })
    };
    let low = make("low", TaskPriority::Low);
    let high = make("high", TaskPriority::High);

    system.execute_task(&low).unwrap();
    system.execute_task(&high).unwrap();

    gate.wait();
    low.wait();
    high.wait();
    assert_eq!(*order.lock().unwrap(), vec!["high", "low"]);
}

#[test]
fn do_work_lets_the_caller_execute_queued_tasks() {
    let system = TaskSystem::with_configuration(&configuration(2)).unwrap();
    let gate = park_executor(&system);

    let ran = Arc::new(AtomicUsize::new(0));
    let r = ran.clone();
    let task = Task::with_options("helped", TaskPriority::Low, WaitMode::Block, move || {
        r.fetch_add(1, Ordering::SeqCst);
    });
    system.execute_task(&task).unwrap();

    assert!(!system.do_work(TaskPriority::High));
    assert!(system.do_work(TaskPriority::Low));
    assert!(task.is_executed());
    assert_eq!(ran.load(Ordering::SeqCst), 1);

    gate.wait();
}

#[test]
fn wait_helping_completes_work_while_executors_are_busy() {
    let system = TaskSystem::with_configuration(&configuration(2)).unwrap();
    let gate = park_executor(&system);

    let task = Task::new("needs help", || {});
    system.execute_task(&task).unwrap();
    system.wait_helping(&task);
    assert!(task.is_executed());

    gate.wait();
}

#[test]
fn panicking_task_is_isolated_and_counted() {
    init_logging();
    let system = TaskSystem::with_configuration(&configuration(2)).unwrap();
    let task = Task::new("explodes", || panic!("boom"));

    system.execute_task(&task).unwrap();
    task.wait();
    assert!(task.panicked());

    let healthy = Task::new("healthy", || {});
    system.execute_task(&healthy).unwrap();
    healthy.wait();
    assert!(!healthy.panicked());

    let statistics = system.statistics();
    assert_eq!(statistics.submitted, 2);
    assert_eq!(statistics.executed, 2);
    assert_eq!(statistics.panicked, 1);
}

#[test]
fn parallel_for_touches_every_element_exactly_once() {
    let system = TaskSystem::with_configuration(&configuration(4)).unwrap();
    let mut values: Vec<u64> = (0..10_000).collect();

    let batches = system
        .parallel_for(&mut values, 256, |batch, offset| {
            for (i, value) in batch.iter_mut().enumerate() {
                assert_eq!(*value, (offset + i) as u64);
                *value *= 2;
            }
        })
        .unwrap();

    assert_eq!(batches, 10_000usize.div_ceil(256));
    assert!(values.iter().enumerate().all(|(i, v)| *v == 2 * i as u64));
}

#[test]
fn parallel_for_with_automatic_batches_and_empty_input() {
    let system = TaskSystem::with_configuration(&configuration(3)).unwrap();
    let mut empty: Vec<u32> = Vec::new();
    assert_eq!(system.parallel_for(&mut empty, 0, |_, _| {}).unwrap(), 0);

    let mut values = vec![1u32; 1000];
    let batches = system
        .parallel_for(&mut values, 0, |batch, _| {
            batch.iter_mut().for_each(|v| *v += 1);
        })
        .unwrap();
    assert_eq!(batches, 2);
    assert!(values.iter().all(|v| *v == 2));
}

#[test]
fn parallel_for_survives_more_batches_than_queue_slots() {
    let system = TaskSystem::with_configuration(&configuration(2)).unwrap();
    let batches_wanted = system.queue_capacity() * 3;
    let mut values = vec![0usize; batches_wanted];

    let batches = system
        .parallel_for(&mut values, 1, |batch, offset| batch[0] = offset)
        .unwrap();

    assert_eq!(batches, batches_wanted);
    assert!(values.iter().enumerate().all(|(i, v)| *v == i));
}

#[test]
#[should_panic(expected = "parallel_for")]
fn parallel_for_reraises_batch_panics() {
    let system = TaskSystem::with_configuration(&configuration(2)).unwrap();
    let mut values = vec![0u8; 64];
    let _ = system.parallel_for(&mut values, 8, |_, offset| {
        if offset == 16 {
            panic!("bad batch");
        }
    });
}

#[test]
fn idle_policies_all_make_progress() {
    for idle_policy in [
        IdlePolicy::Spin,
        IdlePolicy::Yield,
        IdlePolicy::Sleep(Duration::from_micros(50)),
    ] {
        let config = MultithreadingConfiguration {
            hardware_threads: Some(2),
            idle_policy,
            ..Default::default()
        };
        let system = TaskSystem::with_configuration(&config).unwrap();
        // Let the executor reach its idle state first.
        std::thread::sleep(Duration::from_millis(5));
        let task = Task::new("after idle", || {});
        system.execute_task(&task).unwrap();
        task.wait();
    }
}

#[test]
fn release_is_idempotent_and_allows_reinitialization() {
    let mut system = TaskSystem::with_configuration(&configuration(2)).unwrap();
    system.release();
    system.release();
    assert!(!system.is_initialized());

    system.initialize(&configuration(3)).unwrap();
    assert_eq!(system.number_of_task_executors(), 2);
    let task = Task::new("second life", || {});
    system.execute_task(&task).unwrap();
    task.wait();
}
