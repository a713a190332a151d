use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

use hearth_engine::{
    MultithreadingConfiguration, QuestError, QuestId, QuestState, QuestSystem, TaskSystem, WaitMode,
};

const CULLING: QuestId = QuestId(1);
const ANIMATION: QuestId = QuestId(2);
const UNKNOWN: QuestId = QuestId(99);

fn task_system() -> TaskSystem {
    TaskSystem::with_configuration(&MultithreadingConfiguration {
        hardware_threads: Some(3),
        ..Default::default()
    })
    .unwrap()
}

#[test]
fn daily_quest_runs_once_and_rearms_on_pre_update() {
    let tasks = task_system();
    let quests = QuestSystem::new();
    let runs = Arc::new(AtomicUsize::new(0));
    let r = runs.clone();
    quests
        .register_daily_quest(CULLING, "update culling", move || {
            r.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    assert_eq!(quests.state(CULLING), Some(QuestState::Available));

    quests.carry_out_daily_quest(CULLING, &tasks).unwrap();
    quests.wait_for_daily_quest(CULLING).unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(quests.state(CULLING), Some(QuestState::Complete));

    quests.pre_update();
    assert_eq!(quests.state(CULLING), Some(QuestState::Available));

    // Next frame.
    quests.carry_out_daily_quest(CULLING, &tasks).unwrap();
    quests.wait_for_daily_quest(CULLING).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn duplicate_registration_is_rejected() {
    let quests = QuestSystem::new();
    quests.register_daily_quest(CULLING, "first", || {}).unwrap();
    assert!(matches!(
        quests.register_daily_quest(CULLING, "second", || {}),
        Err(QuestError::AlreadyRegistered(CULLING))
    ));
    assert_eq!(quests.len(), 1);
    assert_eq!(quests.name(CULLING).as_deref(), Some("first"));
}

#[test]
fn unregistered_quest_is_an_error() {
    let tasks = task_system();
    let quests = QuestSystem::new();
    assert!(matches!(
        quests.carry_out_daily_quest(UNKNOWN, &tasks),
        Err(QuestError::Unregistered(UNKNOWN))
    ));
    assert!(matches!(
        quests.wait_for_daily_quest(UNKNOWN),
        Err(QuestError::Unregistered(UNKNOWN))
    ));
    assert_eq!(quests.state(UNKNOWN), None);
}

#[test]
fn quest_in_progress_cannot_be_carried_out_again() {
    let tasks = task_system();
    let quests = QuestSystem::new();
    let gate = Arc::new(Barrier::new(2));
    let g = gate.clone();
    quests
        .register_daily_quest(ANIMATION, "update animation", move || {
            g.wait();
        })
        .unwrap();

    quests.carry_out_daily_quest(ANIMATION, &tasks).unwrap();
    assert_eq!(quests.state(ANIMATION), Some(QuestState::InProgress));
    assert!(matches!(
        quests.carry_out_daily_quest(ANIMATION, &tasks),
        Err(QuestError::AlreadyInProgress(ANIMATION))
    ));

    gate.wait();
    quests.wait_for_daily_quest(ANIMATION).unwrap();
    assert_eq!(quests.state(ANIMATION), Some(QuestState::Complete));
}

#[test]
fn racing_callers_submit_a_quest_once() {
    let tasks = task_system();
    let quests = QuestSystem::new();
    let gate = Arc::new(Barrier::new(2));
    let runs = Arc::new(AtomicUsize::new(0));
    let (g, r) = (gate.clone(), runs.clone());
    quests
        .register_daily_quest(ANIMATION, "update animation", move || {
            r.fetch_add(1, Ordering::SeqCst);
            g.wait();
        })
        .unwrap();

    const CALLERS: usize = 8;
    let start = Barrier::new(CALLERS);
    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                scope.spawn(|| {
                    start.wait();
                    quests.carry_out_daily_quest(ANIMATION, &tasks)
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|result| result.as_ref().err())
        .all(|error| matches!(error, QuestError::AlreadyInProgress(ANIMATION))));
    assert_eq!(quests.state(ANIMATION), Some(QuestState::InProgress));

    gate.wait();
    quests.wait_for_daily_quest(ANIMATION).unwrap();
    assert_eq!(quests.state(ANIMATION), Some(QuestState::Complete));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn unavailable_quest_is_refused_until_made_available() {
    let tasks = task_system();
    let quests = QuestSystem::new();
    let runs = Arc::new(AtomicUsize::new(0));
    let r = runs.clone();
    quests
        .register_daily_quest_with(CULLING, "culling", WaitMode::Spin, move || {
            r.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    quests.set_unavailable(CULLING).unwrap();
    assert!(matches!(
        quests.carry_out_daily_quest(CULLING, &tasks),
        Err(QuestError::Unavailable(CULLING))
    ));
    quests.pre_update();
    assert_eq!(quests.state(CULLING), Some(QuestState::Unavailable));

    quests.set_available(CULLING).unwrap();
    quests.carry_out_daily_quest(CULLING, &tasks).unwrap();
    quests.wait_for_daily_quest(CULLING).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn quest_that_panicked_can_run_again_next_frame() {
    let tasks = task_system();
    let quests = QuestSystem::new();
    let attempts = Arc::new(AtomicUsize::new(0));
    let a = attempts.clone();
    quests
        .register_daily_quest(CULLING, "flaky", move || {
            if a.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first frame fails");
            }
        })
        .unwrap();

    quests.carry_out_daily_quest(CULLING, &tasks).unwrap();
    quests.wait_for_daily_quest(CULLING).unwrap();
    assert_eq!(quests.state(CULLING), Some(QuestState::InProgress));

    quests.carry_out_daily_quest(CULLING, &tasks).unwrap();
    quests.wait_for_daily_quest(CULLING).unwrap();
    assert_eq!(quests.state(CULLING), Some(QuestState::Complete));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn carrying_out_without_a_running_task_system_restores_state() {
    let tasks = TaskSystem::new();
    let quests = QuestSystem::new();
    quests.register_daily_quest(CULLING, "culling", || {}).unwrap();

    assert!(matches!(
        quests.carry_out_daily_quest(CULLING, &tasks),
        Err(QuestError::Task(_))
    ));
    assert_eq!(quests.state(CULLING), Some(QuestState::Available));
}

#[test]
fn many_quests_run_concurrently() {
    let tasks = task_system();
    let quests = QuestSystem::new();
    let total = Arc::new(AtomicUsize::new(0));

    for id in 0..32 {
        let total = total.clone();
        quests
            .register_daily_quest(QuestId(id), format!("quest {id}"), move || {
                total.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }

    for frame in 0..3 {
        quests.pre_update();
        for id in 0..32 {
            quests.carry_out_daily_quest(QuestId(id), &tasks).unwrap();
        }
        for id in 0..32 {
            quests.wait_for_daily_quest(QuestId(id)).unwrap();
        }
        assert_eq!(total.load(Ordering::SeqCst), 32 * (frame + 1));
    }
}
