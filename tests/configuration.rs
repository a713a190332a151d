use std::time::Duration;

use hearth_engine::engine::types::ENGINE_RESERVED_TASK_SLOTS;
use hearth_engine::{ConfigError, EngineConfiguration, IdlePolicy, MultithreadingConfiguration, WaitMode};

#[test]
fn defaults_detect_hardware_and_block_on_waits() {
    let config = EngineConfiguration::default();
    assert_eq!(config.multithreading.hardware_threads, None);
    assert_eq!(config.multithreading.additional_task_slots, 0);
    assert_eq!(config.multithreading.idle_policy, IdlePolicy::Yield);
    assert_eq!(config.multithreading.default_wait_mode, WaitMode::Block);
    assert!(config.validate().is_ok());
    assert!(config.multithreading.resolve_hardware_threads() >= 1);
}

#[test]
fn partial_json_fills_in_defaults() {
    let config: EngineConfiguration = serde_json::from_str(
        r#"{ "multithreading": { "hardware_threads": 6, "idle_policy": { "sleep": { "secs": 0, "nanos": 100000 } } } }"#,
    )
    .unwrap();

    assert_eq!(config.multithreading.hardware_threads, Some(6));
    assert_eq!(
        config.multithreading.idle_policy,
        IdlePolicy::Sleep(Duration::from_micros(100))
    );
    assert_eq!(config.multithreading.default_wait_mode, WaitMode::Block);

    let empty: EngineConfiguration = serde_json::from_str("{}").unwrap();
    assert_eq!(empty, EngineConfiguration::default());
}

#[test]
fn zero_thread_override_is_invalid() {
    let config = MultithreadingConfiguration {
        hardware_threads: Some(0),
        ..Default::default()
    };
    assert_eq!(config.validate(), Err(ConfigError::ZeroHardwareThreads));
}

#[test]
fn executor_and_slot_arithmetic() {
    assert_eq!(MultithreadingConfiguration::executors_for(1), 1);
    assert_eq!(MultithreadingConfiguration::executors_for(8), 7);

    let config = MultithreadingConfiguration {
        additional_task_slots: 10,
        ..Default::default()
    };
    assert_eq!(config.queue_slots_for(7), 7 + ENGINE_RESERVED_TASK_SLOTS + 10);
}
