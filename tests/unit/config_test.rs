//! Tests for configuration validation

use prometheus_event_manager::config::{EventManagerConfig, MAX_SLEEP_MS};
use prometheus_event_manager::util::SleepType;

#[test]
fn test_config_defaults() {
    let cfg = EventManagerConfig::default();
    assert!(cfg.enabled);
    assert!(cfg.notify);
    assert_eq!(cfg.default_limit, 0);
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_config_from_json_partial() {
    let cfg = EventManagerConfig::from_json_str(
        r#"{ "default_limit": 8, "sleep_times": { "service": 25 } }"#,
    )
    .unwrap();
    assert_eq!(cfg.default_limit, 8);
    assert_eq!(cfg.sleep_times.get(&SleepType::Service), Some(&25));
    assert!(cfg.enabled);
}

#[test]
fn test_config_rejects_zero_minimum() {
    let cfg = EventManagerConfig {
        minimum_sleep_ms: Some(0),
        ..EventManagerConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_config_rejects_long_sleep() {
    let mut cfg = EventManagerConfig::default();
    cfg.minimum_sleep_times.insert(SleepType::Wait, MAX_SLEEP_MS + 1);
    let err = cfg.validate().unwrap_err();
    assert!(err.contains("minimum_sleep_times"));
}

#[test]
fn test_config_from_json_invalid() {
    let err = EventManagerConfig::from_json_str("{ not json").unwrap_err();
    assert!(err.starts_with("parse error"));
}

#[test]
fn test_config_from_vars_bad_number() {
    let result = EventManagerConfig::from_vars(|key| {
        (key == "DEFAULT_LIMIT").then(|| "lots".to_string())
    });
    assert!(result.is_err());
}
