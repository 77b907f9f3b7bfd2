use std::env;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use pandapwr_app::{DeviceEntry, IntegrationConfig};

static ENV_LOCK: Mutex<()> = Mutex::new(());

const ENV_KEYS: [&str; 6] = [
    "PANDAPWR_CONFIG",
    "PANDAPWR_DEVICES",
    "PANDAPWR_TIMEOUT_MS",
    "PANDAPWR_POLL_INTERVAL_MS",
    "PANDAPWR_LISTEN_ADDR",
    "PANDAPWR_METRICS",
];

fn clear_env() {
    for key in ENV_KEYS {
        env::remove_var(key);
    }
}

#[test]
fn defaults_validate() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    clear_env();

    let config = IntegrationConfig::load().expect("load config");
    config.validate().expect("validate config");
    assert!(config.devices.is_empty());
    assert_eq!(config.client.timeout_ms, 10_000);
    assert_eq!(config.poller.poll_interval, Duration::from_secs(30));
    assert!(config.metrics_enabled);
}

#[test]
fn toml_config_validates() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    clear_env();
    env::set_var("PANDAPWR_CONFIG", fixture_path("config-valid.toml"));

    let config = IntegrationConfig::load().expect("load config");
    config.validate().expect("validate config");
    assert_eq!(
        config.devices,
        vec![
            DeviceEntry::new("192.168.1.40"),
            DeviceEntry {
                entry_id: "garage".to_string(),
                ip_address: "192.168.1.41:8080".to_string(),
            },
        ]
    );
    assert_eq!(config.client.timeout_ms, 5_000);
    assert_eq!(config.poller.poll_interval, Duration::from_millis(15_000));
    assert_eq!(config.listen_addr, "0.0.0.0:9410");
    assert!(!config.metrics_enabled);

    clear_env();
}

#[test]
fn json_config_validates() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    clear_env();
    env::set_var("PANDAPWR_CONFIG", fixture_path("config-valid.json"));

    let config = IntegrationConfig::load().expect("load config");
    config.validate().expect("validate config");
    assert_eq!(config.devices[0].entry_id, "pandapwr_10.0.0.12");

    clear_env();
}

#[test]
fn env_overrides_file_values() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    clear_env();
    env::set_var("PANDAPWR_CONFIG", fixture_path("config-valid.toml"));
    env::set_var("PANDAPWR_DEVICES", "office=10.1.1.5");
    env::set_var("PANDAPWR_TIMEOUT_MS", "2500");
    env::set_var("PANDAPWR_METRICS", "true");

    let config = IntegrationConfig::load().expect("load config");
    config.validate().expect("validate config");
    assert_eq!(config.devices.len(), 1);
    assert_eq!(config.devices[0].entry_id, "office");
    assert_eq!(config.client.timeout_ms, 2_500);
    assert!(config.metrics_enabled);

    clear_env();
}

#[test]
fn invalid_config_fails_validation() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    clear_env();
    env::set_var("PANDAPWR_CONFIG", fixture_path("config-invalid.toml"));

    let config = IntegrationConfig::load().expect("load config");
    assert!(config.validate().is_err());

    clear_env();
}

#[test]
fn duplicate_entries_fail_validation() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    clear_env();

    let config = IntegrationConfig::load_with_path(Some(fixture_path("config-duplicate.toml")))
        .expect("load config");
    let err = config.validate().expect_err("duplicate entry ids");
    assert!(err.to_string().contains("configured twice"));
}

#[test]
fn missing_file_is_an_error() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    clear_env();

    assert!(IntegrationConfig::load_with_path(Some(fixture_path("absent.toml"))).is_err());
}

fn fixture_path(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    path.to_string_lossy().to_string()
}
