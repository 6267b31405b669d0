//! Configuration loading and validation tests
//!
//! Tests focus on BEHAVIOR of configuration loading, validation, and error handling.
//! We test observable outcomes, not implementation details of TOML parsing.

use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use wallbridge::config::{BridgeConfig, ConfigError};

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "{content}").unwrap();
    temp_file
}

#[test]
fn test_config_loads_successfully_from_valid_toml() {
    let temp_file = write_config(
        r#"
[bridge]
device_name = "Office PC"
subnet_prefix = "10.1."
refresh_interval_secs = 120
monitors = [0]
expand_monitor_options = false

[mqtt]
broker_url = "mqtts://broker.lan:8883"
username_env = "WB_USER"
password_env = "WB_PASS"
discovery_prefix = "ha"
state_prefix = "wallpaper"
keep_alive_secs = 30

[engine]
executable = "/opt/we/wallpaper64.exe"
config_path = "/opt/we/config.json"
wallpaper_dirs = ["/opt/we/workshop", "/opt/we/projects/myprojects"]
user = "steamuser"

[supervisor]
max_restarts = 2
initial_backoff_ms = 500
max_backoff_ms = 4000

[health]
port = 9090
"#,
    );

    let config = BridgeConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.bridge.device_name, "Office PC");
    assert_eq!(config.bridge.subnet_prefix, "10.1.");
    assert_eq!(config.bridge.refresh_interval_secs, 120);
    assert_eq!(config.bridge.monitors, vec![0]);
    assert!(!config.bridge.expand_monitor_options);
    assert_eq!(config.mqtt.broker_url, "mqtts://broker.lan:8883");
    assert_eq!(config.mqtt.discovery_prefix, "ha");
    assert_eq!(config.mqtt.state_prefix, "wallpaper");
    assert_eq!(config.engine.wallpaper_dirs.len(), 2);
    assert_eq!(
        config.engine.config_path,
        Some(PathBuf::from("/opt/we/config.json"))
    );
    assert_eq!(config.engine.user.as_deref(), Some("steamuser"));
    assert_eq!(config.supervisor.max_restarts, 2);
    assert_eq!(config.health.port, Some(9090));
}

#[test]
fn test_config_defaults() {
    let temp_file = write_config("[mqtt]\nbroker_url = \"mqtt://localhost:1883\"");
    let config = BridgeConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.bridge.device_name, "Wallpaper Engine");
    assert_eq!(config.bridge.subnet_prefix, "192.168.");
    assert_eq!(config.bridge.refresh_interval_secs, 60);
    assert_eq!(config.mqtt.discovery_prefix, "homeassistant");
    assert_eq!(config.mqtt.state_prefix, "we");
    assert_eq!(config.supervisor.initial_backoff_ms, 1000);
    assert_eq!(config.supervisor.max_backoff_ms, 60000);
    assert!(config.engine.wallpaper_dirs.is_empty());
    assert_eq!(config.health.port, None);
}

#[test]
fn test_missing_file_is_a_read_error() {
    let result = BridgeConfig::load_from_file(&PathBuf::from("/nonexistent/wallbridge.toml"));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_malformed_toml_is_a_parse_error() {
    let temp_file = write_config("[mqtt\nbroker_url = ");
    let result = BridgeConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_zero_refresh_interval_rejected() {
    let result = BridgeConfig::from_toml(
        r#"
[bridge]
refresh_interval_secs = 0

[mqtt]
broker_url = "mqtt://localhost:1883"
"#,
    );
    assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
}

#[test]
fn test_empty_monitor_list_rejected() {
    let result = BridgeConfig::from_toml(
        r#"
[bridge]
monitors = []

[mqtt]
broker_url = "mqtt://localhost:1883"
"#,
    );
    assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
}

#[test]
fn test_wildcard_prefix_rejected() {
    for prefix in ["we/#", "/we", "we/", "", "+"] {
        let result = BridgeConfig::from_toml(&format!(
            "[mqtt]\nbroker_url = \"mqtt://localhost:1883\"\nstate_prefix = \"{prefix}\"\n"
        ));
        assert!(
            matches!(result, Err(ConfigError::InvalidConfig(_))),
            "prefix {prefix:?} should be rejected"
        );
    }
}

#[test]
fn test_inverted_backoff_rejected() {
    let result = BridgeConfig::from_toml(
        r#"
[mqtt]
broker_url = "mqtt://localhost:1883"

[supervisor]
initial_backoff_ms = 5000
max_backoff_ms = 1000
"#,
    );
    assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
}

#[test]
fn test_credentials_come_from_environment() {
    let config = BridgeConfig::from_toml(
        r#"
[mqtt]
broker_url = "mqtt://localhost:1883"
username_env = "WALLBRIDGE_IT_USER"
password_env = "WALLBRIDGE_IT_PASS"
"#,
    )
    .unwrap();

    std::env::set_var("WALLBRIDGE_IT_USER", "bridge");
    std::env::set_var("WALLBRIDGE_IT_PASS", "s3cret");
    assert_eq!(config.mqtt.username().as_deref(), Some("bridge"));
    assert_eq!(config.mqtt.password().as_deref(), Some("s3cret"));

    std::env::remove_var("WALLBRIDGE_IT_USER");
    std::env::remove_var("WALLBRIDGE_IT_PASS");
    assert_eq!(config.mqtt.username(), None);
}

#[test]
fn test_config_round_trips_through_toml() {
    let temp_file = write_config("[mqtt]\nbroker_url = \"mqtt://localhost:1883\"");
    let config = BridgeConfig::load_from_file(temp_file.path()).unwrap();

    let rendered = toml::to_string_pretty(&config).unwrap();
    let reparsed = BridgeConfig::from_toml(&rendered).unwrap();
    assert_eq!(reparsed, config);
}
