//! Bridge configuration
//!
//! Loaded from a TOML file. Broker credentials are never stored in the file;
//! `username_env` / `password_env` name the environment variables that hold
//! them and are resolved at connect time.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    #[serde(default)]
    pub bridge: BridgeSection,
    pub mqtt: MqttSection,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub supervisor: SupervisorSection,
    #[serde(default)]
    pub health: HealthSection,
}

/// Device naming, identity and refresh behavior
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeSection {
    /// Display name prefix for the device and every entity
    #[serde(default = "default_device_name")]
    pub device_name: String,
    /// Preferred address prefix when resolving the node identity
    #[serde(default = "default_subnet_prefix")]
    pub subnet_prefix: String,
    /// Seconds between refresh passes
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    /// Monitor indices addressed by the `all` selector
    #[serde(default = "default_monitors")]
    pub monitors: Vec<u32>,
    /// Offer `title (id)|all` and `title (id)|N` select options
    #[serde(default = "default_true")]
    pub expand_monitor_options: bool,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            subnet_prefix: default_subnet_prefix(),
            refresh_interval_secs: default_refresh_interval(),
            monitors: default_monitors(),
            expand_monitor_options: true,
        }
    }
}

/// Broker connection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// Broker URL, `mqtt://host:port` or `mqtts://host:port`
    pub broker_url: String,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
    /// Root of discovery and presence topics
    #[serde(default = "default_discovery_prefix")]
    pub discovery_prefix: String,
    /// Root of command and state topics
    #[serde(default = "default_state_prefix")]
    pub state_prefix: String,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

impl MqttSection {
    fn env_var(name: Option<&String>) -> Option<String> {
        name.and_then(|name| std::env::var(name).ok())
    }

    /// Broker username from the configured environment variable
    pub fn username(&self) -> Option<String> {
        Self::env_var(self.username_env.as_ref())
    }

    /// Broker password from the configured environment variable
    pub fn password(&self) -> Option<String> {
        Self::env_var(self.password_env.as_ref())
    }
}

/// Wallpaper Engine installation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineSection {
    /// Path to the engine executable used for `-control` commands
    #[serde(default = "default_executable")]
    pub executable: PathBuf,
    /// Engine `config.json`; profiles and the active wallpaper come from here
    pub config_path: Option<PathBuf>,
    /// Folders whose sub-folders hold `project.json` wallpapers
    #[serde(default)]
    pub wallpaper_dirs: Vec<PathBuf>,
    /// User key inside `config.json`; the first user is taken when unset
    pub user: Option<String>,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            config_path: None,
            wallpaper_dirs: Vec::new(),
            user: None,
        }
    }
}

/// Restart policy for the top-level bridge routine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SupervisorSection {
    /// Restarts allowed after the first failure; 0 disables restarting
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            max_restarts: default_max_restarts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Optional HTTP health endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HealthSection {
    pub port: Option<u16>,
}

fn default_device_name() -> String {
    "Wallpaper Engine".to_string()
}

fn default_subnet_prefix() -> String {
    "192.168.".to_string()
}

fn default_refresh_interval() -> u64 {
    60
}

fn default_monitors() -> Vec<u32> {
    vec![0, 1]
}

fn default_true() -> bool {
    true
}

fn default_discovery_prefix() -> String {
    "homeassistant".to_string()
}

fn default_state_prefix() -> String {
    "we".to_string()
}

fn default_keep_alive() -> u64 {
    60
}

fn default_executable() -> PathBuf {
    PathBuf::from(r"C:\Program Files (x86)\Steam\steamapps\common\wallpaper_engine\wallpaper64.exe")
}

fn default_max_restarts() -> u32 {
    5
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BridgeConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bridge.refresh_interval_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "bridge.refresh_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.bridge.monitors.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "bridge.monitors must list at least one monitor index".to_string(),
            ));
        }
        if self.bridge.device_name.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "bridge.device_name must not be empty".to_string(),
            ));
        }
        for (name, prefix) in [
            ("mqtt.discovery_prefix", &self.mqtt.discovery_prefix),
            ("mqtt.state_prefix", &self.mqtt.state_prefix),
        ] {
            validate_topic_prefix(name, prefix)?;
        }
        if self.supervisor.initial_backoff_ms == 0
            || self.supervisor.max_backoff_ms < self.supervisor.initial_backoff_ms
        {
            return Err(ConfigError::InvalidConfig(
                "supervisor backoff must satisfy 0 < initial_backoff_ms <= max_backoff_ms"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[mqtt]
broker_url = "mqtt://localhost:1883"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

fn validate_topic_prefix(name: &str, prefix: &str) -> Result<(), ConfigError> {
    if prefix.is_empty()
        || prefix.starts_with('/')
        || prefix.ends_with('/')
        || prefix.contains(['#', '+'])
    {
        return Err(ConfigError::InvalidConfig(format!(
            "{name} '{prefix}' must be non-empty, without leading/trailing '/' or wildcards"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = BridgeConfig::test_config();
        assert_eq!(config.mqtt.broker_url, "mqtt://localhost:1883");
        assert_eq!(config.mqtt.discovery_prefix, "homeassistant");
        assert_eq!(config.mqtt.state_prefix, "we");
        assert_eq!(config.bridge.refresh_interval_secs, 60);
        assert_eq!(config.bridge.monitors, vec![0, 1]);
        assert!(config.bridge.expand_monitor_options);
        assert_eq!(config.supervisor.max_restarts, 5);
        assert_eq!(config.health.port, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_full_config() {
        let toml_content = r#"
[bridge]
device_name = "Living Room PC"
subnet_prefix = "10.0."
refresh_interval_secs = 30
monitors = [0, 1, 2]
expand_monitor_options = false

[mqtt]
broker_url = "mqtts://broker.local:8883"
username_env = "MQTT_USERNAME"
password_env = "MQTT_PASSWORD"
discovery_prefix = "ha"
state_prefix = "wallpaper"

[engine]
executable = "/opt/we/wallpaper64.exe"
config_path = "/opt/we/config.json"
wallpaper_dirs = ["/steam/workshop/431960", "/opt/we/projects/myprojects"]
user = "steamuser"

[supervisor]
max_restarts = 0
initial_backoff_ms = 500
max_backoff_ms = 500

[health]
port = 8080
"#;

        let config = BridgeConfig::from_toml(toml_content).unwrap();
        assert_eq!(config.bridge.device_name, "Living Room PC");
        assert_eq!(config.bridge.monitors, vec![0, 1, 2]);
        assert!(!config.bridge.expand_monitor_options);
        assert_eq!(config.mqtt.discovery_prefix, "ha");
        assert_eq!(config.engine.wallpaper_dirs.len(), 2);
        assert_eq!(config.engine.user.as_deref(), Some("steamuser"));
        assert_eq!(config.supervisor.max_restarts, 0);
        assert_eq!(config.health.port, Some(8080));
    }

    #[test]
    fn test_rejects_zero_refresh_interval() {
        let toml_content = r#"
[bridge]
refresh_interval_secs = 0

[mqtt]
broker_url = "mqtt://localhost:1883"
"#;
        let result = BridgeConfig::from_toml(toml_content);
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_empty_monitor_list() {
        let toml_content = r#"
[bridge]
monitors = []

[mqtt]
broker_url = "mqtt://localhost:1883"
"#;
        assert!(BridgeConfig::from_toml(toml_content).is_err());
    }

    #[test]
    fn test_rejects_wildcard_prefix() {
        let mut config = BridgeConfig::test_config();
        config.mqtt.state_prefix = "we/#".to_string();
        assert!(config.validate().is_err());

        config.mqtt.state_prefix = "/we".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_backoff() {
        let mut config = BridgeConfig::test_config();
        config.supervisor.initial_backoff_ms = 5000;
        config.supervisor.max_backoff_ms = 1000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_mqtt_section_fails() {
        let result = BridgeConfig::from_toml("[bridge]\ndevice_name = \"x\"\n");
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[mqtt]\nbroker_url = \"mqtt://10.0.0.2:1883\"").unwrap();

        let config = BridgeConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.mqtt.broker_url, "mqtt://10.0.0.2:1883");
    }

    #[test]
    fn test_credentials_from_env() {
        let mut config = BridgeConfig::test_config();
        config.mqtt.username_env = Some("WALLBRIDGE_TEST_USER_UNIT".to_string());
        config.mqtt.password_env = Some("WALLBRIDGE_TEST_PASS_UNSET".to_string());
        std::env::set_var("WALLBRIDGE_TEST_USER_UNIT", "alice");

        assert_eq!(config.mqtt.username().as_deref(), Some("alice"));
        assert_eq!(config.mqtt.password(), None);
    }
}
