//! MQTT client implementation for the bridge
//!
//! This module separates pure functions from I/O operations for better
//! testability.
//!
//! # Architecture
//!
//! - [`connection`] - Pure connection state management and configuration
//! - [`message_handler`] - Pure event routing plus the event forwarder
//! - [`health_monitor`] - Pure health monitoring and retry decisions
//! - [`client`] - Impure I/O operations and coordination
//!
//! # Usage
//!
//! ```rust,no_run
//! use wallbridge::transport::mqtt::{LastWillSpec, MqttClient};
//! use wallbridge::config::MqttSection;
//!
//! # tokio_test::block_on(async {
//! let config = MqttSection {
//!     broker_url: "mqtt://localhost:1883".to_string(),
//!     username_env: None,
//!     password_env: None,
//!     discovery_prefix: "homeassistant".to_string(),
//!     state_prefix: "we".to_string(),
//!     keep_alive_secs: 60,
//! };
//! let will = LastWillSpec::new("homeassistant/status/192_168_1_20", "offline");
//!
//! let mut client = MqttClient::new("192_168_1_20", config, will)?;
//! client.connect().await?;
//! client.subscribe("we/192_168_1_20/muted/set").await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod health_monitor;
pub mod message_handler;

// Re-export public types for convenience
pub use client::MqttClient;
pub use connection::{ConnectionState, LastWillSpec, MqttError, ReconnectConfig};
pub use health_monitor::{ConnectionEvent, HealthMetrics, HealthMonitor, ReconnectionDecision};
pub use message_handler::{EventRoute, MessageHandler};
