//! wallbridge - Wallpaper Engine to Home Assistant over MQTT
//!
//! Exposes Wallpaper Engine's controls (desktop icons, mute, playback,
//! wallpaper and profile selection, wallpaper properties) as Home Assistant
//! entities registered through MQTT discovery.
//!
//! # Overview
//!
//! - [`identity`] derives the node id that namespaces every topic
//! - [`protocol`] holds topic naming, discovery descriptors and payload codecs
//! - [`control`] is the capability interface to Wallpaper Engine, with an
//!   adapter over the engine's `-control` command line
//! - [`bridge`] is the event loop: discovery, command dispatch, refresh and
//!   presence
//! - [`supervisor`] restarts a failed bridge run with exponential backoff
//! - [`transport`] is the broker abstraction and its rumqttc implementation
//!
//! # Quick Start
//!
//! ```rust
//! use wallbridge::protocol::{Entity, TopicBuilder, WallpaperRequest, MonitorTarget};
//!
//! let topics = TopicBuilder::new("homeassistant", "we", "192_168_1_20");
//! assert_eq!(topics.command(Entity::Muted), "we/192_168_1_20/muted/set");
//! assert_eq!(topics.status(), "homeassistant/status/192_168_1_20");
//!
//! let request = WallpaperRequest::parse("Sunset (abc123)|all").unwrap();
//! assert_eq!(request.id_hint.as_deref(), Some("abc123"));
//! assert_eq!(request.target, MonitorTarget::All);
//! ```

pub mod bridge;
pub mod config;
pub mod control;
pub mod error;
pub mod identity;
pub mod observability;
pub mod protocol;
pub mod supervisor;
pub mod testing;
pub mod transport;

pub use bridge::Bridge;
pub use config::BridgeConfig;
pub use error::{BridgeError, BridgeResult};
pub use identity::NodeIdentity;
pub use transport::mqtt::MqttClient;
