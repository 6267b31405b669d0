//! The bridge between the broker and the wallpaper control API
//!
//! A [`Bridge`] owns the transport, the control capability and all mutable
//! state. Its event loop ([`lifecycle`]) is the only task that touches any of
//! them, so connect handling, inbound commands ([`dispatcher`]) and refresh
//! passes ([`refresh`]) run strictly one at a time.

pub mod discovery;
pub mod dispatcher;
pub mod lifecycle;
pub mod refresh;
pub mod state;

use crate::config::{BridgeConfig, BridgeSection};
use crate::error::sanitize_error_message;
use crate::identity::NodeIdentity;
use crate::observability::metrics;
use crate::protocol::TopicBuilder;
use crate::transport::Transport;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

pub use discovery::DiscoveryCatalog;
pub use dispatcher::{Command, CommandOutcome};
pub use refresh::{RefreshReport, RefreshStep};
pub use state::{BridgeState, ShadowState};

/// Bridge behavior knobs taken from the `[bridge]` section
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeSettings {
    pub device_name: String,
    /// Monitors addressed by the `all` selector
    pub monitors: Vec<u32>,
    pub expand_monitor_options: bool,
    pub refresh_interval: Duration,
}

impl From<&BridgeSection> for BridgeSettings {
    fn from(section: &BridgeSection) -> Self {
        Self {
            device_name: section.device_name.clone(),
            monitors: section.monitors.clone(),
            expand_monitor_options: section.expand_monitor_options,
            refresh_interval: Duration::from_secs(section.refresh_interval_secs),
        }
    }
}

/// Broker-to-control bridge for one node
pub struct Bridge<T, C>
where
    T: Transport,
    C: crate::control::WallpaperControl,
{
    transport: T,
    control: C,
    topics: TopicBuilder,
    settings: BridgeSettings,
    state: BridgeState,
    discovery: DiscoveryCatalog,
}

impl<T, C> Bridge<T, C>
where
    T: Transport,
    C: crate::control::WallpaperControl,
{
    pub fn new(config: &BridgeConfig, identity: &NodeIdentity, transport: T, control: C) -> Self {
        let settings = BridgeSettings::from(&config.bridge);
        Self {
            transport,
            control,
            topics: TopicBuilder::new(
                config.mqtt.discovery_prefix.clone(),
                config.mqtt.state_prefix.clone(),
                identity.node_id(),
            ),
            discovery: DiscoveryCatalog::new(&settings.device_name, identity),
            settings,
            state: BridgeState::default(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn control(&self) -> &C {
        &self.control
    }

    pub fn state(&self) -> &BridgeState {
        &self.state
    }

    pub fn topics(&self) -> &TopicBuilder {
        &self.topics
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    /// Publish and log failures; returns whether the broker accepted it
    async fn publish(&self, topic: &str, payload: impl Into<Vec<u8>>, retain: bool) -> bool {
        match self.transport.publish(topic, payload.into(), retain).await {
            Ok(()) => {
                metrics().mqtt_message_published();
                debug!(topic = %topic, retain, "Published");
                true
            }
            Err(e) => {
                metrics().mqtt_publish_failed();
                warn!(
                    topic = %topic,
                    error = %sanitize_error_message(&e.to_string()),
                    "Publish failed"
                );
                false
            }
        }
    }

    async fn publish_json<S: Serialize>(&self, topic: &str, value: &S, retain: bool) -> bool {
        match serde_json::to_vec(value) {
            Ok(payload) => self.publish(topic, payload, retain).await,
            Err(e) => {
                warn!(topic = %topic, error = %e, "Failed to serialize payload");
                false
            }
        }
    }
}
