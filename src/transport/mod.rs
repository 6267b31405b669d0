//! Transport layer for the bridge
//!
//! This module provides the broker abstraction the bridge is written against,
//! plus the MQTT implementation used in production.

pub mod mqtt;

use tokio::sync::mpsc;

/// Events the transport hands to the bridge, in delivery order
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The broker acknowledged a (re)connection
    Connected,
    /// A message arrived on a subscribed topic
    Message { topic: String, payload: Vec<u8> },
    /// The transport gave up; no further events will follow
    Failed(String),
}

/// Transport trait for broker communication
///
/// This trait provides an abstraction over the broker client to enable
/// dependency injection and testing.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Connect to the broker; resolves once the connection is acknowledged
    async fn connect(&mut self) -> Result<(), Self::Error>;

    /// Disconnect from the broker
    async fn disconnect(&mut self) -> Result<(), Self::Error>;

    /// Publish a message to the given topic
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool)
        -> Result<(), Self::Error>;

    /// Subscribe to a topic
    async fn subscribe(&self, topic: &str) -> Result<(), Self::Error>;

    /// Check if transport is currently connected
    fn is_connected(&self) -> bool;

    /// Get current connection state
    fn connection_state(&self) -> Option<mqtt::ConnectionState>;

    /// Check if the connection is permanently disconnected
    fn is_permanently_disconnected(&self) -> bool;

    /// Set the sender that receives connection and message events
    fn set_event_sender(&self, sender: mpsc::Sender<TransportEvent>);
}

/// Type alias for MQTT transport
pub type MqttTransport = mqtt::MqttClient;
