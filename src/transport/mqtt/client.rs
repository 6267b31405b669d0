//! Impure I/O operations for MQTT client
//!
//! This module handles all impure I/O operations including network communication,
//! async coordination, and integration with the rumqttc client.

use super::connection::{
    configure_mqtt_options, ConnectionState, LastWillSpec, MqttError, ReconnectConfig,
};
use super::health_monitor::{ConnectionEvent, HealthMetrics, HealthMonitor, ReconnectionDecision};
use super::message_handler::{EventRoute, MessageForwarder, MessageHandler};
use crate::config::MqttSection;
use crate::mqtt_span;
use crate::observability::metrics;
use crate::transport::{Transport, TransportEvent};
use async_trait::async_trait;
use rumqttc::v5::mqttbytes::v5::PublishProperties;
use rumqttc::v5::{mqttbytes::QoS, AsyncClient, EventLoop};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

/// Capacity of the rumqttc request channel
const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// MQTT transport client for the bridge
///
/// Owns a single rumqttc session. rumqttc reconnects by itself when the event
/// loop is polled after a failure, so this client only paces the polling and
/// reports each ConnAck to the bridge, which redoes its connect sequence.
pub struct MqttClient {
    node_id: String,
    client: AsyncClient,
    /// Taken by the first `connect()`; the mutex keeps the client `Sync`
    event_loop: Mutex<Option<EventLoop>>,
    event_loop_handle: Option<JoinHandle<()>>,
    state_rx: Option<watch::Receiver<ConnectionState>>,
    state_tx: Option<watch::Sender<ConnectionState>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    reconnect_config: ReconnectConfig,
    message_forwarder: Arc<MessageForwarder>,
    connect_time: Option<Instant>,
    last_message_time: Arc<Mutex<Option<Instant>>>,
    reconnect_count: Arc<AtomicU32>,
}

/// State shared with the spawned event loop task
struct EventLoopContext {
    node_id: String,
    state_tx: watch::Sender<ConnectionState>,
    shutdown_rx: watch::Receiver<bool>,
    reconnect_config: ReconnectConfig,
    message_forwarder: Arc<MessageForwarder>,
    last_message_time: Arc<Mutex<Option<Instant>>>,
    reconnect_count: Arc<AtomicU32>,
}

impl MqttClient {
    pub fn new(node_id: &str, config: MqttSection, will: LastWillSpec) -> Result<Self, MqttError> {
        let mqtt_options = configure_mqtt_options(node_id, &config, &will)?;
        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CHANNEL_CAPACITY);

        Ok(MqttClient {
            node_id: node_id.to_string(),
            client,
            event_loop: Mutex::new(Some(event_loop)),
            event_loop_handle: None,
            state_rx: None,
            state_tx: None,
            shutdown_tx: None,
            reconnect_config: ReconnectConfig::default(),
            message_forwarder: Arc::new(MessageForwarder::new()),
            connect_time: None,
            last_message_time: Arc::new(Mutex::new(None)),
            reconnect_count: Arc::new(AtomicU32::new(0)),
        })
    }

    /// Override poll retry pacing; only effective before `connect()`
    pub fn with_reconnect_config(mut self, reconnect_config: ReconnectConfig) -> Self {
        self.reconnect_config = reconnect_config;
        self
    }

    /// Create connection state and shutdown channels
    #[allow(clippy::type_complexity)]
    fn setup_connection_channels() -> (
        (
            watch::Sender<ConnectionState>,
            watch::Receiver<ConnectionState>,
        ),
        (watch::Sender<bool>, watch::Receiver<bool>),
    ) {
        let state_channels = watch::channel(ConnectionState::Connecting);
        let shutdown_channels = watch::channel(false);
        (state_channels, shutdown_channels)
    }

    /// Wait for connection confirmation (ConnAck) with timeout
    async fn wait_for_connection_confirmation(
        mut state_rx: watch::Receiver<ConnectionState>,
        timeout: Duration,
    ) -> Result<(), MqttError> {
        let timeout_result = tokio::time::timeout(timeout, async {
            loop {
                if state_rx.changed().await.is_err() {
                    return Err(MqttError::ConnectionFailedStr(
                        "State channel closed".to_string(),
                    ));
                }
                match *state_rx.borrow() {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Disconnected(ref reason) => {
                        return Err(MqttError::ConnectionFailedStr(reason.clone()));
                    }
                    ConnectionState::PermanentlyDisconnected(ref reason) => {
                        return Err(MqttError::ConnectionFailedStr(format!(
                            "Permanently disconnected: {reason}"
                        )));
                    }
                    ConnectionState::Connecting => continue,
                    ConnectionState::Reconnecting(_) => continue,
                }
            }
        })
        .await;

        match timeout_result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(MqttError::ConnectionFailedStr(
                "ConnAck timeout - no connection confirmation received".to_string(),
            )),
        }
    }

    /// Connect to the broker
    ///
    /// Spawns the event loop task and only returns once the first ConnAck has
    /// been observed. A failed first attempt stops the task again.
    pub async fn connect(&mut self) -> Result<(), MqttError> {
        let mut event_loop = self
            .event_loop
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .ok_or_else(|| MqttError::ConnectionFailedStr("Event loop already started".to_string()))?;

        let ((state_tx, state_rx), (shutdown_tx, shutdown_rx)) =
            Self::setup_connection_channels();
        self.state_rx = Some(state_rx.clone());
        self.state_tx = Some(state_tx.clone());
        self.shutdown_tx = Some(shutdown_tx);

        let mut context = EventLoopContext {
            node_id: self.node_id.clone(),
            state_tx,
            shutdown_rx,
            reconnect_config: self.reconnect_config.clone(),
            message_forwarder: self.message_forwarder.clone(),
            last_message_time: self.last_message_time.clone(),
            reconnect_count: self.reconnect_count.clone(),
        };

        let span = mqtt_span!(node_id = %self.node_id, operation = "event_loop");
        let handle = tokio::spawn(
            async move {
                info!(node_id = %context.node_id, "Starting MQTT event loop");
                let mut failed_polls = 0u32;
                let mut ever_connected = false;

                loop {
                    tokio::select! {
                        _ = context.shutdown_rx.changed() => {
                            if *context.shutdown_rx.borrow() {
                                info!("Shutdown signal received, stopping MQTT event loop");
                                break;
                            }
                        }

                        event_result = event_loop.poll() => {
                            let keep_going = match event_result {
                                Ok(event) => {
                                    let route = MessageHandler::route_mqtt_event(&event);
                                    Self::process_event_route(
                                        route,
                                        &context,
                                        &mut failed_polls,
                                        &mut ever_connected,
                                    )
                                    .await
                                }
                                // the supervisor owns startup retries
                                Err(e) if !ever_connected => {
                                    error!(node_id = %context.node_id, error = %e, "Initial broker connection failed");
                                    Self::transition(
                                        &context.state_tx,
                                        ConnectionEvent::PermanentFailure(e.to_string()),
                                    );
                                    false
                                }
                                Err(e) => Self::handle_event_loop_error(e, &mut context, &mut failed_polls).await,
                            };
                            if !keep_going {
                                break;
                            }
                        }
                    }
                }
                info!(node_id = %context.node_id, "MQTT event loop stopped");
            }
            .instrument(span),
        );

        self.event_loop_handle = Some(handle);

        let connection_timeout =
            HealthMonitor::calculate_connection_timeout(&self.reconnect_config);
        if let Err(e) = Self::wait_for_connection_confirmation(state_rx, connection_timeout).await
        {
            if let Some(shutdown_tx) = &self.shutdown_tx {
                let _ = shutdown_tx.send(true);
            }
            return Err(e);
        }

        self.connect_time = Some(Instant::now());
        Ok(())
    }

    fn transition(state_tx: &watch::Sender<ConnectionState>, event: ConnectionEvent) {
        let new_state = HealthMonitor::determine_next_state(event);
        let old_state = state_tx.borrow().clone();
        if old_state != new_state {
            HealthMonitor::log_state_transition(&old_state, &new_state);
        }
        if HealthMonitor::is_connection_drop(&old_state, &new_state) {
            metrics().mqtt_connection_lost();
        }
        let _ = state_tx.send(new_state);
    }

    /// Handle a poll failure; returns false when the loop must stop
    async fn handle_event_loop_error(
        error: rumqttc::v5::ConnectionError,
        context: &mut EventLoopContext,
        failed_polls: &mut u32,
    ) -> bool {
        error!(node_id = %context.node_id, error = %error, "MQTT event loop error");
        Self::transition(
            &context.state_tx,
            ConnectionEvent::NetworkError(error.to_string()),
        );

        let decision = HealthMonitor::should_attempt_reconnection(
            *failed_polls,
            &context.reconnect_config,
            *context.shutdown_rx.borrow(),
        );

        match decision {
            ReconnectionDecision::Proceed { attempt, delay_ms } => {
                *failed_polls = attempt;
                Self::transition(
                    &context.state_tx,
                    ConnectionEvent::ReconnectionStarted(attempt),
                );

                let max_display = context
                    .reconnect_config
                    .max_attempts
                    .map_or("unlimited".to_string(), |max| max.to_string());
                info!(
                    "Polling broker again ({}/{}) after {}ms delay",
                    attempt, max_display, delay_ms
                );

                Self::interruptible_sleep(context.shutdown_rx.clone(), delay_ms).await
            }
            ReconnectionDecision::AbortShutdownRequested => {
                info!("Shutdown signal received, stopping reconnection");
                false
            }
            ReconnectionDecision::AbortMaxAttemptsExceeded => {
                let reason = format!("Broker unreachable after {} attempts", *failed_polls);
                Self::transition(
                    &context.state_tx,
                    ConnectionEvent::PermanentFailure(reason.clone()),
                );
                let _ = context
                    .message_forwarder
                    .forward(TransportEvent::Failed(reason))
                    .await;
                false
            }
        }
    }

    /// Process routed MQTT event; returns false to stop the loop
    async fn process_event_route(
        route: EventRoute,
        context: &EventLoopContext,
        failed_polls: &mut u32,
        ever_connected: &mut bool,
    ) -> bool {
        if let Some(event) = MessageHandler::to_transport_event(&route) {
            if matches!(event, TransportEvent::Message { .. }) {
                let mut last = context
                    .last_message_time
                    .lock()
                    .unwrap_or_else(|p| p.into_inner());
                *last = Some(Instant::now());
            }
            // ConnAck must reach the bridge after the state flips, so the
            // bridge can publish straight away
            if matches!(event, TransportEvent::Connected) {
                Self::transition(&context.state_tx, ConnectionEvent::ConnAckReceived);
                *failed_polls = 0;
                if *ever_connected {
                    context.reconnect_count.fetch_add(1, Ordering::Relaxed);
                }
                *ever_connected = true;
            }
            if let Err(e) = context.message_forwarder.forward(event).await {
                warn!(error = %e, "Dropping MQTT event");
            }
            return true;
        }

        match route {
            EventRoute::Disconnected => {
                Self::transition(&context.state_tx, ConnectionEvent::DisconnectedByBroker);
                true
            }
            EventRoute::DisconnectSent => {
                debug!(target: "mqtt_transport", "DISCONNECT sent, stopping event loop");
                false
            }
            EventRoute::SubscriptionConfirmed {
                packet_id,
                topic_count,
            } => {
                debug!(target: "mqtt_transport", packet_id, topic_count, "Subscription confirmed");
                true
            }
            EventRoute::InfrastructureEvent(event_str) => {
                debug!(target: "mqtt_transport", "MQTT event: {}", event_str);
                true
            }
            EventRoute::ConnectionAcknowledged
            | EventRoute::MessageReceived { .. }
            | EventRoute::OutgoingEvent => true,
        }
    }

    /// Perform interruptible sleep with shutdown monitoring
    /// Returns true if sleep completed, false if shutdown requested
    async fn interruptible_sleep(mut shutdown_rx: watch::Receiver<bool>, delay_ms: u64) -> bool {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("Shutdown signal received during retry delay, stopping");
                    return false;
                }
                true
            }
            _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {
                true
            }
        }
    }

    /// Disconnect from the broker
    ///
    /// Queues a DISCONNECT behind anything already published, lets the event
    /// loop flush it, then stops the task.
    pub async fn disconnect(&mut self) -> Result<(), MqttError> {
        let was_connected = self.is_connected();

        if was_connected {
            self.client
                .disconnect()
                .await
                .map_err(|e| MqttError::ConnectionFailed(Box::new(e)))?;
        }

        if let Some(handle) = self.event_loop_handle.take() {
            let graceful_shutdown = tokio::time::timeout(Duration::from_secs(2), handle).await;

            match graceful_shutdown {
                Ok(Ok(())) => {
                    debug!("Event loop task shut down gracefully");
                }
                Ok(Err(e)) if !e.is_cancelled() => {
                    warn!("Event loop task ended with error: {}", e);
                }
                Err(_) => {
                    warn!("Event loop task didn't shut down gracefully, forcing stop");
                }
                _ => {}
            }
        }

        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(true);
        }

        if let Some(state_tx) = &self.state_tx {
            let _ = state_tx.send(ConnectionState::Disconnected(
                "Client disconnected".to_string(),
            ));
        }

        info!(node_id = %self.node_id, "MQTT client disconnected");
        Ok(())
    }

    /// Get current connection state
    /// Returns None if connection hasn't been established yet
    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.state_rx.as_ref().map(|rx| rx.borrow().clone())
    }

    /// Check if the connection is permanently disconnected
    pub fn is_permanently_disconnected(&self) -> bool {
        matches!(
            self.connection_state(),
            Some(ConnectionState::PermanentlyDisconnected(_))
        )
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.connection_state(), Some(ConnectionState::Connected))
    }

    /// Get health metrics for the connection
    pub fn get_health_metrics(&self) -> HealthMetrics {
        let last_message_time = *self
            .last_message_time
            .lock()
            .unwrap_or_else(|p| p.into_inner());
        HealthMonitor::calculate_health_metrics(
            self.connect_time,
            last_message_time,
            self.reconnect_count.load(Ordering::Relaxed),
        )
    }

    /// Check connection state before operations
    fn check_connection_state(&self) -> Result<(), MqttError> {
        let state_rx = self.state_rx.as_ref().ok_or_else(|| {
            MqttError::ConnectionFailedStr("Client not connected: state_rx is None".to_string())
        })?;

        let current_state = state_rx.borrow().clone();
        if !HealthMonitor::can_publish(&current_state) {
            return Err(MqttError::NotConnected {
                state: current_state,
            });
        }

        Ok(())
    }

    /// Publish raw bytes; retained messages go out at QoS 1, others at QoS 0
    pub async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<(), MqttError> {
        self.check_connection_state()?;

        let qos = MessageHandler::determine_qos_level(retain);
        self.client
            .publish_with_properties(topic, qos, retain, payload, PublishProperties::default())
            .await
            .map_err(|e| MqttError::PublishFailed {
                topic: topic.to_string(),
                source: Box::new(e),
            })?;

        debug!(target: "mqtt_transport", topic = %topic, retain, "Published message");
        Ok(())
    }

    /// Subscribe at QoS 1
    pub async fn subscribe(&self, topic: &str) -> Result<(), MqttError> {
        if let Some(state_rx) = &self.state_rx {
            let current_state = state_rx.borrow().clone();
            if !HealthMonitor::can_subscribe(&current_state) {
                return Err(MqttError::NotConnected {
                    state: current_state,
                });
            }
        }

        self.client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| MqttError::SubscriptionFailed {
                topic: topic.to_string(),
                source: Box::new(e),
            })?;

        debug!(target: "mqtt_transport", topic = %topic, "Subscribed");
        Ok(())
    }

    pub fn set_event_sender(&self, sender: mpsc::Sender<TransportEvent>) {
        self.message_forwarder.set_sender(sender);
    }
}

#[async_trait]
impl Transport for MqttClient {
    type Error = MqttError;

    async fn connect(&mut self) -> Result<(), Self::Error> {
        MqttClient::connect(self).await
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        MqttClient::disconnect(self).await
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> Result<(), Self::Error> {
        MqttClient::publish(self, topic, payload, retain).await
    }

    async fn subscribe(&self, topic: &str) -> Result<(), Self::Error> {
        MqttClient::subscribe(self, topic).await
    }

    fn is_connected(&self) -> bool {
        MqttClient::is_connected(self)
    }

    fn connection_state(&self) -> Option<ConnectionState> {
        MqttClient::connection_state(self)
    }

    fn is_permanently_disconnected(&self) -> bool {
        MqttClient::is_permanently_disconnected(self)
    }

    fn set_event_sender(&self, sender: mpsc::Sender<TransportEvent>) {
        MqttClient::set_event_sender(self, sender)
    }
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(true);
        }

        // Drop can't await, so call disconnect() for a clean DISCONNECT
        if let Some(handle) = self.event_loop_handle.take() {
            handle.abort();
        }
    }
}
