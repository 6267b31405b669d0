//! Connection lifecycle and the bridge event loop
//!
//! Every connect announces presence, re-registers discovery, subscribes to
//! the command topics and runs one refresh pass before (re)arming the refresh
//! timer. Shutdown publishes `offline` retained before the transport closes.

use super::{Bridge, RefreshReport, ShadowState};
use crate::control::WallpaperControl;
use crate::error::{BridgeError, BridgeResult};
use crate::lifecycle_span;
use crate::observability::metrics;
use crate::protocol::{on_off, PAYLOAD_OFFLINE, PAYLOAD_ONLINE};
use crate::transport::{Transport, TransportEvent};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn, Instrument};

/// Transport events buffered ahead of the bridge task
const EVENT_CHANNEL_CAPACITY: usize = 256;

impl<T, C> Bridge<T, C>
where
    T: Transport,
    C: WallpaperControl,
{
    /// Run until shutdown is signalled or the transport gives up
    ///
    /// Returns `Ok` after a clean shutdown; any error is meant for the
    /// supervisor, which decides whether to start over.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> BridgeResult<()> {
        let (event_tx, mut event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        self.transport.set_event_sender(event_tx);

        metrics().set_bridge_state("connecting");
        info!(node_id = %self.topics.node_id(), "Connecting to broker");
        tokio::select! {
            result = self.transport.connect() => result.map_err(BridgeError::transport)?,
            _ = wait_for_shutdown(&mut shutdown) => {
                info!("Shutdown requested before the broker connection was up");
                metrics().set_bridge_state("stopped");
                return Ok(());
            }
        }

        let mut ticker: Option<Interval> = None;
        loop {
            tokio::select! {
                biased;

                _ = wait_for_shutdown(&mut shutdown) => break,

                event = event_rx.recv() => match event {
                    Some(TransportEvent::Connected) => {
                        self.on_connected().await;
                        match ticker.as_mut() {
                            Some(ticker) => ticker.reset(),
                            None => ticker = Some(refresh_ticker(self.settings.refresh_interval)),
                        }
                    }
                    Some(TransportEvent::Message { topic, payload }) => {
                        metrics().mqtt_message_received();
                        self.handle_message(&topic, &payload).await;
                    }
                    Some(TransportEvent::Failed(reason)) => {
                        metrics().mqtt_connection_lost();
                        metrics().set_bridge_state("failed");
                        error!(reason = %reason, "Broker connection lost for good");
                        return Err(BridgeError::ConnectionLost(reason));
                    }
                    None => {
                        metrics().mqtt_connection_lost();
                        metrics().set_bridge_state("failed");
                        return Err(BridgeError::ConnectionLost(
                            "transport event channel closed".to_string(),
                        ));
                    }
                },

                _ = next_tick(&mut ticker) => {
                    self.refresh().await;
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Connect sequence, run on the first connect and every reconnect
    pub async fn on_connected(&mut self) -> RefreshReport {
        let span = lifecycle_span!(phase = "connected", node_id = %self.topics.node_id());
        self.connected_sequence().instrument(span).await
    }

    async fn connected_sequence(&mut self) -> RefreshReport {
        metrics().mqtt_connection_established();
        metrics().set_bridge_state("connected");
        info!("Broker connected");

        self.publish(&self.topics.status(), PAYLOAD_ONLINE, true)
            .await;

        self.state.shadow = ShadowState::default();
        for (entity, value) in self.state.shadow.toggles() {
            self.publish(&self.topics.state(entity), on_off(value), true)
                .await;
        }

        self.publish_discovery().await;
        self.subscribe_commands().await;
        self.refresh().await
    }

    async fn subscribe_commands(&self) -> usize {
        let mut subscribed = 0;
        for topic in self.topics.command_topics() {
            match self.transport.subscribe(&topic).await {
                Ok(()) => subscribed += 1,
                Err(e) => warn!(
                    topic = %topic,
                    error = %crate::error::sanitize_error_message(&e.to_string()),
                    "Subscribe failed"
                ),
            }
        }
        debug!(subscribed, "Subscribed to command topics");
        subscribed
    }

    /// Announce `offline` and close the transport
    pub async fn shutdown(&mut self) {
        metrics().set_bridge_state("shutting_down");
        info!("Shutting down bridge");

        self.publish(&self.topics.status(), PAYLOAD_OFFLINE, true)
            .await;
        if let Err(e) = self.transport.disconnect().await {
            warn!(
                error = %crate::error::sanitize_error_message(&e.to_string()),
                "Disconnect failed"
            );
        }

        metrics().mqtt_disconnected();
        metrics().set_bridge_state("stopped");
    }
}

fn refresh_ticker(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Resolves on the next tick, or never while the timer is not armed
async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Resolves once shutdown is signalled or the signalling side is gone
pub async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::control::WallpaperEntry;
    use crate::identity::NodeIdentity;
    use crate::testing::{ControlCall, MockControl, MockTransport};
    use std::net::Ipv4Addr;

    const NODE: &str = "192_168_1_20";

    fn bridge_with(
        transport: &MockTransport,
        control: &MockControl,
    ) -> Bridge<MockTransport, MockControl> {
        let config = BridgeConfig::test_config();
        let identity = NodeIdentity::from_address(Ipv4Addr::new(192, 168, 1, 20));
        Bridge::new(&config, &identity, transport.clone(), control.clone())
    }

    async fn wait_for_subscriptions(transport: &MockTransport, count: usize) {
        for _ in 0..200 {
            if transport.subscriptions().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("bridge never subscribed");
    }

    #[tokio::test]
    async fn test_on_connected_sequence() {
        let transport = MockTransport::new();
        let control = MockControl::new();
        let mut bridge = bridge_with(&transport, &control);
        bridge.state.shadow.muted = true;

        bridge.on_connected().await;

        let published = transport.published_messages();
        assert_eq!(published[0].topic, format!("homeassistant/status/{NODE}"));
        assert_eq!(published[0].payload_text(), "online");
        assert!(published[0].retain);

        assert!(!bridge.state().shadow.muted);
        assert_eq!(
            transport.published_to(&format!("we/{NODE}/muted/state")),
            vec!["OFF".to_string()]
        );
        assert_eq!(
            transport.published_to(&format!("we/{NODE}/show_icons/state")),
            vec!["ON".to_string()]
        );

        let discovery_index = published
            .iter()
            .position(|m| m.topic.ends_with("/config"))
            .unwrap();
        assert!(discovery_index > 3);
        assert_eq!(transport.subscriptions().len(), 9);
        assert!(control.calls().contains(&ControlCall::ListWallpapers));
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let transport = MockTransport::new();
        let control = MockControl::new();
        control.set_wallpapers(vec![WallpaperEntry::new("abc123", "Sunset", "/w/abc123")]);
        let mut bridge = bridge_with(&transport, &control);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { bridge.run(shutdown_rx).await });

        wait_for_subscriptions(&transport, 9).await;
        assert!(
            transport
                .inject(TransportEvent::Message {
                    topic: format!("we/{NODE}/select_wallpaper/set"),
                    payload: b"abc123".to_vec(),
                })
                .await
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();

        let result = handle.await.unwrap();
        assert!(result.is_ok());
        assert!(control.calls().contains(&ControlCall::OpenWallpaper {
            id: "abc123".to_string(),
            monitor: None
        }));

        let published = transport.published_messages();
        let last = published.last().unwrap();
        assert_eq!(last.topic, format!("homeassistant/status/{NODE}"));
        assert_eq!(last.payload_text(), "offline");
        assert!(last.retain);
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_reconnect_repeats_sequence() {
        let transport = MockTransport::new();
        let control = MockControl::new();
        let mut bridge = bridge_with(&transport, &control);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { bridge.run(shutdown_rx).await });

        wait_for_subscriptions(&transport, 9).await;
        transport.inject(TransportEvent::Connected).await;
        wait_for_subscriptions(&transport, 18).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        let online = transport
            .published_to(&format!("homeassistant/status/{NODE}"))
            .into_iter()
            .filter(|payload| payload == "online")
            .count();
        assert_eq!(online, 2);
    }

    #[tokio::test]
    async fn test_timer_triggers_refresh() {
        let transport = MockTransport::new();
        let control = MockControl::new();
        let mut bridge = bridge_with(&transport, &control);
        bridge.settings.refresh_interval = Duration::from_millis(20);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { bridge.run(shutdown_rx).await });

        wait_for_subscriptions(&transport, 9).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        let passes = control
            .calls()
            .iter()
            .filter(|call| **call == ControlCall::ListWallpapers)
            .count();
        assert!(passes >= 2, "expected timer refreshes, saw {passes}");
    }

    #[tokio::test]
    async fn test_transport_failure_ends_run() {
        let transport = MockTransport::new();
        let control = MockControl::new();
        let mut bridge = bridge_with(&transport, &control);

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { bridge.run(shutdown_rx).await });

        wait_for_subscriptions(&transport, 9).await;
        transport
            .inject(TransportEvent::Failed("gave up".to_string()))
            .await;

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(BridgeError::ConnectionLost(reason)) if reason == "gave up"));
    }

    #[tokio::test]
    async fn test_connect_failure_is_an_error() {
        let transport = MockTransport::new();
        transport.set_connect_failure(true);
        let control = MockControl::new();
        let mut bridge = bridge_with(&transport, &control);

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let result = bridge.run(shutdown_rx).await;
        assert!(matches!(result, Err(BridgeError::Broker(_))));
        assert!(transport.published_messages().is_empty());
    }

    #[tokio::test]
    async fn test_wait_for_shutdown_on_dropped_sender() {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        drop(shutdown_tx);
        tokio::time::timeout(Duration::from_secs(1), wait_for_shutdown(&mut shutdown_rx))
            .await
            .unwrap();
    }
}
