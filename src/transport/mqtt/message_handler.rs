//! Pure message routing for MQTT events, plus forwarding to the bridge
//!
//! Routing decisions are pure; [`MessageForwarder`] is the one impure piece
//! that hands routed events to the bridge's event channel.

use crate::transport::TransportEvent;
use rumqttc::v5::{mqttbytes::QoS, Event};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Pure message routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Route MQTT event to appropriate handler (pure routing decision)
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => {
                use rumqttc::v5::mqttbytes::v5::Packet;
                match incoming {
                    Packet::ConnAck(_) => EventRoute::ConnectionAcknowledged,
                    Packet::Publish(publish) => EventRoute::MessageReceived {
                        topic: String::from_utf8_lossy(&publish.topic).to_string(),
                        payload: publish.payload.to_vec(),
                        retain: publish.retain,
                    },
                    Packet::Disconnect(_) => EventRoute::Disconnected,
                    Packet::SubAck(suback) => EventRoute::SubscriptionConfirmed {
                        packet_id: suback.pkid,
                        topic_count: suback.return_codes.len(),
                    },
                    other => EventRoute::InfrastructureEvent(format!("{other:?}")),
                }
            }
            Event::Outgoing(rumqttc::Outgoing::Disconnect) => EventRoute::DisconnectSent,
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Retained state uses QoS 1; transient acknowledgements use QoS 0
    pub fn determine_qos_level(retain: bool) -> QoS {
        match retain {
            true => QoS::AtLeastOnce,
            false => QoS::AtMostOnce,
        }
    }

    /// Convert a routed event into what the bridge consumes, if anything
    pub fn to_transport_event(route: &EventRoute) -> Option<TransportEvent> {
        match route {
            EventRoute::ConnectionAcknowledged => Some(TransportEvent::Connected),
            EventRoute::MessageReceived { topic, payload, .. } => Some(TransportEvent::Message {
                topic: topic.clone(),
                payload: payload.clone(),
            }),
            _ => None,
        }
    }
}

/// Routing decisions for MQTT events
#[derive(Debug, Clone)]
pub enum EventRoute {
    /// Connection acknowledged - ready to publish/subscribe
    ConnectionAcknowledged,
    /// Message received on subscribed topic
    MessageReceived {
        topic: String,
        payload: Vec<u8>,
        retain: bool,
    },
    /// MQTT broker disconnected
    Disconnected,
    /// Subscription confirmed
    SubscriptionConfirmed { packet_id: u16, topic_count: usize },
    /// Infrastructure event (PingResp, etc.)
    InfrastructureEvent(String),
    /// Our own DISCONNECT was written to the socket
    DisconnectSent,
    /// Outgoing event (handled automatically)
    OutgoingEvent,
}

/// Hands routed events to the bridge (impure I/O)
#[derive(Debug, Default)]
pub struct MessageForwarder {
    sender: Mutex<Option<mpsc::Sender<TransportEvent>>>,
}

impl MessageForwarder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_sender(&self, sender: mpsc::Sender<TransportEvent>) {
        let mut guard = self.sender.lock().unwrap_or_else(|p| p.into_inner());
        *guard = Some(sender);
    }

    pub fn has_sender(&self) -> bool {
        self.sender
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// Forward an event; waits for room in the channel so nothing is dropped
    pub async fn forward(&self, event: TransportEvent) -> Result<(), String> {
        let sender = {
            let guard = self.sender.lock().unwrap_or_else(|p| p.into_inner());
            guard.clone()
        };

        match sender {
            Some(sender) => {
                debug!(target: "mqtt_transport", event = ?event, "Forwarding event to bridge");
                sender
                    .send(event)
                    .await
                    .map_err(|e| format!("Failed to forward event to bridge: {e}"))
            }
            None => {
                warn!("Received MQTT event but no event sender configured - event dropped");
                Err("No event sender configured".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use rumqttc::v5::mqttbytes::v5::Publish;

    #[test]
    fn test_route_mqtt_event() {
        use rumqttc::v5::mqttbytes::v5::{ConnAck, ConnectReturnCode, Disconnect, Packet};

        let connack = Event::Incoming(Packet::ConnAck(ConnAck {
            session_present: false,
            code: ConnectReturnCode::Success,
            properties: None,
        }));
        assert!(matches!(
            MessageHandler::route_mqtt_event(&connack),
            EventRoute::ConnectionAcknowledged
        ));

        let disconnect = Event::Incoming(Packet::Disconnect(Disconnect {
            reason_code: rumqttc::v5::mqttbytes::v5::DisconnectReasonCode::NormalDisconnection,
            properties: None,
        }));
        assert!(matches!(
            MessageHandler::route_mqtt_event(&disconnect),
            EventRoute::Disconnected
        ));

        let publish = Event::Incoming(Packet::Publish(Publish {
            dup: false,
            qos: QoS::AtLeastOnce,
            retain: false,
            topic: Bytes::from("we/node/muted/set"),
            pkid: 1,
            payload: Bytes::from("ON"),
            properties: None,
        }));

        if let EventRoute::MessageReceived {
            topic,
            payload,
            retain,
        } = MessageHandler::route_mqtt_event(&publish)
        {
            assert_eq!(topic, "we/node/muted/set");
            assert_eq!(payload, b"ON");
            assert!(!retain);
        } else {
            panic!("Expected MessageReceived route");
        }
    }

    #[test]
    fn test_to_transport_event() {
        assert_eq!(
            MessageHandler::to_transport_event(&EventRoute::ConnectionAcknowledged),
            Some(TransportEvent::Connected)
        );
        assert_eq!(
            MessageHandler::to_transport_event(&EventRoute::MessageReceived {
                topic: "a/b".to_string(),
                payload: b"1".to_vec(),
                retain: true,
            }),
            Some(TransportEvent::Message {
                topic: "a/b".to_string(),
                payload: b"1".to_vec()
            })
        );
        assert_eq!(
            MessageHandler::to_transport_event(&EventRoute::OutgoingEvent),
            None
        );
        assert_eq!(
            MessageHandler::to_transport_event(&EventRoute::Disconnected),
            None
        );
    }

    #[test]
    fn test_outgoing_disconnect_is_distinguished() {
        assert!(matches!(
            MessageHandler::route_mqtt_event(&Event::Outgoing(rumqttc::Outgoing::Disconnect)),
            EventRoute::DisconnectSent
        ));
        assert!(matches!(
            MessageHandler::route_mqtt_event(&Event::Outgoing(rumqttc::Outgoing::PingReq)),
            EventRoute::OutgoingEvent
        ));
    }

    #[test]
    fn test_determine_qos_level() {
        assert_eq!(MessageHandler::determine_qos_level(true), QoS::AtLeastOnce);
        assert_eq!(MessageHandler::determine_qos_level(false), QoS::AtMostOnce);
    }

    #[tokio::test]
    async fn test_message_forwarder() {
        let forwarder = MessageForwarder::new();
        assert!(!forwarder.has_sender());
        assert!(forwarder.forward(TransportEvent::Connected).await.is_err());

        let (tx, mut rx) = mpsc::channel(1);
        forwarder.set_sender(tx);
        assert!(forwarder.has_sender());

        forwarder.forward(TransportEvent::Connected).await.unwrap();
        assert_eq!(rx.recv().await, Some(TransportEvent::Connected));
    }
}
