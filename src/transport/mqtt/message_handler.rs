//! Pure routing of `rumqttc` events
//!
//! The event-loop task turns every polled event into an [`EventRoute`] and
//! acts on the route; nothing here performs I/O.

use rumqttc::{ConnectReturnCode, Event, Packet};

/// Routing decisions for broker events
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// Broker accepted the session
    ConnectionAcknowledged { session_present: bool },
    /// Broker refused the session
    ConnectionRefused(String),
    /// Message received on a subscribed topic
    MessageReceived { topic: String, payload: bytes::Bytes },
    /// Broker answered a subscription request
    SubscriptionAcknowledged { refused: bool },
    /// Broker closed the session
    Disconnected,
    /// PingResp, UnsubAck and similar housekeeping
    InfrastructureEvent(String),
    /// Outgoing packets need no action
    OutgoingEvent,
}

pub struct MessageHandler;

impl MessageHandler {
    /// Route an event to the action the event loop should take
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => match &ack.code {
                ConnectReturnCode::Success => EventRoute::ConnectionAcknowledged {
                    session_present: ack.session_present,
                },
                code => EventRoute::ConnectionRefused(format!("{code:?}")),
            },
            Event::Incoming(Packet::Publish(publish)) => EventRoute::MessageReceived {
                topic: publish.topic.clone(),
                payload: publish.payload.clone(),
            },
            Event::Incoming(Packet::SubAck(ack)) => EventRoute::SubscriptionAcknowledged {
                refused: Self::subscription_refused(&ack.return_codes),
            },
            Event::Incoming(Packet::Disconnect) => EventRoute::Disconnected,
            Event::Incoming(other) => EventRoute::InfrastructureEvent(format!("{other:?}")),
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Whether a SubAck reports a refused subscription
    pub fn subscription_refused(return_codes: &[rumqttc::SubscribeReasonCode]) -> bool {
        return_codes
            .iter()
            .any(|code| matches!(code, rumqttc::SubscribeReasonCode::Failure))
    }
}
