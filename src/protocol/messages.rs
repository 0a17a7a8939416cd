//! Message types crossing the boundary between the flow engine and the nodes
//!
//! [`FlowMessage`] is what the flow engine hands to a node and what a node
//! forwards downstream. [`RelayMessage`] is the relay's view of one message
//! once the deployment configuration has been applied to it.

use crate::config::TransportKind;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Message exchanged with the flow engine
///
/// # Examples
/// ```
/// use flow_relay::protocol::FlowMessage;
///
/// let msg: FlowMessage = serde_json::from_str(r#"{"payload":"abc","topic":"events"}"#).unwrap();
/// assert_eq!(&msg.payload[..], b"abc");
/// assert!(!msg.send_status);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FlowMessage {
    /// Message body
    #[serde(default, with = "payload_serde")]
    pub payload: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Storage target of the form `gs://bucket/key`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Set by the relay when the message was handed to a connected broker session
    #[serde(default)]
    pub send_status: bool,
}

impl FlowMessage {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            ..Default::default()
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Build a message from one input line: a JSON object, or a raw text payload
    pub fn from_line(line: &str) -> Self {
        match serde_json::from_str::<FlowMessage>(line) {
            Ok(msg) if line.trim_start().starts_with('{') => msg,
            _ => Self::new(line.to_string()),
        }
    }
}

/// A message after transport and device selection
#[derive(Debug, Clone, PartialEq)]
pub struct RelayMessage {
    pub payload: Bytes,
    /// Required for MQTT publish, populated on inbound delivery
    pub topic: Option<String>,
    pub device_id: String,
    pub transport: TransportKind,
    pub send_status: bool,
    /// Caller fields the relay does not interpret, forwarded unchanged
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

impl RelayMessage {
    /// Apply the node's deployment configuration to a flow message
    pub fn outbound(msg: FlowMessage, device_id: &str, transport: TransportKind) -> Self {
        Self {
            payload: msg.payload,
            topic: msg.topic,
            device_id: device_id.to_string(),
            transport,
            send_status: false,
            filename: msg.filename,
            content_type: msg.content_type,
        }
    }

    /// Message received from the broker for `device_id`
    pub fn inbound(device_id: &str, topic: String, payload: Bytes) -> Self {
        Self {
            payload,
            topic: Some(topic),
            device_id: device_id.to_string(),
            transport: TransportKind::Mqtt,
            send_status: false,
            filename: None,
            content_type: None,
        }
    }

    pub fn into_flow_message(self) -> FlowMessage {
        FlowMessage {
            payload: self.payload,
            topic: self.topic,
            filename: self.filename,
            content_type: self.content_type,
            send_status: self.send_status,
        }
    }
}

/// Displayed connectivity of a device, derived from its connection flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityStatus {
    Connected,
    Disconnected,
}

impl ConnectivityStatus {
    pub fn from_connected(connected: bool) -> Self {
        if connected {
            ConnectivityStatus::Connected
        } else {
            ConnectivityStatus::Disconnected
        }
    }

    /// Editor badge for this status
    pub fn indicator(&self) -> StatusIndicator {
        match self {
            ConnectivityStatus::Connected => StatusIndicator {
                fill: "green",
                shape: "dot",
                text: "connected",
            },
            ConnectivityStatus::Disconnected => StatusIndicator {
                fill: "red",
                shape: "dot",
                text: "disconnected",
            },
        }
    }
}

impl fmt::Display for ConnectivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.indicator().text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusIndicator {
    pub fill: &'static str,
    pub shape: &'static str,
    pub text: &'static str,
}

/// Payloads travel as UTF-8 strings when possible and as byte arrays otherwise.
/// Non-string JSON payloads are accepted and stored as their JSON text.
mod payload_serde {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(payload: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        match std::str::from_utf8(payload) {
            Ok(text) => serializer.serialize_str(text),
            Err(_) => serializer.collect_seq(payload.iter()),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Null => Bytes::new(),
            Value::String(text) => Bytes::from(text),
            Value::Array(items) if items.iter().all(|v| v.as_u64().is_some_and(|n| n <= 255)) => {
                items
                    .iter()
                    .filter_map(Value::as_u64)
                    .map(|n| n as u8)
                    .collect::<Vec<u8>>()
                    .into()
            }
            other => Bytes::from(other.to_string()),
        })
    }
}
