//! Transport layer for device traffic
//!
//! The relay never talks to `rumqttc` or `reqwest` directly. It is handed a
//! [`BrokerConnector`] and a [`TelemetryPublisher`] at construction, so tests
//! substitute fakes for both.

use crate::config::DeviceSection;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;

pub mod http;
pub mod mqtt;

pub use http::{HttpError, HttpTelemetryPublisher};
pub use mqtt::{MqttError, RumqttConnector};

/// Opens broker sessions for devices
#[async_trait::async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Start a session for `device`. Connection state changes and inbound
    /// messages for this session are reported through `listener`.
    async fn connect(
        &self,
        device: &DeviceSection,
        listener: BrokerListener,
    ) -> Result<Box<dyn BrokerClient>, MqttError>;
}

/// One live broker session
#[async_trait::async_trait]
pub trait BrokerClient: Send + Sync {
    async fn subscribe(&self, topic: &str) -> Result<(), MqttError>;

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), MqttError>;

    /// Close the session; no events are reported afterwards
    async fn disconnect(&mut self) -> Result<(), MqttError>;
}

/// One-shot HTTP delivery of device telemetry
#[async_trait::async_trait]
pub trait TelemetryPublisher: Send + Sync {
    async fn publish_event(&self, device_id: &str, payload: Bytes) -> Result<(), HttpError>;
}

/// What happened on a broker session
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerEventKind {
    Connected,
    Disconnected(String),
    Message { topic: String, payload: Bytes },
}

/// A broker event tagged with the session that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerEvent {
    pub device_id: String,
    pub session: u64,
    pub kind: BrokerEventKind,
}

/// Listener a broker session reports into
#[derive(Debug, Clone)]
pub struct BrokerListener {
    device_id: String,
    session: u64,
    tx: mpsc::UnboundedSender<BrokerEvent>,
}

impl BrokerListener {
    pub fn new(device_id: &str, session: u64, tx: mpsc::UnboundedSender<BrokerEvent>) -> Self {
        Self {
            device_id: device_id.to_string(),
            session,
            tx,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn connected(&self) {
        self.emit(BrokerEventKind::Connected);
    }

    pub fn disconnected(&self, reason: impl Into<String>) {
        self.emit(BrokerEventKind::Disconnected(reason.into()));
    }

    pub fn message(&self, topic: impl Into<String>, payload: Bytes) {
        self.emit(BrokerEventKind::Message {
            topic: topic.into(),
            payload,
        });
    }

    fn emit(&self, kind: BrokerEventKind) {
        let event = BrokerEvent {
            device_id: self.device_id.clone(),
            session: self.session,
            kind,
        };
        if self.tx.send(event).is_err() {
            debug!(device_id = %self.device_id, "Relay gone, dropping broker event");
        }
    }
}
