//! Device relay: transport selection, connection lifecycle, inbound forwarding
//!
//! The relay and its pool live on a single task. Broker sessions never touch
//! the pool; they report through a [`BrokerListener`] into a channel that the
//! owning task drains with [`DeviceRelay::handle_broker_event`].

use super::pool::{ConnectionPool, DeviceConnection};
use crate::config::{DeviceSection, TransportKind};
use crate::error::{RelayError, RelayResult};
use crate::flow::FlowHost;
use crate::observability::metrics;
use crate::protocol::{ConnectivityStatus, DeviceTopics, RelayMessage};
use crate::transport::{
    BrokerConnector, BrokerEvent, BrokerEventKind, BrokerListener, TelemetryPublisher,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub struct DeviceRelay {
    host: Arc<dyn FlowHost>,
    connector: Option<Arc<dyn BrokerConnector>>,
    publisher: Option<Arc<dyn TelemetryPublisher>>,
    pool: ConnectionPool,
    events_tx: mpsc::UnboundedSender<BrokerEvent>,
    next_session: u64,
}

impl DeviceRelay {
    /// Create a relay reporting to `host`. The returned receiver carries broker
    /// events and must be drained by the task that owns the relay.
    pub fn new(host: Arc<dyn FlowHost>) -> (Self, mpsc::UnboundedReceiver<BrokerEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let relay = Self {
            host,
            connector: None,
            publisher: None,
            pool: ConnectionPool::new(),
            events_tx,
            next_session: 0,
        };
        (relay, events_rx)
    }

    pub fn with_broker(mut self, connector: Arc<dyn BrokerConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn with_http(mut self, publisher: Arc<dyn TelemetryPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn status_of(&self, device_id: &str) -> ConnectivityStatus {
        self.pool.status_of(device_id)
    }

    /// Route one message to its transport and forward it downstream at most once.
    ///
    /// An MQTT message for a device without a connected session is dropped
    /// without an error; only the status badge changes.
    pub async fn handle_outbound(&mut self, mut msg: RelayMessage) {
        metrics().record_outbound();
        msg.send_status = false;

        if msg.payload.is_empty() {
            metrics().record_rejected_input();
            let error = RelayError::invalid_input("No data found in msg.payload");
            self.host
                .error(error.to_report(), Some(msg.into_flow_message()));
            return;
        }

        match msg.transport {
            TransportKind::Mqtt => self.outbound_mqtt(msg).await,
            TransportKind::Http => self.outbound_http(msg).await,
        }
    }

    async fn outbound_mqtt(&mut self, mut msg: RelayMessage) {
        let connection = match self.pool.get(&msg.device_id) {
            Some(connection) if connection.connected => connection,
            _ => {
                debug!(device_id = %msg.device_id, "Device offline, dropping message");
                metrics().record_dropped_offline();
                self.host.status(ConnectivityStatus::Disconnected);
                return;
            }
        };

        self.host.status(ConnectivityStatus::Connected);

        let topic = DeviceTopics::resolve_outbound(&msg.device_id, msg.topic.as_deref());
        match connection.client.publish(&topic, msg.payload.clone()).await {
            Ok(()) => {
                metrics().record_mqtt_publish(true);
                debug!(device_id = %msg.device_id, topic = %topic, "Published telemetry");
                msg.send_status = true;
                self.host.send(msg.into_flow_message());
            }
            Err(e) => {
                metrics().record_mqtt_publish(false);
                warn!(device_id = %msg.device_id, topic = %topic, "Publish failed: {}", e);
                let error = RelayError::from(e);
                self.host
                    .error(error.to_report(), Some(msg.into_flow_message()));
            }
        }
    }

    async fn outbound_http(&mut self, msg: RelayMessage) {
        let Some(publisher) = self.publisher.clone() else {
            metrics().record_rejected_input();
            let error = RelayError::invalid_input(format!(
                "No HTTP endpoint configured for device {}",
                msg.device_id
            ));
            self.host
                .error(error.to_report(), Some(msg.into_flow_message()));
            return;
        };

        // Forwarded whatever the outcome; send_status stays false on this path
        match publisher
            .publish_event(&msg.device_id, msg.payload.clone())
            .await
        {
            Ok(()) => {
                metrics().record_http(true);
                debug!(device_id = %msg.device_id, "Telemetry delivered over HTTP");
            }
            Err(e) => {
                metrics().record_http(false);
                warn!(device_id = %msg.device_id, "HTTP delivery failed: {}", e);
                let error = RelayError::from(e);
                self.host
                    .error(error.to_report(), Some(msg.clone().into_flow_message()));
            }
        }

        self.host.send(msg.into_flow_message());
    }

    /// Open the broker session for `device`, subscribe to its config and
    /// commands topics, and add it to the pool.
    ///
    /// A failed attempt is logged and returned; the device stays disconnected
    /// and nothing retries it.
    pub async fn establish_connection(&mut self, device: &DeviceSection) -> RelayResult<()> {
        let device_id = device.device_id.as_str();

        if self.pool.contains(device_id) {
            debug!(device_id = %device_id, "Broker session already exists");
            return Ok(());
        }

        self.host.status(ConnectivityStatus::Disconnected);

        let connector = self
            .connector
            .clone()
            .ok_or_else(|| RelayError::internal("No broker connector configured"))?;

        self.next_session += 1;
        let session = self.next_session;
        let listener = BrokerListener::new(device_id, session, self.events_tx.clone());

        let client = match connector.connect(device, listener).await {
            Ok(client) => client,
            Err(e) => {
                error!(device_id = %device_id, "Broker connection failed: {}", e);
                return Err(e.into());
            }
        };

        let mut connection = DeviceConnection::new(device_id, session, client);
        for topic in DeviceTopics::subscriptions(device_id) {
            match connection.client.subscribe(&topic).await {
                Ok(()) => {
                    connection.subscribed_topics.insert(topic);
                }
                Err(e) => warn!(device_id = %device_id, topic = %topic, "Subscribe failed: {}", e),
            }
        }

        info!(
            device_id = %device_id,
            session,
            topics = connection.subscribed_topics.len(),
            "Broker session registered"
        );
        self.pool.insert(connection);
        Ok(())
    }

    /// Apply a broker event to the pool. Events for devices that are no longer
    /// pooled, or from a replaced session, are ignored.
    pub fn handle_broker_event(&mut self, event: BrokerEvent) {
        let Some(connection) = self.pool.get_mut(&event.device_id) else {
            debug!(device_id = %event.device_id, "Event for unknown device ignored");
            return;
        };
        if connection.session != event.session {
            debug!(device_id = %event.device_id, session = event.session, "Stale session event ignored");
            return;
        }

        match event.kind {
            BrokerEventKind::Connected => {
                connection.connected = true;
                metrics().record_connection(true);
                self.host.status(ConnectivityStatus::Connected);
            }
            BrokerEventKind::Disconnected(reason) => {
                connection.connected = false;
                metrics().record_connection(false);
                info!(device_id = %event.device_id, "Device disconnected: {}", reason);
                self.host.status(ConnectivityStatus::Disconnected);
            }
            BrokerEventKind::Message { topic, payload } => {
                metrics().record_inbound();
                self.host.status(connection.status());
                let inbound = RelayMessage::inbound(&event.device_id, topic, payload);
                self.host.send(inbound.into_flow_message());
            }
        }
    }

    /// Close and forget the device's broker session, if it has one
    pub async fn teardown(&mut self, device_id: &str) {
        let Some(mut connection) = self.pool.remove(device_id) else {
            return;
        };

        if let Err(e) = connection.client.disconnect().await {
            warn!(device_id = %device_id, "Disconnect failed: {}", e);
        }
        info!(device_id = %device_id, "Broker session torn down");
    }

    /// Tear down every pooled session
    pub async fn shutdown(&mut self) {
        for device_id in self.pool.device_ids() {
            self.teardown(&device_id).await;
        }
    }
}
