//! The message-hub node: a [`DeviceRelay`] driven by flow input and broker events

use super::hub::DeviceRelay;
use crate::config::{DeviceSection, RelayConfig, TransportKind};
use crate::error::RelayResult;
use crate::flow::{FlowHost, FlowNode};
use crate::protocol::{FlowMessage, RelayMessage};
use crate::relay_span;
use crate::transport::{
    BrokerConnector, BrokerEvent, HttpTelemetryPublisher, RumqttConnector, TelemetryPublisher,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, Instrument};

pub struct RelayNode {
    device: DeviceSection,
    relay: DeviceRelay,
    events_rx: mpsc::UnboundedReceiver<BrokerEvent>,
}

impl RelayNode {
    /// Build a node with explicit transports
    pub fn new(
        device: DeviceSection,
        host: Arc<dyn FlowHost>,
        connector: Option<Arc<dyn BrokerConnector>>,
        publisher: Option<Arc<dyn TelemetryPublisher>>,
    ) -> Self {
        let (mut relay, events_rx) = DeviceRelay::new(host);
        if let Some(connector) = connector {
            relay = relay.with_broker(connector);
        }
        if let Some(publisher) = publisher {
            relay = relay.with_http(publisher);
        }
        Self {
            device,
            relay,
            events_rx,
        }
    }

    /// Build a node with the production transport selected by the configuration
    pub fn from_config(config: &RelayConfig, host: Arc<dyn FlowHost>) -> RelayResult<Self> {
        let device = config.require_device()?;
        let mut connector: Option<Arc<dyn BrokerConnector>> = None;
        let mut publisher: Option<Arc<dyn TelemetryPublisher>> = None;
        match device.transport {
            TransportKind::Mqtt => {
                connector = Some(Arc::new(RumqttConnector::from_config(config)?));
            }
            TransportKind::Http => {
                publisher = Some(Arc::new(HttpTelemetryPublisher::from_config(config)?));
            }
        }
        Ok(Self::new(device.clone(), host, connector, publisher))
    }

    pub fn relay(&self) -> &DeviceRelay {
        &self.relay
    }

    /// Open the broker session when the node uses MQTT. A failure leaves the
    /// node running but unable to deliver MQTT traffic until restarted.
    pub async fn start(&mut self) {
        if self.device.transport != TransportKind::Mqtt {
            return;
        }
        if let Err(e) = self.relay.establish_connection(&self.device).await {
            error!(
                device_id = %self.device.device_id,
                "Broker connection could not be started, node stays disconnected: {}", e
            );
        }
    }

    /// Apply any broker events that are already queued
    pub fn drain_broker_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.relay.handle_broker_event(event);
        }
    }

    /// Serve flow input and broker events until shutdown. A closed input stops
    /// outbound traffic only; inbound forwarding continues until shutdown.
    pub async fn run(
        mut self,
        mut inputs: mpsc::Receiver<FlowMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let span = relay_span!(
            device_id = %self.device.device_id,
            transport = %self.device.transport
        );

        async move {
            self.start().await;
            self.drain_broker_events();
            info!("Relay node running");

            let mut inputs_open = true;
            loop {
                // Broker events are applied before the next input is routed
                tokio::select! {
                    biased;

                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("Shutdown requested");
                            break;
                        }
                    }
                    Some(event) = self.events_rx.recv() => {
                        self.relay.handle_broker_event(event);
                    }
                    input = inputs.recv(), if inputs_open => match input {
                        Some(msg) => self.on_input(msg).await,
                        None => {
                            info!("Flow input closed, still serving broker events");
                            inputs_open = false;
                        }
                    },
                }
            }

            self.on_close().await;
        }
        .instrument(span)
        .await
    }
}

#[async_trait]
impl FlowNode for RelayNode {
    async fn on_input(&mut self, msg: FlowMessage) {
        let msg = RelayMessage::outbound(msg, &self.device.device_id, self.device.transport);
        self.relay.handle_outbound(msg).await;
    }

    async fn on_close(&mut self) {
        if self.device.transport == TransportKind::Mqtt {
            self.relay.teardown(&self.device.device_id).await;
        }
    }
}
