//! `rumqttc`-backed broker sessions
//!
//! Each device session owns an `AsyncClient` and a spawned task that polls the
//! event loop and reports connection changes and inbound messages to the
//! session's [`BrokerListener`]. Reconnection is left to `rumqttc`: after a poll
//! error the task pauses briefly and polls again, which re-dials the broker.

use super::connection::{configure_mqtt_options, BrokerCredentials, MqttError};
use super::message_handler::{EventRoute, MessageHandler};
use crate::config::{ConfigError, DeviceSection, MqttSection, RelayConfig};
use crate::mqtt_span;
use crate::transport::{BrokerClient, BrokerConnector, BrokerListener};
use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{AsyncClient, EventLoop, QoS};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

/// Capacity of the request channel between client handle and event loop
const REQUEST_CAPACITY: usize = 10;

/// Pause between a failed poll and the next reconnect attempt
const DEFAULT_RETRY_PAUSE: Duration = Duration::from_secs(1);

/// Bound on how long `disconnect` waits for the event loop task to stop
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Opens one `rumqttc` session per device
pub struct RumqttConnector {
    mqtt: MqttSection,
    credentials: BrokerCredentials,
    retry_pause: Duration,
}

impl RumqttConnector {
    pub fn new(mqtt: MqttSection, credentials: BrokerCredentials) -> Self {
        Self {
            mqtt,
            credentials,
            retry_pause: DEFAULT_RETRY_PAUSE,
        }
    }

    /// Build from the `[mqtt]` section, resolving credentials from the environment
    pub fn from_config(config: &RelayConfig) -> Result<Self, ConfigError> {
        let mqtt = config.mqtt.clone().ok_or_else(|| {
            ConfigError::InvalidConfig("MQTT transport requires an [mqtt] section".to_string())
        })?;
        let credentials = BrokerCredentials {
            username: config.get_mqtt_username(),
            password: config.get_mqtt_password(),
        };
        Ok(Self::new(mqtt, credentials))
    }

    pub fn with_retry_pause(mut self, retry_pause: Duration) -> Self {
        self.retry_pause = retry_pause;
        self
    }
}

#[async_trait]
impl BrokerConnector for RumqttConnector {
    async fn connect(
        &self,
        device: &DeviceSection,
        listener: BrokerListener,
    ) -> Result<Box<dyn BrokerClient>, MqttError> {
        let options = configure_mqtt_options(device, &self.mqtt, &self.credentials)?;
        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);

        let topics = Arc::new(Mutex::new(Vec::new()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            device_id = %device.device_id,
            broker = %self.mqtt.broker_url,
            "Starting broker session"
        );

        let span = mqtt_span!(device_id = %device.device_id, session = listener.session());
        let handle = tokio::spawn(
            run_event_loop(
                event_loop,
                client.clone(),
                listener,
                topics.clone(),
                shutdown_rx,
                self.retry_pause,
            )
            .instrument(span),
        );

        Ok(Box::new(RumqttDeviceClient {
            device_id: device.device_id.clone(),
            client,
            topics,
            shutdown_tx,
            event_loop_handle: Some(handle),
        }))
    }
}

/// Handle on one running device session
pub struct RumqttDeviceClient {
    device_id: String,
    client: AsyncClient,
    topics: Arc<Mutex<Vec<String>>>,
    shutdown_tx: watch::Sender<bool>,
    event_loop_handle: Option<JoinHandle<()>>,
}

#[async_trait]
impl BrokerClient for RumqttDeviceClient {
    async fn subscribe(&self, topic: &str) -> Result<(), MqttError> {
        self.client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| MqttError::SubscriptionFailed(Box::new(e)))?;

        if let Ok(mut topics) = self.topics.lock() {
            if !topics.iter().any(|t| t == topic) {
                topics.push(topic.to_string());
            }
        }
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), MqttError> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
            .await
            .map_err(|e| MqttError::PublishFailed(Box::new(e)))
    }

    async fn disconnect(&mut self) -> Result<(), MqttError> {
        if let Err(e) = self.client.try_disconnect() {
            debug!(device_id = %self.device_id, "Disconnect request not delivered: {}", e);
        }
        let _ = self.shutdown_tx.send(true);

        if let Some(mut handle) = self.event_loop_handle.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await.is_err() {
                handle.abort();
            }
        }

        info!(device_id = %self.device_id, "Broker session closed");
        Ok(())
    }
}

impl Drop for RumqttDeviceClient {
    fn drop(&mut self) {
        if let Some(handle) = self.event_loop_handle.take() {
            handle.abort();
        }
    }
}

/// Poll the event loop until shutdown, translating events for the listener
async fn run_event_loop(
    mut event_loop: EventLoop,
    client: AsyncClient,
    listener: BrokerListener,
    topics: Arc<Mutex<Vec<String>>>,
    mut shutdown_rx: watch::Receiver<bool>,
    retry_pause: Duration,
) {
    let device_id = listener.device_id().to_string();
    // None until the first connection outcome is known
    let mut connected: Option<bool> = None;
    let mut acknowledged_once = false;

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    debug!(device_id = %device_id, "Event loop shutdown requested");
                    break;
                }
            }

            polled = event_loop.poll() => match polled {
                Ok(event) => match MessageHandler::route_mqtt_event(&event) {
                    EventRoute::ConnectionAcknowledged { session_present } => {
                        if acknowledged_once && !session_present {
                            resubscribe(&client, &topics);
                        }
                        acknowledged_once = true;
                        connected = Some(true);
                        info!(device_id = %device_id, "Broker session connected");
                        listener.connected();
                    }
                    EventRoute::ConnectionRefused(reason) => {
                        warn!(device_id = %device_id, "Broker refused session: {}", reason);
                        if connected != Some(false) {
                            listener.disconnected(reason);
                        }
                        connected = Some(false);
                        tokio::time::sleep(retry_pause).await;
                    }
                    EventRoute::MessageReceived { topic, payload } => {
                        debug!(device_id = %device_id, topic = %topic, "Inbound message");
                        listener.message(topic, payload);
                    }
                    EventRoute::SubscriptionAcknowledged { refused } => {
                        if refused {
                            warn!(device_id = %device_id, "Broker refused a subscription");
                        }
                    }
                    EventRoute::Disconnected => {
                        info!(device_id = %device_id, "Broker closed the session");
                        if connected != Some(false) {
                            listener.disconnected("broker closed the session");
                        }
                        connected = Some(false);
                    }
                    EventRoute::InfrastructureEvent(event) => {
                        tracing::trace!(device_id = %device_id, "MQTT event: {}", event);
                    }
                    EventRoute::OutgoingEvent => {}
                },
                Err(e) => {
                    if connected != Some(false) {
                        error!(device_id = %device_id, "Broker connection error: {}", e);
                        listener.disconnected(e.to_string());
                    } else {
                        debug!(device_id = %device_id, "Reconnect attempt failed: {}", e);
                    }
                    connected = Some(false);
                    tokio::time::sleep(retry_pause).await;
                }
            }
        }
    }
}

/// Restore subscriptions after the broker dropped session state.
/// Runs inside the polling task, so it must not wait on the request channel.
fn resubscribe(client: &AsyncClient, topics: &Arc<Mutex<Vec<String>>>) {
    let topics: Vec<String> = match topics.lock() {
        Ok(topics) => topics.clone(),
        Err(_) => return,
    };

    for topic in topics {
        if let Err(e) = client.try_subscribe(&topic, QoS::AtLeastOnce) {
            warn!("Failed to resubscribe to {}: {}", topic, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportKind;
    use crate::transport::BrokerEventKind;
    use tokio::sync::mpsc;

    fn device() -> DeviceSection {
        DeviceSection {
            transport: TransportKind::Mqtt,
            project_id: "proj".to_string(),
            region: "us-central1".to_string(),
            registry_id: "reg".to_string(),
            device_id: "d1".to_string(),
        }
    }

    fn connector(broker_url: &str) -> RumqttConnector {
        RumqttConnector::new(
            MqttSection {
                broker_url: broker_url.to_string(),
                username_env: None,
                password_env: None,
                keep_alive_secs: 60,
            },
            BrokerCredentials::default(),
        )
        .with_retry_pause(Duration::from_millis(20))
    }

    #[tokio::test]
    async fn test_invalid_broker_url_fails_synchronously() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = connector("not a url")
            .connect(&device(), BrokerListener::new("d1", 1, tx))
            .await;
        assert!(matches!(result, Err(MqttError::InvalidBrokerUrl(_))));
    }

    #[tokio::test]
    async fn test_unreachable_broker_reports_disconnected_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        // Port 1 on loopback refuses connections
        let mut client = connector("mqtt://127.0.0.1:1")
            .connect(&device(), BrokerListener::new("d1", 1, tx))
            .await
            .expect("session handle is returned before the network is touched");

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("a connection outcome is reported")
            .expect("listener channel open");
        assert_eq!(event.device_id, "d1");
        assert!(matches!(event.kind, BrokerEventKind::Disconnected(_)));

        // Later failed attempts are not re-reported
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());

        client.disconnect().await.unwrap();
    }
}
