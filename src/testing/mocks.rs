//! Mock implementations for testing
//!
//! Each mock is cheap to clone; clones share their recorded history, so a test
//! keeps one handle while the relay owns another.

use crate::config::DeviceSection;
use crate::flow::FlowHost;
use crate::protocol::{ConnectivityStatus, FlowMessage};
use crate::storage::{StorageBackend, StorageError};
use crate::transport::{
    BrokerClient, BrokerConnector, BrokerListener, HttpError, MqttError, TelemetryPublisher,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn snapshot<T: Clone>(records: &Mutex<Vec<T>>) -> Vec<T> {
    records.lock().map(|r| r.clone()).unwrap_or_default()
}

fn record<T>(records: &Mutex<Vec<T>>, value: T) {
    if let Ok(mut records) = records.lock() {
        records.push(value);
    }
}

pub type PublishedMessage = (String, Bytes);

/// Mock broker session
#[derive(Debug, Clone, Default)]
pub struct MockBrokerClient {
    pub published: Arc<Mutex<Vec<PublishedMessage>>>,
    pub subscriptions: Arc<Mutex<Vec<String>>>,
    pub disconnects: Arc<AtomicUsize>,
    pub fail_publish: Arc<AtomicBool>,
    pub fail_subscribe: Arc<AtomicBool>,
}

impl MockBrokerClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        snapshot(&self.published)
    }

    pub fn subscriptions(&self) -> Vec<String> {
        snapshot(&self.subscriptions)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrokerClient for MockBrokerClient {
    async fn subscribe(&self, topic: &str) -> Result<(), MqttError> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(MqttError::SubscriptionFailed("Mock subscribe failure".into()));
        }
        record(&self.subscriptions, topic.to_string());
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), MqttError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(MqttError::PublishFailed("Mock publish failure".into()));
        }
        record(&self.published, (topic.to_string(), payload));
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), MqttError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Mock connector handing out a shared [`MockBrokerClient`]
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    pub client: MockBrokerClient,
    pub connects: Arc<Mutex<Vec<String>>>,
    pub listeners: Arc<Mutex<Vec<BrokerListener>>>,
    pub should_fail: Arc<AtomicBool>,
    /// Report `Connected` as soon as a session is opened
    pub connect_immediately: bool,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connected_on_start() -> Self {
        Self {
            connect_immediately: true,
            ..Default::default()
        }
    }

    pub fn with_failure() -> Self {
        let connector = Self::default();
        connector.set_should_fail(true);
        connector
    }

    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    pub fn connects(&self) -> Vec<String> {
        snapshot(&self.connects)
    }

    /// Listener of the most recent session opened for `device_id`
    pub fn listener(&self, device_id: &str) -> Option<BrokerListener> {
        snapshot(&self.listeners)
            .into_iter()
            .rev()
            .find(|l| l.device_id() == device_id)
    }
}

#[async_trait]
impl BrokerConnector for MockConnector {
    async fn connect(
        &self,
        device: &DeviceSection,
        listener: BrokerListener,
    ) -> Result<Box<dyn BrokerClient>, MqttError> {
        record(&self.connects, device.device_id.clone());
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(MqttError::InvalidBrokerUrl(
                "Mock connection failure".to_string(),
            ));
        }

        if self.connect_immediately {
            listener.connected();
        }
        record(&self.listeners, listener);
        Ok(Box::new(self.client.clone()))
    }
}

/// Mock HTTP telemetry publisher
#[derive(Debug, Clone, Default)]
pub struct MockTelemetryPublisher {
    pub calls: Arc<Mutex<Vec<PublishedMessage>>>,
    pub should_fail: Arc<AtomicBool>,
}

impl MockTelemetryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure() -> Self {
        let publisher = Self::default();
        publisher.should_fail.store(true, Ordering::SeqCst);
        publisher
    }

    /// `(device_id, payload)` for every request made
    pub fn calls(&self) -> Vec<PublishedMessage> {
        snapshot(&self.calls)
    }
}

#[async_trait]
impl TelemetryPublisher for MockTelemetryPublisher {
    async fn publish_event(&self, device_id: &str, payload: Bytes) -> Result<(), HttpError> {
        record(&self.calls, (device_id.to_string(), payload));
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(HttpError::Status {
                status: 503,
                body: "Mock endpoint unavailable".to_string(),
            });
        }
        Ok(())
    }
}

/// One object written through [`MockStorage`]
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub bucket: String,
    pub key: String,
    pub data: Bytes,
    pub content_type: Option<String>,
}

/// Mock storage backend
#[derive(Debug, Clone, Default)]
pub struct MockStorage {
    pub objects: Arc<Mutex<Vec<StoredObject>>>,
    pub should_fail: Arc<AtomicBool>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    pub fn writes(&self) -> Vec<StoredObject> {
        snapshot(&self.objects)
    }
}

#[async_trait]
impl StorageBackend for MockStorage {
    async fn write(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), StorageError> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(StorageError::Status {
                status: 403,
                body: "Mock access denied".to_string(),
            });
        }
        record(
            &self.objects,
            StoredObject {
                bucket: bucket.to_string(),
                key: key.to_string(),
                data,
                content_type: content_type.map(str::to_string),
            },
        );
        Ok(())
    }
}

pub type ReportedError = (String, Option<FlowMessage>);

/// Flow host recording every hook call
#[derive(Debug, Default)]
pub struct RecordingHost {
    pub sent: Mutex<Vec<FlowMessage>>,
    pub statuses: Mutex<Vec<ConnectivityStatus>>,
    pub errors: Mutex<Vec<ReportedError>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<FlowMessage> {
        snapshot(&self.sent)
    }

    pub fn statuses(&self) -> Vec<ConnectivityStatus> {
        snapshot(&self.statuses)
    }

    pub fn last_status(&self) -> Option<ConnectivityStatus> {
        self.statuses().last().copied()
    }

    pub fn errors(&self) -> Vec<ReportedError> {
        snapshot(&self.errors)
    }

    pub fn clear(&self) {
        if let Ok(mut r) = self.sent.lock() {
            r.clear();
        }
        if let Ok(mut r) = self.statuses.lock() {
            r.clear();
        }
        if let Ok(mut r) = self.errors.lock() {
            r.clear();
        }
    }
}

impl FlowHost for RecordingHost {
    fn send(&self, msg: FlowMessage) {
        record(&self.sent, msg);
    }

    fn status(&self, status: ConnectivityStatus) {
        record(&self.statuses, status);
    }

    fn error(&self, report: String, msg: Option<FlowMessage>) {
        record(&self.errors, (report, msg));
    }
}
