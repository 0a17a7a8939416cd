//! Per-device broker sessions keyed by device id

use crate::protocol::ConnectivityStatus;
use crate::transport::BrokerClient;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// One broker session owned by the relay
pub struct DeviceConnection {
    pub device_id: String,
    /// Identifies which session produced a broker event
    pub session: u64,
    pub client: Box<dyn BrokerClient>,
    /// Changed only by connection events
    pub connected: bool,
    pub subscribed_topics: HashSet<String>,
}

impl DeviceConnection {
    pub fn new(device_id: &str, session: u64, client: Box<dyn BrokerClient>) -> Self {
        Self {
            device_id: device_id.to_string(),
            session,
            client,
            connected: false,
            subscribed_topics: HashSet::new(),
        }
    }

    pub fn status(&self) -> ConnectivityStatus {
        ConnectivityStatus::from_connected(self.connected)
    }
}

impl fmt::Debug for DeviceConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceConnection")
            .field("device_id", &self.device_id)
            .field("session", &self.session)
            .field("connected", &self.connected)
            .field("subscribed_topics", &self.subscribed_topics)
            .finish_non_exhaustive()
    }
}

/// At most one live connection per device
#[derive(Debug, Default)]
pub struct ConnectionPool {
    connections: HashMap<String, DeviceConnection>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, device_id: &str) -> Option<&DeviceConnection> {
        self.connections.get(device_id)
    }

    pub fn get_mut(&mut self, device_id: &str) -> Option<&mut DeviceConnection> {
        self.connections.get_mut(device_id)
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.connections.contains_key(device_id)
    }

    /// Insert a connection, handing back any connection it replaced
    pub fn insert(&mut self, connection: DeviceConnection) -> Option<DeviceConnection> {
        self.connections
            .insert(connection.device_id.clone(), connection)
    }

    pub fn remove(&mut self, device_id: &str) -> Option<DeviceConnection> {
        self.connections.remove(device_id)
    }

    pub fn device_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.connections.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Status of a device; unknown devices are disconnected
    pub fn status_of(&self, device_id: &str) -> ConnectivityStatus {
        self.get(device_id)
            .map(DeviceConnection::status)
            .unwrap_or(ConnectivityStatus::Disconnected)
    }
}
