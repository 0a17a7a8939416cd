//! Process-wide relay counters
//!
//! Atomic counters for message outcomes and connection events, readable as a
//! serializable snapshot.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics collector instance
pub static METRICS: Lazy<RelayMetrics> = Lazy::new(RelayMetrics::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static RelayMetrics {
    &METRICS
}

#[derive(Debug, Default)]
pub struct RelayMetrics {
    outbound_received: AtomicU64,
    mqtt_published: AtomicU64,
    mqtt_publish_failures: AtomicU64,
    dropped_offline: AtomicU64,
    http_sent: AtomicU64,
    http_failures: AtomicU64,
    inbound_forwarded: AtomicU64,
    connects: AtomicU64,
    disconnects: AtomicU64,
    storage_writes: AtomicU64,
    storage_failures: AtomicU64,
    input_rejected: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub outbound_received: u64,
    pub mqtt_published: u64,
    pub mqtt_publish_failures: u64,
    pub dropped_offline: u64,
    pub http_sent: u64,
    pub http_failures: u64,
    pub inbound_forwarded: u64,
    pub connects: u64,
    pub disconnects: u64,
    pub storage_writes: u64,
    pub storage_failures: u64,
    pub input_rejected: u64,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_outbound(&self) {
        self.outbound_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_mqtt_publish(&self, success: bool) {
        if success {
            self.mqtt_published.fetch_add(1, Ordering::Relaxed);
        } else {
            self.mqtt_publish_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_dropped_offline(&self) {
        self.dropped_offline.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_http(&self, success: bool) {
        if success {
            self.http_sent.fetch_add(1, Ordering::Relaxed);
        } else {
            self.http_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_inbound(&self) {
        self.inbound_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection(&self, connected: bool) {
        if connected {
            self.connects.fetch_add(1, Ordering::Relaxed);
        } else {
            self.disconnects.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_storage_write(&self, success: bool) {
        if success {
            self.storage_writes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.storage_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_rejected_input(&self) {
        self.input_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            outbound_received: self.outbound_received.load(Ordering::Relaxed),
            mqtt_published: self.mqtt_published.load(Ordering::Relaxed),
            mqtt_publish_failures: self.mqtt_publish_failures.load(Ordering::Relaxed),
            dropped_offline: self.dropped_offline.load(Ordering::Relaxed),
            http_sent: self.http_sent.load(Ordering::Relaxed),
            http_failures: self.http_failures.load(Ordering::Relaxed),
            inbound_forwarded: self.inbound_forwarded.load(Ordering::Relaxed),
            connects: self.connects.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            storage_writes: self.storage_writes.load(Ordering::Relaxed),
            storage_failures: self.storage_failures.load(Ordering::Relaxed),
            input_rejected: self.input_rejected.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_split_by_outcome() {
        let metrics = RelayMetrics::new();
        metrics.record_outbound();
        metrics.record_outbound();
        metrics.record_mqtt_publish(true);
        metrics.record_mqtt_publish(false);
        metrics.record_dropped_offline();
        metrics.record_http(false);
        metrics.record_connection(true);
        metrics.record_connection(false);
        metrics.record_connection(false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.outbound_received, 2);
        assert_eq!(snapshot.mqtt_published, 1);
        assert_eq!(snapshot.mqtt_publish_failures, 1);
        assert_eq!(snapshot.dropped_offline, 1);
        assert_eq!(snapshot.http_sent, 0);
        assert_eq!(snapshot.http_failures, 1);
        assert_eq!(snapshot.connects, 1);
        assert_eq!(snapshot.disconnects, 2);
    }

    #[test]
    fn test_fresh_snapshot_is_zeroed() {
        assert_eq!(RelayMetrics::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = RelayMetrics::new();
        metrics.record_storage_write(true);
        let value = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(value["storage_writes"], 1);
    }
}
