//! Device topic construction and canonicalization
//!
//! Broker topics follow `/devices/{device_id}/{suffix}` where the suffix is one
//! of `config`, `commands`, `events` or `state`.

use crate::config::DeviceSection;

/// Suffix used when an outbound message carries no topic
pub const DEFAULT_EVENTS_SUFFIX: &str = "events";

pub fn canonicalize_topic(topic: &str) -> String {
    if topic.is_empty() {
        return "/".to_string();
    }

    // Single leading slash
    let mut result = if topic.starts_with('/') {
        topic.to_string()
    } else {
        format!("/{topic}")
    };

    while result.contains("//") {
        result = result.replace("//", "/");
    }

    // No trailing slash except for root
    if result.len() > 1 && result.ends_with('/') {
        result.pop();
    }

    result
}

/// Topic construction for a single device
pub struct DeviceTopics;

impl DeviceTopics {
    /// `/devices/{device_id}/config`
    pub fn config(device_id: &str) -> String {
        canonicalize_topic(&format!("/devices/{device_id}/config"))
    }

    /// `/devices/{device_id}/commands/#`
    pub fn commands(device_id: &str) -> String {
        canonicalize_topic(&format!("/devices/{device_id}/commands/#"))
    }

    /// `/devices/{device_id}/events`
    pub fn events(device_id: &str) -> String {
        canonicalize_topic(&format!("/devices/{device_id}/{DEFAULT_EVENTS_SUFFIX}"))
    }

    /// Topics subscribed when a device connection is established
    pub fn subscriptions(device_id: &str) -> Vec<String> {
        vec![Self::config(device_id), Self::commands(device_id)]
    }

    /// Resolve an outbound message topic against the device prefix.
    ///
    /// No topic publishes to the events topic, an absolute topic is used as given,
    /// and anything else is treated as a suffix under `/devices/{device_id}/`.
    pub fn resolve_outbound(device_id: &str, topic: Option<&str>) -> String {
        match topic.map(str::trim) {
            None | Some("") => Self::events(device_id),
            Some(t) if t.starts_with('/') => canonicalize_topic(t),
            Some(t) => canonicalize_topic(&format!("/devices/{device_id}/{t}")),
        }
    }

    /// Broker client id for the cloud MQTT bridge
    pub fn client_id(device: &DeviceSection) -> String {
        format!(
            "projects/{}/locations/{}/registries/{}/devices/{}",
            device.project_id, device.region, device.registry_id, device.device_id
        )
    }
}
