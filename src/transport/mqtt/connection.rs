//! Broker connection options and errors
//!
//! Pure functions that turn the `[mqtt]` and `[device]` sections into
//! `rumqttc` options.

use crate::config::{DeviceSection, MqttSection};
use crate::protocol::DeviceTopics;
use rumqttc::{MqttOptions, Transport as RumqttcTransport};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Broker transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Publishing failed: {0}")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Subscription failed: {0}")]
    SubscriptionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
}

/// Credentials resolved from the environment
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BrokerCredentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Username sent when only a password is configured; the cloud bridge ignores it
const PLACEHOLDER_USERNAME: &str = "unused";

/// Broker host, port and whether TLS is required
pub fn parse_broker_url(broker_url: &str) -> Result<(String, u16, bool), MqttError> {
    let url =
        Url::parse(broker_url).map_err(|_| MqttError::InvalidBrokerUrl(broker_url.to_string()))?;

    let tls = match url.scheme() {
        "mqtts" | "ssl" => true,
        "mqtt" | "tcp" => false,
        _ => return Err(MqttError::InvalidBrokerUrl(broker_url.to_string())),
    };

    let host = url
        .host_str()
        .ok_or_else(|| MqttError::InvalidBrokerUrl(broker_url.to_string()))?;
    let port = url.port().unwrap_or(if tls { 8883 } else { 1883 });

    Ok((host.to_string(), port, tls))
}

/// Build client options for one device session
pub fn configure_mqtt_options(
    device: &DeviceSection,
    config: &MqttSection,
    credentials: &BrokerCredentials,
) -> Result<MqttOptions, MqttError> {
    let (host, port, tls) = parse_broker_url(&config.broker_url)?;

    let mut mqtt_options = MqttOptions::new(DeviceTopics::client_id(device), host, port);

    if tls {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    match (&credentials.username, &credentials.password) {
        (Some(username), password) => {
            mqtt_options.set_credentials(username, password.clone().unwrap_or_default());
        }
        (None, Some(password)) => {
            mqtt_options.set_credentials(PLACEHOLDER_USERNAME, password);
        }
        (None, None) => {}
    }

    mqtt_options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
    mqtt_options.set_clean_session(true);

    Ok(mqtt_options)
}
