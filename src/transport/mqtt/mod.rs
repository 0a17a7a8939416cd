//! MQTT transport for device sessions
//!
//! - [`connection`] - pure option building and errors
//! - [`message_handler`] - pure routing of `rumqttc` events
//! - [`client`] - the session task and handle
//!
//! # Usage
//!
//! ```rust,no_run
//! use flow_relay::config::{DeviceSection, MqttSection, TransportKind};
//! use flow_relay::transport::mqtt::{BrokerCredentials, RumqttConnector};
//! use flow_relay::transport::{BrokerConnector, BrokerListener};
//!
//! # tokio_test::block_on(async {
//! let device = DeviceSection {
//!     transport: TransportKind::Mqtt,
//!     project_id: "my-project".to_string(),
//!     region: "us-central1".to_string(),
//!     registry_id: "my-registry".to_string(),
//!     device_id: "d1".to_string(),
//! };
//! let mqtt = MqttSection {
//!     broker_url: "mqtt://localhost:1883".to_string(),
//!     username_env: None,
//!     password_env: None,
//!     keep_alive_secs: 60,
//! };
//!
//! let (tx, mut events) = tokio::sync::mpsc::unbounded_channel();
//! let connector = RumqttConnector::new(mqtt, BrokerCredentials::default());
//! let client = connector
//!     .connect(&device, BrokerListener::new("d1", 1, tx))
//!     .await?;
//! client.subscribe("/devices/d1/config").await?;
//! let first_event = events.recv().await;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod message_handler;

pub use client::{RumqttConnector, RumqttDeviceClient};
pub use connection::{configure_mqtt_options, parse_broker_url, BrokerCredentials, MqttError};
pub use message_handler::{EventRoute, MessageHandler};
