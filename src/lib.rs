//! Flow Relay
//!
//! Flow-engine nodes bridging message flows to cloud device infrastructure.
//!
//! # Overview
//!
//! - [`relay`] - the message-hub node: routes outbound telemetry over a
//!   per-device MQTT session or a one-shot HTTP call, tracks connectivity, and
//!   forwards inbound config and command messages downstream
//! - [`storage`] - the write node: stores each message payload as one object
//! - [`transport`] - broker and HTTP seams with `rumqttc` and `reqwest` backends
//! - [`flow`] - the hooks a node uses to talk to its hosting flow engine
//!
//! # Quick Start
//!
//! ```rust
//! use flow_relay::config::{DeviceSection, TransportKind};
//! use flow_relay::protocol::{FlowMessage, RelayMessage};
//!
//! let device = DeviceSection {
//!     transport: TransportKind::Mqtt,
//!     project_id: "my-project".to_string(),
//!     region: "us-central1".to_string(),
//!     registry_id: "my-registry".to_string(),
//!     device_id: "d1".to_string(),
//! };
//!
//! let msg = FlowMessage::new("21.5").with_topic("events/temperature");
//! let outbound = RelayMessage::outbound(msg, &device.device_id, device.transport);
//! assert_eq!(outbound.device_id, "d1");
//! assert!(!outbound.send_status);
//! ```

pub mod config;
pub mod error;
pub mod flow;
pub mod observability;
pub mod protocol;
pub mod relay;
pub mod storage;
pub mod testing;
pub mod transport;

pub use config::{RelayConfig, TransportKind};
pub use error::{RelayError, RelayResult};
pub use flow::{FlowHost, FlowNode, StdoutHost};
pub use protocol::*;
pub use relay::{DeviceRelay, RelayNode};
pub use storage::{StorageBackend, StorageWriteNode};
