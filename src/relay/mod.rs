//! Device relay between the flow engine and a device transport
//!
//! - [`pool`] - per-device broker sessions
//! - [`hub`] - outbound routing, connection lifecycle and inbound forwarding
//! - [`node`] - the flow node wrapping a relay and its event loop

pub mod hub;
pub mod node;
pub mod pool;

pub use hub::DeviceRelay;
pub use node::RelayNode;
pub use pool::{ConnectionPool, DeviceConnection};
