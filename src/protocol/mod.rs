//! Message types and device topic conventions shared by both nodes

pub mod messages;
pub mod topics;

pub use messages::*;
pub use topics::*;
