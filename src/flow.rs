//! Seams between the nodes and the flow engine that hosts them
//!
//! The engine calls into a node through [`FlowNode`]; the node reports back
//! through [`FlowHost`]: forwarded messages, a status badge, and errors.

use crate::protocol::{ConnectivityStatus, FlowMessage};
use async_trait::async_trait;
use std::io::Write;
use tracing::{error, info};

/// Hooks a node uses to talk back to the flow engine
pub trait FlowHost: Send + Sync {
    /// Forward a message downstream
    fn send(&self, msg: FlowMessage);

    /// Update the node's status badge
    fn status(&self, status: ConnectivityStatus);

    /// Report an error, optionally attached to the message that caused it
    fn error(&self, report: String, msg: Option<FlowMessage>);
}

/// Entry points the flow engine calls on a node
#[async_trait]
pub trait FlowNode: Send {
    async fn on_input(&mut self, msg: FlowMessage);

    async fn on_close(&mut self);
}

/// Host that prints forwarded messages as JSON lines and logs the rest
#[derive(Debug, Default)]
pub struct StdoutHost;

impl FlowHost for StdoutHost {
    fn send(&self, msg: FlowMessage) {
        let line = match serde_json::to_string(&msg) {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to encode forwarded message: {}", e);
                return;
            }
        };
        let mut out = std::io::stdout().lock();
        if let Err(e) = writeln!(out, "{line}").and_then(|_| out.flush()) {
            error!("Failed to write forwarded message: {}", e);
        }
    }

    fn status(&self, status: ConnectivityStatus) {
        let indicator = status.indicator();
        info!(status = indicator.text, fill = indicator.fill, "Node status");
    }

    fn error(&self, report: String, msg: Option<FlowMessage>) {
        match msg {
            Some(msg) => error!(topic = ?msg.topic, "{}", report),
            None => error!("{}", report),
        }
    }
}
