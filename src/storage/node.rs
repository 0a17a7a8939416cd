//! Flow node writing each message payload to one object

use super::{GcsBackend, ObjectUrl, StorageBackend};
use crate::config::{RelayConfig, StorageSection};
use crate::error::{RelayError, RelayResult};
use crate::flow::{FlowHost, FlowNode};
use crate::observability::metrics;
use crate::protocol::FlowMessage;
use crate::storage_span;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn, Instrument};

/// Where and how one message is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectTarget {
    pub object: ObjectUrl,
    pub content_type: Option<String>,
}

pub struct StorageWriteNode {
    backend: Arc<dyn StorageBackend>,
    host: Arc<dyn FlowHost>,
    default_filename: String,
    default_content_type: String,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl StorageWriteNode {
    pub fn new(
        settings: &StorageSection,
        backend: Arc<dyn StorageBackend>,
        host: Arc<dyn FlowHost>,
    ) -> Self {
        Self {
            backend,
            host,
            default_filename: settings.filename.trim().to_string(),
            default_content_type: settings.content_type.trim().to_string(),
        }
    }

    /// Build a node writing through [`GcsBackend`]
    pub fn from_config(config: &RelayConfig, host: Arc<dyn FlowHost>) -> RelayResult<Self> {
        let backend = GcsBackend::from_config(config)?;
        Ok(Self::new(&config.storage, Arc::new(backend), host))
    }

    /// Resolve the object and content type for `msg`, message fields first
    pub fn resolve_target(&self, msg: &FlowMessage) -> RelayResult<ObjectTarget> {
        let filename = non_empty(msg.filename.as_deref())
            .or_else(|| non_empty(Some(self.default_filename.as_str())))
            .ok_or_else(|| {
                RelayError::invalid_input(
                    "No filename found in msg.filename and no file name configured",
                )
            })?;

        if msg.payload.is_empty() {
            return Err(RelayError::invalid_input("No data found in msg.payload"));
        }

        let object = ObjectUrl::parse(filename)
            .ok_or_else(|| RelayError::invalid_input(format!("Badly formed URL: {filename}")))?;

        let content_type = non_empty(msg.content_type.as_deref())
            .or_else(|| non_empty(Some(self.default_content_type.as_str())))
            .map(str::to_string);

        Ok(ObjectTarget {
            object,
            content_type,
        })
    }

    /// Write the payload of `msg` to its resolved object
    pub async fn write(&self, msg: &FlowMessage) -> RelayResult<()> {
        let target = self.resolve_target(msg)?;
        let span = storage_span!(
            bucket = %target.object.bucket,
            key = %target.object.key
        );

        async {
            self.backend
                .write(
                    &target.object.bucket,
                    &target.object.key,
                    msg.payload.clone(),
                    target.content_type.as_deref(),
                )
                .await
                .map_err(|e| RelayError::storage(format!("write error: {e}")))?;
            debug!(bytes = msg.payload.len(), "Object written");
            Ok(())
        }
        .instrument(span)
        .await
    }
}

#[async_trait]
impl FlowNode for StorageWriteNode {
    async fn on_input(&mut self, msg: FlowMessage) {
        match self.write(&msg).await {
            Ok(()) => {
                metrics().record_storage_write(true);
                self.host.send(msg);
            }
            Err(e @ RelayError::InvalidInput { .. }) => {
                metrics().record_rejected_input();
                warn!("Storage input rejected: {}", e);
                self.host.error(e.to_report(), None);
            }
            Err(e) => {
                metrics().record_storage_write(false);
                warn!("Storage write failed: {}", e);
                self.host.error(e.to_report(), Some(msg));
            }
        }
    }

    async fn on_close(&mut self) {}
}
