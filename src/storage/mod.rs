//! Object storage write node
//!
//! - [`gcs`] - `reqwest` uploads to a Cloud Storage compatible JSON API
//! - [`node`] - the flow node resolving target, content type and payload per message

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use thiserror::Error;

pub mod gcs;
pub mod node;

pub use gcs::GcsBackend;
pub use node::{ObjectTarget, StorageWriteNode};

/// Errors from a storage backend
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Upload rejected with {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Writes whole objects to a bucket
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn write(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), StorageError>;
}

/// A parsed `gs://bucket/key` location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectUrl {
    pub bucket: String,
    pub key: String,
}

impl ObjectUrl {
    const SCHEME: &'static str = "gs://";

    /// Parse `gs://bucket/key`. Bucket and key must both be non-empty; the key
    /// keeps any further slashes.
    pub fn parse(url: &str) -> Option<Self> {
        let rest = url.strip_prefix(Self::SCHEME)?;
        let (bucket, key) = rest.split_once('/')?;
        if bucket.is_empty() || key.is_empty() {
            return None;
        }
        Some(Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }
}

impl fmt::Display for ObjectUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}", Self::SCHEME, self.bucket, self.key)
    }
}
