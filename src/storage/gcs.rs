//! Cloud Storage JSON API uploads
//!
//! One `POST {endpoint}/upload/storage/v1/b/{bucket}/o?uploadType=media&name={key}`
//! per object, with the whole payload as the body.

use super::{StorageBackend, StorageError};
use crate::config::RelayConfig;
use crate::error::RelayResult;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use tracing::debug;
use url::Url;

/// `reqwest`-backed storage backend
pub struct GcsBackend {
    endpoint: Url,
    token: Option<String>,
    client: Client,
}

impl GcsBackend {
    pub fn new(endpoint: &str, token: Option<String>) -> Result<Self, StorageError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| StorageError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
        if endpoint.cannot_be_a_base() {
            return Err(StorageError::InvalidEndpoint(endpoint.to_string()));
        }
        Ok(Self {
            endpoint,
            token,
            client: Client::new(),
        })
    }

    /// Build from the `[storage]` section, resolving the token from the environment
    pub fn from_config(config: &RelayConfig) -> RelayResult<Self> {
        let token = config.get_storage_token()?;
        Self::new(&config.storage.endpoint, token)
            .map_err(|e| crate::error::RelayError::storage(e.to_string()))
    }

    /// Upload URL for `bucket`, with path segments percent-encoded
    pub fn upload_url(&self, bucket: &str) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["upload", "storage", "v1", "b", bucket, "o"]);
        }
        url
    }
}

#[async_trait]
impl StorageBackend for GcsBackend {
    async fn write(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), StorageError> {
        let url = self.upload_url(bucket);
        debug!(bucket = %bucket, key = %key, bytes = data.len(), "Uploading object");

        let mut request = self
            .client
            .post(url)
            .query(&[("uploadType", "media"), ("name", key)])
            .body(data);
        if let Some(content_type) = content_type {
            request = request.header(reqwest::header::CONTENT_TYPE, content_type);
        }
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(StorageError::Status {
            status: status.as_u16(),
            body: body.chars().take(256).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_url() {
        let backend = GcsBackend::new("https://storage.googleapis.com", None).unwrap();
        assert_eq!(
            backend.upload_url("my-bucket").as_str(),
            "https://storage.googleapis.com/upload/storage/v1/b/my-bucket/o"
        );
    }

    #[test]
    fn test_upload_url_keeps_endpoint_prefix() {
        let backend = GcsBackend::new("http://localhost:4443/storage/", None).unwrap();
        assert_eq!(
            backend.upload_url("b").as_str(),
            "http://localhost:4443/storage/upload/storage/v1/b/b/o"
        );
    }

    #[test]
    fn test_invalid_endpoint() {
        assert!(matches!(
            GcsBackend::new("not a url", None),
            Err(StorageError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            GcsBackend::new("mailto:someone@example.com", None),
            Err(StorageError::InvalidEndpoint(_))
        ));
    }
}
