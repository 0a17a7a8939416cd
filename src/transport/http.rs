//! One-shot HTTP delivery of device telemetry
//!
//! Each outbound message is a single `POST` of the raw payload to the device's
//! `publishEvent` endpoint. No retries; timeouts come from the client config.

use crate::config::{DeviceSection, HttpSection, RelayConfig};
use crate::transport::TelemetryPublisher;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// HTTP transport errors
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Not configured: {0}")]
    NotConfigured(String),
}

/// Upper bound on how much of an error response body is kept
const MAX_ERROR_BODY: usize = 256;

/// Publisher configuration
#[derive(Debug, Clone)]
pub struct HttpPublisherConfig {
    pub endpoint: String,
    pub project_id: String,
    pub region: String,
    pub registry_id: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl HttpPublisherConfig {
    pub fn new(device: &DeviceSection, http: &HttpSection, token: Option<String>) -> Self {
        Self {
            endpoint: http.endpoint.trim_end_matches('/').to_string(),
            project_id: device.project_id.clone(),
            region: device.region.clone(),
            registry_id: device.registry_id.clone(),
            token,
            timeout: Duration::from_millis(http.timeout_ms),
        }
    }

    /// `{endpoint}/projects/{p}/locations/{r}/registries/{reg}/devices/{d}:publishEvent`
    pub fn publish_url(&self, device_id: &str) -> String {
        format!(
            "{}/projects/{}/locations/{}/registries/{}/devices/{}:publishEvent",
            self.endpoint, self.project_id, self.region, self.registry_id, device_id
        )
    }
}

/// `reqwest`-backed telemetry publisher
pub struct HttpTelemetryPublisher {
    config: HttpPublisherConfig,
    client: Client,
}

impl HttpTelemetryPublisher {
    pub fn new(config: HttpPublisherConfig) -> Result<Self, HttpError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    /// Build from the `[device]` and `[http]` sections
    pub fn from_config(config: &RelayConfig) -> Result<Self, crate::error::RelayError> {
        let http = config.http.as_ref().ok_or_else(|| {
            HttpError::NotConfigured("HTTP transport requires an [http] section".to_string())
        })?;
        let device = config.require_device()?;
        let token = config.get_http_token()?;
        Ok(Self::new(HttpPublisherConfig::new(device, http, token))?)
    }
}

#[async_trait]
impl TelemetryPublisher for HttpTelemetryPublisher {
    async fn publish_event(&self, device_id: &str, payload: Bytes) -> Result<(), HttpError> {
        let url = self.config.publish_url(device_id);
        debug!(device_id = %device_id, url = %url, bytes = payload.len(), "Publishing event over HTTP");

        let mut request = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(payload);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        Err(HttpError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
