//! Node configuration loaded from TOML
//!
//! One file configures both nodes: `[device]`, `[mqtt]` and `[http]` drive the
//! message-hub relay, `[storage]` drives the object storage write node.
//! Secrets are referenced by environment variable name and resolved at runtime.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelayConfig {
    /// Message-hub node settings; absent for a storage-only deployment
    pub device: Option<DeviceSection>,
    pub mqtt: Option<MqttSection>,
    pub http: Option<HttpSection>,
    #[serde(default)]
    pub storage: StorageSection,
}

/// Outbound delivery mechanism selected per node
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TransportKind {
    #[serde(alias = "mqtt", alias = "Mqtt")]
    #[serde(rename = "MQTT")]
    Mqtt,
    #[serde(alias = "http", alias = "Http")]
    #[serde(rename = "HTTP")]
    Http,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Mqtt => write!(f, "MQTT"),
            TransportKind::Http => write!(f, "HTTP"),
        }
    }
}

/// Device identity and transport selection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSection {
    pub transport: TransportKind,
    pub project_id: String,
    pub region: String,
    pub registry_id: String,
    pub device_id: String,
}

/// MQTT bridge settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// Broker URL, `mqtt://` or `mqtts://`
    pub broker_url: String,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password (for the cloud bridge, a device JWT)
    pub password_env: Option<String>,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

fn default_keep_alive() -> u64 {
    60
}

/// HTTP bridge settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpSection {
    /// Base URL of the device HTTP bridge
    pub endpoint: String,
    /// Environment variable containing a bearer token
    pub token_env: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    10_000
}

/// Object storage write node settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageSection {
    /// Default target of the form `gs://bucket/key`, used when a message has no filename
    #[serde(default)]
    pub filename: String,
    /// Default content type, used when a message has none
    #[serde(default)]
    pub content_type: String,
    #[serde(default = "default_storage_endpoint")]
    pub endpoint: String,
    pub token_env: Option<String>,
}

fn default_storage_endpoint() -> String {
    "https://storage.googleapis.com".to_string()
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            filename: String::new(),
            content_type: String::new(),
            endpoint: default_storage_endpoint(),
            token_env: None,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid identifier: {0}")]
    InvalidDeviceId(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RelayConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: RelayConfig = toml::from_str(content)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    fn normalize(&mut self) {
        self.storage.filename = self.storage.filename.trim().to_string();
        self.storage.content_type = self.storage.content_type.trim().to_string();
    }

    /// Check identifiers and that the selected transport has its section
    pub fn validate(&self) -> Result<(), ConfigError> {
        let Some(device) = &self.device else {
            return Ok(());
        };

        validate_identifier("project_id", &device.project_id)?;
        validate_identifier("region", &device.region)?;
        validate_identifier("registry_id", &device.registry_id)?;
        validate_identifier("device_id", &device.device_id)?;

        match device.transport {
            TransportKind::Mqtt if self.mqtt.is_none() => Err(ConfigError::InvalidConfig(
                "MQTT transport requires an [mqtt] section".to_string(),
            )),
            TransportKind::Http if self.http.is_none() => Err(ConfigError::InvalidConfig(
                "HTTP transport requires an [http] section".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// The `[device]` section, required by the message-hub node
    pub fn require_device(&self) -> Result<&DeviceSection, ConfigError> {
        self.device.as_ref().ok_or_else(|| {
            ConfigError::InvalidConfig("The message hub requires a [device] section".to_string())
        })
    }

    fn get_env_var_optional(env_var_name: Option<&String>) -> Option<String> {
        env_var_name.and_then(|name| std::env::var(name).ok())
    }

    /// MQTT username from its environment variable
    pub fn get_mqtt_username(&self) -> Option<String> {
        self.mqtt
            .as_ref()
            .and_then(|m| Self::get_env_var_optional(m.username_env.as_ref()))
    }

    /// MQTT password from its environment variable
    pub fn get_mqtt_password(&self) -> Option<String> {
        self.mqtt
            .as_ref()
            .and_then(|m| Self::get_env_var_optional(m.password_env.as_ref()))
    }

    /// HTTP bearer token; an env var that is named but unset is an error
    pub fn get_http_token(&self) -> Result<Option<String>, ConfigError> {
        match self.http.as_ref().and_then(|h| h.token_env.as_ref()) {
            Some(name) => std::env::var(name)
                .map(Some)
                .map_err(|_| ConfigError::EnvVarNotFound(name.clone())),
            None => Ok(None),
        }
    }

    /// Storage bearer token; an env var that is named but unset is an error
    pub fn get_storage_token(&self) -> Result<Option<String>, ConfigError> {
        match self.storage.token_env.as_ref() {
            Some(name) => std::env::var(name)
                .map(Some)
                .map_err(|_| ConfigError::EnvVarNotFound(name.clone())),
            None => Ok(None),
        }
    }
}

/// Identifiers must be non-empty and stay within the cloud naming alphabet
fn validate_identifier(field: &str, value: &str) -> Result<(), ConfigError> {
    let valid_chars = value.chars().all(|c| {
        c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '+' | '%' | '~')
    });

    if value.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidDeviceId(format!(
            "{field} '{value}' must match pattern [a-zA-Z0-9._+%~-]+"
        )));
    }

    Ok(())
}
