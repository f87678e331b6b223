use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("port cannot be 0")]
    InvalidPort,
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Settings for outbound upstream calls
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct UpstreamSettings {
    /// Per-call timeout covering the whole request/response exchange
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_http_timeout_secs() -> u64 {
    5
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

/// Aggregator configuration
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// Main listener for client requests
    pub listener: Listener,
    /// Admin listener for health/readiness endpoints
    pub admin_listener: Listener,
    #[serde(default)]
    pub upstream: UpstreamSettings,
    /// Raw per-tenant configuration, kept untyped so that one malformed
    /// tenant can be skipped at initialization without rejecting the file
    #[serde(default)]
    pub tenants: HashMap<String, JsonValue>,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;
        Ok(())
    }
}

/// The typed shape each tenant value must parse into
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct TenantConfig {
    /// Raw upstream base URLs; normalized and de-duplicated at
    /// initialization
    pub addons: Vec<String>,
}
