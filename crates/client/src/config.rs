//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `VENDORA_API_URL` - Base URL of the marketplace backend
//!
//! ## Optional
//! - `VENDORA_DELIVERY_FEE` - Flat delivery fee applied to non-empty orders
//!   (default: 15)
//! - `VENDORA_TIMEOUT_SECS` - Per-request timeout in seconds (default: 30)
//! - `VENDORA_AUTH_FILE` - Path of the persisted credential record; omit for
//!   in-memory-only sessions

use std::path::PathBuf;
use std::time::Duration;

use rust_decimal::Decimal;
use thiserror::Error;
use url::Url;
use vendora_core::Money;

const DEFAULT_DELIVERY_FEE: i64 = 15;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Marketplace client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the marketplace backend.
    pub base_url: Url,
    /// Flat delivery fee charged on any non-empty order.
    pub delivery_fee: Money,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Where to persist the credential record between runs. `None` keeps the
    /// session in memory only.
    pub auth_file: Option<PathBuf>,
}

impl ClientConfig {
    /// Create a configuration with defaults for everything but the URL.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            delivery_fee: Money::from_major(DEFAULT_DELIVERY_FEE),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            auth_file: None,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `VENDORA_API_URL` is missing or any variable fails
    /// to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw_url = require_env("VENDORA_API_URL")?;
        let base_url = Url::parse(&raw_url)
            .map_err(|e| ConfigError::InvalidEnvVar("VENDORA_API_URL".to_string(), e.to_string()))?;

        let mut config = Self::new(base_url);

        if let Some(raw) = optional_env("VENDORA_DELIVERY_FEE") {
            let fee = raw.parse::<Decimal>().map_err(|e| {
                ConfigError::InvalidEnvVar("VENDORA_DELIVERY_FEE".to_string(), e.to_string())
            })?;
            config.delivery_fee = Money::new(fee);
        }

        if let Some(raw) = optional_env("VENDORA_TIMEOUT_SECS") {
            let secs = raw.parse::<u64>().map_err(|e| {
                ConfigError::InvalidEnvVar("VENDORA_TIMEOUT_SECS".to_string(), e.to_string())
            })?;
            config.request_timeout = Duration::from_secs(secs);
        }

        if let Some(raw) = optional_env("VENDORA_AUTH_FILE") {
            config.auth_file = Some(PathBuf::from(raw));
        }

        Ok(config)
    }
}

fn require_env(name: &str) -> Result<String, ConfigError> {
    optional_env(name).ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::new(Url::parse("http://127.0.0.1:4000").unwrap());
        assert_eq!(config.delivery_fee, Money::from_major(15));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.auth_file.is_none());
    }
}
