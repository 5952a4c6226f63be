//! Application Configuration
//!
//! This module provides configuration management for the application,
//! supporting YAML configuration files with sensible defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use log::{info, warn};

/// One bucket to create at startup, with its preloaded configuration
/// documents (raw XML bytes, fed through the same parse-and-validate path
/// a PUT request uses).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BucketPreconfig {
    pub name: String,
    #[serde(default)]
    pub cors: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
}

/// Credentials the signature verifier checks every signed request against.
/// A single fixed pair, as this is a local test double rather than a
/// multi-tenant service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    pub access_key: String,
    pub secret_key: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            access_key: "S3RVER".to_string(),
            secret_key: "S3RVER".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Path to log configuration file
    pub config_file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            config_file: "server_log.yaml".to_string(),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Bind port. 0 means an OS-assigned ephemeral port.
    pub port: u16,
    /// Bind address.
    pub address: String,
    /// Host suffix used for virtual-hosted-style addressing.
    pub service_endpoint: String,
    /// On-disk root for persistence; `None` runs purely in memory.
    pub directory: Option<String>,
    /// Suppress request-level logging.
    pub silent: bool,
    /// Delete all persisted state on shutdown.
    pub reset_on_close: bool,
    /// Buckets (and their preloaded configs) to create at startup.
    pub configure_buckets: Vec<BucketPreconfig>,
    /// Waive `SignatureDoesNotMatch` with a warning instead of failing.
    pub allow_mismatched_signatures: bool,
    /// Allow CNAME / bucket-host addressing (Host is itself a bucket name).
    pub vhost_buckets: bool,
    pub credentials: CredentialsConfig,
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 4568,
            address: "0.0.0.0".to_string(),
            service_endpoint: "s3.amazonaws.com".to_string(),
            directory: None,
            silent: false,
            reset_on_close: false,
            configure_buckets: Vec::new(),
            allow_mismatched_signatures: false,
            vhost_buckets: false,
            credentials: CredentialsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file, use defaults if not found
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = "config.yaml";
        if Path::new(config_path).exists() {
            let content = fs::read_to_string(config_path)?;
            let config: AppConfig = serde_yaml::from_str(&content)?;
            info!("Loaded configuration from {}", config_path);
            Ok(config)
        } else {
            warn!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_preconfigured_buckets_and_default_credentials() {
        let config = AppConfig::default();
        assert!(config.configure_buckets.is_empty());
        assert_eq!(config.credentials.access_key, "S3RVER");
    }

    #[test]
    fn round_trips_through_yaml() {
        let config = AppConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: AppConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.port, config.port);
        assert_eq!(parsed.service_endpoint, config.service_endpoint);
    }
}
