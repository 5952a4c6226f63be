//! Application State Management
//!
//! This module provides the application state that contains all services
//! and their dependencies, following the dependency injection pattern.

use std::sync::Arc;
use log::info;

use crate::auth::Credentials;
use crate::config::AppConfig;
use crate::error::S3Result;
use crate::events::EventBus;
use crate::store::backend::Backend;
use crate::store::disk_backend::DiskBackend;
use crate::store::memory_backend::MemoryBackend;
use crate::store::{ConfigKind, Store};
use crate::{cors, website};

/// Application state containing all services and their dependencies
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub events: Arc<EventBus>,
    pub config: AppConfig,
    pub credentials: Credentials,
}

impl AppState {
    /// Create a new application state with services configured from YAML config
    pub fn new() -> Self {
        let config = AppConfig::load().expect("Failed to load configuration");
        Self::from_config(config).unwrap_or_else(|err| {
            log::error!("startup validation failed: {err}");
            std::process::exit(1);
        })
    }

    /// Create application state from configuration, validating every
    /// preconfigured bucket's CORS/website documents eagerly: a malformed
    /// preconfigured document must fail fast at startup rather than on
    /// first request.
    pub fn from_config(config: AppConfig) -> S3Result<Self> {
        info!("Initializing application state with configuration");

        let backend: Arc<dyn Backend> = match &config.directory {
            Some(dir) => {
                info!("Using disk-backed storage rooted at {dir}");
                Arc::new(DiskBackend::new(dir)?)
            }
            None => {
                info!("Using in-memory storage backend");
                Arc::new(MemoryBackend::new())
            }
        };

        let store = Arc::new(Store::new(backend)?);

        for preconfig in &config.configure_buckets {
            info!("preconfiguring bucket {}", preconfig.name);
            if !store.bucket_exists(&preconfig.name) {
                store.create_bucket(&preconfig.name)?;
            }
            if let Some(cors_xml) = &preconfig.cors {
                cors::parse(cors_xml.as_bytes())?;
                store.put_bucket_config(&preconfig.name, ConfigKind::Cors, cors_xml.as_bytes().to_vec())?;
            }
            if let Some(website_xml) = &preconfig.website {
                website::parse(website_xml.as_bytes())?;
                store.put_bucket_config(&preconfig.name, ConfigKind::Website, website_xml.as_bytes().to_vec())?;
            }
        }

        info!("Application state initialized successfully");
        Ok(Self {
            store,
            events: Arc::new(EventBus::new()),
            credentials: Credentials {
                access_key: config.credentials.access_key.clone(),
                secret_key: config.credentials.secret_key.clone(),
            },
            config,
        })
    }

    /// Create application state for testing with an in-memory backend and
    /// no preconfigured buckets.
    pub fn new_for_testing() -> Self {
        Self::from_config(AppConfig::default()).expect("default config must validate")
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new_for_testing()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BucketPreconfig;

    #[test]
    fn preconfigured_buckets_are_created_with_their_cors_config() {
        let mut config = AppConfig::default();
        config.configure_buckets.push(BucketPreconfig {
            name: "preset".to_string(),
            cors: Some(
                "<CORSConfiguration><CORSRule><AllowedOrigin>*</AllowedOrigin><AllowedMethod>GET</AllowedMethod></CORSRule></CORSConfiguration>"
                    .to_string(),
            ),
            website: None,
        });
        let state = AppState::from_config(config).unwrap();
        assert!(state.store.bucket_exists("preset"));
        assert!(state.store.get_bucket_config("preset", ConfigKind::Cors).is_ok());
    }

    #[test]
    fn a_malformed_preconfigured_document_fails_construction() {
        let mut config = AppConfig::default();
        config.configure_buckets.push(BucketPreconfig {
            name: "preset".to_string(),
            cors: Some("<CORSConfiguration><CORSRule></CORSRule></CORSConfiguration>".to_string()),
            website: None,
        });
        assert!(AppState::from_config(config).is_err());
    }
}
