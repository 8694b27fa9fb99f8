//! Configuration management for the collector
//!
//! Settings are layered:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Environment Variables
//!
//! Any key can be overridden with `DFC__<section>__<key>`:
//! - `DFC__SERVER__BIND_ADDR=0.0.0.0:8100`
//! - `DFC__COLLECTOR__WORKER_COUNT=50`
//! - `DFC__PUBLISH__URL=https://dr:8443/publish/1`
//!
//! The file-router password is read only from `DFC_PUBLISH_PASSWORD`.
//!
//! # Configuration File
//!
//! Loaded from `config/dfc.toml` unless `DFC_CONFIG` names another path.

mod models;
mod sources;
mod validation;

pub use models::{
    CertificatesConfig, CollectorConfig, Config, EventSourceConfig, FtpsConfig, HttpConfig,
    PublishSettings, ServerConfig, SftpConfig,
};
pub use validation::ValidationError;

use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::publish::PublishConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    pub fn publish_config(&self) -> Result<PublishConfig, ValidationError> {
        let url = Url::parse(&self.publish.url).map_err(|e| ValidationError::InvalidPublishUrl {
            url: self.publish.url.clone(),
            reason: e.to_string(),
        })?;
        Ok(PublishConfig {
            url,
            user: self.publish.user.clone(),
            password: self.publish.password.clone(),
            timeout: Duration::from_millis(self.publish.timeout_ms),
            max_redirects: self.publish.max_redirects,
        })
    }

    pub fn event_source_url(&self) -> Result<Url, ValidationError> {
        Url::parse(&self.event_source.url).map_err(|e| ValidationError::InvalidEventSourceUrl {
            url: self.event_source.url.clone(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[collector]\nworker_count = 10\n").unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.collector.worker_count, 10);
        assert_eq!(config.collector.scheduler().worker_count, 10);
    }

    #[test]
    fn test_validation_rejects_exhaustible_pool() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[collector]
worker_count = 50

[http]
pool_size = 50
        "#;
        fs::write(&config_path, toml_content).unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::PoolTooSmall { .. })
        ));
    }

    #[test]
    fn test_full_config_example() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
bind_addr = "0.0.0.0:8433"

[collector]
worker_count = 80
poll_interval_ms = 5000
collected_files_path = "/tmp/dfc"
published_cache_capacity = 1000
max_collect_attempts = 5

[event_source]
url = "http://mr:3904/events/unauthenticated.VES_NOTIFICATION_OUTPUT/OpenDcae-c12/C12"
request_timeout_ms = 15000

[publish]
url = "http://dr:8080/publish/1"
user = "dradmin"
timeout_ms = 30000
max_redirects = 3

[http]
pool_size = 100
connect_timeout_ms = 2000
request_timeout_ms = 20000

[ftps]
buffer_size = 65536
connect_timeout_ms = 5000

[sftp]
timeout_ms = 10000
        "#;
        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.server.bind_addr.port(), 8433);

        let scheduler = config.collector.scheduler();
        assert_eq!(scheduler.poll_interval, Duration::from_secs(5));
        assert_eq!(scheduler.max_collect_attempts, 5);

        let collect = config.collect_settings();
        assert_eq!(collect.http.pool_size, 100);
        assert_eq!(collect.ftps.buffer_size, 65536);
        assert_eq!(collect.sftp.timeout, Duration::from_secs(10));
        assert!(collect.certificates.is_none());

        let publish = config.publish_config().unwrap();
        assert_eq!(publish.url.as_str(), "http://dr:8080/publish/1");
        assert_eq!(publish.max_redirects, 3);
        assert_eq!(publish.timeout, Duration::from_secs(30));
    }
}
