use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "DFC_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/dfc.toml";
const ENV_PREFIX: &str = "DFC";
const ENV_SEPARATOR: &str = "__";
const PUBLISH_PASSWORD_ENV_VAR: &str = "DFC_PUBLISH_PASSWORD";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = load_from_sources(config_path)?;
    load_secrets(&mut config);
    Ok(config)
}

/// Secrets are never read from TOML files
fn load_secrets(config: &mut Config) {
    if let Ok(password) = env::var(PUBLISH_PASSWORD_ENV_VAR) {
        config.publish.password = password;
    }
}

/// Load configuration from a specific path and environment
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // DFC__COLLECTOR__WORKER_COUNT -> collector.worker_count
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8100");
        assert_eq!(config.collector.worker_count, 100);
        assert_eq!(config.http.pool_size, 200);
        assert!(config.certificates.is_empty());
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
bind_addr = "127.0.0.1:9000"

[collector]
worker_count = 20
poll_interval_ms = 500
collected_files_path = "/var/dfc"

[publish]
url = "https://dr:8443/publish/7"
user = "dfc"
password = "ignored"

[certificates]
key_cert_path = "/certs/cert.p12"
key_cert_password_path = "/certs/p12.pass"
trusted_ca_path = "/certs/trust.pem"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(config.collector.worker_count, 20);
        assert_eq!(config.collector.collected_files_path, PathBuf::from("/var/dfc"));
        assert_eq!(config.publish.url, "https://dr:8443/publish/7");
        assert_eq!(config.publish.password, "");

        let paths = config.certificates.paths().unwrap();
        assert_eq!(paths.trusted_ca_path, PathBuf::from("/certs/trust.pem"));
        assert!(paths.trusted_ca_password_path.is_none());
    }
}
