use super::models::Config;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("worker_count must be positive")]
    NoWorkers,

    #[error("worker_count ({workers}) must be lower than http.pool_size ({pool_size})")]
    PoolTooSmall { workers: usize, pool_size: usize },

    #[error("{field} must be positive")]
    NotPositive { field: &'static str },

    #[error("Invalid publish url '{url}': {reason}")]
    InvalidPublishUrl { url: String, reason: String },

    #[error("Invalid event source url '{url}': {reason}")]
    InvalidEventSourceUrl { url: String, reason: String },

    #[error("Certificate paths must be configured together, missing {missing}")]
    IncompleteCertificates { missing: &'static str },

    #[error("certificates.trusted_ca_password_path is not supported, use an unencrypted PEM or DER trust store")]
    TrustStorePassword,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_collector(config)?;
    validate_urls(config)?;
    validate_certificates(config)?;
    Ok(())
}

/// Workers must never be able to exhaust the HTTP pool
fn validate_collector(config: &Config) -> Result<(), ValidationError> {
    let collector = &config.collector;
    if collector.worker_count == 0 {
        return Err(ValidationError::NoWorkers);
    }
    if collector.worker_count >= config.http.pool_size {
        return Err(ValidationError::PoolTooSmall {
            workers: collector.worker_count,
            pool_size: config.http.pool_size,
        });
    }
    if collector.poll_interval_ms == 0 {
        return Err(ValidationError::NotPositive {
            field: "collector.poll_interval_ms",
        });
    }
    if collector.published_cache_capacity == 0 {
        return Err(ValidationError::NotPositive {
            field: "collector.published_cache_capacity",
        });
    }
    if collector.max_collect_attempts == 0 {
        return Err(ValidationError::NotPositive {
            field: "collector.max_collect_attempts",
        });
    }
    Ok(())
}

fn validate_urls(config: &Config) -> Result<(), ValidationError> {
    let publish = &config.publish.url;
    match Url::parse(publish) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => {
            return Err(ValidationError::InvalidPublishUrl {
                url: publish.clone(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        Err(e) => {
            return Err(ValidationError::InvalidPublishUrl {
                url: publish.clone(),
                reason: e.to_string(),
            });
        }
    }

    Url::parse(&config.event_source.url).map_err(|e| ValidationError::InvalidEventSourceUrl {
        url: config.event_source.url.clone(),
        reason: e.to_string(),
    })?;
    Ok(())
}

fn validate_certificates(config: &Config) -> Result<(), ValidationError> {
    let certs = &config.certificates;
    if certs.trusted_ca_password_path.is_some() {
        return Err(ValidationError::TrustStorePassword);
    }
    if certs.is_empty() {
        return Ok(());
    }
    let missing = if certs.key_cert_path.is_none() {
        Some("key_cert_path")
    } else if certs.key_cert_password_path.is_none() {
        Some("key_cert_password_path")
    } else if certs.trusted_ca_path.is_none() {
        Some("trusted_ca_path")
    } else {
        None
    };
    match missing {
        Some(missing) => Err(ValidationError::IncompleteCertificates { missing }),
        None => Ok(()),
    }
}
