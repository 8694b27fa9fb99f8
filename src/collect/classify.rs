//! Two-kind failure taxonomy shared by every stage of a job

use reqwest::StatusCode;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::model::{ParseError, Scheme};

/// Whether a failed file may be attempted again on a later cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Retryable,
    NonRetryable,
}

/// Implemented by every error a job can end with
pub trait Classify {
    fn kind(&self) -> FailureKind;

    fn is_retryable(&self) -> bool {
        self.kind() == FailureKind::Retryable
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CollectError {
    #[error("retryable collect failure: {0}")]
    Retryable(String),

    #[error("non-retryable collect failure: {0}")]
    NonRetryable(String),
}

impl Classify for CollectError {
    fn kind(&self) -> FailureKind {
        match self {
            CollectError::Retryable(_) => FailureKind::Retryable,
            CollectError::NonRetryable(_) => FailureKind::NonRetryable,
        }
    }
}

impl From<std::io::Error> for CollectError {
    fn from(value: std::io::Error) -> Self {
        CollectError::Retryable(format!("I/O error: {}", value))
    }
}

/// Missing or unusable credentials; fatal for the job, never for the process
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("HTTPS connection manager has not been set up")]
    NotInitialized,

    #[error("no client certificates configured for {0}")]
    MissingCertificates(Scheme),

    #[error("cannot read {what} from {}: {source}", path.display())]
    Unreadable {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid {what}: {reason}")]
    InvalidCredentials { what: &'static str, reason: String },

    #[error("failed to build TLS client: {0}")]
    Tls(String),

    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),
}

impl Classify for ConfigurationError {
    fn kind(&self) -> FailureKind {
        FailureKind::NonRetryable
    }
}

impl Classify for ParseError {
    fn kind(&self) -> FailureKind {
        FailureKind::NonRetryable
    }
}

/// 200 is success, 400 and above is terminal, anything else may recover
pub fn classify_status(status: StatusCode) -> Result<(), CollectError> {
    if status == StatusCode::OK {
        Ok(())
    } else if status.as_u16() >= 400 {
        Err(CollectError::NonRetryable(format!(
            "HTTP request failed with status {}",
            status.as_u16()
        )))
    } else {
        Err(CollectError::Retryable(format!(
            "unexpected HTTP status {}",
            status.as_u16()
        )))
    }
}

/// Map a transport failure for the given HTTP variant
///
/// HTTPS treats every pre-response failure (DNS, refused or unreachable host,
/// connect timeout, TLS handshake) as terminal. Plain HTTP retries them.
pub fn classify_transport(err: &reqwest::Error, scheme: Scheme) -> CollectError {
    if scheme == Scheme::Https && err.is_connect() {
        return CollectError::NonRetryable(format!("HTTPS connection failed: {}", err));
    }
    CollectError::Retryable(format!("{} transfer failed: {}", scheme, err))
}
