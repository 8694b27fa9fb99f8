//! Delivery of collected files to the file-router
//!
//! [`Publisher::publish`] is idempotent per [`FileIdentity`]: a file present
//! in the [`PublishedFileCache`] is never sent again, and concurrent
//! publishes of one identity send once.

mod cache;
mod redirect;

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::collect::{Classify, FailureKind};
use crate::model::{FileIdentity, FilePublishInformation};
use crate::observability::Counters;

pub use cache::PublishedFileCache;
pub use redirect::Redirector;

/// Header carrying the JSON file metadata
pub const DR_META_HEADER: &str = "X-DMAAP-DR-META";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publish transport failure: {0}")]
    Transport(String),

    #[error("file-router rejected publish with status {0}")]
    Status(u16),

    #[error("more than {0} redirects")]
    TooManyRedirects(usize),

    #[error("cannot build publish request: {0}")]
    Request(String),

    #[error("cannot read collected file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot encode metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// Publish failures never make a file terminal on their own
impl Classify for PublishError {
    fn kind(&self) -> FailureKind {
        FailureKind::Retryable
    }
}

pub type Result<T> = std::result::Result<T, PublishError>;

/// What a successful call to [`Publisher::publish`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Sent and accepted by the file-router
    Published,
    /// Identity already in the cache, nothing sent
    AlreadyPublished,
    /// Another job is publishing the same identity, nothing sent
    InFlight,
}

#[derive(Clone)]
pub struct PublishConfig {
    /// Base URL; the file name is appended as the last path segment
    pub url: Url,
    pub user: String,
    pub password: String,
    pub timeout: Duration,
    pub max_redirects: usize,
}

impl fmt::Debug for PublishConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishConfig")
            .field("url", &self.url.as_str())
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("max_redirects", &self.max_redirects)
            .finish()
    }
}

pub struct Publisher {
    client: Client,
    config: PublishConfig,
    redirector: Redirector,
    cache: Arc<PublishedFileCache>,
    counters: Arc<Counters>,
    in_flight: Mutex<HashSet<FileIdentity>>,
}

impl Publisher {
    pub fn new(
        config: PublishConfig,
        cache: Arc<PublishedFileCache>,
        counters: Arc<Counters>,
    ) -> Result<Self> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("datafile-collector/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PublishError::Request(e.to_string()))?;

        Ok(Self {
            client,
            redirector: Redirector::new(config.max_redirects),
            config,
            cache,
            counters,
            in_flight: Mutex::new(HashSet::new()),
        })
    }

    pub fn cache(&self) -> &Arc<PublishedFileCache> {
        &self.cache
    }

    /// Publish with the configured timeout
    pub async fn publish(&self, info: &FilePublishInformation) -> Result<PublishOutcome> {
        self.publish_with_timeout(info, None).await
    }

    /// Publish once per identity; `timeout` overrides the configured one
    pub async fn publish_with_timeout(
        &self,
        info: &FilePublishInformation,
        timeout: Option<Duration>,
    ) -> Result<PublishOutcome> {
        let identity = info.identity();
        if self.cache.contains(&identity) {
            debug!(file = %identity, "Already published, skipping");
            return Ok(PublishOutcome::AlreadyPublished);
        }

        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, identity.clone()) else {
            debug!(file = %identity, "Publish already in flight, skipping");
            return Ok(PublishOutcome::InFlight);
        };
        // a concurrent publish may have finished before the guard was taken
        if self.cache.contains(&identity) {
            return Ok(PublishOutcome::AlreadyPublished);
        }

        self.counters.inc_publish_attempts();
        match self.send(info, timeout.unwrap_or(self.config.timeout)).await {
            Ok(()) => {
                self.cache.add(identity.clone());
                self.counters.inc_total_published_files();
                info!(file = %identity, "File published");
                Ok(PublishOutcome::Published)
            }
            Err(e) => {
                self.counters.inc_failed_publish();
                warn!(file = %identity, error = %e, "Publish failed");
                Err(e)
            }
        }
    }

    async fn send(&self, info: &FilePublishInformation, timeout: Duration) -> Result<()> {
        let body = tokio::fs::read(&info.internal_location).await?;
        let metadata = info.metadata_header()?;

        let mut request = self
            .client
            .put(self.target_url(&info.name)?)
            .basic_auth(&self.config.user, Some(&self.config.password))
            .header(CONTENT_TYPE, mime::APPLICATION_OCTET_STREAM.as_ref())
            .header(DR_META_HEADER, metadata)
            .timeout(timeout)
            .body(body)
            .build()
            .map_err(|e| PublishError::Request(e.to_string()))?;
        redirect::apply_context(&mut request, &info.context)?;

        let response = self
            .redirector
            .execute(&self.client, request, &info.context)
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(PublishError::Status(status.as_u16()))
        }
    }

    fn target_url(&self, file_name: &str) -> Result<Url> {
        let mut url = self.config.url.clone();
        url.path_segments_mut()
            .map_err(|_| PublishError::Request(format!("cannot append to {}", self.config.url)))?
            .pop_if_empty()
            .push(file_name);
        Ok(url)
    }
}

/// Membership in the in-flight set, released on drop
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<FileIdentity>>,
    identity: FileIdentity,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(set: &'a Mutex<HashSet<FileIdentity>>, identity: FileIdentity) -> Option<Self> {
        let inserted = set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identity.clone());
        inserted.then_some(Self { set, identity })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.identity);
    }
}
