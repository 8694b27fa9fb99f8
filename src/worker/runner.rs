//! One file through collect and publish

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::collect::{Classify, ClientFactory, CollectError, ConfigurationError, FailureKind};
use crate::model::{FileData, FilePublishInformation, ParseError, Scheme};
use crate::observability::Counters;
use crate::publish::{PublishError, PublishOutcome, Publisher};

pub const INVOCATION_ID_HEADER: &str = "X-InvocationID";
pub const REQUEST_ID_HEADER: &str = "X-ONAP-RequestID";

/// A file scheduled for collection
#[derive(Debug, Clone)]
pub struct Job {
    pub file: FileData,
    /// 1 for the first try of this file
    pub attempt: u32,
    pub invocation_id: Uuid,
}

impl Job {
    pub fn new(file: FileData, attempt: u32) -> Self {
        Self {
            file,
            attempt,
            invocation_id: Uuid::new_v4(),
        }
    }

    /// Trace context forwarded to the file-router
    pub fn context(&self) -> BTreeMap<String, String> {
        let id = self.invocation_id.to_string();
        BTreeMap::from([
            (INVOCATION_ID_HEADER.to_string(), id.clone()),
            (REQUEST_ID_HEADER.to_string(), id),
        ])
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Collect(#[from] CollectError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("local storage: {0}")]
    Io(#[from] std::io::Error),
}

impl JobError {
    /// Whether the job failed before the file reached local storage
    pub fn during_collect(&self) -> bool {
        !matches!(self, JobError::Publish(_))
    }
}

impl Classify for JobError {
    fn kind(&self) -> FailureKind {
        match self {
            JobError::Parse(e) => e.kind(),
            JobError::Configuration(e) => e.kind(),
            JobError::Collect(e) => e.kind(),
            JobError::Publish(e) => e.kind(),
            JobError::Io(_) => FailureKind::Retryable,
        }
    }
}

pub type Result<T> = std::result::Result<T, JobError>;

pub struct JobRunner {
    factory: Arc<ClientFactory>,
    publisher: Arc<Publisher>,
    counters: Arc<Counters>,
    collected_files_path: PathBuf,
    publish_timeout: Option<Duration>,
}

impl JobRunner {
    pub fn new(
        factory: Arc<ClientFactory>,
        publisher: Arc<Publisher>,
        counters: Arc<Counters>,
        collected_files_path: PathBuf,
    ) -> Self {
        Self {
            factory,
            publisher,
            counters,
            collected_files_path,
            publish_timeout: None,
        }
    }

    /// Override the publisher's default timeout
    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = Some(timeout);
        self
    }

    pub fn factory(&self) -> &Arc<ClientFactory> {
        &self.factory
    }

    pub fn publisher(&self) -> &Arc<Publisher> {
        &self.publisher
    }

    pub fn counters(&self) -> &Arc<Counters> {
        &self.counters
    }

    /// Collect the file, then publish it
    ///
    /// The local copy is removed once the publish attempt is over,
    /// whatever its result.
    pub async fn run(&self, job: Job) -> Result<PublishOutcome> {
        let span = info_span!(
            "job",
            file = %job.file.name,
            source = %job.file.message_meta_data.source_name,
            scheme = %job.file.scheme,
            attempt = job.attempt,
            invocation_id = %job.invocation_id,
        );
        async move {
            debug!("Job started");
            let local_path = self.collect(&job).await?;
            self.counters.inc_no_of_collected_files();
            info!(local = %local_path.display(), "File collected");

            let info = FilePublishInformation::from_file_data(&job.file, local_path.clone(), job.context());
            let result = self
                .publisher
                .publish_with_timeout(&info, self.publish_timeout)
                .await;
            remove_local(&local_path).await;
            Ok::<_, JobError>(result?)
        }
        .instrument(span)
        .await
    }

    async fn collect(&self, job: &Job) -> Result<PathBuf> {
        let scheme = job.file.scheme;
        let server = job.file.server_data()?;
        let remote_path = job.file.remote_path()?;
        let local_path = job.file.local_path(&self.collected_files_path)?;
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        self.count_attempt(scheme);
        let factory = Arc::clone(&self.factory);
        let target = local_path.clone();
        // the client lives and dies on one blocking thread
        let result = tokio::task::spawn_blocking(move || -> Result<()> {
            let mut client = factory.create(scheme, server)?;
            let collected = client
                .open()
                .and_then(|()| client.collect_file(&remote_path, &target));
            client.close();
            Ok(collected?)
        })
        .await
        .unwrap_or_else(|e| {
            Err(JobError::Collect(CollectError::Retryable(format!(
                "collect task ended abnormally: {}",
                e
            ))))
        });

        if let Err(e) = result {
            self.count_failed_attempt(scheme);
            remove_local(&local_path).await;
            warn!(error = %e, retryable = e.is_retryable(), "Collection failed");
            return Err(e);
        }
        Ok(local_path)
    }

    fn count_attempt(&self, scheme: Scheme) {
        if scheme.is_file_transfer() {
            self.counters.inc_ftp_attempts();
        } else {
            self.counters.inc_http_attempts();
        }
    }

    fn count_failed_attempt(&self, scheme: Scheme) {
        if scheme.is_file_transfer() {
            self.counters.inc_failed_ftp_attempts();
        } else {
            self.counters.inc_failed_http_attempts();
        }
    }
}

async fn remove_local(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(local = %path.display(), error = %e, "Failed to remove local file"),
    }
}
