//! Process-wide counters surfaced by the status endpoint

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};

const NEVER: i64 = i64::MIN;

/// Lifetime counters, one atomic per field
///
/// Increments are independent; a snapshot is not a transaction across fields.
#[derive(Debug)]
pub struct Counters {
    total_received_events: AtomicU64,
    collected_files: AtomicU64,
    ftp_attempts: AtomicU64,
    failed_ftp_attempts: AtomicU64,
    failed_ftp: AtomicU64,
    http_attempts: AtomicU64,
    failed_http_attempts: AtomicU64,
    failed_http: AtomicU64,
    publish_attempts: AtomicU64,
    failed_publish: AtomicU64,
    total_published_files: AtomicU64,
    current_jobs: AtomicUsize,
    last_event_millis: AtomicI64,
    last_published_millis: AtomicI64,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            total_received_events: AtomicU64::new(0),
            collected_files: AtomicU64::new(0),
            ftp_attempts: AtomicU64::new(0),
            failed_ftp_attempts: AtomicU64::new(0),
            failed_ftp: AtomicU64::new(0),
            http_attempts: AtomicU64::new(0),
            failed_http_attempts: AtomicU64::new(0),
            failed_http: AtomicU64::new(0),
            publish_attempts: AtomicU64::new(0),
            failed_publish: AtomicU64::new(0),
            total_published_files: AtomicU64::new(0),
            current_jobs: AtomicUsize::new(0),
            last_event_millis: AtomicI64::new(NEVER),
            last_published_millis: AtomicI64::new(NEVER),
        }
    }
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_total_received_events(&self, n: u64) {
        self.total_received_events.fetch_add(n, Ordering::Relaxed);
        self.last_event_millis
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        tracing::debug!(counter = "total_received_events", n, "Counter incremented");
    }

    pub fn inc_no_of_collected_files(&self) {
        self.collected_files.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_ftp_attempts(&self) {
        self.ftp_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed_ftp_attempts(&self) {
        self.failed_ftp_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// A file given up on after FTPS/SFTP failures
    pub fn inc_failed_ftp(&self) {
        self.failed_ftp.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_http_attempts(&self) {
        self.http_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed_http_attempts(&self) {
        self.failed_http_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed_http(&self) {
        self.failed_http.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_publish_attempts(&self) {
        self.publish_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed_publish(&self) {
        self.failed_publish.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "failed_publish", "Counter incremented");
    }

    pub fn inc_total_published_files(&self) {
        self.total_published_files.fetch_add(1, Ordering::Relaxed);
        self.last_published_millis
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn job_started(&self) {
        self.current_jobs.fetch_add(1, Ordering::AcqRel);
    }

    pub fn job_finished(&self) {
        // never wraps below zero
        let _ = self
            .current_jobs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_sub(1)));
    }

    pub fn current_jobs(&self) -> usize {
        self.current_jobs.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            total_received_events: self.total_received_events.load(Ordering::Relaxed),
            collected_files: self.collected_files.load(Ordering::Relaxed),
            ftp_attempts: self.ftp_attempts.load(Ordering::Relaxed),
            failed_ftp_attempts: self.failed_ftp_attempts.load(Ordering::Relaxed),
            failed_ftp: self.failed_ftp.load(Ordering::Relaxed),
            http_attempts: self.http_attempts.load(Ordering::Relaxed),
            failed_http_attempts: self.failed_http_attempts.load(Ordering::Relaxed),
            failed_http: self.failed_http.load(Ordering::Relaxed),
            publish_attempts: self.publish_attempts.load(Ordering::Relaxed),
            failed_publish: self.failed_publish.load(Ordering::Relaxed),
            total_published_files: self.total_published_files.load(Ordering::Relaxed),
            current_jobs: self.current_jobs(),
            last_event_time: to_time(self.last_event_millis.load(Ordering::Relaxed)),
            last_published_time: to_time(self.last_published_millis.load(Ordering::Relaxed)),
        }
    }
}

fn to_time(millis: i64) -> Option<DateTime<Utc>> {
    if millis == NEVER {
        return None;
    }
    Utc.timestamp_millis_opt(millis).single()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountersSnapshot {
    pub total_received_events: u64,
    pub collected_files: u64,
    pub ftp_attempts: u64,
    pub failed_ftp_attempts: u64,
    pub failed_ftp: u64,
    pub http_attempts: u64,
    pub failed_http_attempts: u64,
    pub failed_http: u64,
    pub publish_attempts: u64,
    pub failed_publish: u64,
    pub total_published_files: u64,
    pub current_jobs: usize,
    pub last_event_time: Option<DateTime<Utc>>,
    pub last_published_time: Option<DateTime<Utc>>,
}
