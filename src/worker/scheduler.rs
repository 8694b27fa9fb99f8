//! Poll loop turning file-ready events into bounded concurrent jobs

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Semaphore, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::failures::{FailureLedger, Verdict};
use super::runner::{Job, JobError, JobRunner};
use crate::collect::Classify;
use crate::messaging::EventSource;
use crate::model::{FileIdentity, Scheme};
use crate::observability::{Counters, CountersSnapshot};
use crate::publish::{PublishOutcome, PublishedFileCache};

pub const HEARTBEAT: &str = "I'm living!";

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Concurrent jobs; keep below the HTTP pool size
    pub worker_count: usize,
    pub poll_interval: Duration,
    pub max_collect_attempts: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: 100,
            poll_interval: Duration::from_secs(10),
            max_collect_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopOutcome {
    pub was_running: bool,
    pub cancelled_jobs: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub running: bool,
    pub active_jobs: usize,
    pub cache_size: usize,
    pub terminal_files: usize,
    pub counters: CountersSnapshot,
}

struct Shared {
    config: SchedulerConfig,
    runner: Arc<JobRunner>,
    source: Arc<dyn EventSource>,
    counters: Arc<Counters>,
    cache: Arc<PublishedFileCache>,
    ledger: FailureLedger,
    permits: Arc<Semaphore>,
    /// Files with a job dispatched and not yet settled
    dispatched: Mutex<HashSet<FileIdentity>>,
}

struct Cycle {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<usize>,
}

/// Owner of the worker pool and the single polling cycle
///
/// At most one cycle runs at a time. Each dispatched job holds one worker
/// permit for its whole collect and publish; when none is free the poll loop
/// waits.
pub struct Scheduler {
    shared: Arc<Shared>,
    cycle: Mutex<Option<Cycle>>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, runner: Arc<JobRunner>, source: Arc<dyn EventSource>) -> Self {
        let counters = Arc::clone(runner.counters());
        let cache = Arc::clone(runner.publisher().cache());
        let shared = Shared {
            ledger: FailureLedger::new(config.max_collect_attempts),
            permits: Arc::new(Semaphore::new(config.worker_count.max(1))),
            dispatched: Mutex::new(HashSet::new()),
            config,
            runner,
            source,
            counters,
            cache,
        };
        Self {
            shared: Arc::new(shared),
            cycle: Mutex::new(None),
        }
    }

    /// Arm a polling cycle; false if one is already running
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        let mut cycle = self.lock_cycle();
        if cycle.as_ref().is_some_and(|c| !c.handle.is_finished()) {
            debug!("Polling cycle already running");
            return false;
        }

        self.refresh_connections();
        let (shutdown, rx) = watch::channel(false);
        let handle = tokio::spawn(poll_loop(Arc::clone(&self.shared), rx));
        *cycle = Some(Cycle { shutdown, handle });

        info!(
            worker_count = self.shared.config.worker_count,
            poll_interval_ms = self.shared.config.poll_interval.as_millis() as u64,
            "Datafile collection started"
        );
        true
    }

    /// Disarm polling and cancel outstanding jobs; idempotent
    ///
    /// Jobs blocked in a network call finish on their own thread, bounded by
    /// their read or connect timeout.
    pub async fn stop(&self) -> StopOutcome {
        let Some(cycle) = self.lock_cycle().take() else {
            return StopOutcome {
                was_running: false,
                cancelled_jobs: 0,
            };
        };

        let _ = cycle.shutdown.send(true);
        let cancelled_jobs = match cycle.handle.await {
            Ok(cancelled) => cancelled,
            Err(e) => {
                error!(error = %e, "Polling cycle ended abnormally");
                0
            }
        };
        info!(cancelled_jobs, "Datafile collection stopped");
        StopOutcome {
            was_running: true,
            cancelled_jobs,
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock_cycle()
            .as_ref()
            .is_some_and(|c| !c.handle.is_finished())
    }

    pub fn active_job_count(&self) -> usize {
        self.shared.counters.current_jobs()
    }

    pub fn cache_size(&self) -> usize {
        self.shared.cache.size()
    }

    pub fn snapshot_counters(&self) -> CountersSnapshot {
        self.shared.counters.snapshot()
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            running: self.is_running(),
            active_jobs: self.active_job_count(),
            cache_size: self.cache_size(),
            terminal_files: self.shared.ledger.terminal_count(),
            counters: self.snapshot_counters(),
        }
    }

    pub fn heartbeat(&self) -> &'static str {
        HEARTBEAT
    }

    /// Rebuild the HTTPS pool from the configured certificates
    fn refresh_connections(&self) {
        let factory = self.shared.runner.factory();
        let Some(paths) = factory.certificates() else {
            debug!("No certificates configured, HTTPS collection disabled");
            return;
        };
        if let Err(e) = factory.connections().setup_or_update(paths) {
            warn!(error = %e, "HTTPS connection pool setup failed");
        }
    }

    fn lock_cycle(&self) -> MutexGuard<'_, Option<Cycle>> {
        self.cycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn poll_loop(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) -> usize {
    let mut jobs: JoinSet<()> = JoinSet::new();
    let mut ticker = tokio::time::interval(shared.config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    'cycle: loop {
        tokio::select! {
            _ = shutdown.changed() => break 'cycle,
            _ = ticker.tick() => {}
        }
        reap(&mut jobs);

        let events = tokio::select! {
            _ = shutdown.changed() => break 'cycle,
            fetched = shared.source.fetch() => match fetched {
                Ok(events) => events,
                Err(e) => {
                    warn!(error = %e, "Fetching file ready events failed");
                    continue;
                }
            },
        };
        if events.is_empty() {
            continue;
        }
        shared.counters.inc_total_received_events(events.len() as u64);

        for file in events.into_iter().flat_map(|event| event.files) {
            let identity = file.identity();
            if shared.cache.contains(&identity) {
                debug!(file = %identity, "Already published, not collecting again");
                continue;
            }
            if shared.ledger.is_terminal(&identity) {
                debug!(file = %identity, "Failed permanently earlier, skipping");
                continue;
            }
            let Some(claim) = Claim::take(&shared, &identity) else {
                debug!(file = %identity, "Already being collected, skipping");
                continue;
            };

            let permit = tokio::select! {
                _ = shutdown.changed() => break 'cycle,
                permit = Arc::clone(&shared.permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break 'cycle,
                },
            };
            let attempt = shared.ledger.attempts(&identity) + 1;
            let job_shared = Arc::clone(&shared);
            let active = ActiveJob::start(Arc::clone(&shared.counters));
            jobs.spawn(async move {
                let _permit = permit;
                let _active = active;
                let _claim = claim;
                let scheme = file.scheme;
                let result = job_shared.runner.run(Job::new(file, attempt)).await;
                job_shared.settle(identity, scheme, result);
            });
        }
    }

    reap(&mut jobs);
    jobs.abort_all();
    let mut cancelled = 0;
    while let Some(joined) = jobs.join_next().await {
        if matches!(joined, Err(ref e) if e.is_cancelled()) {
            cancelled += 1;
        }
    }
    cancelled
}

fn reap(jobs: &mut JoinSet<()>) {
    while let Some(joined) = jobs.try_join_next() {
        if let Err(e) = joined {
            if e.is_panic() {
                error!(error = %e, "Job panicked");
            }
        }
    }
}

impl Shared {
    fn lock_dispatched(&self) -> MutexGuard<'_, HashSet<FileIdentity>> {
        self.dispatched.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settle(&self, identity: FileIdentity, scheme: Scheme, result: Result<PublishOutcome, JobError>) {
        let error = match result {
            Ok(outcome) => {
                self.ledger.record_success(&identity);
                debug!(file = %identity, ?outcome, "Job finished");
                return;
            }
            Err(error) => error,
        };

        match self.ledger.record_failure(identity.clone(), error.kind()) {
            Verdict::RetryLater { attempts } => {
                warn!(file = %identity, attempts, error = %error, "Job failed, will retry on a later cycle");
            }
            verdict => {
                if error.during_collect() {
                    if scheme.is_file_transfer() {
                        self.counters.inc_failed_ftp();
                    } else {
                        self.counters.inc_failed_http();
                    }
                }
                error!(file = %identity, ?verdict, error = %error, "Giving up on file");
            }
        }
    }
}

/// Keeps `current_jobs` accurate even when a job is aborted
struct ActiveJob(Arc<Counters>);

impl ActiveJob {
    fn start(counters: Arc<Counters>) -> Self {
        counters.job_started();
        Self(counters)
    }
}

impl Drop for ActiveJob {
    fn drop(&mut self) {
        self.0.job_finished();
    }
}

/// Marks a file as dispatched until the job settles or is aborted
struct Claim {
    shared: Arc<Shared>,
    identity: FileIdentity,
}

impl Claim {
    fn take(shared: &Arc<Shared>, identity: &FileIdentity) -> Option<Self> {
        if !shared.lock_dispatched().insert(identity.clone()) {
            return None;
        }
        Some(Self {
            shared: Arc::clone(shared),
            identity: identity.clone(),
        })
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.shared.lock_dispatched().remove(&self.identity);
    }
}
