//! Collection worker pool
//!
//! [`Scheduler`] polls the event source and dispatches one [`Job`] per
//! announced file onto a bounded pool. [`JobRunner`] drives a job through
//! collect and publish and is the only place job errors are interpreted.

mod failures;
mod runner;
mod scheduler;

pub use failures::{FailureLedger, Verdict};
pub use runner::{INVOCATION_ID_HEADER, Job, JobError, JobRunner, REQUEST_ID_HEADER};
pub use scheduler::{HEARTBEAT, Scheduler, SchedulerConfig, StatusReport, StopOutcome};
