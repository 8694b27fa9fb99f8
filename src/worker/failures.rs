use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::collect::FailureKind;
use crate::model::FileIdentity;

/// What the scheduler does with a file after a failed job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Eligible for another attempt on a later poll cycle
    RetryLater { attempts: u32 },
    /// Permanent failure; never dispatched again in this run
    Terminal,
    /// Retryable failures reached the attempt limit
    Exhausted { attempts: u32 },
}

impl Verdict {
    pub fn is_final(self) -> bool {
        !matches!(self, Verdict::RetryLater { .. })
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Entry {
    attempts: u32,
    terminal: bool,
}

/// Per-file failure history for the lifetime of the process
#[derive(Debug)]
pub struct FailureLedger {
    max_attempts: u32,
    entries: Mutex<HashMap<FileIdentity, Entry>>,
}

impl FailureLedger {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_terminal(&self, identity: &FileIdentity) -> bool {
        self.lock().get(identity).is_some_and(|e| e.terminal)
    }

    /// Failed attempts recorded so far
    pub fn attempts(&self, identity: &FileIdentity) -> u32 {
        self.lock().get(identity).map_or(0, |e| e.attempts)
    }

    pub fn record_failure(&self, identity: FileIdentity, kind: FailureKind) -> Verdict {
        let mut entries = self.lock();
        let entry = entries.entry(identity).or_default();
        entry.attempts = entry.attempts.saturating_add(1);

        match kind {
            FailureKind::NonRetryable => {
                entry.terminal = true;
                Verdict::Terminal
            }
            FailureKind::Retryable if entry.attempts >= self.max_attempts => {
                entry.terminal = true;
                Verdict::Exhausted {
                    attempts: entry.attempts,
                }
            }
            FailureKind::Retryable => Verdict::RetryLater {
                attempts: entry.attempts,
            },
        }
    }

    pub fn record_success(&self, identity: &FileIdentity) {
        self.lock().remove(identity);
    }

    pub fn terminal_count(&self) -> usize {
        self.lock().values().filter(|e| e.terminal).count()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<FileIdentity, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> FileIdentity {
        FileIdentity::new("node", "A.gz")
    }

    #[test]
    fn test_non_retryable_is_terminal_at_once() {
        let ledger = FailureLedger::new(3);
        assert_eq!(ledger.record_failure(id(), FailureKind::NonRetryable), Verdict::Terminal);
        assert!(ledger.is_terminal(&id()));
        assert_eq!(ledger.terminal_count(), 1);
    }

    #[test]
    fn test_retryable_exhausts_after_limit() {
        let ledger = FailureLedger::new(3);
        assert_eq!(
            ledger.record_failure(id(), FailureKind::Retryable),
            Verdict::RetryLater { attempts: 1 }
        );
        assert_eq!(
            ledger.record_failure(id(), FailureKind::Retryable),
            Verdict::RetryLater { attempts: 2 }
        );
        assert!(!ledger.is_terminal(&id()));

        let verdict = ledger.record_failure(id(), FailureKind::Retryable);
        assert_eq!(verdict, Verdict::Exhausted { attempts: 3 });
        assert!(verdict.is_final());
        assert!(ledger.is_terminal(&id()));
    }

    #[test]
    fn test_success_clears_history() {
        let ledger = FailureLedger::new(3);
        ledger.record_failure(id(), FailureKind::Retryable);
        assert_eq!(ledger.attempts(&id()), 1);

        ledger.record_success(&id());
        assert_eq!(ledger.attempts(&id()), 0);
        assert!(!ledger.is_terminal(&id()));
    }
}
