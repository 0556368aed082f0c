//! Finalize hooks and the finalization record.

use agora_store::{ModerationLogEntry, Submission};
use agora_types::Outcome;

/// Error returned by a finalize hook.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Module-specific side effect run once, right after a submission's
/// decision has been committed.
pub trait FinalizeHook: Send + Sync {
    fn on_finalized(&self, submission: &Submission, outcome: Outcome) -> Result<(), HookError>;
}

/// What a successful `try_finalize` did.
#[derive(Clone, Debug)]
pub struct Finalization {
    /// The submission in its terminal state.
    pub submission: Submission,
    pub outcome: Outcome,
    pub log_entry: ModerationLogEntry,
    /// Trust updates that failed after the decision was committed. They
    /// stay stored and are retried on the next resume.
    pub trust_errors: Vec<String>,
    /// Set when the module's finalize hook failed. The decision stands.
    pub settlement_error: Option<String>,
}

impl Finalization {
    /// Whether every follow-up of the decision succeeded.
    pub fn is_clean(&self) -> bool {
        self.trust_errors.is_empty() && self.settlement_error.is_none()
    }
}
