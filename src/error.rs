//! Closed error taxonomy for the collection and edge-detection pipeline.
//!
//! Call sites mostly propagate `anyhow::Result<T>` the way the rest of the
//! crate does, but the handful of places that need to branch on *kind*
//! (the reliability layer, adapters deciding whether a failure is source-wide)
//! match on this enum instead of string-sniffing an `anyhow::Error`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    #[error("client error (HTTP {status}): {message}")]
    ClientError { status: u16, message: String },

    #[error("circuit breaker open, resets at {reset_at}")]
    BreakerOpen { reset_at: chrono::DateTime<chrono::Utc> },

    #[error("schema drift / parse error in {source}: {message}")]
    ParseError { source: String, message: String },

    #[error("validation failed: {0}")]
    ValidationError(String),

    #[error("data unavailable: {0}")]
    DataUnavailable(String),
}

impl PipelineError {
    /// True for the error kinds that mean "this call never reached the
    /// network" — the adapter should not count these against a source's
    /// verification flag the same way it would a genuine parse failure.
    pub fn is_fast_fail(&self) -> bool {
        matches!(self, PipelineError::BreakerOpen { .. })
    }

    /// True for failures that should mark a *critical* source as failed
    /// outright (as opposed to skipping one record out of many).
    pub fn is_source_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::ClientError { status: 401, .. }
                | PipelineError::ClientError { status: 403, .. }
                | PipelineError::BreakerOpen { .. }
        )
    }
}

/// Outcome classification the orchestrator and CLI use to pick an exit code.
/// Distinguishes "ran, partial" from "did not complete" from "nothing to do".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Ok,
    Degraded,
    Failed,
    NoOp,
}

impl RunOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            RunOutcome::Ok | RunOutcome::Degraded => 0,
            RunOutcome::Failed => 1,
            RunOutcome::NoOp => 2,
        }
    }
}
