//! Error types for the triage engine.

use thiserror::Error;

/// User-visible triage failures.
///
/// Only invalid input surfaces as an `Err`: an unavailable model degrades to
/// a well-typed conservative result instead (UNKNOWN specialty, routine
/// urgency, error metadata), so a caller's request path never sees a bare
/// fault for upstream trouble. Tool failures and parse ambiguity are always
/// recovered internally.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TriageError {
    /// Empty referral, blank client id, or no active configuration for the
    /// client. Never retried.
    #[error("Invalid triage input: {0}")]
    InvalidInput(String),

    /// The blocking wrapper could not construct its runtime.
    #[error("Failed to start blocking runtime: {0}")]
    Runtime(#[from] std::io::Error),
}
