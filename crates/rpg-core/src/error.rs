//! Shared error taxonomy for graph operations and the encoding pipeline.
//!
//! Recoverable extraction/grounding failures are reported as warnings, not
//! errors — only conditions a caller must act on live here.

use thiserror::Error;

/// Errors surfaced across crate boundaries.
#[derive(Debug, Error)]
pub enum RpgError {
    /// Schema violation, bad commit range, absent root path.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A node lookup failed.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// An optimistic-concurrency check failed; the graph is unchanged.
    #[error("stale revision: submitted {submitted}, current {current}")]
    StaleRevision { submitted: String, current: String },

    /// The operator explicitly requested an LLM but none is configured.
    #[error("an LLM was explicitly requested but no client is configured")]
    LlmRequired,

    /// A graph invariant was violated (e.g., re-insert after delete failed).
    #[error("graph invariant violated: {0}")]
    InvariantViolation(String),
}
