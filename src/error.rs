//! Typed errors for the reconciliation core.
//!
//! Collaborators (REST client, formatter runner, CLI) use `anyhow`; the core
//! reports its contract violations through [`CheckError`] so callers can tell
//! them apart.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckError {
    /// A change entry or finding has no usable file path. Logged, never fatal.
    #[error("missing file path for {context}")]
    MissingPath { context: String },

    /// An update was about to target a thread that has no server id.
    #[error("existing thread id is not set (thread content: {signature})")]
    UnanchoredUpdate { signature: String },

    #[error("malformed format report: {0}")]
    MalformedReport(#[from] serde_json::Error),

    #[error("pull request {pull_request_id} has no iteration to attach a status to")]
    MissingIteration { pull_request_id: u64 },
}
