//! The pull request host seen by the run orchestrator.
//!
//! [`crate::devops::DevOpsClient`] talks to Azure DevOps; tests use an
//! in-memory host.

use crate::reconcile::{Anchor, ReviewThread, ThreadStatus};
use crate::scope::ChangeEntry;
use crate::status::CheckState;
use anyhow::Result;

/// Operations the task needs from the service hosting the pull request.
///
/// Calls are awaited one at a time; implementations need not be `Send`.
#[allow(async_fn_in_trait)]
pub trait PullRequestHost {
    /// Files changed by the pull request, with paths as the host reports them.
    async fn pull_request_changes(&self) -> Result<Vec<ChangeEntry>>;

    /// Every review thread on the pull request.
    async fn threads(&self) -> Result<Vec<ReviewThread>>;

    /// Create a thread with one comment; returns the new thread id.
    async fn create_thread(&self, comment: &str, anchor: &Anchor) -> Result<u64>;

    async fn update_thread(&self, thread_id: u64, status: ThreadStatus) -> Result<()>;

    /// Publish the status check for the latest iteration.
    async fn update_status(&self, state: CheckState, description: &str) -> Result<()>;
}
