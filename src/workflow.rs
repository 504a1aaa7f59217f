//! Run orchestration
//!
//! Sequences one check run against a pull request host:
//! pending status -> findings -> scope -> normalize -> read threads ->
//! reconcile -> apply -> decide -> publish.
//!
//! Any failure after the pending status has been published turns the check
//! into an error state before the error is returned.

use crate::config::Parameters;
use crate::findings::{Finding, FindingNormalizer};
use crate::git_ops::AddedLines;
use crate::host::PullRequestHost;
use crate::paths::PathNormalizer;
use crate::reconcile::{reconcile, Operation, Reconciliation};
use crate::scope::{resolve_scope, ScopeIndex};
use crate::status::{decide, status_description, CheckState, Decision};
use anyhow::{Context, Result};
use tracing::{info, warn};

/// Switches that shape a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub scope_to_pull_request: bool,
    pub scope_to_changed_lines: bool,
    pub fail_on_formatting_errors: bool,
    pub status_check: bool,
    /// Plan only: no thread changes and no status updates.
    pub dry_run: bool,
}

impl RunOptions {
    pub fn from_parameters(params: &Parameters) -> Self {
        Self {
            scope_to_pull_request: params.scope_to_pull_request,
            scope_to_changed_lines: params.scope_to_changed_lines,
            fail_on_formatting_errors: params.fail_on_formatting_errors,
            status_check: params.status_check,
            dry_run: params.dry_run,
        }
    }

    fn publishes_status(&self) -> bool {
        self.status_check && !self.dry_run
    }
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub decision: Decision,
    pub reconciliation: Reconciliation,
}

/// Run the check once.
///
/// `produce` yields the raw formatter findings. `changed_lines` holds the
/// added lines per file from the local clone, when line scoping could be
/// computed.
pub async fn run_format_check<H, F>(
    host: &H,
    options: &RunOptions,
    paths: &PathNormalizer,
    changed_lines: Option<&AddedLines>,
    produce: F,
) -> Result<RunOutcome>
where
    H: PullRequestHost,
    F: FnOnce() -> Result<Vec<Finding>>,
{
    if options.publishes_status() {
        host.update_status(CheckState::Pending, status_description(CheckState::Pending))
            .await
            .context("Failed to publish pending status")?;
    }

    match execute(host, options, paths, changed_lines, produce).await {
        Ok(outcome) => Ok(outcome),
        Err(err) => {
            if options.publishes_status() {
                if let Err(status_err) = host
                    .update_status(CheckState::Error, status_description(CheckState::Error))
                    .await
                {
                    warn!(error = %format!("{:#}", status_err), "Failed to publish error status");
                }
            }
            Err(err)
        }
    }
}

async fn execute<H, F>(
    host: &H,
    options: &RunOptions,
    paths: &PathNormalizer,
    changed_lines: Option<&AddedLines>,
    produce: F,
) -> Result<RunOutcome>
where
    H: PullRequestHost,
    F: FnOnce() -> Result<Vec<Finding>>,
{
    let findings = produce()?;
    info!(count = findings.len(), "Formatter findings loaded");

    let scope = if options.scope_to_pull_request {
        Some(pull_request_scope(host, options, paths, changed_lines).await?)
    } else {
        if options.scope_to_changed_lines {
            warn!("scopeToChangedLines has no effect unless scopeToPullRequest is enabled");
        }
        None
    };

    let findings = FindingNormalizer::new(paths.clone()).normalize(findings, scope.as_ref());

    info!("Getting existing threads");
    let threads = host.threads().await.context("Failed to read pull request threads")?;
    let reconciliation = reconcile(&findings, &threads)?;
    info!(
        created = reconciliation.created(),
        reopened = reconciliation.reopened(),
        closed = reconciliation.closed(),
        active = reconciliation.active_count,
        "Reconciled threads"
    );

    if options.dry_run {
        for op in &reconciliation.operations {
            info!(operation = ?op, "Dry run: not applied");
        }
    } else {
        apply(host, &reconciliation.operations).await?;
    }

    let decision = decide(
        reconciliation.active_count,
        options.fail_on_formatting_errors,
        options.status_check,
    );
    if decision.publish_status && !options.dry_run {
        host.update_status(decision.check_state, status_description(decision.check_state))
            .await
            .context("Failed to publish final status")?;
    }

    Ok(RunOutcome {
        decision,
        reconciliation,
    })
}

async fn pull_request_scope<H: PullRequestHost>(
    host: &H,
    options: &RunOptions,
    paths: &PathNormalizer,
    changed_lines: Option<&AddedLines>,
) -> Result<ScopeIndex> {
    let mut changes = host
        .pull_request_changes()
        .await
        .context("Failed to read pull request changes")?;

    let line_map = if options.scope_to_changed_lines {
        if changed_lines.is_none() {
            warn!("Changed lines unavailable; scoping to whole files");
        }
        changed_lines
    } else {
        None
    };

    for change in &mut changes {
        let Some(raw) = change.file_path.as_deref().filter(|p| !p.is_empty()) else {
            continue;
        };
        let path = paths.normalize_logged(raw);
        // Files missing from the local diff keep an unbounded scope
        change.line_ranges = line_map.and_then(|lines| lines.get(&path).cloned());
        change.file_path = Some(path);
    }

    let scope = resolve_scope(&changes);
    info!(files = scope.len(), "Resolved pull request scope");
    Ok(scope)
}

/// Apply operations one at a time, in order.
async fn apply<H: PullRequestHost>(host: &H, operations: &[Operation]) -> Result<()> {
    for op in operations {
        match op {
            Operation::Create { comment, anchor } => {
                let id = host
                    .create_thread(comment, anchor)
                    .await
                    .with_context(|| format!("Failed to create thread on {}", anchor.file_path))?;
                info!(thread_id = id, path = %anchor.file_path, line = anchor.line, "Created thread");
            }
            Operation::Update { thread_id, status } => {
                host.update_thread(*thread_id, *status)
                    .await
                    .with_context(|| format!("Failed to update thread {}", thread_id))?;
                info!(thread_id, status = ?status, "Updated thread");
            }
        }
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
