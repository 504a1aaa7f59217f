//! Pass/fail decision and the pull request status check
//!
//! The check shown on the pull request and the task's exit code are separate
//! controls: a run can show a red check without failing the pipeline, or fail
//! the pipeline without publishing a check.

use serde::{Deserialize, Serialize};

/// State of the pull request status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CheckState {
    Pending,
    Succeeded,
    Failed,
    Error,
}

/// Outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub check_state: CheckState,
    pub should_fail_task: bool,
    /// Whether the check state should be published on the pull request.
    pub publish_status: bool,
}

/// Fold the number of active findings and the task settings into a decision.
pub fn decide(active_count: usize, fail_on_findings: bool, status_check_enabled: bool) -> Decision {
    let issues_exist = active_count > 0;
    Decision {
        check_state: if issues_exist {
            CheckState::Failed
        } else {
            CheckState::Succeeded
        },
        should_fail_task: issues_exist && fail_on_findings,
        publish_status: status_check_enabled,
    }
}

/// Human-readable description shown next to the status check.
pub fn status_description(state: CheckState) -> &'static str {
    match state {
        CheckState::Pending => "Format check is running",
        CheckState::Failed => "Formatting errors found",
        CheckState::Error => "Formatting task failed with an error.",
        CheckState::Succeeded => "No formatting errors found",
    }
}

/// Azure Pipelines logging command that sets the task result.
pub fn task_complete_command(decision: &Decision) -> String {
    let result = if decision.should_fail_task {
        "Failed"
    } else {
        "Succeeded"
    };
    let message = match decision.check_state {
        CheckState::Failed => "Code format is incorrect.",
        _ => "Code format is correct.",
    };
    format!("##vso[task.complete result={};]{}", result, message)
}
