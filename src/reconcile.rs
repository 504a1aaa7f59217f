//! Thread reconciliation
//!
//! Compares the current findings with the review threads already on the pull
//! request and works out which threads to create, reopen, or close. Threads
//! whose first comment does not carry [`COMMENT_PREAMBLE`] belong to people or
//! other tools and are never touched.
//!
//! Reconciliation is pure: it only plans [`Operation`]s. Applying them is the
//! caller's job.

use crate::error::CheckError;
use crate::findings::{is_managed_content, Finding, COMMENT_PREAMBLE};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Review thread status as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ThreadStatus {
    Active,
    Pending,
    Fixed,
    WontFix,
    Closed,
    ByDesign,
    #[serde(other)]
    Unknown,
}

impl ThreadStatus {
    /// Closed and every terminal resolution the host offers.
    pub fn is_closed(self) -> bool {
        matches!(
            self,
            ThreadStatus::Closed | ThreadStatus::Fixed | ThreadStatus::WontFix | ThreadStatus::ByDesign
        )
    }
}

/// Where a thread is pinned in the pull request diff.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Anchor {
    pub file_path: String,
    pub line: u32,
    pub column: u32,
}

/// A review thread already present on the pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewThread {
    pub id: Option<u64>,
    pub status: ThreadStatus,
    /// Content of the first comment.
    pub content: Option<String>,
    pub anchor: Option<Anchor>,
}

impl ReviewThread {
    pub fn signature(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }

    /// Owned by this tool.
    pub fn is_managed(&self) -> bool {
        self.content.as_deref().is_some_and(is_managed_content)
    }

    fn require_id(&self) -> Result<u64, CheckError> {
        self.id.ok_or_else(|| CheckError::UnanchoredUpdate {
            signature: self.signature().to_string(),
        })
    }
}

/// A change to apply to the pull request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Create { comment: String, anchor: Anchor },
    Update { thread_id: u64, status: ThreadStatus },
}

/// Planned operations plus the number of findings that are still present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub operations: Vec<Operation>,
    /// Counts findings, not distinct signatures.
    pub active_count: usize,
}

impl Reconciliation {
    pub fn created(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| matches!(op, Operation::Create { .. }))
            .count()
    }

    pub fn reopened(&self) -> usize {
        self.count_updates(ThreadStatus::Active)
    }

    pub fn closed(&self) -> usize {
        self.count_updates(ThreadStatus::Closed)
    }

    fn count_updates(&self, target: ThreadStatus) -> usize {
        self.operations
            .iter()
            .filter(|op| matches!(op, Operation::Update { status, .. } if *status == target))
            .count()
    }
}

/// Plan the operations that bring `existing` threads in line with `findings`.
///
/// - a finding whose signature matches a managed thread reopens that thread
///   unless it is already active;
/// - a finding with no matching thread gets a new thread;
/// - an open managed thread that no finding matched is closed. When two
///   managed threads share a signature only the first one is matched, so the
///   duplicate is closed.
///
/// Findings with the same signature collapse into one thread.
pub fn reconcile(findings: &[Finding], existing: &[ReviewThread]) -> Result<Reconciliation, CheckError> {
    let managed: Vec<&ReviewThread> = existing.iter().filter(|t| t.is_managed()).collect();
    debug!(
        total = existing.len(),
        managed = managed.len(),
        preamble = COMMENT_PREAMBLE,
        "Partitioned existing threads"
    );

    let mut first_by_signature: HashMap<&str, usize> = HashMap::with_capacity(managed.len());
    for (idx, thread) in managed.iter().enumerate() {
        first_by_signature.entry(thread.signature()).or_insert(idx);
    }

    let mut matched = vec![false; managed.len()];
    let mut handled: HashSet<String> = HashSet::with_capacity(findings.len());
    let mut operations = Vec::new();

    for finding in findings {
        let signature = finding.signature();
        if !handled.insert(signature.clone()) {
            continue;
        }

        match first_by_signature.get(signature.as_str()) {
            Some(&idx) => {
                matched[idx] = true;
                let thread = managed[idx];
                if thread.status != ThreadStatus::Active {
                    debug!(status = ?thread.status, "Reopening existing thread");
                    operations.push(Operation::Update {
                        thread_id: thread.require_id()?,
                        status: ThreadStatus::Active,
                    });
                }
            }
            None => {
                debug!(path = %finding.file_path, line = finding.line_number, "New thread");
                operations.push(Operation::Create {
                    anchor: Anchor {
                        file_path: finding.file_path.clone(),
                        line: finding.line_number,
                        column: finding.char_number,
                    },
                    comment: signature,
                });
            }
        }
    }

    for (idx, thread) in managed.iter().enumerate() {
        if matched[idx] || thread.status.is_closed() {
            continue;
        }
        debug!(
            path = thread.anchor.as_ref().map(|a| a.file_path.as_str()).unwrap_or("?"),
            "Closing resolved thread"
        );
        operations.push(Operation::Update {
            thread_id: thread.require_id()?,
            status: ThreadStatus::Closed,
        });
    }

    Ok(Reconciliation {
        operations,
        active_count: findings.len(),
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(path: &str, line: u32, id: &str, desc: &str) -> Finding {
        Finding {
            file_path: path.to_string(),
            line_number: line,
            char_number: 1,
            diagnostic_id: id.to_string(),
            description: desc.to_string(),
        }
    }

    fn thread(id: u64, status: ThreadStatus, content: &str) -> ReviewThread {
        ReviewThread {
            id: Some(id),
            status,
            content: Some(content.to_string()),
            anchor: Some(Anchor {
                file_path: "/a.ts".to_string(),
                line: 1,
                column: 1,
            }),
        }
    }

    /// Play operations onto the thread list the way the host would.
    fn apply(threads: &mut Vec<ReviewThread>, ops: &[Operation]) {
        for op in ops {
            match op {
                Operation::Create { comment, anchor } => {
                    let id = threads.iter().filter_map(|t| t.id).max().unwrap_or(0) + 1;
                    threads.push(ReviewThread {
                        id: Some(id),
                        status: ThreadStatus::Active,
                        content: Some(comment.clone()),
                        anchor: Some(anchor.clone()),
                    });
                }
                Operation::Update { thread_id, status } => {
                    let t = threads.iter_mut().find(|t| t.id == Some(*thread_id)).unwrap();
                    t.status = *status;
                }
            }
        }
    }

    // ========================================================================
    // Scenarios
    // ========================================================================

    #[test]
    fn test_new_finding_creates_thread() {
        let findings = vec![finding("a.ts", 2, "D1", "x")];
        let result = reconcile(&findings, &[]).unwrap();

        assert_eq!(result.active_count, 1);
        assert_eq!(result.operations.len(), 1);
        match &result.operations[0] {
            Operation::Create { comment, anchor } => {
                assert_eq!(comment, &findings[0].signature());
                assert_eq!(anchor.file_path, "a.ts");
                assert_eq!(anchor.line, 2);
                assert_eq!(anchor.column, 1);
            }
            other => panic!("expected create, got {:?}", other),
        }
    }

    #[test]
    fn test_closed_thread_is_reopened_not_duplicated() {
        let findings = vec![finding("a.ts", 2, "D1", "x")];
        let existing = vec![thread(42, ThreadStatus::Closed, &findings[0].signature())];

        let result = reconcile(&findings, &existing).unwrap();
        assert_eq!(
            result.operations,
            vec![Operation::Update {
                thread_id: 42,
                status: ThreadStatus::Active
            }]
        );
        assert_eq!(result.created(), 0);
    }

    #[test]
    fn test_resolved_thread_is_closed_once() {
        let sig = finding("a.ts", 9, "D9", "gone").signature();
        let mut existing = vec![thread(7, ThreadStatus::Active, &sig)];

        let first = reconcile(&[], &existing).unwrap();
        assert_eq!(
            first.operations,
            vec![Operation::Update {
                thread_id: 7,
                status: ThreadStatus::Closed
            }]
        );

        apply(&mut existing, &first.operations);
        let second = reconcile(&[], &existing).unwrap();
        assert!(second.operations.is_empty());
        assert_eq!(second.active_count, 0);
    }

    #[test]
    fn test_active_match_needs_no_update() {
        let findings = vec![finding("a.ts", 2, "D1", "x")];
        let existing = vec![thread(1, ThreadStatus::Active, &findings[0].signature())];
        let result = reconcile(&findings, &existing).unwrap();
        assert!(result.operations.is_empty());
        assert_eq!(result.active_count, 1);
    }

    #[test]
    fn test_second_run_is_a_no_op() {
        let findings = vec![
            finding("a.ts", 2, "D1", "x"),
            finding("b.ts", 3, "D2", "y"),
            finding("b.ts", 3, "D2", "y"),
        ];
        let mut threads = vec![
            thread(1, ThreadStatus::Active, "[DotNetFormatTask][Automated] OLD: stale on line 1, position 1"),
            thread(2, ThreadStatus::Active, "Please rename this"),
        ];

        let first = reconcile(&findings, &threads).unwrap();
        assert_eq!(first.created(), 2);
        assert_eq!(first.closed(), 1);
        apply(&mut threads, &first.operations);

        let second = reconcile(&findings, &threads).unwrap();
        assert!(second.operations.is_empty(), "{:?}", second.operations);
        assert_eq!(second.active_count, 3);
    }

    // ========================================================================
    // Isolation
    // ========================================================================

    #[test]
    fn test_unmanaged_threads_are_never_touched() {
        let existing = vec![
            thread(1, ThreadStatus::Active, "Human review comment"),
            thread(2, ThreadStatus::Pending, "Another tool: [DotNetFormatTask][Automated]"),
            ReviewThread {
                id: None,
                status: ThreadStatus::Active,
                content: None,
                anchor: None,
            },
        ];
        let result = reconcile(&[finding("a.ts", 1, "D", "d")], &existing).unwrap();
        assert_eq!(result.operations.len(), 1);
        assert!(matches!(result.operations[0], Operation::Create { .. }));
    }

    // ========================================================================
    // Duplicates
    // ========================================================================

    #[test]
    fn test_duplicate_findings_collapse() {
        let f = finding("a.ts", 4, "D1", "x");
        let result = reconcile(&[f.clone(), f.clone(), f], &[]).unwrap();
        assert_eq!(result.created(), 1);
        assert_eq!(result.active_count, 3);
    }

    #[test]
    fn test_same_signature_in_two_files_shares_one_thread() {
        let a = finding("a.ts", 4, "D1", "x");
        let b = finding("b.ts", 4, "D1", "x");
        let result = reconcile(&[a, b], &[]).unwrap();
        assert_eq!(result.created(), 1);
        assert_eq!(result.active_count, 2);
    }

    #[test]
    fn test_duplicate_findings_reopen_once() {
        let f = finding("a.ts", 4, "D1", "x");
        let existing = vec![thread(3, ThreadStatus::Closed, &f.signature())];
        let result = reconcile(&[f.clone(), f], &existing).unwrap();
        assert_eq!(result.operations.len(), 1);
        assert_eq!(result.reopened(), 1);
    }

    #[test]
    fn test_duplicate_threads_first_wins_rest_closed() {
        let f = finding("a.ts", 4, "D1", "x");
        let existing = vec![
            thread(10, ThreadStatus::Closed, &f.signature()),
            thread(11, ThreadStatus::Active, &f.signature()),
            thread(12, ThreadStatus::Closed, &f.signature()),
        ];
        let result = reconcile(&[f], &existing).unwrap();
        assert_eq!(
            result.operations,
            vec![
                Operation::Update {
                    thread_id: 10,
                    status: ThreadStatus::Active
                },
                Operation::Update {
                    thread_id: 11,
                    status: ThreadStatus::Closed
                },
            ]
        );
    }

    // ========================================================================
    // Status handling
    // ========================================================================

    #[test]
    fn test_terminal_statuses_are_left_alone() {
        let existing = vec![
            thread(1, ThreadStatus::Fixed, "[DotNetFormatTask][Automated] A"),
            thread(2, ThreadStatus::WontFix, "[DotNetFormatTask][Automated] B"),
            thread(3, ThreadStatus::ByDesign, "[DotNetFormatTask][Automated] C"),
            thread(4, ThreadStatus::Closed, "[DotNetFormatTask][Automated] D"),
        ];
        assert!(reconcile(&[], &existing).unwrap().operations.is_empty());
    }

    #[test]
    fn test_pending_and_unknown_threads_are_closed() {
        let existing = vec![
            thread(1, ThreadStatus::Pending, "[DotNetFormatTask][Automated] A"),
            thread(2, ThreadStatus::Unknown, "[DotNetFormatTask][Automated] B"),
        ];
        assert_eq!(reconcile(&[], &existing).unwrap().closed(), 2);
    }

    #[test]
    fn test_terminal_thread_reopens_when_signature_returns() {
        let f = finding("a.ts", 4, "D1", "x");
        let existing = vec![thread(5, ThreadStatus::WontFix, &f.signature())];
        let result = reconcile(&[f], &existing).unwrap();
        assert_eq!(result.reopened(), 1);
    }

    #[test]
    fn test_thread_status_wire_names() {
        let parsed: Vec<ThreadStatus> =
            serde_json::from_str(r#"["active","closed","wontFix","byDesign","fixed","pending","unknown","somethingNew"]"#)
                .unwrap();
        assert_eq!(
            parsed,
            vec![
                ThreadStatus::Active,
                ThreadStatus::Closed,
                ThreadStatus::WontFix,
                ThreadStatus::ByDesign,
                ThreadStatus::Fixed,
                ThreadStatus::Pending,
                ThreadStatus::Unknown,
                ThreadStatus::Unknown,
            ]
        );
        assert_eq!(serde_json::to_string(&ThreadStatus::Closed).unwrap(), "\"closed\"");
    }

    // ========================================================================
    // Contract violations
    // ========================================================================

    #[test]
    fn test_close_without_id_is_an_error() {
        let mut t = thread(1, ThreadStatus::Active, "[DotNetFormatTask][Automated] stale");
        t.id = None;
        let err = reconcile(&[], &[t]).unwrap_err();
        assert!(matches!(err, CheckError::UnanchoredUpdate { .. }));
    }

    #[test]
    fn test_reopen_without_id_is_an_error() {
        let f = finding("a.ts", 1, "D", "d");
        let mut t = thread(1, ThreadStatus::Closed, &f.signature());
        t.id = None;
        assert!(matches!(
            reconcile(&[f], &[t]),
            Err(CheckError::UnanchoredUpdate { .. })
        ));
    }

    #[test]
    fn test_idless_thread_without_pending_update_is_fine() {
        let mut t = thread(1, ThreadStatus::Closed, "[DotNetFormatTask][Automated] old");
        t.id = None;
        assert!(reconcile(&[], &[t]).unwrap().operations.is_empty());
    }
}
