use format_check_task::findings::{Finding, FindingNormalizer};
use format_check_task::paths::PathNormalizer;
use format_check_task::reconcile::{reconcile, Anchor, Operation, ReviewThread, ThreadStatus};
use format_check_task::scope::{resolve_scope, ChangeEntry, ChangeType};
use proptest::prelude::*;
use std::collections::{BTreeSet, HashSet};

const PATHS: &[&str] = &["/a.cs", "/b.cs", "/src/c.cs", "/src/nested/d.cs"];
const DIAGNOSTICS: &[&str] = &["WHITESPACE", "IDE0055", "FINALNEWLINE"];

fn finding_strategy() -> impl Strategy<Value = Finding> {
    (
        prop::sample::select(PATHS),
        1u32..15,
        1u32..4,
        prop::sample::select(DIAGNOSTICS),
    )
        .prop_map(|(path, line, col, id)| Finding {
            file_path: path.to_string(),
            line_number: line,
            char_number: col,
            diagnostic_id: id.to_string(),
            description: format!("Fix {}", id.to_lowercase()),
        })
}

fn status_strategy() -> impl Strategy<Value = ThreadStatus> {
    prop_oneof![
        Just(ThreadStatus::Active),
        Just(ThreadStatus::Pending),
        Just(ThreadStatus::Fixed),
        Just(ThreadStatus::WontFix),
        Just(ThreadStatus::Closed),
        Just(ThreadStatus::ByDesign),
        Just(ThreadStatus::Unknown),
    ]
}

/// Managed threads built from findings, mixed with human threads.
fn threads_strategy() -> impl Strategy<Value = Vec<ReviewThread>> {
    let managed = (finding_strategy(), status_strategy()).prop_map(|(f, status)| ReviewThread {
        id: None,
        status,
        content: Some(f.signature()),
        anchor: Some(Anchor {
            file_path: f.file_path.clone(),
            line: f.line_number,
            column: f.char_number,
        }),
    });
    let human = (0u32..50, status_strategy()).prop_map(|(n, status)| ReviewThread {
        id: None,
        status,
        content: Some(format!("Reviewer note {}", n)),
        anchor: None,
    });

    prop::collection::vec(prop_oneof![3 => managed, 1 => human], 0..20).prop_map(|mut threads| {
        for (i, t) in threads.iter_mut().enumerate() {
            t.id = Some(i as u64 + 1);
        }
        threads
    })
}

fn change_type_strategy() -> impl Strategy<Value = ChangeType> {
    prop_oneof![
        Just(ChangeType::Add),
        Just(ChangeType::Edit),
        Just(ChangeType::Delete),
        Just(ChangeType::Rename),
    ]
}

fn changes_strategy() -> impl Strategy<Value = Vec<ChangeEntry>> {
    let entry = (
        prop::sample::select(PATHS),
        change_type_strategy(),
        prop::option::of(prop::collection::btree_set(1u32..15, 0..6)),
    )
        .prop_map(|(path, change_type, line_ranges)| ChangeEntry {
            file_path: Some(path.to_string()),
            commit_id: "c0ffee".to_string(),
            change_type,
            line_ranges,
        });
    prop::collection::vec(entry, 0..8)
}

/// Apply a plan the way a host would.
fn apply(mut threads: Vec<ReviewThread>, operations: &[Operation]) -> Vec<ReviewThread> {
    let mut next_id = threads.iter().filter_map(|t| t.id).max().unwrap_or(0);
    for op in operations {
        match op {
            Operation::Create { comment, anchor } => {
                next_id += 1;
                threads.push(ReviewThread {
                    id: Some(next_id),
                    status: ThreadStatus::Active,
                    content: Some(comment.clone()),
                    anchor: Some(anchor.clone()),
                });
            }
            Operation::Update { thread_id, status } => {
                let thread = threads
                    .iter_mut()
                    .find(|t| t.id == Some(*thread_id))
                    .expect("update targets an existing thread");
                thread.status = *status;
            }
        }
    }
    threads
}

fn touched_ids(operations: &[Operation]) -> HashSet<u64> {
    operations
        .iter()
        .filter_map(|op| match op {
            Operation::Update { thread_id, .. } => Some(*thread_id),
            Operation::Create { .. } => None,
        })
        .collect()
}

proptest! {
    #[test]
    fn prop_second_run_is_a_no_op(
        findings in prop::collection::vec(finding_strategy(), 0..20),
        threads in threads_strategy(),
    ) {
        let first = reconcile(&findings, &threads).unwrap();
        let after = apply(threads, &first.operations);
        let second = reconcile(&findings, &after).unwrap();
        prop_assert!(second.operations.is_empty(), "unexpected: {:?}", second.operations);
    }

    #[test]
    fn prop_human_threads_are_never_updated(
        findings in prop::collection::vec(finding_strategy(), 0..20),
        threads in threads_strategy(),
    ) {
        let plan = reconcile(&findings, &threads).unwrap();
        let touched = touched_ids(&plan.operations);
        for thread in threads.iter().filter(|t| !t.is_managed()) {
            prop_assert!(!touched.contains(&thread.id.unwrap()));
        }
    }

    #[test]
    fn prop_close_iff_open_and_unmatched(
        findings in prop::collection::vec(finding_strategy(), 0..20),
        threads in threads_strategy(),
    ) {
        // Keep only the first managed thread per signature
        let mut seen = HashSet::new();
        let threads: Vec<ReviewThread> = threads
            .into_iter()
            .filter(|t| !t.is_managed() || seen.insert(t.signature().to_string()))
            .collect();

        let plan = reconcile(&findings, &threads).unwrap();
        let closed: HashSet<u64> = plan
            .operations
            .iter()
            .filter_map(|op| match op {
                Operation::Update { thread_id, status: ThreadStatus::Closed } => Some(*thread_id),
                _ => None,
            })
            .collect();
        let current: HashSet<String> = findings.iter().map(Finding::signature).collect();

        for thread in threads.iter().filter(|t| t.is_managed()) {
            let expected = !thread.status.is_closed() && !current.contains(thread.signature());
            prop_assert_eq!(closed.contains(&thread.id.unwrap()), expected);
        }
    }

    #[test]
    fn prop_one_thread_per_signature(
        findings in prop::collection::vec(finding_strategy(), 0..30),
    ) {
        let plan = reconcile(&findings, &[]).unwrap();
        let distinct: HashSet<String> = findings.iter().map(Finding::signature).collect();
        prop_assert_eq!(plan.created(), distinct.len());
        prop_assert_eq!(plan.active_count, findings.len());
    }

    #[test]
    fn prop_scoped_findings_stay_in_scope(
        findings in prop::collection::vec(finding_strategy(), 0..30),
        changes in changes_strategy(),
    ) {
        let scope = resolve_scope(&changes);
        let normalizer = FindingNormalizer::new(PathNormalizer::new(None));
        let expected = findings
            .iter()
            .filter(|f| scope.contains(&f.file_path, f.line_number))
            .count();

        let kept = normalizer.normalize(findings, Some(&scope));
        prop_assert_eq!(kept.len(), expected);
        for f in &kept {
            prop_assert!(scope.contains(&f.file_path, f.line_number));
        }

        // A path named by any Delete entry never survives
        let deleted: BTreeSet<&str> = changes
            .iter()
            .filter(|c| c.change_type == ChangeType::Delete)
            .filter_map(|c| c.file_path.as_deref())
            .collect();
        for f in &kept {
            prop_assert!(!deleted.contains(f.file_path.as_str()));
        }
    }
}
