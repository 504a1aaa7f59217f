//! Local git queries for line-level scoping
//!
//! Computes, per file, the lines the pull request adds relative to the merge
//! base with its target branch. Everything is read from the checked-out
//! repository; nothing is fetched.

use crate::devops::branch_name;
use anyhow::{anyhow, Context, Result};
use git2::{Delta, DiffOptions, Oid, Patch, Repository};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::debug;

/// Added line numbers keyed by `/`-prefixed repository path.
pub type AddedLines = BTreeMap<String, BTreeSet<u32>>;

fn resolve_target(repo: &Repository, target_branch: &str) -> Result<Oid> {
    let name = branch_name(target_branch);
    let candidates = [
        format!("refs/remotes/origin/{}", name),
        format!("origin/{}", name),
        format!("refs/heads/{}", name),
        name.to_string(),
    ];

    for candidate in &candidates {
        if let Ok(obj) = repo.revparse_single(candidate) {
            let commit = obj
                .peel_to_commit()
                .with_context(|| format!("{} does not point at a commit", candidate))?;
            debug!(candidate = %candidate, "Resolved target branch");
            return Ok(commit.id());
        }
    }

    Err(anyhow!("Target branch '{}' not found in the local repository", name))
}

/// Lines added by `source_rev` (default `HEAD`) since its merge base with
/// `target_branch`.
///
/// Every file the diff touches gets an entry, even when nothing was added.
/// Deleted files are left out.
pub fn added_lines(repo_path: &Path, target_branch: &str, source_rev: Option<&str>) -> Result<AddedLines> {
    let repo = Repository::open(repo_path)
        .with_context(|| format!("Failed to open repository at {}", repo_path.display()))?;

    let target = resolve_target(&repo, target_branch)?;
    let source = repo
        .revparse_single(source_rev.unwrap_or("HEAD"))
        .and_then(|obj| obj.peel_to_commit())
        .context("Failed to resolve the source commit")?;
    let base = repo
        .merge_base(target, source.id())
        .context("No merge base between source and target")?;

    let base_tree = repo.find_commit(base)?.tree()?;
    let source_tree = source.tree()?;

    let mut opts = DiffOptions::new();
    opts.context_lines(0);
    let diff = repo.diff_tree_to_tree(Some(&base_tree), Some(&source_tree), Some(&mut opts))?;

    let mut added = AddedLines::new();
    for idx in 0..diff.deltas().len() {
        let Some(delta) = diff.get_delta(idx) else {
            continue;
        };
        if delta.status() == Delta::Deleted {
            continue;
        }
        let Some(path) = delta.new_file().path() else {
            continue;
        };
        let key = format!("/{}", path.to_string_lossy().replace('\\', "/"));
        let lines = added.entry(key).or_default();

        let Some(patch) = Patch::from_diff(&diff, idx)? else {
            continue;
        };
        for hunk in 0..patch.num_hunks() {
            for line_idx in 0..patch.num_lines_in_hunk(hunk)? {
                let line = patch.line_in_hunk(hunk, line_idx)?;
                if line.origin() == '+' {
                    if let Some(lineno) = line.new_lineno() {
                        lines.insert(lineno);
                    }
                }
            }
        }
    }

    debug!(files = added.len(), "Computed added lines");
    Ok(added)
}
