//! Diff scope resolution
//!
//! Turns the pull request's change list into a lookup of which files (and,
//! optionally, which lines) are in scope for reporting.

use crate::error::CheckError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// How a file was touched by the pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChangeType {
    Add,
    Edit,
    Delete,
    Rename,
    #[default]
    None,
}

impl ChangeType {
    /// Parse the host's change type, which may be a comma-separated flag set
    /// such as `"edit, rename"`. Deletion wins over every other flag.
    pub fn from_host(value: &str) -> Self {
        let flags: Vec<String> = value
            .split(',')
            .map(|f| f.trim().to_ascii_lowercase())
            .collect();
        let has = |name: &str| flags.iter().any(|f| f == name);

        if has("delete") {
            ChangeType::Delete
        } else if has("add") {
            ChangeType::Add
        } else if has("rename") {
            ChangeType::Rename
        } else if has("edit") {
            ChangeType::Edit
        } else {
            ChangeType::None
        }
    }
}

/// A file touched by the pull request's current diff.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangeEntry {
    /// Normalized path; `None` when the host did not report one.
    pub file_path: Option<String>,
    pub commit_id: String,
    pub change_type: ChangeType,
    /// Lines added by the diff, when line-level scoping was requested.
    pub line_ranges: Option<BTreeSet<u32>>,
}

/// Lines of a file that are in scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineScope {
    All,
    Lines(BTreeSet<u32>),
}

impl LineScope {
    pub fn contains(&self, line: u32) -> bool {
        match self {
            LineScope::All => true,
            LineScope::Lines(lines) => lines.contains(&line),
        }
    }
}

/// Normalized file path -> in-scope lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeIndex {
    files: BTreeMap<String, LineScope>,
}

impl ScopeIndex {
    pub fn get(&self, path: &str) -> Option<&LineScope> {
        self.files.get(path)
    }

    /// Whether a finding at `path:line` is in scope.
    pub fn contains(&self, path: &str, line: u32) -> bool {
        self.get(path).is_some_and(|scope| scope.contains(line))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }
}

/// Build the scope index for a set of change entries.
///
/// A path named by any `Delete` entry is out of scope, whatever other entries
/// say about it.
pub fn resolve_scope(changes: &[ChangeEntry]) -> ScopeIndex {
    let mut with_path = Vec::with_capacity(changes.len());
    for change in changes {
        match change.file_path.as_deref().filter(|p| !p.is_empty()) {
            Some(path) => with_path.push((path, change)),
            None => {
                let err = CheckError::MissingPath {
                    context: format!("change in commit {}", change.commit_id),
                };
                warn!(error = %err, "Skipping change entry");
            }
        }
    }

    let deleted: BTreeSet<&str> = with_path
        .iter()
        .filter(|(_, change)| change.change_type == ChangeType::Delete)
        .map(|(path, _)| *path)
        .collect();

    let mut files = BTreeMap::new();
    for (path, change) in with_path {
        if deleted.contains(path) {
            debug!(path, change_type = ?change.change_type, "Deleted file excluded from scope");
            continue;
        }

        let scope = match &change.line_ranges {
            Some(lines) => LineScope::Lines(lines.clone()),
            None => LineScope::All,
        };

        match &scope {
            LineScope::All => debug!(path, change_type = ?change.change_type, "In scope: whole file"),
            LineScope::Lines(lines) => {
                debug!(path, change_type = ?change.change_type, lines = lines.len(), "In scope: added lines")
            }
        }
        files.insert(path.to_string(), scope);
    }

    ScopeIndex { files }
}

// ============================================================================
// Tests
// ============================================================================
