//! Formatting findings and their identity
//!
//! A finding is one issue reported by the formatter. Its [`signature`] is both
//! the text of the review comment and the key used to find that comment again
//! on the next run, so the format must stay stable.

use crate::error::CheckError;
use crate::paths::{NormalizedPath, PathNormalizer};
use crate::scope::ScopeIndex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Marks the first comment of every thread this tool owns.
pub const COMMENT_PREAMBLE: &str = "[DotNetFormatTask][Automated]";

/// One formatting issue at one location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Finding {
    pub file_path: String,
    pub line_number: u32,
    pub char_number: u32,
    pub diagnostic_id: String,
    pub description: String,
}

impl Finding {
    pub fn signature(&self) -> String {
        signature(
            &self.diagnostic_id,
            &self.description,
            self.line_number,
            self.char_number,
        )
    }
}

/// Identity key of a finding; also the content of its thread's first comment.
///
/// The file path is not part of the key.
pub fn signature(diagnostic_id: &str, description: &str, line: u32, column: u32) -> String {
    format!(
        "{} {}: {} on line {}, position {}",
        COMMENT_PREAMBLE, diagnostic_id, description, line, column
    )
}

/// Whether a comment was written by this tool.
pub fn is_managed_content(content: &str) -> bool {
    content.starts_with(COMMENT_PREAMBLE)
}

/// Normalizes finding paths and filters findings against the pull request scope.
#[derive(Debug, Clone, Default)]
pub struct FindingNormalizer {
    paths: PathNormalizer,
}

impl FindingNormalizer {
    pub fn new(paths: PathNormalizer) -> Self {
        Self { paths }
    }

    /// Normalize paths, then drop findings outside `scope` (when given).
    pub fn normalize(&self, findings: Vec<Finding>, scope: Option<&ScopeIndex>) -> Vec<Finding> {
        let mut kept = Vec::with_capacity(findings.len());

        for mut finding in findings {
            if finding.file_path.trim().is_empty() {
                let err = CheckError::MissingPath {
                    context: format!("finding {}", finding.diagnostic_id),
                };
                warn!(error = %err, "Skipping finding");
                continue;
            }

            finding.file_path = match self.paths.normalize(&finding.file_path) {
                NormalizedPath::Relative(p) => p,
                NormalizedPath::Foreign(p) => {
                    warn!(path = %p, "Could not make finding path repository-relative; keeping it");
                    p
                }
            };

            if let Some(scope) = scope {
                match scope.get(&finding.file_path) {
                    None => {
                        debug!(path = %finding.file_path, "Excluded: file not part of the pull request");
                        continue;
                    }
                    Some(lines) if !lines.contains(finding.line_number) => {
                        debug!(
                            path = %finding.file_path,
                            line = finding.line_number,
                            "Excluded: line not changed in the pull request"
                        );
                        continue;
                    }
                    Some(_) => {}
                }
            }

            kept.push(finding);
        }

        if scope.is_some() {
            info!(kept = kept.len(), "Scoped findings to the pull request");
        }
        kept
    }
}

// ============================================================================
// Tests
// ============================================================================
