//! Repository-relative path normalization
//!
//! The formatter reports absolute paths under the build sources directory,
//! while the pull request API reports paths like `/src/Program.cs`. Both are
//! normalized to the latter form so they can be compared.

use tracing::warn;

/// Strips the repository root from file paths.
#[derive(Debug, Clone, Default)]
pub struct PathNormalizer {
    root: Option<String>,
}

/// Outcome of normalizing a single path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedPath {
    /// Path was under the root (or already repo-relative).
    Relative(String),
    /// Path lies outside the root; kept with separators normalized.
    Foreign(String),
}

impl NormalizedPath {
    pub fn as_str(&self) -> &str {
        match self {
            NormalizedPath::Relative(p) | NormalizedPath::Foreign(p) => p,
        }
    }

    pub fn into_string(self) -> String {
        match self {
            NormalizedPath::Relative(p) | NormalizedPath::Foreign(p) => p,
        }
    }
}

impl PathNormalizer {
    /// Create a normalizer for the given sources directory. A blank root
    /// disables prefix stripping.
    pub fn new(root: Option<&str>) -> Self {
        let root = root
            .map(to_forward_slashes)
            .map(|r| r.trim_end_matches('/').to_string())
            .filter(|r| !r.is_empty());
        Self { root }
    }

    /// Normalize a path to the `/dir/file.ext` form used by the pull request API.
    pub fn normalize(&self, path: &str) -> NormalizedPath {
        let path = to_forward_slashes(path);

        let Some(root) = &self.root else {
            return NormalizedPath::Relative(ensure_leading_slash(&path));
        };

        match path.strip_prefix(root.as_str()) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => {
                NormalizedPath::Relative(ensure_leading_slash(rest))
            }
            // Already repo-relative (e.g. paths coming from the pull request API)
            _ if !is_absolute(&path) || (path.starts_with('/') && !is_absolute_host(&path, root)) => {
                NormalizedPath::Relative(ensure_leading_slash(&path))
            }
            _ => NormalizedPath::Foreign(path),
        }
    }

    /// Normalize, logging a warning when the path is outside the root.
    pub fn normalize_logged(&self, path: &str) -> String {
        let normalized = self.normalize(path);
        if let NormalizedPath::Foreign(p) = &normalized {
            warn!(path = %p, "File path is outside the sources directory; keeping it unchanged");
        }
        normalized.into_string()
    }
}

fn to_forward_slashes(path: &str) -> String {
    path.replace('\\', "/")
}

fn ensure_leading_slash(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

/// Windows drive paths (`C:/...`) are absolute.
fn is_absolute(path: &str) -> bool {
    let bytes = path.as_bytes();
    path.starts_with('/') || (bytes.len() > 2 && bytes[1] == b':' && bytes[2] == b'/')
}

/// A leading-slash path is treated as a host filesystem path when it shares
/// the first component with the root (e.g. `/home/...` vs root `/home/vsts/work`).
fn is_absolute_host(path: &str, root: &str) -> bool {
    let first = |p: &str| p.trim_start_matches('/').split('/').next().map(str::to_string);
    root.starts_with('/') && first(path) == first(root)
}

// ============================================================================
// Tests
// ============================================================================
