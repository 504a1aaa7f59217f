//! `dotnet format --report` JSON
//!
//! The report is an array of documents, each listing the formatting changes
//! the formatter would make. Every change becomes one [`Finding`].

use crate::error::CheckError;
use crate::findings::Finding;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FormatReport {
    #[serde(default)]
    pub document_id: Option<DocumentId>,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub file_changes: Vec<FileChange>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DocumentId {
    pub project_id: ProjectId,
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProjectId {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileChange {
    pub line_number: u32,
    pub char_number: u32,
    pub diagnostic_id: String,
    pub format_description: String,
}

/// Parse report JSON. Any structural problem rejects the whole report.
pub fn parse_report(json: &str) -> Result<Vec<FormatReport>, CheckError> {
    Ok(serde_json::from_str(json)?)
}

/// Flatten report documents into findings (paths are not normalized yet).
pub fn flatten(reports: Vec<FormatReport>) -> Vec<Finding> {
    reports
        .into_iter()
        .flat_map(|report| {
            let path = report.file_path;
            report.file_changes.into_iter().map(move |change| Finding {
                file_path: path.clone(),
                line_number: change.line_number,
                char_number: change.char_number,
                diagnostic_id: change.diagnostic_id,
                description: change.format_description,
            })
        })
        .collect()
}

/// Load and flatten a report file.
pub fn load_findings(path: &Path) -> Result<Vec<Finding>> {
    info!(path = %path.display(), "Loading format report");
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read format report {}", path.display()))?;
    let reports = parse_report(&content)?;
    let findings = flatten(reports);
    info!(findings = findings.len(), "Format report loaded");
    Ok(findings)
}
