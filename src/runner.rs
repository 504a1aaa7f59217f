//! `dotnet format` invocation
//!
//! Runs the formatter in verify mode so it writes a JSON report of every change
//! it would make, then loads that report.

use crate::findings::Finding;
use crate::report;
use crate::util::{run_command_with_timeout, truncate};
use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;
use tracing::{error, info, warn};

const DEFAULT_REPORT_PATH: &str = "format-report.json";
const FORMAT_TIMEOUT: Duration = Duration::from_secs(60 * 60);
const VERSION_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_STDERR_LOG_CHARS: usize = 4000;

/// Runs `dotnet format --verify-no-changes` and collects its report.
#[derive(Debug, Clone)]
pub struct FormatCheckRunner {
    solution_path: PathBuf,
    include: Option<String>,
    exclude: Option<String>,
    report_path: PathBuf,
    program: String,
}

impl FormatCheckRunner {
    pub fn new(solution_path: impl Into<PathBuf>, include: Option<String>, exclude: Option<String>) -> Self {
        Self {
            solution_path: solution_path.into(),
            include: include.filter(|s| !s.trim().is_empty()),
            exclude: exclude.filter(|s| !s.trim().is_empty()),
            report_path: PathBuf::from(DEFAULT_REPORT_PATH),
            program: "dotnet".to_string(),
        }
    }

    pub fn with_report_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_path = path.into();
        self
    }

    /// Use a different executable in place of `dotnet`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Arguments passed to the formatter.
    pub fn format_args(&self) -> Vec<String> {
        let mut args = vec![
            "format".to_string(),
            self.solution_path.display().to_string(),
            "--verify-no-changes".to_string(),
            "--verbosity".to_string(),
            "diagnostic".to_string(),
            "--report".to_string(),
            self.report_path.display().to_string(),
        ];
        if let Some(include) = &self.include {
            args.push("--include".to_string());
            args.push(include.clone());
        }
        if let Some(exclude) = &self.exclude {
            args.push("--exclude".to_string());
            args.push(exclude.clone());
        }
        args
    }

    /// Run the formatter and return its findings.
    ///
    /// A non-zero exit is expected when there are formatting issues; the run
    /// only fails if no report was written.
    pub fn run(&self) -> Result<Vec<Finding>> {
        if !self.solution_path.exists() {
            bail!(
                "Solution file at solutionPath does not exist: {}",
                self.solution_path.display()
            );
        }

        if self.report_path.exists() {
            std::fs::remove_file(&self.report_path).with_context(|| {
                format!("Failed to delete existing report {}", self.report_path.display())
            })?;
            info!("Deleted the existing report file");
        }

        let version = run_command_with_timeout(
            Command::new(&self.program).args(["format", "--version"]),
            VERSION_TIMEOUT,
        )
        .context("Failed to query dotnet format version")?;
        info!(version = %version.stdout.trim(), "Using dotnet format");

        let args = self.format_args();
        info!(command = %format!("{} {}", self.program, args.join(" ")), "Running dotnet format");
        let result = run_command_with_timeout(Command::new(&self.program).args(&args), FORMAT_TIMEOUT)
            .context("Failed to run dotnet format")?;

        if result.timed_out {
            bail!("dotnet format timed out after {}s", FORMAT_TIMEOUT.as_secs());
        }
        if !result.success() {
            warn!(
                code = ?result.status.and_then(|s| s.code()),
                "dotnet format reported changes or failed"
            );
            if !result.stderr.trim().is_empty() {
                warn!(stderr = %truncate(result.stderr.trim(), MAX_STDERR_LOG_CHARS), "dotnet format stderr");
            }
            if !self.report_path.exists() {
                error!(path = %self.report_path.display(), "No report found at reportPath");
                bail!("dotnet format failed without writing a report");
            }
        }
        info!("Dotnet format command completed");

        report::load_findings(&self.report_path)
    }
}
