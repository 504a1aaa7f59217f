//! Task configuration
//!
//! Task inputs come from command-line flags, falling back to the `INPUT_*`
//! variables Azure Pipelines sets for task inputs. Build information
//! (organization, repository, pull request) is read from the pipeline's
//! predefined variables through an injectable lookup.

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser};
use std::fmt;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "format-check",
    about = "Run dotnet format and sync its findings to pull request review threads",
    version
)]
pub struct Args {
    /// Solution or project to check
    #[arg(long, env = "INPUT_SOLUTIONPATH")]
    pub solution_path: Option<String>,

    /// Only check files matching this path
    #[arg(long, env = "INPUT_INCLUDEPATH")]
    pub include_path: Option<String>,

    /// Skip files matching this path
    #[arg(long, env = "INPUT_EXCLUDEPATH")]
    pub exclude_path: Option<String>,

    /// Publish a status check on the pull request
    #[arg(long, env = "INPUT_STATUSCHECK", action = ArgAction::Set, value_parser = parse_flag,
          default_value = "false", num_args = 0..=1, default_missing_value = "true")]
    pub status_check: bool,

    /// Name of the status check
    #[arg(long, env = "INPUT_STATUSCHECKNAME", default_value = "format check")]
    pub status_check_name: String,

    /// Genre of the status check
    #[arg(long, env = "INPUT_STATUSCHECKGENRE", default_value = "dotnet-format")]
    pub status_check_genre: String,

    /// Fail the task when formatting issues remain
    #[arg(long, env = "INPUT_FAILONFORMATTINGERRORS", action = ArgAction::Set, value_parser = parse_flag,
          default_value = "false", num_args = 0..=1, default_missing_value = "true")]
    pub fail_on_formatting_errors: bool,

    /// Only report issues in files changed by the pull request
    #[arg(long, env = "INPUT_SCOPETOPULLREQUEST", action = ArgAction::Set, value_parser = parse_flag,
          default_value = "false", num_args = 0..=1, default_missing_value = "true")]
    pub scope_to_pull_request: bool,

    /// Only report issues on lines added by the pull request
    #[arg(long, env = "INPUT_SCOPETOCHANGEDLINES", action = ArgAction::Set, value_parser = parse_flag,
          default_value = "false", num_args = 0..=1, default_missing_value = "true")]
    pub scope_to_changed_lines: bool,

    /// Personal access token (defaults to SYSTEM_ACCESSTOKEN)
    #[arg(long = "token", env = "INPUT_PAT", hide_env_values = true)]
    pub pat: Option<String>,

    /// Use an existing format report instead of running dotnet format
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Plan thread changes without applying them or publishing a status
    #[arg(long)]
    pub dry_run: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Azure Pipelines boolean input: only `true` (any case) is true.
fn parse_flag(value: &str) -> Result<bool, String> {
    Ok(value.trim().eq_ignore_ascii_case("true"))
}

/// Predefined pipeline variables describing the build and pull request.
#[derive(Clone, PartialEq, Eq)]
pub struct Environment {
    pub org_url: String,
    pub repo_id: String,
    pub project_id: String,
    pub pull_request_id: u64,
    pub token: String,
    pub sources_directory: Option<String>,
    pub source_commit: Option<String>,
    pub target_branch: Option<String>,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("org_url", &self.org_url)
            .field("repo_id", &self.repo_id)
            .field("project_id", &self.project_id)
            .field("pull_request_id", &self.pull_request_id)
            .field("token", &"<redacted>")
            .field("sources_directory", &self.sources_directory)
            .field("source_commit", &self.source_commit)
            .field("target_branch", &self.target_branch)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusContext {
    pub name: String,
    pub genre: String,
}

/// Task inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameters {
    pub solution_path: Option<String>,
    pub include_path: Option<String>,
    pub exclude_path: Option<String>,
    pub report_path: Option<PathBuf>,
    pub fail_on_formatting_errors: bool,
    pub scope_to_pull_request: bool,
    pub scope_to_changed_lines: bool,
    pub status_check: bool,
    pub status_check_context: StatusContext,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub environment: Environment,
    pub parameters: Parameters,
}

impl Settings {
    /// Build settings from parsed arguments and the process environment.
    ///
    /// Returns `Ok(None)` when this is not a pull request build.
    pub fn load(args: &Args) -> Result<Option<Self>> {
        Self::from_lookup(args, |key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(args: &Args, lookup: F) -> Result<Option<Self>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let pull_request_id = get("SYSTEM_PULLREQUEST_PULLREQUESTID")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|id| *id > 0);
        let Some(pull_request_id) = pull_request_id else {
            return Ok(None);
        };

        let require = |key: &str| get(key).with_context(|| format!("{} is not set", key));

        let token = args
            .pat
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| get("SYSTEM_ACCESSTOKEN"))
            .context("No access token: set the PAT input or expose SYSTEM_ACCESSTOKEN to the task")?;

        let environment = Environment {
            org_url: require("SYSTEM_TEAMFOUNDATIONCOLLECTIONURI")?,
            repo_id: require("BUILD_REPOSITORY_ID")?,
            project_id: require("SYSTEM_TEAMPROJECTID")?,
            pull_request_id,
            token,
            sources_directory: get("BUILD_SOURCESDIRECTORY"),
            source_commit: get("SYSTEM_PULLREQUEST_SOURCECOMMITID"),
            target_branch: get("SYSTEM_PULLREQUEST_TARGETBRANCH"),
        };

        let solution_path = args.solution_path.clone().filter(|s| !s.trim().is_empty());
        if solution_path.is_none() && args.report.is_none() {
            bail!("SolutionPath is not set.");
        }

        let parameters = Parameters {
            solution_path,
            include_path: args.include_path.clone().filter(|s| !s.trim().is_empty()),
            exclude_path: args.exclude_path.clone().filter(|s| !s.trim().is_empty()),
            report_path: args.report.clone(),
            fail_on_formatting_errors: args.fail_on_formatting_errors,
            scope_to_pull_request: args.scope_to_pull_request,
            scope_to_changed_lines: args.scope_to_changed_lines,
            status_check: args.status_check,
            status_check_context: StatusContext {
                name: args.status_check_name.clone(),
                genre: args.status_check_genre.clone(),
            },
            dry_run: args.dry_run,
        };

        Ok(Some(Settings {
            environment,
            parameters,
        }))
    }

    /// Log the effective inputs. The token is never logged.
    pub fn log_inputs(&self) {
        let p = &self.parameters;
        let e = &self.environment;
        info!(
            solution_path = p.solution_path.as_deref().unwrap_or("-"),
            include_path = p.include_path.as_deref().unwrap_or("-"),
            exclude_path = p.exclude_path.as_deref().unwrap_or("-"),
            status_check = p.status_check,
            status_check_name = %p.status_check_context.name,
            status_check_genre = %p.status_check_context.genre,
            fail_on_formatting_errors = p.fail_on_formatting_errors,
            scope_to_pull_request = p.scope_to_pull_request,
            scope_to_changed_lines = p.scope_to_changed_lines,
            "Task input parameters"
        );
        info!(
            org_url = %e.org_url,
            repo_id = %e.repo_id,
            project_id = %e.project_id,
            pull_request_id = e.pull_request_id,
            "Build environment"
        );
    }
}
