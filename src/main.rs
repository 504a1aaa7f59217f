use anyhow::Result;
use clap::Parser;
use format_check_task::config::{Args, Settings};
use format_check_task::devops::DevOpsClient;
use format_check_task::git_ops::{self, AddedLines};
use format_check_task::logging::init_logging;
use format_check_task::paths::PathNormalizer;
use format_check_task::report;
use format_check_task::runner::FormatCheckRunner;
use format_check_task::status::task_complete_command;
use format_check_task::workflow::{run_format_check, RunOptions};
use std::path::Path;
use std::process::ExitCode;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(err) = init_logging(args.verbose) {
        eprintln!("{:#}", err);
        return ExitCode::FAILURE;
    }

    match run(&args).await {
        Ok(code) => code,
        Err(err) => {
            error!(error = %format!("{:#}", err), "Format check failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> Result<ExitCode> {
    let Some(settings) = Settings::load(args)? else {
        info!("Not a PR build. Skipping.");
        return Ok(ExitCode::SUCCESS);
    };
    settings.log_inputs();

    let client = DevOpsClient::new(&settings)?;
    let options = RunOptions::from_parameters(&settings.parameters);
    let paths = PathNormalizer::new(settings.environment.sources_directory.as_deref());

    let changed_lines = if options.scope_to_pull_request && options.scope_to_changed_lines {
        changed_lines(&settings)
    } else {
        None
    };

    let params = &settings.parameters;
    let outcome = run_format_check(&client, &options, &paths, changed_lines.as_ref(), || {
        match (&params.report_path, &params.solution_path) {
            (Some(report_path), _) => {
                info!(path = %report_path.display(), "Using existing format report");
                report::load_findings(report_path)
            }
            (None, Some(solution)) => FormatCheckRunner::new(
                solution.as_str(),
                params.include_path.clone(),
                params.exclude_path.clone(),
            )
            .run(),
            (None, None) => anyhow::bail!("SolutionPath is not set."),
        }
    })
    .await?;

    println!("{}", task_complete_command(&outcome.decision));
    Ok(if outcome.decision.should_fail_task {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Added lines from the local clone, or `None` (whole-file scope) on failure.
fn changed_lines(settings: &Settings) -> Option<AddedLines> {
    let env = &settings.environment;
    let Some(target) = env.target_branch.as_deref() else {
        warn!("SYSTEM_PULLREQUEST_TARGETBRANCH is not set; scoping to whole files");
        return None;
    };
    let repo = Path::new(env.sources_directory.as_deref().unwrap_or("."));

    match git_ops::added_lines(repo, target, env.source_commit.as_deref()) {
        Ok(lines) => Some(lines),
        Err(err) => {
            warn!(error = %format!("{:#}", err), "Could not compute changed lines; scoping to whole files");
            None
        }
    }
}
