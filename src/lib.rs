//! format-check-task library crate
//!
//! Runs `dotnet format` on a pull request build and keeps the pull request's
//! review threads in step with its findings. The binary in `main.rs` wires
//! these modules to the Azure Pipelines environment; benchmarks and tests use
//! them directly.

pub mod config;
pub mod devops;
pub mod error;
pub mod findings;
pub mod git_ops;
pub mod host;
pub mod logging;
pub mod paths;
pub mod reconcile;
pub mod report;
pub mod runner;
pub mod scope;
pub mod status;
pub mod util;
pub mod workflow;
