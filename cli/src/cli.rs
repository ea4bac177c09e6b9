//! # CLI Interface
//!
//! Defines the command-line argument structure for `granary` using `clap`
//! derive. Supports three subcommands: `run`, `init` and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::logging::LogFormat;

/// Granary vault scenario runner.
///
/// Deploys a registry, controller, vault and strategy into a fresh
/// in-process environment, replays a JSON scenario against them, and prints
/// the resulting ledger snapshot.
#[derive(Parser, Debug)]
#[command(
    name = "granary",
    about = "Granary vault scenario runner",
    version,
    propagate_version = true
)]
pub struct GranaryCli {
    /// Log output format. Logs go to stderr; stdout carries the report.
    #[arg(
        long,
        global = true,
        value_enum,
        env = "GRANARY_LOG_FORMAT",
        default_value_t = LogFormat::Pretty
    )]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the `granary` binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a scenario and print the resulting snapshot as JSON.
    Run(RunArgs),
    /// Write a sample scenario file to start from.
    Init(InitArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the scenario file (JSON).
    #[arg(long, short = 's', env = "GRANARY_SCENARIO")]
    pub scenario: PathBuf,

    /// Include the full event log in the report.
    #[arg(long)]
    pub events: bool,

    /// Print Prometheus metrics (text exposition format) to stderr after the run.
    #[arg(long)]
    pub metrics: bool,

    /// Exit with an error if any step fails.
    #[arg(long)]
    pub strict: bool,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Where to write the sample scenario.
    #[arg(default_value = "scenario.json")]
    pub path: PathBuf,

    /// Overwrite an existing file.
    #[arg(long)]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        GranaryCli::command().debug_assert();
    }

    #[test]
    fn run_accepts_flags() {
        let cli = GranaryCli::parse_from([
            "granary",
            "--log-format",
            "json",
            "run",
            "--scenario",
            "demo.json",
            "--metrics",
        ]);
        assert_eq!(cli.log_format, LogFormat::Json);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.scenario, PathBuf::from("demo.json"));
                assert!(args.metrics);
                assert!(!args.events);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
