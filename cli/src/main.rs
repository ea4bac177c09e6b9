// Copyright (c) 2026 Granary Contributors. MIT License.
// See LICENSE for details.

//! # Granary CLI
//!
//! Entry point for the `granary` binary. Parses CLI arguments, initializes
//! logging, and replays vault scenarios against a fresh in-process
//! environment.
//!
//! The binary supports three subcommands:
//!
//! - `run`     - replay a scenario and print the report as JSON
//! - `init`    - write a sample scenario
//! - `version` - print build version information

mod cli;
mod logging;
mod metrics;
mod scenario;

use anyhow::{bail, Context, Result};
use clap::Parser;

use cli::{Commands, GranaryCli};
use metrics::RunMetrics;
use scenario::Scenario;

fn main() -> Result<()> {
    let cli = GranaryCli::parse();

    match cli.command {
        Commands::Run(args) => {
            logging::init_logging(logging::DEFAULT_DIRECTIVE, cli.log_format);
            run_scenario(args)
        }
        Commands::Init(args) => {
            logging::init_logging(logging::DEFAULT_DIRECTIVE, cli.log_format);
            init_scenario(args)
        }
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Loads a scenario, replays it, and prints the report to stdout.
fn run_scenario(args: cli::RunArgs) -> Result<()> {
    let scenario = Scenario::load(&args.scenario)?;
    tracing::info!(
        path = %args.scenario.display(),
        steps = scenario.steps.len(),
        "running scenario"
    );

    let metrics = RunMetrics::new();
    let report = scenario::run(&scenario, &metrics, args.events)?;

    let json = serde_json::to_string_pretty(&report).context("failed to encode report")?;
    println!("{json}");

    if args.metrics {
        let text = metrics.encode().context("failed to encode metrics")?;
        eprint!("{text}");
    }

    let failures = report.failures();
    if args.strict && failures > 0 {
        bail!("{failures} of {} steps failed", report.steps.len());
    }
    Ok(())
}

/// Writes the sample scenario to disk.
fn init_scenario(args: cli::InitArgs) -> Result<()> {
    let path = &args.path;
    if path.exists() && !args.force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    Scenario::sample().save(path)?;
    tracing::info!(path = %path.display(), "sample scenario written");
    Ok(())
}

fn print_version() {
    println!("granary  {}", env!("CARGO_PKG_VERSION"));
    println!("protocol {}", granary_protocol::config::PROTOCOL_VERSION);
    println!("rustc    {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}
