// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Custody Simulator
//!
//! Entry point for the `custody-sim` binary. Parses CLI arguments,
//! initializes logging, runs a scenario against an in-memory host, and
//! prints the JSON report to stdout.
//!
//! - `run`     — execute a scenario file
//! - `demo`    — execute the built-in demonstration scenario
//! - `version` — print build version information

mod cli;
mod logging;
mod metrics;
mod scenario;

use anyhow::{Context, Result};
use clap::Parser;

use custody_protocol::config::{MAX_BATCH_SIZE, PAYMENT_CALL_STIPEND};

use cli::{Commands, CustodySimCli, ReportArgs};
use logging::LogFormat;
use scenario::Scenario;

fn main() -> Result<()> {
    let cli = CustodySimCli::parse();

    match cli.command {
        Commands::Run(args) => {
            init(&cli.log_level, &cli.log_format)?;
            let scenario = Scenario::from_path(&args.scenario)?;
            tracing::info!(
                path = %args.scenario.display(),
                steps = scenario.steps.len(),
                "running scenario"
            );
            execute(&scenario, args.report)
        }
        Commands::Demo(report) => {
            init(&cli.log_level, &cli.log_format)?;
            tracing::info!("running demo scenario");
            execute(&Scenario::demo(), report)
        }
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

fn init(filter: &str, format: &str) -> Result<()> {
    logging::init_logging(filter, LogFormat::from_str_lossy(format))
}

fn execute(scenario: &Scenario, options: ReportArgs) -> Result<()> {
    let (report, metrics) = scenario.run()?;
    tracing::info!(
        steps = report.steps.len(),
        reverted = report.reverted_steps(),
        vaults = report.vaults.len(),
        "scenario finished"
    );

    let rendered = if options.compact {
        serde_json::to_string(&report)
    } else {
        serde_json::to_string_pretty(&report)
    }
    .context("failed to render report")?;
    println!("{rendered}");

    if options.metrics {
        let text = metrics.encode().context("failed to encode metrics")?;
        print!("{text}");
    }
    Ok(())
}

fn print_version() {
    println!("custody-sim {}", env!("CARGO_PKG_VERSION"));
    println!("batch cap   {MAX_BATCH_SIZE}");
    println!("stipend     {PAYMENT_CALL_STIPEND}");
}
