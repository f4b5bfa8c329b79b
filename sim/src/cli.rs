//! # CLI Interface
//!
//! Defines the command-line argument structure for `custody-sim` using
//! `clap` derive. Supports three subcommands: `run`, `demo`, and `version`.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Default tracing directives when neither `--log-level` nor `RUST_LOG` is
/// given.
pub const DEFAULT_LOG_FILTER: &str = "custody_sim=info,custody_contracts=info,custody_protocol=warn";

/// Custody batch layer simulator.
///
/// Runs scripted custody scenarios (vault creation, batch transfers, batch
/// payments) against an in-memory host and prints a JSON report of every
/// step.
#[derive(Parser, Debug)]
#[command(
    name = "custody-sim",
    about = "Custody batch layer simulator",
    version,
    propagate_version = true
)]
pub struct CustodySimCli {
    /// Log output format: `pretty` or `json`.
    #[arg(long, global = true, env = "CUSTODY_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Tracing filter directives. `RUST_LOG` takes precedence when set.
    #[arg(long, global = true, env = "CUSTODY_LOG", default_value = DEFAULT_LOG_FILTER)]
    pub log_level: String,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a scenario file.
    Run(RunArgs),
    /// Run the built-in demonstration scenario.
    Demo(ReportArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the JSON scenario.
    #[arg(long, short = 's', env = "CUSTODY_SCENARIO")]
    pub scenario: PathBuf,

    #[command(flatten)]
    pub report: ReportArgs,
}

/// Output options shared by `run` and `demo`.
#[derive(Args, Debug, Clone, Copy)]
pub struct ReportArgs {
    /// Print Prometheus metrics after the report.
    #[arg(long)]
    pub metrics: bool,

    /// Print the report as a single JSON line instead of pretty JSON.
    #[arg(long)]
    pub compact: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        CustodySimCli::command().debug_assert();
    }

    #[test]
    fn run_takes_scenario_and_flags() {
        let cli = CustodySimCli::try_parse_from([
            "custody-sim",
            "--log-format",
            "json",
            "run",
            "--scenario",
            "payroll.json",
            "--metrics",
        ])
        .unwrap();
        assert_eq!(cli.log_format, "json");
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.scenario, PathBuf::from("payroll.json"));
                assert!(args.report.metrics);
                assert!(!args.report.compact);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn run_requires_a_scenario() {
        if std::env::var_os("CUSTODY_SCENARIO").is_none() {
            assert!(CustodySimCli::try_parse_from(["custody-sim", "run"]).is_err());
        }
    }
}
