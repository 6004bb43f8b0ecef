//! CLI argument definitions for emberpost-agent.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.
//! Purely declarative, no side effects or I/O.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};

/// Emberpost log-to-metrics agent.
///
/// Tails the configured log files, aggregates metrics from matching
/// lines, and periodically ships signed snapshots to the collector.
#[derive(Parser, Debug)]
#[command(name = "emberpost-agent")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the agent configuration file.
    #[arg(short, long)]
    pub config: PathBuf,

    /// Print snapshots instead of sending them to the collector.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Override the snapshot interval (e.g. 30s, 5m).
    #[arg(long, global = true, value_parser = humantime::parse_duration)]
    pub interval: Option<Duration>,

    /// Increase verbosity (-v, -vv, -vvv).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the agent until a termination signal arrives (default).
    Run,

    /// Process a log file once and print the resulting metrics.
    Test(TestArgs),
}

/// Process a whole file through the first configured source.
#[derive(Args, Debug)]
pub struct TestArgs {
    /// Log file to process.
    pub file: PathBuf,

    /// Limit the number of lines processed (0 = no limit).
    #[arg(short = 'n', long, default_value_t = 0)]
    pub lines: usize,
}
