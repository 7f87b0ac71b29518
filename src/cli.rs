//! CLI struct definitions for the weekgate command-line interface.
//!
//! All clap-derived types live here. Dispatch logic lives in `lib.rs`.

use crate::core::gate::Mode;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[clap(
    name = "weekgate",
    version = env!("CARGO_PKG_VERSION"),
    about = "Weekgate is the content-readiness gate that decides whether a curriculum week package meets its Definition-of-Done for the task, idle, and release contexts."
)]
pub(crate) struct Cli {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Run the Definition-of-Done gate for one week package
    Check(CheckCli),
    /// Print the weekgate version
    Version,
}

#[derive(clap::Args, Debug)]
pub(crate) struct CheckCli {
    /// Week id (e.g. week_06 or 06).
    #[clap(long)]
    pub week: String,
    /// Verification context: which gates run and how strict they are.
    #[clap(long, value_enum)]
    pub mode: Mode,
    /// Output format: 'text' or 'json'.
    #[clap(long, default_value = "text")]
    pub format: String,
    /// Print a diagnostic line for every individual check.
    #[clap(long, short = 'v')]
    pub verbose: bool,
    /// Interpreter used to launch the week's pytest suite.
    #[clap(long, default_value = "python3")]
    pub python: String,
    /// Kill the test run after this many seconds (default: wait indefinitely).
    #[clap(long)]
    pub test_timeout: Option<u64>,
}
