//! Weekgate: the content-readiness gate for curriculum week packages.
//!
//! A week package is one self-contained folder of course content
//! (`chapters/week_NN/`). Weekgate decides whether that package meets its
//! Definition-of-Done for a given verification context:
//!
//! - **task**: after one authoring task; structural + content + cross-ref
//!   checks, plus the week's pytest suite
//! - **idle**: periodic sweep; adds the QA blocking-item scan, skips the
//!   test run
//! - **release**: final gate; everything, with the strict placeholder
//!   threshold and the template-drift check
//!
//! Every defect is accumulated as one human-readable Problem; nothing
//! short-circuits, so an author fixes everything in one iteration. The
//! process exits 0 only when the Problem list is empty.
//!
//! # Examples
//!
//! ```bash
//! # Gate week 6 after an authoring task
//! weekgate check --week 06 --mode task
//!
//! # Full release gate with per-check diagnostics
//! weekgate check --week week_06 --mode release --verbose
//!
//! # Machine-readable report
//! weekgate check --week 06 --mode idle --format json
//! ```
//!
//! # Crate Structure
//!
//! - [`core::week`]: week-id normalization and course-root discovery
//! - [`core::gate`]: the gate battery and its orchestrator
//! - [`core::xref`]: terms/anchors cross-reference checks
//! - [`core::report`]: Problem aggregation and text/JSON rendering

pub mod core;

mod cli;

use cli::{CheckCli, Cli, Command};
use crate::core::error::WeekgateError;
use crate::core::gate::{self, GateCtx};
use crate::core::report::{self, GateReport};
use crate::core::week;

use clap::Parser;

pub fn run() -> Result<(), WeekgateError> {
    let cli = Cli::parse();
    match cli.command {
        Command::Version => {
            println!("v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::Check(args) => run_check(args),
    }
}

fn run_check(args: CheckCli) -> Result<(), WeekgateError> {
    let week = week::normalize_week(&args.week)?;
    let current_dir = std::env::current_dir()?;
    let root = week::find_course_root(&current_dir)?;

    let ctx = GateCtx {
        week_dir: week::week_dir(&root, &week),
        root,
        week,
        mode: args.mode,
        verbose: args.verbose,
        python: args.python,
        test_timeout: args.test_timeout,
    };

    let problems = gate::run_gate(&ctx);
    let report = GateReport::new(&ctx.week, ctx.mode, problems);

    if args.format == "json" {
        println!("{}", report::render_json(&report)?);
    } else {
        report::render_text(&report);
    }

    if report.passed {
        Ok(())
    } else {
        Err(WeekgateError::GateFailed(report.problems.len()))
    }
}
