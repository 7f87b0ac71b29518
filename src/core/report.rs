//! Gate result aggregation and rendering.
//!
//! The Problem list is the sole pass/fail signal: the report is text by
//! default (success line on stdout, failure banner plus every Problem on
//! stderr) or pretty JSON for machine consumers.

use crate::core::gate::Mode;
use colored::Colorize;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct GateReport {
    pub week: String,
    pub mode: Mode,
    pub problems: Vec<String>,
    pub passed: bool,
}

impl GateReport {
    pub fn new(week: &str, mode: Mode, problems: Vec<String>) -> Self {
        GateReport {
            week: week.to_string(),
            mode,
            passed: problems.is_empty(),
            problems,
        }
    }
}

/// Render the report the way a terminal consumer expects: every Problem
/// in discovery order, then a one-line verdict naming the week.
pub fn render_text(report: &GateReport) {
    if report.passed {
        println!("{} {}", "[weekgate] OK:".green().bold(), report.week);
        return;
    }
    eprintln!("{}", "[weekgate] gate report".bold());
    eprintln!("Problems:");
    for problem in &report.problems {
        eprintln!("{}", problem);
    }
    eprintln!(
        "{} {} ({} problem(s))",
        "[weekgate] FAILED:".red().bold(),
        report.week,
        report.problems.len()
    );
}

pub fn render_json(report: &GateReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}
