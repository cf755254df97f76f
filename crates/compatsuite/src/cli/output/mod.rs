//! Terminal styling shared by the commands

use std::fmt::Display;

use console::{style, Style};

use compatsuite_tasks::RunSummary;

pub fn success(message: impl Display) {
    println!("{} {}", style("✓").green().bold(), message);
}

/// Errors go to stderr so `--format json` output stays parseable
pub fn error(message: impl Display) {
    eprintln!("{} {}", style("✗").red().bold(), message);
}

pub fn warning(message: impl Display) {
    println!("{} {}", style("!").yellow().bold(), message);
}

pub fn info(message: impl Display) {
    println!("{} {}", style("→").blue(), message);
}

pub fn header(text: impl Display) -> String {
    style(text).bold().to_string()
}

/// Indented, aligned `label value` line for statistics blocks
pub fn stat(label: &str, value: impl Display) -> String {
    format!("  {} {}", style(format!("{:<14}", label)).dim(), value)
}

/// Colour for an outcome label: passes green, expected failures yellow,
/// anything that fails the run red
fn outcome_style(label: &str) -> Style {
    match label {
        "PASS" => Style::new().green().bold(),
        "XFAIL" => Style::new().yellow().bold(),
        _ => Style::new().red().bold(),
    }
}

pub fn path_style() -> Style {
    Style::new().cyan()
}

/// Closing line of a run
pub fn verdict(summary: &RunSummary) {
    let label = summary.result();
    let line = verdict_line(summary.was_cancelled(), summary.is_clean(), label);
    if summary.was_cancelled() || summary.is_clean() {
        println!("{}", line);
    } else {
        eprintln!("{}", line);
    }
}

fn verdict_line(cancelled: bool, clean: bool, label: &str) -> String {
    let label = outcome_style(label).apply_to(label);
    if cancelled {
        format!("{} Run cancelled, partial result: {}", style("!").yellow().bold(), label)
    } else if clean {
        format!("{} No unexpected results: {}", style("✓").green().bold(), label)
    } else {
        format!("{} Unexpected results: {}", style("✗").red().bold(), label)
    }
}
