//! Terminal output formatting: choice labels, spinners, status lines.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::event::RawEvent;
use crate::issues::Issue;

/// Sentinel choice that advances to the next page
pub const NEXT_PAGE: &str = "Next page";

/// Label for an issue in the search prompt:
/// `[x<count> times, last <time>] dataset service namespace message`
pub fn issue_label(issue: &Issue) -> String {
    let last = issue
        .last_occurrence
        .map(|t| t.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
        .unwrap_or_else(|| "unknown".to_string());

    [
        format!("[x{} times, last {}]", issue.occurrences, last)
            .white()
            .to_string(),
        issue.dataset.magenta().to_string(),
        issue.service.yellow().to_string(),
        issue.namespace.green().to_string(),
        single_line(&issue.message),
    ]
    .join(" ")
}

/// Label for an event in the query-run prompt: `dataset service message`
pub fn event_label(event: &RawEvent) -> String {
    let message = event
        .message()
        .or(event.error())
        .or(event.source.as_deref())
        .unwrap_or_default();

    [
        event.dataset().magenta().to_string(),
        event.service().yellow().to_string(),
        single_line(message),
    ]
    .join(" ")
}

/// Collapse whitespace so a label fits on one prompt row
fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Format an error for display with optional tip
pub fn format_error(message: &str, tip: Option<&str>) -> String {
    let mut output = format!("{} {}", "Error:".red().bold(), message);
    if let Some(tip) = tip {
        output.push('\n');
        output.push_str(&format!("{} {}", "Tip:".blue().bold(), tip));
    }
    output
}

pub fn print_no_issues() {
    println!("{} {}", "ℹ".blue(), "No issues found".bold());
}

pub fn print_cancelled() {
    println!("{}", "Cancelled.".dimmed());
}

/// Spinner on stderr; hidden automatically when stderr is not a terminal
pub struct Spinner {
    bar: ProgressBar,
}

impl Spinner {
    pub fn start(message: impl Into<String>) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.into());
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar }
    }

    pub fn succeed(self) {
        let message = self.bar.message();
        self.bar
            .finish_with_message(format!("{} {}", "✔".green(), message));
    }

    pub fn fail(self, reason: &str) {
        self.bar
            .abandon_with_message(format!("{} {}", "✖".red(), reason.red()));
    }
}
