//! Progress reporting for apply runs

use colored::Colorize;
use declarative::{ApplyResult, ProgressCallback};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner per step, one result line per finished step
pub struct ApplyProgress {
    spinner: Option<ProgressBar>,
    quiet: bool,
}

impl ApplyProgress {
    pub fn new(quiet: bool) -> Self {
        Self {
            spinner: None,
            quiet,
        }
    }

    fn clear(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}

impl ProgressCallback for ApplyProgress {
    fn on_plan_start(&mut self, name: &str, steps: usize) {
        if !self.quiet {
            println!();
            println!("{} {}", name.cyan().bold(), format!("({steps} steps)").dimmed());
        }
    }

    fn on_resource_start(&mut self, _id: &str, description: &str) {
        if self.quiet {
            return;
        }
        self.clear();
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("  {spinner:.green} {msg}") {
            spinner.set_style(style);
        }
        spinner.set_message(description.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));
        self.spinner = Some(spinner);
    }

    fn on_resource_complete(&mut self, id: &str, result: &ApplyResult) {
        self.clear();
        if self.quiet && result.is_success() {
            return;
        }
        let line = match result {
            ApplyResult::NoChange => format!("  {} {}", "○".dimmed(), id.dimmed()),
            ApplyResult::Created => format!("  {} {} {}", "✓".green(), id, "created".dimmed()),
            ApplyResult::Modified => format!("  {} {} {}", "✓".green(), id, "modified".dimmed()),
            ApplyResult::Removed => format!("  {} {} {}", "✓".green(), id, "removed".dimmed()),
            ApplyResult::Skipped { reason } => {
                format!("  {} {} {}", "⊘".yellow(), id, reason.dimmed())
            }
            ApplyResult::Failed { error } => format!("  {} {}: {}", "✗".red(), id, error.red()),
        };
        println!("{line}");
    }

    fn on_plan_complete(&mut self, _name: &str) {
        self.clear();
    }
}
