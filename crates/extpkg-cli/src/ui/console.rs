//! Line-oriented progress output for `extpkg configure`.

use crossterm::style::Stylize;
use extpkg_core::{Reporter, Step};
use extpkg_schema::PackageName;

const NAME_WIDTH: usize = 12;

/// [`Reporter`] printing one line per event.
///
/// Progress goes to stdout; failures and warnings go to stderr so that
/// `--json` output stays parseable.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleReporter {
    quiet: bool,
    /// Send progress to stderr as well, keeping stdout for the report.
    to_stderr: bool,
}

impl ConsoleReporter {
    pub fn new(quiet: bool, to_stderr: bool) -> Self {
        Self { quiet, to_stderr }
    }

    fn progress(&self, line: &str) {
        if self.quiet {
            return;
        }
        if self.to_stderr {
            eprintln!("{line}");
        } else {
            println!("{line}");
        }
    }
}

fn name_col(name: &PackageName) -> String {
    format!("{:<width$}", name.as_str(), width = NAME_WIDTH)
}

impl Reporter for ConsoleReporter {
    fn section(&self, title: &str) {
        self.progress("");
        self.progress(&title.bold().to_string());
    }

    fn skipped(&self, name: &PackageName) {
        let line = format!("  {} {}", name_col(name), "not requested");
        self.progress(&line.dark_grey().to_string());
    }

    fn probing(&self, name: &PackageName) {
        self.progress(&format!(
            "  {} {}",
            name_col(name).white(),
            "searching...".dark_grey()
        ));
    }

    fn found(&self, name: &PackageName, detail: &str) {
        self.progress(&format!(
            "  {} {} {}",
            name_col(name).white(),
            "found".green(),
            detail.dark_grey()
        ));
    }

    fn step(&self, name: &PackageName, step: Step, detail: &str) {
        self.progress(&format!(
            "  {} {:<10} {}",
            name_col(name).white(),
            step.as_str().cyan(),
            detail.dark_grey()
        ));
    }

    fn installed(&self, name: &PackageName, detail: &str) {
        self.progress(&format!(
            "  {} {} {}",
            name_col(name).white(),
            "installed".green(),
            detail.dark_grey()
        ));
    }

    fn failed(&self, name: &PackageName, reason: &str) {
        let first = reason.lines().next().unwrap_or_default();
        eprintln!("  {} {} {}", name_col(name).white(), "FAILED".red(), first);
    }

    fn warning(&self, msg: &str) {
        eprintln!("{} {msg}", "warning:".yellow());
    }
}
