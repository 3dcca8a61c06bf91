//! Output formatting

use console::{style, Term};
use serde::{Deserialize, Serialize};

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Writes command results to stdout
#[derive(Debug)]
pub struct Reporter {
    term: Term,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(false, false)
    }
}

impl Reporter {
    /// Create a new reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stdout(),
            use_color,
            quiet,
        }
    }

    /// Print a section header
    pub fn header(&self, title: &str) {
        if self.quiet {
            return;
        }
        let styled = if self.use_color {
            style(title).bold().underlined().to_string()
        } else {
            format!("=== {title} ===")
        };
        let _ = self.term.write_line(&styled);
    }

    /// Print an aligned `label: value` line
    pub fn field(&self, label: &str, value: impl std::fmt::Display) {
        if self.quiet {
            return;
        }
        let label = format!("{label}:");
        let label = if self.use_color {
            style(format!("{label:<16}")).cyan().to_string()
        } else {
            format!("{label:<16}")
        };
        let _ = self.term.write_line(&format!("{label}{value}"));
    }

    /// Print an indented list item
    pub fn item(&self, text: &str) {
        if self.quiet {
            return;
        }
        let _ = self.term.write_line(&format!("  {text}"));
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.quiet {
            return;
        }
        let prefix = if self.use_color {
            style("⚠").yellow().bold().to_string()
        } else {
            "WARN".to_string()
        };
        let _ = self.term.write_line(&format!("{prefix} {message}"));
    }

    /// Print a value as pretty JSON; printed even in quiet mode
    pub fn json<T: Serialize>(&self, value: &T) -> crate::CliResult<()> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| crate::CliError::invalid_argument(e.to_string()))?;
        self.term.write_line(&json)?;
        Ok(())
    }
}

/// Percentage of `part` in `whole`, 0 when `whole` is 0
#[must_use]
pub fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}
