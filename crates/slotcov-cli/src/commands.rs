//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use slotcov::CoverageStrategy;
use std::path::PathBuf;

/// Slotcov: per-test source coverage from slot recordings
#[derive(Parser, Debug)]
#[command(name = "slotcov")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the header and hit summary of one recording
    Inspect(InspectArgs),

    /// Show a saved registry's version and slot layout
    Registry(RegistryArgs),

    /// Ingest a directory of recordings and report aggregate coverage
    Query(QueryArgs),
}

/// Arguments for the inspect command
#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// Recording file
    pub recording: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: FormatArg,
}

/// Arguments for the registry command
#[derive(Parser, Debug)]
pub struct RegistryArgs {
    /// Registry JSON file
    pub registry: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: FormatArg,
}

/// Arguments for the query command
#[derive(Parser, Debug)]
pub struct QueryArgs {
    /// Registry JSON file
    #[arg(long)]
    pub registry: PathBuf,

    /// Directory holding per-test recordings
    #[arg(long)]
    pub recordings: PathBuf,

    /// Coverage config file (JSON or YAML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Per-test coverage strategy, overriding the config file
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,

    /// Recording cache budget in bytes (sampling strategy)
    #[arg(long)]
    pub cache_budget: Option<u64>,

    /// List the tests covering this file (name or path)
    #[arg(long)]
    pub file: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: FormatArg,
}

/// Color argument
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

/// Strategy argument
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrategyArg {
    /// Keep every bit-vector in memory
    InMemory,
    /// Sample index plus disk-backed bit-vectors
    Sampling,
}

impl From<StrategyArg> for CoverageStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::InMemory => Self::InMemory,
            StrategyArg::Sampling => Self::Sampling,
        }
    }
}

/// Output format argument
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FormatArg {
    /// Human-readable text
    #[default]
    Text,
    /// JSON
    Json,
}

impl From<FormatArg> for crate::output::OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => Self::Text,
            FormatArg::Json => Self::Json,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::config::ColorChoice;

    #[test]
    fn test_parse_query() {
        let cli = Cli::try_parse_from([
            "slotcov",
            "-vv",
            "query",
            "--registry",
            "reg.json",
            "--recordings",
            "rec",
            "--strategy",
            "sampling",
            "--cache-budget",
            "1024",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Commands::Query(args) = cli.command else {
            panic!("expected query");
        };
        assert_eq!(args.strategy, Some(StrategyArg::Sampling));
        assert_eq!(args.cache_budget, Some(1024));
        assert!(args.file.is_none());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["slotcov", "inspect", "a.slice", "-q", "--color", "never"])
            .unwrap();
        assert!(cli.quiet);
        assert_eq!(ColorChoice::from(cli.color), ColorChoice::Never);
    }

    #[test]
    fn test_strategy_conversion() {
        assert_eq!(
            CoverageStrategy::from(StrategyArg::InMemory),
            CoverageStrategy::InMemory
        );
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["slotcov"]).is_err());
    }
}
