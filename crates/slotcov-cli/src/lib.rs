//! Slotcov CLI Library
//!
//! Command-line interface over the slotcov coverage engine.

#![warn(missing_docs)]

mod commands;
mod config;
mod error;
pub mod handlers;
pub mod logging;
mod output;

pub use commands::{
    Cli, ColorArg, Commands, FormatArg, InspectArgs, QueryArgs, RegistryArgs, StrategyArg,
};
pub use config::{load_coverage_config, CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use output::{OutputFormat, Reporter};
