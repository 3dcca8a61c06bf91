//! Slotcov CLI: inspect recordings and registries, query per-test coverage
//!
//! ## Usage
//!
//! ```bash
//! slotcov inspect target/recordings/ShopTest.adds-0.slice
//! slotcov registry target/slotcov/registry.json
//! slotcov query --registry registry.json --recordings target/recordings --file Cart.java
//! ```

use clap::Parser;
use slotcov_cli::handlers::{run_inspect, run_query, run_registry};
use slotcov_cli::logging::init_logging;
use slotcov_cli::{Cli, CliConfig, CliResult, ColorChoice, Commands, Verbosity};
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let config = build_config(&cli);
    init_logging(config.verbosity);

    match cli.command {
        Commands::Inspect(args) => run_inspect(&config, &args),
        Commands::Registry(args) => run_registry(&config, &args),
        Commands::Query(args) => run_query(&config, &args),
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let verbosity = if cli.quiet {
        Verbosity::Quiet
    } else {
        match cli.verbose {
            0 => Verbosity::Normal,
            1 => Verbosity::Verbose,
            _ => Verbosity::Debug,
        }
    };

    let color: ColorChoice = cli.color.into();

    CliConfig::new().with_verbosity(verbosity).with_color(color)
}
