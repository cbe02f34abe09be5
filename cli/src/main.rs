/*!
# cvm

Runs and inspects WASM contracts against an in-memory chain state.
*/

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cvm_cli::{inspect, run, CliConfig, InspectArgs, RunArgs};

#[derive(Parser)]
#[command(name = "cvm", about = "WASM contract VM command-line interface", version)]
struct Cli {
    /// TOML config with [vm] and [logging] sections
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Invoke a contract method and print the result with emitted events
    Run(RunArgs),

    /// List a module's imports and exported functions
    Inspect(InspectArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.as_deref())?;
    cvm_cli::init_tracing(&config.logging.level)?;

    let output = match &cli.command {
        Commands::Run(args) => {
            let report = run(args, &config.vm)?;
            let failed = !report.result.is_success;
            let text = serde_json::to_string_pretty(&report).context("Failed to serialize result")?;
            if failed {
                println!("{}", text);
                std::process::exit(1);
            }
            text
        }
        Commands::Inspect(args) => {
            let report = inspect(args, &config.vm)?;
            serde_json::to_string_pretty(&report).context("Failed to serialize report")?
        }
    };

    println!("{}", output);
    Ok(())
}
