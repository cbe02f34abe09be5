/*!
# Contract VM CLI

Library half of the `cvm` binary: config loading, logging setup and the
`run`/`inspect` commands, kept here so they can be tested without a process.
*/

pub mod commands;
pub mod config;

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub use commands::{inspect, read_code, run, InspectArgs, InspectReport, RunArgs, RunReport};
pub use config::{CliConfig, LoggingConfig};

/// Installs the global subscriber; `RUST_LOG` wins over `default_level`
pub fn init_tracing(default_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("Invalid log level '{}': {}", default_level, e))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))
}
