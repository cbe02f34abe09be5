use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use cvm_core_vm::VmConfig;
use serde::{Deserialize, Serialize};

/// `[logging]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

/// Contents of the CLI's TOML config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub vm: VmConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl CliConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: CliConfig = toml::from_str(text).context("Failed to parse config")?;
        config.vm.validate().context("Invalid [vm] section")?;
        Ok(config)
    }

    /// Reads `path`; no path means defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                Self::from_toml(&text)
            }
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_sections_use_defaults() {
        let config = CliConfig::from_toml("[vm]\nfuel_limit = 500\n").unwrap();
        assert_eq!(config.vm.fuel_limit, 500);
        assert_eq!(config.vm.max_call_depth, VmConfig::default().max_call_depth);
        assert_eq!(config.logging.level, "info");

        assert_eq!(CliConfig::from_toml("").unwrap(), CliConfig::default());
    }

    #[test]
    fn test_invalid_vm_section_is_rejected() {
        assert!(CliConfig::from_toml("[vm]\nheap_initial_size = 1000\n").is_err());
        assert!(CliConfig::from_toml("[logging]\nlevel = 3\n").is_err());
    }
}
