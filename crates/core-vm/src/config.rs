use serde::{Deserialize, Serialize};
use wasmtime::{Config, Engine};

use crate::ConstructionError;

/// Size of one wasm linear-memory page
pub const WASM_PAGE_SIZE: usize = 64 * 1024;

/// Limits applied to every VM frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmConfig {
    /// Initial guest heap size in bytes
    #[serde(default = "default_heap_initial_size")]
    pub heap_initial_size: usize,
    /// Largest size the guest heap may grow to
    #[serde(default = "default_heap_max_size")]
    pub heap_max_size: usize,
    /// Instruction fuel available to one frame
    #[serde(default = "default_fuel_limit")]
    pub fuel_limit: u64,
    /// Gas charged to the meter on every host call
    #[serde(default = "default_host_call_gas")]
    pub host_call_gas: u64,
    /// Deepest allowed nesting of contract calls
    #[serde(default = "default_max_call_depth")]
    pub max_call_depth: u32,
    /// Longest guest string the host will read
    #[serde(default = "default_max_string_len")]
    pub max_string_len: usize,
}

fn default_heap_initial_size() -> usize {
    256 * 1024
}

fn default_heap_max_size() -> usize {
    16 * 1024 * 1024
}

fn default_fuel_limit() -> u64 {
    10_000_000
}

fn default_host_call_gas() -> u64 {
    10
}

fn default_max_call_depth() -> u32 {
    8
}

fn default_max_string_len() -> usize {
    1024 * 1024
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            heap_initial_size: default_heap_initial_size(),
            heap_max_size: default_heap_max_size(),
            fuel_limit: default_fuel_limit(),
            host_call_gas: default_host_call_gas(),
            max_call_depth: default_max_call_depth(),
            max_string_len: default_max_string_len(),
        }
    }
}

impl VmConfig {
    pub fn validate(&self) -> Result<(), ConstructionError> {
        let heap = self.heap_initial_size;
        if !heap.is_power_of_two() || heap % WASM_PAGE_SIZE != 0 {
            return Err(ConstructionError::InvalidConfig(format!(
                "heap_initial_size {} must be a power of two and a multiple of {}",
                heap, WASM_PAGE_SIZE
            )));
        }
        if self.heap_max_size < heap {
            return Err(ConstructionError::InvalidConfig(format!(
                "heap_max_size {} is smaller than heap_initial_size {}",
                self.heap_max_size, heap
            )));
        }
        // The heap sits inside a 32-bit address space
        if self.heap_max_size > u32::MAX as usize / 2 + 1 {
            return Err(ConstructionError::InvalidConfig(format!(
                "heap_max_size {} exceeds the 32-bit linear memory",
                self.heap_max_size
            )));
        }
        if self.fuel_limit == 0 {
            return Err(ConstructionError::InvalidConfig("fuel_limit must be positive".to_string()));
        }
        if self.max_string_len == 0 {
            return Err(ConstructionError::InvalidConfig(
                "max_string_len must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds a wasmtime engine with fuel metering enabled
    pub fn engine(&self) -> Result<Engine, ConstructionError> {
        let mut config = Config::new();
        config.consume_fuel(true);
        Engine::new(&config).map_err(|e| ConstructionError::Engine(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = VmConfig::default();
        config.validate().unwrap();
        assert_eq!(config.heap_initial_size, 256 * 1024);
        assert_eq!(config.max_call_depth, 8);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: VmConfig = serde_json::from_str(r#"{"fuel_limit": 500}"#).unwrap();
        assert_eq!(config.fuel_limit, 500);
        assert_eq!(config.host_call_gas, 10);
        assert_eq!(config.heap_max_size, 16 * 1024 * 1024);
    }

    #[test]
    fn test_validate_rejects_inconsistent_values() {
        let mut config = VmConfig::default();
        config.heap_initial_size = 100_000;
        assert!(matches!(config.validate(), Err(ConstructionError::InvalidConfig(_))));

        let mut config = VmConfig::default();
        config.heap_initial_size = 32 * 1024;
        assert!(config.validate().is_err());

        let mut config = VmConfig::default();
        config.heap_max_size = 64 * 1024;
        assert!(config.validate().is_err());

        let mut config = VmConfig::default();
        config.fuel_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_engine_builds() {
        assert!(VmConfig::default().engine().is_ok());
    }
}
