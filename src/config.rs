//! Client configuration
//!
//! Layered with figment: built-in defaults, then an optional TOML file,
//! then `ME3000_`-prefixed environment variables (`__` separates nested
//! keys, e.g. `ME3000_SERIAL__PORT=/dev/ttyS1`).
//!
//! ```toml
//! slave_id = 1
//! packet_logging = false
//!
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud_rate = 9600
//! parity = "none"
//! timeout_ms = 1000
//! ```

use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{
    DEFAULT_BAUD_RATE, DEFAULT_FRAME_GAP_MS, DEFAULT_SERIAL_PORT, DEFAULT_TIMEOUT_MS,
};
use crate::error::{ModbusError, ModbusResult};
use crate::protocol::SlaveId;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "ME3000_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// Serial line settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
    /// Response timeout
    pub timeout_ms: u64,
    /// Inter-byte silence that ends a frame when its length is unknown
    pub frame_gap_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_SERIAL_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 1,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            frame_gap_ms: DEFAULT_FRAME_GAP_MS,
        }
    }
}

impl SerialConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn frame_gap(&self) -> Duration {
        Duration::from_millis(self.frame_gap_ms)
    }

    pub fn validate(&self) -> ModbusResult<()> {
        if self.port.trim().is_empty() {
            return Err(ModbusError::configuration("Serial port must not be empty"));
        }
        if self.baud_rate == 0 {
            return Err(ModbusError::configuration("Baud rate must be positive"));
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(ModbusError::configuration(format!(
                "Data bits {} outside 5..=8",
                self.data_bits
            )));
        }
        if !matches!(self.stop_bits, 1 | 2) {
            return Err(ModbusError::configuration(format!(
                "Stop bits must be 1 or 2, got {}",
                self.stop_bits
            )));
        }
        if self.timeout_ms == 0 {
            return Err(ModbusError::configuration("Timeout must be positive"));
        }
        if self.frame_gap_ms == 0 {
            return Err(ModbusError::configuration("Frame gap must be positive"));
        }
        Ok(())
    }
}

/// Everything needed to talk to one inverter
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InverterConfig {
    pub slave_id: SlaveId,
    /// Hex-dump every frame at info level
    pub packet_logging: bool,
    pub serial: SerialConfig,
}

impl InverterConfig {
    /// Defaults, overlaid with `path` (if given) and the environment.
    pub fn load(path: Option<&Path>) -> ModbusResult<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(InverterConfig::default()));

        if let Some(path) = path {
            if !path.exists() {
                return Err(ModbusError::configuration(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            debug!("Loading config from {}", path.display());
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::extract(figment)
    }

    /// Defaults overlaid with TOML text; no environment lookup.
    pub fn from_toml_str(toml: &str) -> ModbusResult<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(InverterConfig::default()))
            .merge(Toml::string(toml));
        Self::extract(figment)
    }

    fn extract(figment: Figment) -> ModbusResult<Self> {
        let config: Self = figment
            .extract()
            .map_err(|e| ModbusError::configuration(format!("Failed to load configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ModbusResult<()> {
        self.serial.validate()
    }
}
