//! # ME3000 Modbus - RTU client for Sofar ME3000 battery inverters
//!
//! Async Modbus-RTU client for the Sofar ME3000SP storage inverter on an
//! RS-485 bus. On top of the standard register reads it speaks the vendor's
//! "Write Passive Register" function, which forces the inverter to charge,
//! discharge or return to automatic mode.
//!
//! ## Features
//!
//! - **Exact framing**: stack-allocated PDU, CRC16/MODBUS ADU codec
//! - **Extensible dispatch**: function codes resolved through a
//!   [`FunctionRegistry`] built at startup, vendor codes included
//! - **Typed register map**: signed and unsigned readings decoded by name
//! - **Clear failure model**: transport, framing, malformed-response and
//!   device-exception failures are separate [`ModbusError`] variants
//! - **Compatibility view**: `(success, payload)` results for existing
//!   automation via [`InverterClient::compat`]
//!
//! ## Supported Function Codes
//!
//! | Code | Function | Client |
//! |------|----------|--------|
//! | 0x03 | Read Holding Registers | ✅ |
//! | 0x04 | Read Input Registers | ✅ |
//! | 0x42 | Write Passive Register (vendor) | ✅ |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(feature = "rtu")]
//! # async fn example() -> me3000_modbus::ModbusResult<()> {
//! use me3000_modbus::{InverterClient, InverterConfig};
//!
//! let mut client = InverterClient::open(InverterConfig::default());
//!
//! let holding = client.read_holding().await?;
//! println!("{} holding registers", holding.len());
//!
//! client.set_discharge(2000).await?;
//! client.set_auto().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Core modules
// ============================================================================

/// Core error types and result handling
pub mod error;

/// Protocol constants and serial defaults
pub mod constants;

/// Stack-allocated PDU
pub mod pdu;

/// Slave addressing, function codes, requests and responses
pub mod protocol;

/// RTU ADU framing and CRC16
pub mod rtu;

/// Function code codecs
pub mod functions;

/// Function code dispatch table
pub mod registry;

/// Serial transport layer
pub mod transport;

/// Inverter client façade
pub mod client;

/// `(success, payload)` compatibility view
pub mod compat;

// ============================================================================
// Device model
// ============================================================================

/// Register value types
pub mod value;

/// ME3000 register layout
pub mod register_map;

/// Inverter operating state
pub mod state;

/// Layered configuration
pub mod config;

// ============================================================================
// Re-exports for convenience
// ============================================================================

pub use tokio;

// === Client API ===
pub use client::InverterClient;
pub use compat::CompatClient;

// === Error handling ===
pub use error::{ModbusError, ModbusException, ModbusResult};

// === Core types ===
pub use protocol::{ModbusFunction, ModbusRequest, ModbusResponse, PassiveStatus, SlaveId};
pub use register_map::{ControlRegister, NamedValue, RegisterMap};
pub use state::InverterState;
pub use value::{ModbusValue, Signedness};

// === Configuration ===
pub use config::{InverterConfig, Parity, SerialConfig};

// === Dispatch and framing ===
pub use registry::{FunctionCodec, FunctionRegistry};
pub use rtu::{crc16, decode_adu, encode_adu};

// === Transport ===
pub use transport::{SerialTransport, TransportStats};

#[cfg(feature = "rtu")]
pub use transport::RtuTransport;

// === PDU (advanced usage) ===
pub use pdu::{ModbusPdu, PduBuilder};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library information
pub fn info() -> String {
    format!("ME3000 Modbus v{} - RTU client for Sofar ME3000 inverters", VERSION)
}
