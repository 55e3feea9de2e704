//! # Register Values
//!
//! The wire only carries undistinguished 16-bit words. Whether a word is a
//! signed reading (current, power flow) or an unsigned one (voltage,
//! percentage, state code) is decided by the register map entry, expressed
//! here as [`Signedness`].
//!
//! # Example
//!
//! ```rust
//! use me3000_modbus::{ModbusValue, Signedness};
//!
//! let current = ModbusValue::from_register(0xFF9C, Signedness::Signed);
//! assert_eq!(current, ModbusValue::I16(-100));
//! assert_eq!(current.as_i64(), -100);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// How a raw register word is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signedness {
    /// Plain `u16`
    Unsigned,
    /// Two's complement `i16`
    Signed,
}

/// A decoded register value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModbusValue {
    /// Unsigned 16-bit integer (1 register)
    U16(u16),
    /// Signed 16-bit integer (1 register)
    I16(i16),
}

impl ModbusValue {
    /// Interpret a raw word according to `signedness`.
    #[inline]
    pub fn from_register(raw: u16, signedness: Signedness) -> Self {
        match signedness {
            Signedness::Unsigned => ModbusValue::U16(raw),
            Signedness::Signed => ModbusValue::I16(raw as i16),
        }
    }

    /// The raw word as it travels on the wire.
    #[inline]
    pub fn to_register(self) -> u16 {
        match self {
            ModbusValue::U16(v) => v,
            ModbusValue::I16(v) => v as u16,
        }
    }

    #[inline]
    pub fn as_i64(self) -> i64 {
        match self {
            ModbusValue::U16(v) => i64::from(v),
            ModbusValue::I16(v) => i64::from(v),
        }
    }

    #[inline]
    pub fn as_f64(self) -> f64 {
        match self {
            ModbusValue::U16(v) => f64::from(v),
            ModbusValue::I16(v) => f64::from(v),
        }
    }

    #[inline]
    pub fn signedness(self) -> Signedness {
        match self {
            ModbusValue::U16(_) => Signedness::Unsigned,
            ModbusValue::I16(_) => Signedness::Signed,
        }
    }

    /// Returns the type name as a string for logging/debugging.
    pub fn type_name(self) -> &'static str {
        match self {
            ModbusValue::U16(_) => "u16",
            ModbusValue::I16(_) => "i16",
        }
    }
}

impl fmt::Display for ModbusValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModbusValue::U16(v) => write!(f, "{}", v),
            ModbusValue::I16(v) => write!(f, "{}", v),
        }
    }
}

impl Default for ModbusValue {
    fn default() -> Self {
        ModbusValue::U16(0)
    }
}

impl From<u16> for ModbusValue {
    fn from(v: u16) -> Self {
        ModbusValue::U16(v)
    }
}

impl From<i16> for ModbusValue {
    fn from(v: i16) -> Self {
        ModbusValue::I16(v)
    }
}
