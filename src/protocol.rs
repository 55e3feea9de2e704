//! Modbus protocol definitions: slave addressing, function codes and the
//! logical request/response values exchanged with the function registry.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_SLAVE_ID, FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS,
    FC_WRITE_PASSIVE_REGISTER, MAX_SLAVE_ID, MIN_SLAVE_ID,
};
use crate::error::{ModbusError, ModbusResult};

/// Unicast slave address, always within 1..=247.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct SlaveId(u8);

impl SlaveId {
    pub fn new(id: u8) -> ModbusResult<Self> {
        if (MIN_SLAVE_ID..=MAX_SLAVE_ID).contains(&id) {
            Ok(Self(id))
        } else {
            Err(ModbusError::configuration(format!(
                "Slave id {} outside {}..={}",
                id, MIN_SLAVE_ID, MAX_SLAVE_ID
            )))
        }
    }

    #[inline]
    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for SlaveId {
    fn default() -> Self {
        Self(DEFAULT_SLAVE_ID)
    }
}

impl TryFrom<u8> for SlaveId {
    type Error = ModbusError;

    fn try_from(id: u8) -> ModbusResult<Self> {
        Self::new(id)
    }
}

impl From<SlaveId> for u8 {
    fn from(id: SlaveId) -> u8 {
        id.0
    }
}

impl fmt::Display for SlaveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Function codes known to this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModbusFunction {
    ReadHoldingRegisters,
    ReadInputRegisters,
    WritePassiveRegister,
    /// Any other code, handled by a registry entry added at startup.
    Custom(u8),
}

impl ModbusFunction {
    pub fn from_u8(code: u8) -> Self {
        match code {
            FC_READ_HOLDING_REGISTERS => Self::ReadHoldingRegisters,
            FC_READ_INPUT_REGISTERS => Self::ReadInputRegisters,
            FC_WRITE_PASSIVE_REGISTER => Self::WritePassiveRegister,
            other => Self::Custom(other),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::ReadHoldingRegisters => FC_READ_HOLDING_REGISTERS,
            Self::ReadInputRegisters => FC_READ_INPUT_REGISTERS,
            Self::WritePassiveRegister => FC_WRITE_PASSIVE_REGISTER,
            Self::Custom(code) => code,
        }
    }
}

impl fmt::Display for ModbusFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.to_u8())
    }
}

/// A logical request, before PDU encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModbusRequest {
    ReadHoldingRegisters { address: u16, quantity: u16 },
    ReadInputRegisters { address: u16, quantity: u16 },
    /// `value` is what the caller asked for; the encoder rejects anything
    /// outside the signed 16-bit range instead of truncating it.
    WritePassiveRegister { address: u16, value: i32 },
    Custom { function: u8, data: Vec<u8> },
}

impl ModbusRequest {
    pub fn function(&self) -> ModbusFunction {
        match self {
            Self::ReadHoldingRegisters { .. } => ModbusFunction::ReadHoldingRegisters,
            Self::ReadInputRegisters { .. } => ModbusFunction::ReadInputRegisters,
            Self::WritePassiveRegister { .. } => ModbusFunction::WritePassiveRegister,
            Self::Custom { function, .. } => ModbusFunction::from_u8(*function),
        }
    }

    #[inline]
    pub fn function_code(&self) -> u8 {
        self.function().to_u8()
    }
}

/// A decoded response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModbusResponse {
    /// Register words in address order.
    Registers(Vec<u16>),
    /// Status word of a passive-register write.
    PassiveStatus(PassiveStatus),
    Custom { function: u8, data: Vec<u8> },
}

impl ModbusResponse {
    pub fn into_registers(self) -> ModbusResult<Vec<u16>> {
        match self {
            Self::Registers(words) => Ok(words),
            other => Err(ModbusError::malformed(format!(
                "Expected register data, got {:?}",
                other
            ))),
        }
    }

    pub fn into_passive_status(self) -> ModbusResult<PassiveStatus> {
        match self {
            Self::PassiveStatus(status) => Ok(status),
            other => Err(ModbusError::malformed(format!(
                "Expected passive status, got {:?}",
                other
            ))),
        }
    }
}

/// Status word returned by the inverter for a passive-register write.
///
/// The low byte is the device's result code: 0 means the command was
/// accepted, anything else is a refusal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PassiveStatus(pub u16);

impl PassiveStatus {
    #[inline]
    pub fn word(self) -> u16 {
        self.0
    }

    #[inline]
    pub fn error_code(self) -> u8 {
        (self.0 & 0x00FF) as u8
    }

    #[inline]
    pub fn is_accepted(self) -> bool {
        self.error_code() == 0
    }
}

impl fmt::Display for PassiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slave_id_range() {
        assert!(SlaveId::new(0).is_err());
        assert_eq!(SlaveId::new(1).unwrap().get(), 1);
        assert_eq!(SlaveId::new(247).unwrap().get(), 247);
        assert!(SlaveId::new(248).is_err());
        assert!(SlaveId::try_from(255).is_err());
        assert_eq!(SlaveId::default().get(), 1);
    }

    #[test]
    fn test_function_code_mapping() {
        assert_eq!(ModbusFunction::from_u8(0x42), ModbusFunction::WritePassiveRegister);
        assert_eq!(ModbusFunction::from_u8(0x41), ModbusFunction::Custom(0x41));
        assert_eq!(ModbusFunction::WritePassiveRegister.to_u8(), 66);

        let request = ModbusRequest::WritePassiveRegister {
            address: 0x0103,
            value: 0,
        };
        assert_eq!(request.function_code(), 0x42);
    }

    #[test]
    fn test_passive_status() {
        assert!(PassiveStatus(0x0000).is_accepted());
        assert!(PassiveStatus(0x0100).is_accepted());
        let refused = PassiveStatus(0x0003);
        assert!(!refused.is_accepted());
        assert_eq!(refused.error_code(), 3);
        assert_eq!(refused.to_string(), "0x0003");
    }

    #[test]
    fn test_response_accessors() {
        let words = ModbusResponse::Registers(vec![1, 2]).into_registers().unwrap();
        assert_eq!(words, vec![1, 2]);
        assert!(ModbusResponse::PassiveStatus(PassiveStatus(0))
            .into_registers()
            .is_err());
    }
}
