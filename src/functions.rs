//! Codecs for the function codes the ME3000 understands
//!
//! | Code | Function | Request | Response |
//! |------|----------|---------|----------|
//! | 0x03 | Read Holding Registers | addr, qty | byte count, words |
//! | 0x04 | Read Input Registers | addr, qty | byte count, words |
//! | 0x42 | Write Passive Register | addr, i16 value | byte count (2), status |
//!
//! Each codec is a set of plain functions; [`FunctionRegistry`] binds them
//! to a function code.
//!
//! [`FunctionRegistry`]: crate::registry::FunctionRegistry

use crate::constants::{
    FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS, MAX_READ_REGISTERS,
    PASSIVE_RESPONSE_BYTE_COUNT,
};
use crate::error::{ModbusError, ModbusResult};
use crate::pdu::{ModbusPdu, PduBuilder};
use crate::protocol::{ModbusRequest, ModbusResponse, PassiveStatus};
use crate::registry::FunctionCodec;

/// FC03 codec
pub const READ_HOLDING_REGISTERS: FunctionCodec = FunctionCodec {
    name: "Read Holding Registers",
    build_request: build_read_registers,
    parse_response: parse_read_registers,
    response_len: read_registers_response_len,
};

/// FC04 codec
pub const READ_INPUT_REGISTERS: FunctionCodec = FunctionCodec {
    name: "Read Input Registers",
    build_request: build_read_registers,
    parse_response: parse_read_registers,
    response_len: read_registers_response_len,
};

/// FC66 codec (vendor extension)
pub const WRITE_PASSIVE_REGISTER: FunctionCodec = FunctionCodec {
    name: "Write Passive Register",
    build_request: build_write_passive,
    parse_response: parse_write_passive,
    response_len: write_passive_response_len,
};

// ============================================================================
// Read Holding / Input Registers
// ============================================================================

fn read_target(request: &ModbusRequest) -> ModbusResult<(u8, u16, u16)> {
    match *request {
        ModbusRequest::ReadHoldingRegisters { address, quantity } => {
            Ok((FC_READ_HOLDING_REGISTERS, address, quantity))
        }
        ModbusRequest::ReadInputRegisters { address, quantity } => {
            Ok((FC_READ_INPUT_REGISTERS, address, quantity))
        }
        _ => Err(ModbusError::invalid_value(format!(
            "Register read codec cannot encode {:?}",
            request
        ))),
    }
}

/// `fc, start address, quantity`
pub fn build_read_registers(request: &ModbusRequest) -> ModbusResult<ModbusPdu> {
    let (fc, address, quantity) = read_target(request)?;
    if quantity == 0 || quantity as usize > MAX_READ_REGISTERS {
        return Err(ModbusError::invalid_value(format!(
            "Register quantity {} outside 1..={}",
            quantity, MAX_READ_REGISTERS
        )));
    }
    if address.checked_add(quantity - 1).is_none() {
        return Err(ModbusError::invalid_value(format!(
            "Register range 0x{:04X} + {} overflows the address space",
            address, quantity
        )));
    }
    PduBuilder::build_read_request(fc, address, quantity)
}

/// `fc, byte count, words...`; byte count must be exactly `2 × quantity`.
pub fn parse_read_registers(
    request: &ModbusRequest,
    pdu: &ModbusPdu,
) -> ModbusResult<ModbusResponse> {
    let (_, _, quantity) = read_target(request)?;
    let expected = quantity as usize * 2;

    let byte_count = pdu
        .byte_at(1)
        .ok_or_else(|| ModbusError::malformed("Register response without byte count"))?
        as usize;

    if byte_count != expected {
        return Err(ModbusError::malformed(format!(
            "Byte count {} does not match {} registers (expected {})",
            byte_count, quantity, expected
        )));
    }
    if pdu.len() != 2 + byte_count {
        return Err(ModbusError::malformed(format!(
            "Register response carries {} data bytes, byte count says {}",
            pdu.len().saturating_sub(2),
            byte_count
        )));
    }

    let words = pdu.as_slice()[2..]
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    Ok(ModbusResponse::Registers(words))
}

/// Expected response PDU length
pub fn read_registers_response_len(request: &ModbusRequest) -> Option<usize> {
    read_target(request)
        .ok()
        .map(|(_, _, quantity)| 2 + quantity as usize * 2)
}

// ============================================================================
// Write Passive Register (0x42)
// ============================================================================

/// `0x42, address, value`; the value must fit a signed 16-bit register.
pub fn build_write_passive(request: &ModbusRequest) -> ModbusResult<ModbusPdu> {
    let ModbusRequest::WritePassiveRegister { address, value } = *request else {
        return Err(ModbusError::invalid_value(format!(
            "Passive register codec cannot encode {:?}",
            request
        )));
    };

    let value = i16::try_from(value).map_err(|_| {
        ModbusError::invalid_value(format!(
            "Passive register value {} outside {}..={}",
            value,
            i16::MIN,
            i16::MAX
        ))
    })?;

    PduBuilder::build_write_passive_register(address, value)
}

/// `0x42, 0x02, status_hi, status_lo`
pub fn parse_write_passive(
    _request: &ModbusRequest,
    pdu: &ModbusPdu,
) -> ModbusResult<ModbusResponse> {
    if pdu.len() != 4 {
        return Err(ModbusError::malformed(format!(
            "Passive register response must be 4 bytes, got {}",
            pdu.len()
        )));
    }

    let byte_count = pdu.byte_at(1).unwrap_or_default();
    if byte_count != PASSIVE_RESPONSE_BYTE_COUNT {
        return Err(ModbusError::malformed(format!(
            "Passive register response byte count {} (expected {})",
            byte_count, PASSIVE_RESPONSE_BYTE_COUNT
        )));
    }

    let status = pdu.u16_at(2).unwrap_or_default();
    Ok(ModbusResponse::PassiveStatus(PassiveStatus(status)))
}

pub fn write_passive_response_len(_request: &ModbusRequest) -> Option<usize> {
    Some(4)
}
