//! Modbus RTU ADU framing
//!
//! ```text
//! +---------+----------------------+-----------+-----------+
//! | address | PDU (fc + payload)   | CRC low   | CRC high  |
//! +---------+----------------------+-----------+-----------+
//! ```
//!
//! CRC16/MODBUS: reflected polynomial 0xA001, initial value 0xFFFF,
//! computed over address and PDU, transmitted low byte first.

use crc::{Crc, CRC_16_MODBUS};
use tracing::info;

use crate::constants::{MAX_RTU_FRAME_SIZE, MIN_RTU_FRAME_SIZE};
use crate::error::{ModbusError, ModbusResult};
use crate::pdu::ModbusPdu;
use crate::protocol::SlaveId;

/// CRC calculator for RTU
const CRC_MODBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// CRC16/MODBUS of `data`
#[inline]
pub fn crc16(data: &[u8]) -> u16 {
    CRC_MODBUS.checksum(data)
}

/// Wrap a PDU into an RTU frame.
pub fn encode_adu(slave_id: SlaveId, pdu: &ModbusPdu) -> ModbusResult<Vec<u8>> {
    if pdu.is_empty() {
        return Err(ModbusError::invalid_value("Cannot frame an empty PDU"));
    }

    let mut frame = Vec::with_capacity(pdu.len() + 3);
    frame.push(slave_id.get());
    frame.extend_from_slice(pdu.as_slice());

    if frame.len() + 2 > MAX_RTU_FRAME_SIZE {
        return Err(ModbusError::invalid_value(format!(
            "RTU frame would be {} bytes (max {})",
            frame.len() + 2,
            MAX_RTU_FRAME_SIZE
        )));
    }

    let crc = crc16(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    Ok(frame)
}

/// Validate an RTU frame and split it into slave address and PDU.
///
/// The address is returned raw so the caller can report a reply from the
/// wrong slave instead of a framing error.
pub fn decode_adu(frame: &[u8]) -> ModbusResult<(u8, ModbusPdu)> {
    if frame.len() < MIN_RTU_FRAME_SIZE {
        return Err(ModbusError::frame(format!(
            "RTU frame too short: {} bytes (min {})",
            frame.len(),
            MIN_RTU_FRAME_SIZE
        )));
    }
    if frame.len() > MAX_RTU_FRAME_SIZE {
        return Err(ModbusError::frame(format!(
            "RTU frame too large: {} bytes (max {})",
            frame.len(),
            MAX_RTU_FRAME_SIZE
        )));
    }

    let data_len = frame.len() - 2;
    let received_crc = u16::from_le_bytes([frame[data_len], frame[data_len + 1]]);
    let calculated_crc = crc16(&frame[..data_len]);

    if received_crc != calculated_crc {
        return Err(ModbusError::frame(format!(
            "CRC mismatch: expected 0x{:04X}, got 0x{:04X}",
            calculated_crc, received_crc
        )));
    }

    let pdu = ModbusPdu::from_slice(&frame[1..data_len])?;
    Ok((frame[0], pdu))
}

/// Format raw bytes as hex string for packet logging
pub fn format_hex_packet(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Log a raw frame at info level
pub fn log_packet(direction: &str, data: &[u8], slave_id: SlaveId) {
    info!(
        "[MODBUS-RTU] {} slave:{} {}",
        direction,
        slave_id,
        format_hex_packet(data)
    );
}
