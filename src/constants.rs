//! Modbus RTU and ME3000 protocol constants
//!
//! Frame limits follow the Modbus serial line specification:
//! - Maximum RTU ADU: 256 bytes
//! - Maximum PDU: 256 - slave address (1) - CRC (2) = 253 bytes
//!
//! The passive-register function code is a vendor extension and has no
//! meaning outside ME3000-class firmware.

// ============================================================================
// Frame Size Constants
// ============================================================================

/// Maximum PDU (Protocol Data Unit) size
/// RS485 ADU (256 bytes) - Slave Address (1 byte) - CRC (2 bytes) = 253 bytes
pub const MAX_PDU_SIZE: usize = 253;

/// Maximum RTU frame: address + PDU + CRC
pub const MAX_RTU_FRAME_SIZE: usize = 1 + MAX_PDU_SIZE + 2;

/// Smallest RTU frame that can carry anything: address + function code + CRC
pub const MIN_RTU_FRAME_SIZE: usize = 4;

/// Length of an exception response ADU: address + fc|0x80 + code + CRC
pub const RTU_EXCEPTION_FRAME_SIZE: usize = 5;

/// Bytes of framing around the PDU in an RTU ADU
pub const RTU_FRAMING_OVERHEAD: usize = 3;

// ============================================================================
// Slave Addressing
// ============================================================================

/// Lowest unicast slave address
pub const MIN_SLAVE_ID: u8 = 1;

/// Highest unicast slave address (248-255 are reserved)
pub const MAX_SLAVE_ID: u8 = 247;

// ============================================================================
// Register Operation Limits
// ============================================================================

/// Maximum number of registers for FC03/FC04 (Read Holding/Input Registers)
///
/// Response PDU: fc (1) + byte count (1) + N × 2 ≤ 253, so N ≤ 125
pub const MAX_READ_REGISTERS: usize = 125;

// ============================================================================
// Modbus Function Codes
// ============================================================================

/// Read Holding Registers (FC03)
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;

/// Read Input Registers (FC04)
pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;

/// Write Passive Register (FC66, vendor extension)
///
/// Request:  fc (1) + register address (2, BE) + value (2, signed BE)
/// Response: fc (1) + byte count (1, always 2) + status (2, BE)
pub const FC_WRITE_PASSIVE_REGISTER: u8 = 0x42;

/// Bit set on the function code of an exception response
pub const EXCEPTION_FLAG: u8 = 0x80;

/// Byte count carried by every passive-register response
pub const PASSIVE_RESPONSE_BYTE_COUNT: u8 = 2;

// ============================================================================
// Modbus Exception Codes
// ============================================================================

/// Illegal Function
pub const EXCEPTION_ILLEGAL_FUNCTION: u8 = 0x01;

/// Illegal Data Address
pub const EXCEPTION_ILLEGAL_DATA_ADDRESS: u8 = 0x02;

/// Illegal Data Value
pub const EXCEPTION_ILLEGAL_DATA_VALUE: u8 = 0x03;

/// Server Device Failure
pub const EXCEPTION_SERVER_DEVICE_FAILURE: u8 = 0x04;

/// Acknowledge
pub const EXCEPTION_ACKNOWLEDGE: u8 = 0x05;

/// Server Device Busy
pub const EXCEPTION_SERVER_DEVICE_BUSY: u8 = 0x06;

/// Memory Parity Error
pub const EXCEPTION_MEMORY_PARITY_ERROR: u8 = 0x08;

/// Gateway Path Unavailable
pub const EXCEPTION_GATEWAY_PATH_UNAVAILABLE: u8 = 0x0A;

/// Gateway Target Device Failed to Respond
pub const EXCEPTION_GATEWAY_TARGET_FAILED: u8 = 0x0B;

// ============================================================================
// Serial Defaults (ME3000 RS485 port)
// ============================================================================

/// Default serial device
pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyUSB0";

/// Default baud rate
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default read timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Default inter-byte silence that ends a response frame, in milliseconds
pub const DEFAULT_FRAME_GAP_MS: u64 = 50;

/// Default slave address of the inverter
pub const DEFAULT_SLAVE_ID: u8 = 0x01;
