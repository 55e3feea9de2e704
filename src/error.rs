//! Error types for the ME3000 Modbus client
//!
//! Every failure the client can produce is one variant of [`ModbusError`].
//! The variants fall into two groups:
//!
//! - **Transport failures** (`Timeout`, `Io`, `Connection`, `Frame`,
//!   `MalformedResponse`, `Exception`, `Rejected`): the exchange with the
//!   device did not produce a usable answer. The compatibility façade turns
//!   these into `success = false`.
//! - **Caller errors** (`InvalidValue`, `UnsupportedFunction`,
//!   `Configuration`): detected before any byte is written to the bus.

use std::fmt;

use thiserror::Error;

use crate::constants::{
    EXCEPTION_ACKNOWLEDGE, EXCEPTION_GATEWAY_PATH_UNAVAILABLE, EXCEPTION_GATEWAY_TARGET_FAILED,
    EXCEPTION_ILLEGAL_DATA_ADDRESS, EXCEPTION_ILLEGAL_DATA_VALUE, EXCEPTION_ILLEGAL_FUNCTION,
    EXCEPTION_MEMORY_PARITY_ERROR, EXCEPTION_SERVER_DEVICE_BUSY, EXCEPTION_SERVER_DEVICE_FAILURE,
};

/// Result alias used throughout the crate.
pub type ModbusResult<T> = Result<T, ModbusError>;

/// Errors raised while talking to the inverter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModbusError {
    /// No (complete) response arrived within the read timeout.
    #[error("Timeout during {operation} after {timeout_ms} ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// The serial port reported an I/O failure.
    #[error("I/O error: {message}")]
    Io { message: String },

    /// The serial port could not be opened or is unusable.
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// CRC mismatch or a frame with an impossible size.
    #[error("Frame error: {message}")]
    Frame { message: String },

    /// The frame was intact but its content does not match the request.
    #[error("Malformed response: {message}")]
    MalformedResponse { message: String },

    /// The device answered with a Modbus exception response.
    #[error("Device exception for function 0x{function:02X}: {} (code 0x{code:02X})", exception_of(.code))]
    Exception { function: u8, code: u8 },

    /// The device accepted the frame but refused the passive-register command.
    #[error("Device rejected passive command: status 0x{status:04X}")]
    Rejected { status: u16 },

    /// A caller-supplied value cannot be encoded.
    #[error("Invalid value: {message}")]
    InvalidValue { message: String },

    /// A register value is outside the range its decoder understands.
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// No codec is registered for the function code.
    #[error("Unsupported function code: 0x{code:02X}")]
    UnsupportedFunction { code: u8 },

    /// Invalid configuration (slave id, serial settings, registry setup).
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl ModbusError {
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn frame(message: impl Into<String>) -> Self {
        Self::Frame {
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    pub fn exception(function: u8, code: u8) -> Self {
        Self::Exception { function, code }
    }

    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::InvalidValue {
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    pub fn unsupported_function(code: u8) -> Self {
        Self::UnsupportedFunction { code }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// True for failures of the exchange itself. These never escape the
    /// compatibility façade; they become `success = false`.
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::Io { .. }
                | Self::Connection { .. }
                | Self::Frame { .. }
                | Self::MalformedResponse { .. }
                | Self::Exception { .. }
                | Self::Rejected { .. }
        )
    }

    /// True for errors caused by the caller, raised before any I/O.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidValue { .. } | Self::UnsupportedFunction { .. } | Self::Configuration { .. }
        )
    }

    /// Worth retrying: the bus may simply have been noisy or busy.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Frame { .. } | Self::Io { .. } => true,
            Self::Exception { code, .. } => matches!(
                ModbusException::from_code(*code),
                ModbusException::ServerDeviceBusy | ModbusException::Acknowledge
            ),
            _ => false,
        }
    }

    /// Standard exception kind when this is a device exception.
    pub fn exception_kind(&self) -> Option<ModbusException> {
        match self {
            Self::Exception { code, .. } => Some(ModbusException::from_code(*code)),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ModbusError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::TimedOut {
            Self::timeout("serial I/O", 0)
        } else {
            Self::io(err.to_string())
        }
    }
}

fn exception_of(code: &u8) -> ModbusException {
    ModbusException::from_code(*code)
}

/// Exception codes a Modbus server may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModbusException {
    IllegalFunction,
    IllegalDataAddress,
    IllegalDataValue,
    ServerDeviceFailure,
    Acknowledge,
    ServerDeviceBusy,
    MemoryParityError,
    GatewayPathUnavailable,
    GatewayTargetFailed,
    /// Vendor specific or undefined code.
    Unknown(u8),
}

impl ModbusException {
    pub fn from_code(code: u8) -> Self {
        match code {
            EXCEPTION_ILLEGAL_FUNCTION => Self::IllegalFunction,
            EXCEPTION_ILLEGAL_DATA_ADDRESS => Self::IllegalDataAddress,
            EXCEPTION_ILLEGAL_DATA_VALUE => Self::IllegalDataValue,
            EXCEPTION_SERVER_DEVICE_FAILURE => Self::ServerDeviceFailure,
            EXCEPTION_ACKNOWLEDGE => Self::Acknowledge,
            EXCEPTION_SERVER_DEVICE_BUSY => Self::ServerDeviceBusy,
            EXCEPTION_MEMORY_PARITY_ERROR => Self::MemoryParityError,
            EXCEPTION_GATEWAY_PATH_UNAVAILABLE => Self::GatewayPathUnavailable,
            EXCEPTION_GATEWAY_TARGET_FAILED => Self::GatewayTargetFailed,
            other => Self::Unknown(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::IllegalFunction => EXCEPTION_ILLEGAL_FUNCTION,
            Self::IllegalDataAddress => EXCEPTION_ILLEGAL_DATA_ADDRESS,
            Self::IllegalDataValue => EXCEPTION_ILLEGAL_DATA_VALUE,
            Self::ServerDeviceFailure => EXCEPTION_SERVER_DEVICE_FAILURE,
            Self::Acknowledge => EXCEPTION_ACKNOWLEDGE,
            Self::ServerDeviceBusy => EXCEPTION_SERVER_DEVICE_BUSY,
            Self::MemoryParityError => EXCEPTION_MEMORY_PARITY_ERROR,
            Self::GatewayPathUnavailable => EXCEPTION_GATEWAY_PATH_UNAVAILABLE,
            Self::GatewayTargetFailed => EXCEPTION_GATEWAY_TARGET_FAILED,
            Self::Unknown(code) => code,
        }
    }
}

impl fmt::Display for ModbusException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::IllegalFunction => "illegal function",
            Self::IllegalDataAddress => "illegal data address",
            Self::IllegalDataValue => "illegal data value",
            Self::ServerDeviceFailure => "server device failure",
            Self::Acknowledge => "acknowledge",
            Self::ServerDeviceBusy => "server device busy",
            Self::MemoryParityError => "memory parity error",
            Self::GatewayPathUnavailable => "gateway path unavailable",
            Self::GatewayTargetFailed => "gateway target failed to respond",
            Self::Unknown(_) => "unknown exception",
        };
        f.write_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exception_code_mapping() {
        for code in 0u8..=0x0F {
            assert_eq!(ModbusException::from_code(code).code(), code);
        }
        assert_eq!(
            ModbusException::from_code(0x02),
            ModbusException::IllegalDataAddress
        );
        assert_eq!(
            ModbusException::from_code(0x03),
            ModbusException::IllegalDataValue
        );
        assert_eq!(ModbusException::from_code(0x07), ModbusException::Unknown(0x07));
    }

    #[test]
    fn test_error_classification() {
        assert!(ModbusError::timeout("read", 1000).is_transport_error());
        assert!(ModbusError::frame("crc").is_transport_error());
        assert!(ModbusError::malformed("count").is_transport_error());
        assert!(ModbusError::exception(0x42, 0x02).is_transport_error());
        assert!(ModbusError::Rejected { status: 0x0001 }.is_transport_error());

        assert!(ModbusError::invalid_value("too big").is_caller_error());
        assert!(ModbusError::unsupported_function(0x41).is_caller_error());
        assert!(!ModbusError::invalid_value("too big").is_transport_error());
        assert!(!ModbusError::decode("state 9").is_transport_error());
        assert!(!ModbusError::decode("state 9").is_caller_error());
    }

    #[test]
    fn test_retryable() {
        assert!(ModbusError::timeout("read", 1000).is_retryable());
        assert!(ModbusError::exception(0x03, 0x06).is_retryable());
        assert!(!ModbusError::exception(0x03, 0x02).is_retryable());
        assert!(!ModbusError::invalid_value("x").is_retryable());
    }

    #[test]
    fn test_exception_display() {
        let err = ModbusError::exception(0x42, 0x02);
        assert_eq!(
            err.to_string(),
            "Device exception for function 0x42: illegal data address (code 0x02)"
        );
        assert_eq!(
            err.exception_kind(),
            Some(ModbusException::IllegalDataAddress)
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let err: ModbusError = std::io::Error::new(std::io::ErrorKind::TimedOut, "t").into();
        assert!(matches!(err, ModbusError::Timeout { .. }));

        let err: ModbusError = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone").into();
        assert!(matches!(err, ModbusError::Io { .. }));
    }
}
