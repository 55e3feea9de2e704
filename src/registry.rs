//! Function code registry
//!
//! Maps a function code to the pair of pure functions that encode its
//! request PDU and decode its response PDU. The registry is an ordinary
//! value: build it once at startup, add vendor codes with
//! [`FunctionRegistry::register`], then hand it to the client.
//!
//! ```rust
//! use me3000_modbus::registry::{FunctionCodec, FunctionRegistry};
//! use me3000_modbus::{ModbusPdu, ModbusRequest, ModbusResponse, ModbusResult};
//!
//! fn build(request: &ModbusRequest) -> ModbusResult<ModbusPdu> {
//!     let mut pdu = ModbusPdu::new();
//!     pdu.push(request.function_code())?;
//!     Ok(pdu)
//! }
//!
//! fn parse(_: &ModbusRequest, pdu: &ModbusPdu) -> ModbusResult<ModbusResponse> {
//!     Ok(ModbusResponse::Custom { function: 0x41, data: pdu.payload().to_vec() })
//! }
//!
//! let mut registry = FunctionRegistry::standard();
//! registry
//!     .register(0x41, FunctionCodec { name: "Vendor Probe", build_request: build, parse_response: parse, response_len: |_| None })
//!     .unwrap();
//! assert!(registry.contains(0x41));
//! ```

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::constants::{
    EXCEPTION_FLAG, FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS, FC_WRITE_PASSIVE_REGISTER,
};
use crate::error::{ModbusError, ModbusResult};
use crate::functions;
use crate::pdu::ModbusPdu;
use crate::protocol::{ModbusRequest, ModbusResponse};

/// Encoder/decoder pair for one function code.
#[derive(Clone, Copy)]
pub struct FunctionCodec {
    /// Human-readable name used in logs
    pub name: &'static str,
    /// Request → PDU. Must reject values it cannot encode.
    pub build_request: fn(&ModbusRequest) -> ModbusResult<ModbusPdu>,
    /// Response PDU → response. Only called for a non-exception PDU whose
    /// function code matches the request.
    pub parse_response: fn(&ModbusRequest, &ModbusPdu) -> ModbusResult<ModbusResponse>,
    /// Expected response PDU length, when it is known in advance.
    pub response_len: fn(&ModbusRequest) -> Option<usize>,
}

impl fmt::Debug for FunctionCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionCodec")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Function code → codec table.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    codecs: HashMap<u8, FunctionCodec>,
}

impl FunctionRegistry {
    /// An empty registry. Every request fails until codecs are registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the codes the ME3000 speaks: 0x03, 0x04 and 0x42.
    pub fn standard() -> Self {
        let mut codecs = HashMap::new();
        codecs.insert(FC_READ_HOLDING_REGISTERS, functions::READ_HOLDING_REGISTERS);
        codecs.insert(FC_READ_INPUT_REGISTERS, functions::READ_INPUT_REGISTERS);
        codecs.insert(FC_WRITE_PASSIVE_REGISTER, functions::WRITE_PASSIVE_REGISTER);
        Self { codecs }
    }

    /// Add or replace the codec for `code`, returning the previous one.
    ///
    /// Code 0 is invalid and codes with the high bit set are reserved for
    /// exception responses.
    pub fn register(
        &mut self,
        code: u8,
        codec: FunctionCodec,
    ) -> ModbusResult<Option<FunctionCodec>> {
        if code == 0 || code & EXCEPTION_FLAG != 0 {
            return Err(ModbusError::configuration(format!(
                "Function code 0x{:02X} cannot be registered",
                code
            )));
        }
        debug!("Registering function 0x{:02X} ({})", code, codec.name);
        Ok(self.codecs.insert(code, codec))
    }

    pub fn get(&self, code: u8) -> ModbusResult<&FunctionCodec> {
        self.codecs
            .get(&code)
            .ok_or_else(|| ModbusError::unsupported_function(code))
    }

    pub fn contains(&self, code: u8) -> bool {
        self.codecs.contains_key(&code)
    }

    /// Registered codes in ascending order
    pub fn codes(&self) -> Vec<u8> {
        let mut codes: Vec<u8> = self.codecs.keys().copied().collect();
        codes.sort_unstable();
        codes
    }

    /// Encode `request` into a PDU. Fails before any I/O for unknown codes
    /// and unencodable values.
    pub fn encode(&self, request: &ModbusRequest) -> ModbusResult<ModbusPdu> {
        let code = request.function_code();
        let codec = self.get(code)?;
        let pdu = (codec.build_request)(request)?;

        if pdu.function_code() != Some(code) {
            return Err(ModbusError::configuration(format!(
                "Codec '{}' produced function code {:?} for request 0x{:02X}",
                codec.name,
                pdu.function_code(),
                code
            )));
        }
        Ok(pdu)
    }

    /// Expected response PDU length for `request`, if the codec knows it.
    pub fn response_len(&self, request: &ModbusRequest) -> ModbusResult<Option<usize>> {
        let codec = self.get(request.function_code())?;
        Ok((codec.response_len)(request))
    }

    /// Decode a response PDU, classifying exception responses and function
    /// mismatches before handing it to the codec.
    pub fn decode(&self, request: &ModbusRequest, pdu: &ModbusPdu) -> ModbusResult<ModbusResponse> {
        let code = request.function_code();
        let codec = self.get(code)?;

        let received = pdu
            .function_code()
            .ok_or_else(|| ModbusError::malformed("Empty response PDU"))?;

        if received & EXCEPTION_FLAG != 0 {
            let function = received & !EXCEPTION_FLAG;
            if function != code {
                return Err(ModbusError::malformed(format!(
                    "Exception for function 0x{:02X} in reply to 0x{:02X}",
                    function, code
                )));
            }
            let exception = pdu
                .byte_at(1)
                .ok_or_else(|| ModbusError::malformed("Exception response without code"))?;
            return Err(ModbusError::exception(function, exception));
        }

        if received != code {
            return Err(ModbusError::malformed(format!(
                "Function code mismatch: expected 0x{:02X}, got 0x{:02X}",
                code, received
            )));
        }

        (codec.parse_response)(request, pdu)
    }
}
