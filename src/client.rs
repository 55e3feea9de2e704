//! Inverter client
//!
//! [`InverterClient`] composes the function registry, the RTU framing and a
//! [`SerialTransport`] into the operations an energy manager needs:
//!
//! | Operation | Function | Register |
//! |-----------|----------|----------|
//! | `read_holding()` | 0x03 | 0x0200, 69 words |
//! | `read_input()` | 0x04 | 0x10B0, 13 words |
//! | `get_inverter_state()` | 0x03 | 0x0200 |
//! | `get_battery_percentage()` | 0x03 | 0x0210 |
//! | `set_discharge(w)` | 0x42 | 0x0101 |
//! | `set_charge(w)` | 0x42 | 0x0102 |
//! | `set_auto()` | 0x42 | 0x0103 |
//!
//! Every operation takes `&mut self`, so only one exchange is ever on the
//! bus. Nothing is retried here; the caller decides.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! # #[cfg(feature = "rtu")]
//! # async fn example() -> me3000_modbus::ModbusResult<()> {
//! use me3000_modbus::{InverterClient, InverterConfig};
//!
//! let config = InverterConfig::load(None)?;
//! let mut client = InverterClient::open(config);
//!
//! let state = client.get_inverter_state().await?;
//! let battery = client.get_battery_percentage().await?;
//! println!("{} at {}%", state, battery);
//!
//! client.set_charge(1500).await?;
//! client.disconnect().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::compat::CompatClient;
use crate::config::InverterConfig;
use crate::constants::{
    EXCEPTION_FLAG, MAX_RTU_FRAME_SIZE, RTU_EXCEPTION_FRAME_SIZE, RTU_FRAMING_OVERHEAD,
};
use crate::error::{ModbusError, ModbusResult};
use crate::protocol::{ModbusRequest, ModbusResponse, PassiveStatus, SlaveId};
use crate::register_map::{
    ControlRegister, NamedValue, RegisterMap, BATTERY_PERCENTAGE, INVERTER_STATE,
};
use crate::registry::FunctionRegistry;
use crate::rtu::{decode_adu, encode_adu, log_packet};
use crate::state::InverterState;
use crate::transport::{SerialTransport, TransportStats};
use crate::value::ModbusValue;

#[cfg(feature = "rtu")]
use crate::transport::RtuTransport;

/// A full-length exception ADU is complete even though it is shorter than
/// the expected reply.
fn is_exception_frame(frame: &[u8]) -> bool {
    frame.len() == RTU_EXCEPTION_FRAME_SIZE && frame[1] & EXCEPTION_FLAG != 0
}

/// Client for one ME3000 inverter on a serial bus.
pub struct InverterClient<T: SerialTransport> {
    transport: T,
    config: InverterConfig,
    registry: Arc<FunctionRegistry>,
    map: RegisterMap,
}

#[cfg(feature = "rtu")]
impl InverterClient<RtuTransport> {
    /// Client on the configured serial port. The port is opened by the
    /// first request or an explicit [`connect`](Self::connect).
    pub fn open(config: InverterConfig) -> Self {
        let transport = RtuTransport::new(config.serial.clone());
        Self::new(transport, config)
    }
}

impl<T: SerialTransport> InverterClient<T> {
    /// Client with the standard ME3000 function set.
    pub fn new(transport: T, config: InverterConfig) -> Self {
        Self::with_registry(transport, config, Arc::new(FunctionRegistry::standard()))
    }

    /// Client with a caller-built registry, e.g. one carrying extra vendor
    /// function codes.
    pub fn with_registry(
        transport: T,
        config: InverterConfig,
        registry: Arc<FunctionRegistry>,
    ) -> Self {
        Self {
            transport,
            config,
            registry,
            map: RegisterMap::ME3000,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn config(&self) -> &InverterConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }

    pub fn register_map(&self) -> &RegisterMap {
        &self.map
    }

    pub fn slave_id(&self) -> SlaveId {
        self.config.slave_id
    }

    pub fn set_packet_logging(&mut self, enabled: bool) {
        self.config.packet_logging = enabled;
    }

    /// Boolean-plus-payload view of this client.
    pub fn compat(&mut self) -> CompatClient<'_, T> {
        CompatClient::new(self)
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Open the transport. Calling it while connected does nothing.
    pub async fn connect(&mut self) -> ModbusResult<()> {
        if self.transport.is_connected() {
            return Ok(());
        }
        self.transport.connect().await?;
        info!(
            "Connected to inverter (slave {}) on {}",
            self.config.slave_id, self.config.serial.port
        );
        Ok(())
    }

    /// Close the transport. Calling it while disconnected does nothing.
    pub async fn disconnect(&mut self) -> ModbusResult<()> {
        if !self.transport.is_connected() {
            return Ok(());
        }
        self.transport.disconnect().await?;
        info!("Disconnected from inverter (slave {})", self.config.slave_id);
        Ok(())
    }

    pub fn stats(&self) -> TransportStats {
        self.transport.get_stats()
    }

    /// Send one request and decode the reply.
    ///
    /// Encoding happens first, so an unknown function code or a value the
    /// codec rejects never reaches the bus.
    pub async fn execute(&mut self, request: &ModbusRequest) -> ModbusResult<ModbusResponse> {
        let pdu = self.registry.encode(request)?;
        let frame = encode_adu(self.config.slave_id, &pdu)?;
        let expected = self
            .registry
            .response_len(request)?
            .map(|len| len + RTU_FRAMING_OVERHEAD);

        debug!("Request {:?} encoded as {:?}", request, pdu);

        let result = match self.connect().await {
            Ok(()) => self.exchange(request, &frame, expected).await,
            Err(e) => Err(e),
        };

        if let Err(ref e) = result {
            warn!(
                "Function 0x{:02X} to slave {} failed: {}",
                request.function_code(),
                self.config.slave_id,
                e
            );
        }
        result
    }

    async fn exchange(
        &mut self,
        request: &ModbusRequest,
        frame: &[u8],
        expected: Option<usize>,
    ) -> ModbusResult<ModbusResponse> {
        let slave_id = self.config.slave_id;
        let timeout = self.config.serial.timeout();

        if self.config.packet_logging {
            log_packet("send", frame, slave_id);
        }
        self.transport.write(frame).await?;

        let reply = self
            .transport
            .read(expected.unwrap_or(MAX_RTU_FRAME_SIZE), timeout)
            .await?;

        if reply.is_empty() {
            return Err(ModbusError::timeout(
                "read response",
                timeout.as_millis() as u64,
            ));
        }
        if self.config.packet_logging {
            log_packet("receive", &reply, slave_id);
        }

        let (address, pdu) = match decode_adu(&reply) {
            Ok(decoded) => decoded,
            // Bytes stopped arriving mid-frame
            Err(_)
                if expected.is_some_and(|len| reply.len() < len)
                    && !is_exception_frame(&reply) =>
            {
                return Err(ModbusError::timeout(
                    format!("incomplete frame ({} bytes)", reply.len()),
                    timeout.as_millis() as u64,
                ));
            }
            Err(e) => return Err(e),
        };

        if address != slave_id.get() {
            return Err(ModbusError::malformed(format!(
                "Reply from slave {}, expected {}",
                address, slave_id
            )));
        }

        debug!("Response PDU {:?}", pdu);
        self.registry.decode(request, &pdu)
    }

    async fn read_registers(&mut self, request: ModbusRequest) -> ModbusResult<Vec<u16>> {
        self.execute(&request).await?.into_registers()
    }

    /// Full holding block (0x0200, 69 registers) in address order.
    pub async fn read_holding(&mut self) -> ModbusResult<Vec<u16>> {
        let request = self.map.holding.request()?;
        self.read_registers(request).await
    }

    /// Full input block (0x10B0, 13 registers) in address order.
    pub async fn read_input(&mut self) -> ModbusResult<Vec<u16>> {
        let request = self.map.input.request()?;
        self.read_registers(request).await
    }

    /// Every named holding register, decoded with its signedness.
    pub async fn read_telemetry(&mut self) -> ModbusResult<Vec<NamedValue>> {
        let words = self.read_holding().await?;
        self.map.decode_block(&self.map.holding, &words)
    }

    /// Raw word of one named register, read on its own.
    pub async fn read_raw_register(&mut self, name: &str) -> ModbusResult<u16> {
        let request = self.map.read_request(name)?;
        let words = self.read_registers(request).await?;
        words
            .first()
            .copied()
            .ok_or_else(|| ModbusError::malformed("Empty register response"))
    }

    /// One named register, decoded with its signedness.
    pub async fn read_register(&mut self, name: &str) -> ModbusResult<ModbusValue> {
        let raw = self.read_raw_register(name).await?;
        Ok(self.map.register(name)?.decode(raw))
    }

    pub async fn get_inverter_state(&mut self) -> ModbusResult<InverterState> {
        let raw = self.read_raw_register(INVERTER_STATE).await?;
        InverterState::try_from(raw)
    }

    /// State of charge in percent, as reported. No range check is applied.
    pub async fn get_battery_percentage(&mut self) -> ModbusResult<u16> {
        self.read_raw_register(BATTERY_PERCENTAGE).await
    }

    /// Write a passive control register. A status word whose low byte is
    /// non-zero is returned as [`ModbusError::Rejected`].
    pub async fn write_control(
        &mut self,
        register: ControlRegister,
        value: i32,
    ) -> ModbusResult<PassiveStatus> {
        let status = self
            .execute(&register.request(value))
            .await?
            .into_passive_status()?;

        if !status.is_accepted() {
            warn!(
                "Inverter refused {} = {}: status {}",
                register, value, status
            );
            return Err(ModbusError::Rejected {
                status: status.word(),
            });
        }

        info!("{} set to {}", register, value);
        Ok(status)
    }

    /// Return to automatic (self-consumption) mode.
    pub async fn set_auto(&mut self) -> ModbusResult<PassiveStatus> {
        self.write_control(ControlRegister::Auto, 0).await
    }

    pub async fn set_charge(&mut self, watts: i32) -> ModbusResult<PassiveStatus> {
        self.write_control(ControlRegister::Charge, watts).await
    }

    pub async fn set_discharge(&mut self, watts: i32) -> ModbusResult<PassiveStatus> {
        self.write_control(ControlRegister::Discharge, watts).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::registry::FunctionCodec;
    use crate::rtu::crc16;
    use crate::transport::mock::ScriptedTransport;

    /// Frame `body` (address + PDU) with a valid CRC.
    pub(crate) fn framed(body: &[u8]) -> Vec<u8> {
        let mut frame = body.to_vec();
        frame.extend_from_slice(&crc16(body).to_le_bytes());
        frame
    }

    pub(crate) fn registers_reply(fc: u8, words: &[u16]) -> Vec<u8> {
        let mut body = vec![0x01, fc, (words.len() * 2) as u8];
        for word in words {
            body.extend_from_slice(&word.to_be_bytes());
        }
        framed(&body)
    }

    pub(crate) fn client(transport: ScriptedTransport) -> InverterClient<ScriptedTransport> {
        InverterClient::new(transport, InverterConfig::default())
    }

    #[tokio::test]
    async fn test_set_auto_frame_and_status() {
        let mut client = client(ScriptedTransport::new().reply(framed(&[0x01, 0x42, 0x02, 0x00, 0x00])));

        let status = client.set_auto().await.unwrap();
        assert_eq!(status, PassiveStatus(0));

        let written = &client.transport().written;
        assert_eq!(written.len(), 1);
        assert_eq!(written[0], framed(&[0x01, 0x42, 0x01, 0x03, 0x00, 0x00]));
        assert_eq!(client.transport().last_read_len, Some(7));
    }

    #[tokio::test]
    async fn test_set_charge_and_discharge_frames() {
        let ok = framed(&[0x01, 0x42, 0x02, 0x00, 0x00]);
        let mut client = client(ScriptedTransport::new().reply(ok.clone()).reply(ok));

        client.set_charge(3000).await.unwrap();
        client.set_discharge(-1).await.unwrap();

        let written = &client.transport().written;
        assert_eq!(written[0], framed(&[0x01, 0x42, 0x01, 0x02, 0x0B, 0xB8]));
        assert_eq!(written[1], framed(&[0x01, 0x42, 0x01, 0x01, 0xFF, 0xFF]));
    }

    #[tokio::test]
    async fn test_out_of_range_charge_writes_nothing() {
        let mut client = client(ScriptedTransport::new());

        let err = client.set_charge(40_000).await.unwrap_err();
        assert!(matches!(err, ModbusError::InvalidValue { .. }));
        assert!(err.is_caller_error());
        assert!(client.transport().written.is_empty());
        assert_eq!(client.transport().connects, 0);
    }

    #[tokio::test]
    async fn test_rejected_status() {
        let mut client = client(ScriptedTransport::new().reply(framed(&[0x01, 0x42, 0x02, 0x01, 0x03])));

        let err = client.set_discharge(2000).await.unwrap_err();
        assert_eq!(err, ModbusError::Rejected { status: 0x0103 });
    }

    #[tokio::test]
    async fn test_high_byte_only_status_is_accepted() {
        let mut client = client(ScriptedTransport::new().reply(framed(&[0x01, 0x42, 0x02, 0x01, 0x00])));
        assert_eq!(client.set_auto().await.unwrap(), PassiveStatus(0x0100));
    }

    #[tokio::test]
    async fn test_read_holding_block() {
        let words: Vec<u16> = (0..69).collect();
        let mut client = client(ScriptedTransport::new().reply(registers_reply(0x03, &words)));

        assert_eq!(client.read_holding().await.unwrap(), words);
        assert_eq!(
            client.transport().written[0],
            framed(&[0x01, 0x03, 0x02, 0x00, 0x00, 0x45])
        );
        assert_eq!(client.transport().last_read_len, Some(3 + 2 + 138));
    }

    #[tokio::test]
    async fn test_read_input_block() {
        let words = vec![0xFFFF; 13];
        let mut client = client(ScriptedTransport::new().reply(registers_reply(0x04, &words)));

        assert_eq!(client.read_input().await.unwrap(), words);
        assert_eq!(
            client.transport().written[0],
            framed(&[0x01, 0x04, 0x10, 0xB0, 0x00, 0x0D])
        );
    }

    #[tokio::test]
    async fn test_holding_wrong_byte_count_is_malformed() {
        // 68 registers where 69 were requested
        let mut reply_body = vec![0x01, 0x03, 136];
        reply_body.extend(std::iter::repeat(0).take(136));

        let mut client = client(ScriptedTransport::new().reply(framed(&reply_body)));
        let err = client.read_holding().await.unwrap_err();
        assert!(matches!(err, ModbusError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_inverter_state() {
        let mut client = client(
            ScriptedTransport::new()
                .reply(registers_reply(0x03, &[2]))
                .reply(registers_reply(0x03, &[9])),
        );

        assert_eq!(client.get_inverter_state().await.unwrap(), InverterState::Charge);
        assert_eq!(
            client.transport().written[0],
            framed(&[0x01, 0x03, 0x02, 0x00, 0x00, 0x01])
        );

        let err = client.get_inverter_state().await.unwrap_err();
        assert!(matches!(err, ModbusError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_battery_percentage() {
        let mut client = client(ScriptedTransport::new().reply(registers_reply(0x03, &[87])));
        assert_eq!(client.get_battery_percentage().await.unwrap(), 87);
        assert_eq!(
            client.transport().written[0],
            framed(&[0x01, 0x03, 0x02, 0x10, 0x00, 0x01])
        );
    }

    #[tokio::test]
    async fn test_read_telemetry_signed_values() {
        let mut words = vec![0u16; 69];
        words[0x07] = 0xFF9C;
        words[0x10] = 55;
        let mut client = client(ScriptedTransport::new().reply(registers_reply(0x03, &words)));

        let values = client.read_telemetry().await.unwrap();
        let current = values.iter().find(|v| v.name == "grid_current").unwrap();
        assert_eq!(current.value, ModbusValue::I16(-100));
        let soc = values.iter().find(|v| v.name == BATTERY_PERCENTAGE).unwrap();
        assert_eq!(soc.value, ModbusValue::U16(55));
    }

    #[tokio::test]
    async fn test_no_reply_is_timeout() {
        let mut client = client(ScriptedTransport::new());
        let err = client.set_auto().await.unwrap_err();
        assert!(matches!(err, ModbusError::Timeout { .. }));
        assert_eq!(client.stats().timeouts, 1);
    }

    #[tokio::test]
    async fn test_incomplete_frame_is_timeout() {
        let full = framed(&[0x01, 0x42, 0x02, 0x00, 0x00]);
        let mut client = client(ScriptedTransport::new().reply(&full[..4]));
        let err = client.set_auto().await.unwrap_err();
        assert!(matches!(err, ModbusError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_corrupted_frame_is_frame_error() {
        let mut corrupted = framed(&[0x01, 0x42, 0x02, 0x00, 0x00]);
        corrupted[4] ^= 0x10;
        let mut client = client(ScriptedTransport::new().reply(corrupted));
        let err = client.set_auto().await.unwrap_err();
        assert!(matches!(err, ModbusError::Frame { .. }));
    }

    #[tokio::test]
    async fn test_corrupted_exception_reply_is_frame_error() {
        let mut corrupted = framed(&[0x01, 0xC2, 0x02]);
        corrupted[4] ^= 0x01;
        let mut client = client(ScriptedTransport::new().reply(corrupted));
        let err = client.set_auto().await.unwrap_err();
        assert!(matches!(err, ModbusError::Frame { .. }));
        assert_eq!(client.stats().timeouts, 0);
    }

    #[tokio::test]
    async fn test_read_single_signed_register() {
        let mut client = client(ScriptedTransport::new().reply(registers_reply(0x03, &[0xFF9C])));
        let value = client.read_register("grid_current").await.unwrap();
        assert_eq!(value, ModbusValue::I16(-100));
        assert_eq!(
            client.transport().written[0],
            framed(&[0x01, 0x03, 0x02, 0x07, 0x00, 0x01])
        );
    }

    #[tokio::test]
    async fn test_exception_reply() {
        let mut client = client(ScriptedTransport::new().reply(framed(&[0x01, 0xC2, 0x03])));
        let err = client.set_charge(100).await.unwrap_err();
        assert_eq!(err, ModbusError::exception(0x42, 0x03));
    }

    #[tokio::test]
    async fn test_reply_from_other_slave() {
        let mut client = client(ScriptedTransport::new().reply(framed(&[0x02, 0x42, 0x02, 0x00, 0x00])));
        let err = client.set_auto().await.unwrap_err();
        assert!(matches!(err, ModbusError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let mut client = client(ScriptedTransport::new().reply_err(ModbusError::io("unplugged")));
        let err = client.read_input().await.unwrap_err();
        assert!(matches!(err, ModbusError::Io { .. }));
    }

    #[tokio::test]
    async fn test_lazy_connect_and_idempotent_lifecycle() {
        let ok = framed(&[0x01, 0x42, 0x02, 0x00, 0x00]);
        let mut client = client(ScriptedTransport::new().reply(ok.clone()).reply(ok));
        assert!(!client.is_connected());

        client.set_auto().await.unwrap();
        assert!(client.is_connected());
        client.connect().await.unwrap();
        assert_eq!(client.transport().connects, 1);

        client.disconnect().await.unwrap();
        client.disconnect().await.unwrap();
        assert!(!client.is_connected());

        client.set_auto().await.unwrap();
        assert_eq!(client.transport().connects, 2);
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let transport = ScriptedTransport {
            refuse_connect: true,
            ..ScriptedTransport::new()
        };
        let mut client = client(transport);
        let err = client.get_battery_percentage().await.unwrap_err();
        assert!(matches!(err, ModbusError::Connection { .. }));
        assert!(client.transport().written.is_empty());
    }

    #[tokio::test]
    async fn test_custom_function_through_registry() {
        fn build(request: &ModbusRequest) -> ModbusResult<crate::pdu::ModbusPdu> {
            let ModbusRequest::Custom { function, data } = request else {
                return Err(ModbusError::invalid_value("custom only"));
            };
            let mut pdu = crate::pdu::ModbusPdu::new();
            pdu.push(*function)?;
            pdu.extend(data)?;
            Ok(pdu)
        }
        fn parse(request: &ModbusRequest, pdu: &crate::pdu::ModbusPdu) -> ModbusResult<ModbusResponse> {
            Ok(ModbusResponse::Custom {
                function: request.function_code(),
                data: pdu.payload().to_vec(),
            })
        }

        let mut registry = FunctionRegistry::standard();
        registry
            .register(
                0x41,
                FunctionCodec {
                    name: "Vendor Probe",
                    build_request: build,
                    parse_response: parse,
                    response_len: |_| Some(3),
                },
            )
            .unwrap();

        let transport = ScriptedTransport::new().reply(framed(&[0x01, 0x41, 0x07, 0x08]));
        let mut client =
            InverterClient::with_registry(transport, InverterConfig::default(), Arc::new(registry));

        let request = ModbusRequest::Custom {
            function: 0x41,
            data: vec![0x07],
        };
        let response = client.execute(&request).await.unwrap();
        assert_eq!(
            response,
            ModbusResponse::Custom {
                function: 0x41,
                data: vec![0x07, 0x08]
            }
        );
        assert_eq!(client.transport().written[0], framed(&[0x01, 0x41, 0x07]));
        assert_eq!(client.transport().last_read_len, Some(6));
    }

    #[tokio::test]
    async fn test_unregistered_function_writes_nothing() {
        let mut client = client(ScriptedTransport::new());
        let request = ModbusRequest::Custom {
            function: 0x41,
            data: vec![],
        };
        assert!(matches!(
            client.execute(&request).await,
            Err(ModbusError::UnsupportedFunction { code: 0x41 })
        ));
        assert!(client.transport().written.is_empty());
    }

    #[tokio::test]
    async fn test_non_default_slave_id() {
        let config = InverterConfig {
            slave_id: SlaveId::new(7).unwrap(),
            ..InverterConfig::default()
        };
        let transport = ScriptedTransport::new().reply(framed(&[0x07, 0x42, 0x02, 0x00, 0x00]));
        let mut client = InverterClient::new(transport, config);

        client.set_auto().await.unwrap();
        assert_eq!(client.transport().written[0][0], 0x07);
    }
}
