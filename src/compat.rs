//! Boolean-plus-payload view of [`InverterClient`]
//!
//! Existing automation scripts expect every call to answer "did it work"
//! alongside a payload instead of an error value. [`CompatClient`] keeps
//! that contract on top of the typed API:
//!
//! | Operation | Success | Failure |
//! |-----------|---------|---------|
//! | `set_auto` / `set_charge` / `set_discharge` | `(true, status)` | `(false, 0)`, or `(false, status)` when the inverter refused |
//! | `read_holding` / `read_input` | `(true, words)` | `(false, [])` |
//! | `get_inverter_state` | `(true, raw, Some(state))` | `(false, -1, None)`, or `(false, raw, None)` for an unknown state |
//! | `get_battery_percentage` | `(true, value)` | `(false, -1)` |
//!
//! Caller errors (a value that cannot be encoded, an unknown function
//! code, bad configuration) are still returned as `Err`; nothing was sent.

use tracing::warn;

use crate::client::InverterClient;
use crate::error::{ModbusError, ModbusResult};
use crate::protocol::PassiveStatus;
use crate::register_map::{BATTERY_PERCENTAGE, INVERTER_STATE};
use crate::state::InverterState;
use crate::transport::SerialTransport;

/// Raw value reported when a read produced nothing.
pub const FAILURE_SENTINEL: i32 = -1;

/// Borrowed compatibility view, see [`InverterClient::compat`].
pub struct CompatClient<'a, T: SerialTransport> {
    client: &'a mut InverterClient<T>,
}

/// Split a typed result into "hard" caller errors and a degraded value.
fn degrade<V>(result: ModbusResult<V>) -> ModbusResult<Result<V, ModbusError>> {
    match result {
        Ok(value) => Ok(Ok(value)),
        Err(e) if e.is_caller_error() => Err(e),
        Err(e) => Ok(Err(e)),
    }
}

fn control_outcome(result: ModbusResult<PassiveStatus>) -> ModbusResult<(bool, u16)> {
    Ok(match degrade(result)? {
        Ok(status) => (true, status.word()),
        Err(ModbusError::Rejected { status }) => (false, status),
        Err(_) => (false, 0),
    })
}

impl<'a, T: SerialTransport> CompatClient<'a, T> {
    pub fn new(client: &'a mut InverterClient<T>) -> Self {
        Self { client }
    }

    pub async fn set_auto(&mut self) -> ModbusResult<(bool, u16)> {
        control_outcome(self.client.set_auto().await)
    }

    pub async fn set_charge(&mut self, watts: i32) -> ModbusResult<(bool, u16)> {
        control_outcome(self.client.set_charge(watts).await)
    }

    pub async fn set_discharge(&mut self, watts: i32) -> ModbusResult<(bool, u16)> {
        control_outcome(self.client.set_discharge(watts).await)
    }

    pub async fn read_holding(&mut self) -> ModbusResult<(bool, Vec<u16>)> {
        Ok(match degrade(self.client.read_holding().await)? {
            Ok(words) => (true, words),
            Err(_) => (false, Vec::new()),
        })
    }

    pub async fn read_input(&mut self) -> ModbusResult<(bool, Vec<u16>)> {
        Ok(match degrade(self.client.read_input().await)? {
            Ok(words) => (true, words),
            Err(_) => (false, Vec::new()),
        })
    }

    pub async fn get_inverter_state(
        &mut self,
    ) -> ModbusResult<(bool, i32, Option<InverterState>)> {
        let raw = match degrade(self.client.read_raw_register(INVERTER_STATE).await)? {
            Ok(raw) => raw,
            Err(_) => return Ok((false, FAILURE_SENTINEL, None)),
        };

        match InverterState::try_from(raw) {
            Ok(state) => Ok((true, i32::from(raw), Some(state))),
            Err(e) => {
                warn!("{}", e);
                Ok((false, i32::from(raw), None))
            }
        }
    }

    pub async fn get_battery_percentage(&mut self) -> ModbusResult<(bool, i32)> {
        Ok(
            match degrade(self.client.read_raw_register(BATTERY_PERCENTAGE).await)? {
                Ok(value) => (true, i32::from(value)),
                Err(_) => (false, FAILURE_SENTINEL),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::{client, framed, registers_reply};
    use crate::transport::mock::ScriptedTransport;

    #[tokio::test]
    async fn test_control_success() {
        let mut client = client(ScriptedTransport::new().reply(framed(&[0x01, 0x42, 0x02, 0x00, 0x00])));
        assert_eq!(client.compat().set_auto().await.unwrap(), (true, 0));
    }

    #[tokio::test]
    async fn test_control_transport_failure() {
        let mut client = client(
            ScriptedTransport::new()
                .reply(framed(&[0x01, 0xC2, 0x02]))
                .reply_err(ModbusError::io("unplugged")),
        );
        let mut compat = client.compat();
        assert_eq!(compat.set_charge(500).await.unwrap(), (false, 0));
        assert_eq!(compat.set_discharge(500).await.unwrap(), (false, 0));
        assert_eq!(compat.set_auto().await.unwrap(), (false, 0));
    }

    #[tokio::test]
    async fn test_control_rejection_keeps_status() {
        let mut client = client(ScriptedTransport::new().reply(framed(&[0x01, 0x42, 0x02, 0x00, 0x04])));
        assert_eq!(client.compat().set_charge(500).await.unwrap(), (false, 4));
    }

    #[tokio::test]
    async fn test_caller_error_still_propagates() {
        let mut client = client(ScriptedTransport::new());
        let err = client.compat().set_discharge(i32::MAX).await.unwrap_err();
        assert!(matches!(err, ModbusError::InvalidValue { .. }));
        assert!(client.transport().written.is_empty());
    }

    #[tokio::test]
    async fn test_bulk_reads() {
        let words = vec![7u16; 13];
        let mut client = client(ScriptedTransport::new().reply(registers_reply(0x04, &words)));
        let mut compat = client.compat();

        assert_eq!(compat.read_input().await.unwrap(), (true, words));
        assert_eq!(compat.read_holding().await.unwrap(), (false, vec![]));
    }

    #[tokio::test]
    async fn test_state_outcomes() {
        let mut client = client(
            ScriptedTransport::new()
                .reply(registers_reply(0x03, &[4]))
                .reply(registers_reply(0x03, &[9])),
        );
        let mut compat = client.compat();

        assert_eq!(
            compat.get_inverter_state().await.unwrap(),
            (true, 4, Some(InverterState::Discharge))
        );
        assert_eq!(compat.get_inverter_state().await.unwrap(), (false, 9, None));
        assert_eq!(compat.get_inverter_state().await.unwrap(), (false, -1, None));
    }

    #[tokio::test]
    async fn test_battery_outcomes() {
        let mut client = client(ScriptedTransport::new().reply(registers_reply(0x03, &[101])));
        let mut compat = client.compat();

        assert_eq!(compat.get_battery_percentage().await.unwrap(), (true, 101));
        assert_eq!(compat.get_battery_percentage().await.unwrap(), (false, -1));
    }
}
