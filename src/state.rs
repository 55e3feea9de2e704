//! Inverter operating state, as reported in holding register 0x0200.

use std::fmt;

use crate::error::{ModbusError, ModbusResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InverterState {
    Wait,
    CheckCharge,
    Charge,
    CheckDischarge,
    Discharge,
    Eps,
    Fault,
    PermFault,
}

impl InverterState {
    pub const ALL: [InverterState; 8] = [
        InverterState::Wait,
        InverterState::CheckCharge,
        InverterState::Charge,
        InverterState::CheckDischarge,
        InverterState::Discharge,
        InverterState::Eps,
        InverterState::Fault,
        InverterState::PermFault,
    ];

    /// Raw register value for this state.
    pub fn raw(self) -> u16 {
        self as u16
    }

    pub fn name(self) -> &'static str {
        match self {
            InverterState::Wait => "WAIT",
            InverterState::CheckCharge => "CHECK CHARGE",
            InverterState::Charge => "CHARGE",
            InverterState::CheckDischarge => "CHECK DISCHARGE",
            InverterState::Discharge => "DISCHARGE",
            InverterState::Eps => "EPS",
            InverterState::Fault => "FAULT",
            InverterState::PermFault => "PERM FAULT",
        }
    }

    /// True for the two fault states.
    pub fn is_fault(self) -> bool {
        matches!(self, InverterState::Fault | InverterState::PermFault)
    }
}

impl TryFrom<u16> for InverterState {
    type Error = ModbusError;

    fn try_from(raw: u16) -> ModbusResult<Self> {
        Self::ALL
            .get(usize::from(raw))
            .copied()
            .ok_or_else(|| ModbusError::decode(format!("Unknown inverter state {}", raw)))
    }
}

impl fmt::Display for InverterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_mapping() {
        assert_eq!(InverterState::try_from(0).unwrap(), InverterState::Wait);
        assert_eq!(InverterState::try_from(2).unwrap(), InverterState::Charge);
        assert_eq!(InverterState::try_from(7).unwrap(), InverterState::PermFault);
        for state in InverterState::ALL {
            assert_eq!(InverterState::try_from(state.raw()).unwrap(), state);
        }
    }

    #[test]
    fn test_out_of_range() {
        for raw in [8u16, 9, 0xFFFF] {
            assert!(matches!(
                InverterState::try_from(raw),
                Err(ModbusError::Decode { .. })
            ));
        }
    }

    #[test]
    fn test_display_names() {
        assert_eq!(InverterState::CheckCharge.to_string(), "CHECK CHARGE");
        assert_eq!(InverterState::PermFault.to_string(), "PERM FAULT");
        assert!(InverterState::Fault.is_fault());
        assert!(!InverterState::Eps.is_fault());
    }
}
