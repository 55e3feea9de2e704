//! ME3000 register map
//!
//! Addresses and decode rules are plain data. The client reads whole
//! blocks and then picks named values out of the returned words, so one
//! bus exchange serves every reading in a block.

use std::fmt;

use crate::error::{ModbusError, ModbusResult};
use crate::protocol::ModbusRequest;
use crate::value::{ModbusValue, Signedness};

/// Which address space a register lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterSpace {
    /// Read with function 0x03
    Holding,
    /// Read with function 0x04
    Input,
    /// Written with the vendor passive-register function 0x42
    Control,
}

/// A single named register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterDef {
    pub name: &'static str,
    pub address: u16,
    pub space: RegisterSpace,
    pub signedness: Signedness,
}

impl RegisterDef {
    const fn holding(name: &'static str, address: u16, signedness: Signedness) -> Self {
        Self {
            name,
            address,
            space: RegisterSpace::Holding,
            signedness,
        }
    }

    const fn control(name: &'static str, address: u16) -> Self {
        Self {
            name,
            address,
            space: RegisterSpace::Control,
            signedness: Signedness::Signed,
        }
    }

    /// Interpret the raw word for this register.
    #[inline]
    pub fn decode(&self, raw: u16) -> ModbusValue {
        ModbusValue::from_register(raw, self.signedness)
    }
}

/// A contiguous range read in one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterBlock {
    pub name: &'static str,
    pub space: RegisterSpace,
    pub start: u16,
    pub count: u16,
}

impl RegisterBlock {
    pub fn contains(&self, address: u16) -> bool {
        address >= self.start && u32::from(address) < u32::from(self.start) + u32::from(self.count)
    }

    /// Index of `address` inside the block's word vector.
    pub fn offset_of(&self, address: u16) -> Option<usize> {
        self.contains(address)
            .then(|| usize::from(address - self.start))
    }

    /// The read request covering the whole block.
    pub fn request(&self) -> ModbusResult<ModbusRequest> {
        self.sub_request(self.start, self.count)
    }

    /// Read request for `quantity` registers starting at `address`, in
    /// this block's space.
    pub fn sub_request(&self, address: u16, quantity: u16) -> ModbusResult<ModbusRequest> {
        match self.space {
            RegisterSpace::Holding => Ok(ModbusRequest::ReadHoldingRegisters { address, quantity }),
            RegisterSpace::Input => Ok(ModbusRequest::ReadInputRegisters { address, quantity }),
            RegisterSpace::Control => Err(ModbusError::configuration(format!(
                "Block '{}' is in the control space and cannot be read",
                self.name
            ))),
        }
    }
}

/// Targets of the passive-register function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlRegister {
    /// Force discharge at the given wattage
    Discharge,
    /// Force charge at the given wattage
    Charge,
    /// Return to self-consumption mode; value is always 0
    Auto,
}

impl ControlRegister {
    pub const fn address(self) -> u16 {
        match self {
            ControlRegister::Discharge => 0x0101,
            ControlRegister::Charge => 0x0102,
            ControlRegister::Auto => 0x0103,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            ControlRegister::Discharge => "control_discharge",
            ControlRegister::Charge => "control_charge",
            ControlRegister::Auto => "control_auto",
        }
    }

    /// Passive write request carrying `value`.
    pub fn request(self, value: i32) -> ModbusRequest {
        ModbusRequest::WritePassiveRegister {
            address: self.address(),
            value,
        }
    }
}

impl fmt::Display for ControlRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:04X})", self.name(), self.address())
    }
}

/// One decoded reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamedValue {
    pub name: &'static str,
    pub address: u16,
    pub value: ModbusValue,
}

impl fmt::Display for NamedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.name, self.value)
    }
}

/// A device's register layout.
#[derive(Debug, Clone, Copy)]
pub struct RegisterMap {
    pub holding: RegisterBlock,
    pub input: RegisterBlock,
    pub registers: &'static [RegisterDef],
}

pub const INVERTER_STATE: &str = "inverter_state";
pub const BATTERY_PERCENTAGE: &str = "battery_percentage";

const ME3000_REGISTERS: &[RegisterDef] = &[
    RegisterDef::control(ControlRegister::Discharge.name(), ControlRegister::Discharge.address()),
    RegisterDef::control(ControlRegister::Charge.name(), ControlRegister::Charge.address()),
    RegisterDef::control(ControlRegister::Auto.name(), ControlRegister::Auto.address()),
    RegisterDef::holding(INVERTER_STATE, 0x0200, Signedness::Unsigned),
    RegisterDef::holding("grid_voltage", 0x0206, Signedness::Unsigned),
    RegisterDef::holding("grid_current", 0x0207, Signedness::Signed),
    RegisterDef::holding("battery_voltage", 0x020E, Signedness::Unsigned),
    RegisterDef::holding("battery_current", 0x020F, Signedness::Signed),
    RegisterDef::holding(BATTERY_PERCENTAGE, 0x0210, Signedness::Unsigned),
    RegisterDef::holding("grid_export_power", 0x0219, Signedness::Unsigned),
    RegisterDef::holding("grid_import_power", 0x021A, Signedness::Unsigned),
    RegisterDef::holding("load_power", 0x021B, Signedness::Unsigned),
    RegisterDef::holding("charge_total", 0x0224, Signedness::Unsigned),
    RegisterDef::holding("discharge_total", 0x0225, Signedness::Unsigned),
];

impl RegisterMap {
    /// Sofar ME3000SP layout
    pub const ME3000: RegisterMap = RegisterMap {
        holding: RegisterBlock {
            name: "holding",
            space: RegisterSpace::Holding,
            start: 0x0200,
            count: 69,
        },
        input: RegisterBlock {
            name: "input",
            space: RegisterSpace::Input,
            start: 0x10B0,
            count: 13,
        },
        registers: ME3000_REGISTERS,
    };

    pub fn register(&self, name: &str) -> ModbusResult<&RegisterDef> {
        self.registers
            .iter()
            .find(|def| def.name == name)
            .ok_or_else(|| ModbusError::configuration(format!("Unknown register '{}'", name)))
    }

    /// Every named holding register, in address order.
    pub fn holding_registers(&self) -> impl Iterator<Item = &RegisterDef> + '_ {
        self.registers
            .iter()
            .filter(|def| def.space == RegisterSpace::Holding)
    }

    /// Block holding the readable register `def`.
    pub fn block_of(&self, def: &RegisterDef) -> ModbusResult<&RegisterBlock> {
        match def.space {
            RegisterSpace::Holding => Ok(&self.holding),
            RegisterSpace::Input => Ok(&self.input),
            RegisterSpace::Control => Err(ModbusError::configuration(format!(
                "Register '{}' is write-only",
                def.name
            ))),
        }
    }

    /// Size-1 read request for the named register.
    pub fn read_request(&self, name: &str) -> ModbusResult<ModbusRequest> {
        let def = self.register(name)?;
        self.block_of(def)?.sub_request(def.address, 1)
    }

    fn check_block(block: &RegisterBlock, words: &[u16]) -> ModbusResult<()> {
        if words.len() != usize::from(block.count) {
            return Err(ModbusError::decode(format!(
                "Block '{}' has {} registers, got {} words",
                block.name,
                block.count,
                words.len()
            )));
        }
        Ok(())
    }

    /// Decode every named register of `block` out of a full block read.
    pub fn decode_block(
        &self,
        block: &RegisterBlock,
        words: &[u16],
    ) -> ModbusResult<Vec<NamedValue>> {
        Self::check_block(block, words)?;

        Ok(self
            .registers
            .iter()
            .filter(|def| def.space == block.space)
            .filter_map(|def| {
                block.offset_of(def.address).map(|offset| NamedValue {
                    name: def.name,
                    address: def.address,
                    value: def.decode(words[offset]),
                })
            })
            .collect())
    }

    /// Single named value out of a full read of its block.
    pub fn value_of(&self, name: &str, words: &[u16]) -> ModbusResult<ModbusValue> {
        let def = self.register(name)?;
        let block = self.block_of(def)?;
        Self::check_block(block, words)?;

        let offset = block.offset_of(def.address).ok_or_else(|| {
            ModbusError::configuration(format!(
                "Register '{}' at 0x{:04X} lies outside block '{}'",
                name, def.address, block.name
            ))
        })?;
        Ok(def.decode(words[offset]))
    }
}
