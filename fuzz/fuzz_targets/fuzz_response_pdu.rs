#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use me3000_modbus::{FunctionRegistry, ModbusPdu, ModbusRequest, ModbusResponse};

#[derive(Arbitrary, Debug)]
enum Request {
    Holding { address: u16, quantity: u16 },
    Input { address: u16, quantity: u16 },
    Passive { address: u16, value: i32 },
}

#[derive(Arbitrary, Debug)]
struct Input {
    request: Request,
    reply: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let registry = FunctionRegistry::standard();
    let request = match input.request {
        Request::Holding { address, quantity } => {
            ModbusRequest::ReadHoldingRegisters { address, quantity }
        }
        Request::Input { address, quantity } => {
            ModbusRequest::ReadInputRegisters { address, quantity }
        }
        Request::Passive { address, value } => {
            ModbusRequest::WritePassiveRegister { address, value }
        }
    };

    let Ok(pdu) = ModbusPdu::from_slice(&input.reply) else {
        return;
    };

    // Decoding never panics and never returns a partial register array
    if let Ok(ModbusResponse::Registers(words)) = registry.decode(&request, &pdu) {
        match request {
            ModbusRequest::ReadHoldingRegisters { quantity, .. }
            | ModbusRequest::ReadInputRegisters { quantity, .. } => {
                assert_eq!(words.len(), usize::from(quantity));
            }
            _ => panic!("register words for a passive request"),
        }
    }
});
