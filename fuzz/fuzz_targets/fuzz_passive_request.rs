#![no_main]

use libfuzzer_sys::fuzz_target;
use me3000_modbus::{FunctionRegistry, ModbusRequest};

fuzz_target!(|input: (u16, i32)| {
    let (address, value) = input;
    let request = ModbusRequest::WritePassiveRegister { address, value };

    match FunctionRegistry::standard().encode(&request) {
        Ok(pdu) => {
            let value = i16::try_from(value).expect("encoded value must fit i16");
            let mut expected = vec![0x42];
            expected.extend_from_slice(&address.to_be_bytes());
            expected.extend_from_slice(&value.to_be_bytes());
            assert_eq!(pdu.as_slice(), expected.as_slice());
        }
        Err(e) => {
            assert!(i16::try_from(value).is_err());
            assert!(e.is_caller_error());
        }
    }
});
