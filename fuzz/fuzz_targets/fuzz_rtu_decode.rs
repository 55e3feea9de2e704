#![no_main]

use libfuzzer_sys::fuzz_target;
use me3000_modbus::{crc16, decode_adu};

fuzz_target!(|data: &[u8]| {
    if let Ok((address, pdu)) = decode_adu(data) {
        assert_eq!(address, data[0]);
        assert_eq!(pdu.as_slice(), &data[1..data.len() - 2]);
        let body = &data[..data.len() - 2];
        assert_eq!(crc16(body).to_le_bytes(), [data[data.len() - 2], data[data.len() - 1]]);
    }
});
