#![no_main]

use bytestream::ByteReader;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 16 {
        return;
    }
    let (ops, body) = data.split_at(16);
    let mut reader = ByteReader::new(body);
    for op in ops {
        let result = match op % 9 {
            0 => reader.read_u8().map(drop),
            1 => reader.read_bool().map(drop),
            2 => reader.read_u16().map(drop),
            3 => reader.read_u32().map(drop),
            4 => reader.read_u64().map(drop),
            5 => reader.read_varu32().map(drop),
            6 => reader.read_vars32().map(drop),
            7 => reader.read_len_prefixed(usize::from(op / 9)).map(drop),
            _ => reader.read_str(64).map(drop),
        };
        if result.is_err() {
            break;
        }
    }
    let _ = reader.finish();
});
