use bytestream::{ByteReader, ByteWriter};
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Op {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I32(i32),
    VarU32(u32),
    VarS32(i32),
    Bytes(Vec<u8>),
    Str(String),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        any::<bool>().prop_map(Op::Bool),
        any::<u8>().prop_map(Op::U8),
        any::<u16>().prop_map(Op::U16),
        any::<u32>().prop_map(Op::U32),
        any::<u64>().prop_map(Op::U64),
        any::<i32>().prop_map(Op::I32),
        any::<u32>().prop_map(Op::VarU32),
        any::<i32>().prop_map(Op::VarS32),
        prop::collection::vec(any::<u8>(), 0..32).prop_map(Op::Bytes),
        "[a-z ]{0,24}".prop_map(Op::Str),
    ]
}

proptest! {
    #[test]
    fn prop_roundtrip_ops(ops in prop::collection::vec(op_strategy(), 1..64)) {
        let mut writer = ByteWriter::new();
        for op in &ops {
            match op {
                Op::Bool(v) => writer.write_bool(*v),
                Op::U8(v) => writer.write_u8(*v),
                Op::U16(v) => writer.write_u16(*v),
                Op::U32(v) => writer.write_u32(*v),
                Op::U64(v) => writer.write_u64(*v),
                Op::I32(v) => writer.write_i32(*v),
                Op::VarU32(v) => writer.write_varu32(*v),
                Op::VarS32(v) => writer.write_vars32(*v),
                Op::Bytes(v) => writer.write_len_prefixed(v),
                Op::Str(v) => writer.write_str(v),
            }
        }
        let bytes = writer.finish();

        let mut reader = ByteReader::new(&bytes);
        for op in &ops {
            match op {
                Op::Bool(v) => prop_assert_eq!(reader.read_bool().unwrap(), *v),
                Op::U8(v) => prop_assert_eq!(reader.read_u8().unwrap(), *v),
                Op::U16(v) => prop_assert_eq!(reader.read_u16().unwrap(), *v),
                Op::U32(v) => prop_assert_eq!(reader.read_u32().unwrap(), *v),
                Op::U64(v) => prop_assert_eq!(reader.read_u64().unwrap(), *v),
                Op::I32(v) => prop_assert_eq!(reader.read_i32().unwrap(), *v),
                Op::VarU32(v) => prop_assert_eq!(reader.read_varu32().unwrap(), *v),
                Op::VarS32(v) => prop_assert_eq!(reader.read_vars32().unwrap(), *v),
                Op::Bytes(v) => {
                    prop_assert_eq!(reader.read_len_prefixed(64).unwrap(), v.as_slice());
                }
                Op::Str(v) => prop_assert_eq!(reader.read_str(64).unwrap(), v.as_str()),
            }
        }
        prop_assert!(reader.is_empty());
    }

    #[test]
    fn prop_arbitrary_input_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        let mut reader = ByteReader::new(&bytes);
        while !reader.is_empty() {
            if reader.read_varu32().is_err() {
                break;
            }
            if reader.read_len_prefixed(16).is_err() {
                break;
            }
        }
    }
}
