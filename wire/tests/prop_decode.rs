use proptest::prelude::*;
use wire::{decode_message, encode_message, MessageHeader, MessageKind, WireLimits};

fn kind_strategy() -> impl Strategy<Value = MessageKind> {
    prop::sample::select(MessageKind::ALL.to_vec())
}

proptest! {
    #[test]
    fn arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        let _ = decode_message(&bytes, &WireLimits::for_testing());
    }

    #[test]
    fn valid_headers_roundtrip(
        kind in kind_strategy(),
        tick in any::<u32>(),
        body in prop::collection::vec(any::<u8>(), 0..32),
    ) {
        let header = match kind {
            MessageKind::FullSnapshot => MessageHeader::full_snapshot(tick, 0, 1),
            MessageKind::Delta => MessageHeader::delta(tick, tick / 2, 0, 1),
            other => MessageHeader::single(other, tick),
        };
        let bytes = encode_message(&header, &body);
        let message = decode_message(&bytes, &WireLimits::for_testing()).unwrap();
        prop_assert_eq!(message.header, header);
        prop_assert_eq!(message.body, body.as_slice());
    }
}
