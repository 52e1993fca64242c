#![no_main]

use codec::{
    decode_ack, decode_hints, decode_resync, decode_snapshot_fragment, CodecLimits,
    DisconnectReason, Hello, InputCommand, Ping, SpawnActor, Welcome,
};
use demo::demo_registry;
use libfuzzer_sys::fuzz_target;
use wire::{decode_message, MessageKind, WireLimits};

fuzz_target!(|data: &[u8]| {
    let Ok(registry) = demo_registry() else {
        return;
    };
    let limits = CodecLimits::for_testing();
    let Ok(message) = decode_message(data, &WireLimits::for_testing()) else {
        return;
    };

    match message.kind() {
        MessageKind::Hello => drop(Hello::decode(&message)),
        MessageKind::Welcome => drop(Welcome::decode(&message)),
        MessageKind::FullSnapshot | MessageKind::Delta => {
            if let Ok(fragment) = decode_snapshot_fragment(&message, &registry, &limits) {
                if fragment.full {
                    let _ = fragment.changes.into_snapshot();
                }
            }
        }
        MessageKind::Hint => drop(decode_hints(&message, &registry, &limits)),
        MessageKind::Input => drop(InputCommand::decode(&message, &limits)),
        MessageKind::Ack => drop(decode_ack(&message)),
        MessageKind::Resync => drop(decode_resync(&message)),
        MessageKind::Ping | MessageKind::Pong => drop(Ping::decode(&message)),
        MessageKind::SpawnActor => drop(SpawnActor::decode(&message, &limits)),
        MessageKind::Disconnect => drop(DisconnectReason::decode(&message)),
    }
});
