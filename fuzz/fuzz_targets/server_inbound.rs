#![no_main]

use std::time::Duration;

use channel::{
    ChannelKind, Connector, DeliveryClass, Endpoint, LoopbackConditions, LoopbackNetwork,
};
use codec::{Hello, PROTOCOL_VERSION};
use demo::{demo_registry, GameWorld};
use libfuzzer_sys::fuzz_target;
use server::{ReplicationServer, ServerConfig};

// Feeds length-prefixed chunks of `data` to a server as client messages.
fuzz_target!(|data: &[u8]| {
    let Ok(registry) = demo_registry() else {
        return;
    };
    let network = LoopbackNetwork::new(LoopbackConditions::perfect(), 0);
    let Ok(listener) = network.listen("fuzz") else {
        return;
    };
    let mut server = ReplicationServer::new(listener, ServerConfig::for_testing(), registry);
    let Ok((mut client, handle)) = network.connector().connect("fuzz", b"") else {
        return;
    };
    let hello = Hello {
        protocol_version: PROTOCOL_VERSION,
        schema_hash: server.schema_hash(),
        client_id: 1,
    };
    let _ = client.send(
        handle,
        ChannelKind::Control,
        DeliveryClass::ReliableOrdered,
        hello.encode(),
    );

    let world = GameWorld::new();
    let mut now = Duration::ZERO;
    let mut rest = data;
    while let Some((&len, tail)) = rest.split_first() {
        let len = usize::from(len).min(tail.len());
        let (chunk, tail) = tail.split_at(len);
        rest = tail;
        let bytes = chunk.to_vec();
        let _ = client.send(handle, ChannelKind::Input, DeliveryClass::Unreliable, bytes);

        network.advance();
        now += Duration::from_millis(16);
        let _ = server.begin_tick(now);
        server.end_tick(&world);
        let _ = client.poll().count();
    }
});
