//! Endpoint wrapper that tallies outgoing traffic and keeps a capture.

use std::collections::BTreeMap;

use channel::{ChannelKind, ChannelResult, ConnectionHandle, DeliveryClass, Endpoint, MessageId};
use wire::{decode_message, MessageKind, WireLimits};

/// One message the server sent.
#[derive(Debug, Clone)]
pub struct Captured {
    pub to: ConnectionHandle,
    pub kind: MessageKind,
    pub tick: u32,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct KindTotals {
    pub messages: u64,
    pub bytes: u64,
}

/// Wraps an [`Endpoint`], counting accepted sends per message kind and
/// keeping the first `capture_limit` of them.
#[derive(Debug)]
pub struct Recorder<E> {
    inner: E,
    totals: BTreeMap<MessageKind, KindTotals>,
    captured: Vec<Captured>,
    capture_limit: usize,
}

impl<E> Recorder<E> {
    pub fn new(inner: E, capture_limit: usize) -> Self {
        Self {
            inner,
            totals: BTreeMap::new(),
            captured: Vec::new(),
            capture_limit,
        }
    }

    pub const fn totals(&self) -> &BTreeMap<MessageKind, KindTotals> {
        &self.totals
    }

    pub fn captured(&self) -> &[Captured] {
        &self.captured
    }
}

impl<E: Endpoint> Endpoint for Recorder<E> {
    type Events = E::Events;

    fn send(
        &mut self,
        to: ConnectionHandle,
        kind: ChannelKind,
        class: DeliveryClass,
        bytes: Vec<u8>,
    ) -> ChannelResult<MessageId> {
        let header = decode_message(&bytes, &WireLimits::default())
            .map(|message| message.header)
            .ok();
        let copy = (self.captured.len() < self.capture_limit).then(|| bytes.clone());
        let length = bytes.len() as u64;
        let id = self.inner.send(to, kind, class, bytes)?;

        if let Some(header) = header {
            let totals = self.totals.entry(header.kind).or_default();
            totals.messages += 1;
            totals.bytes += length;
            if let Some(bytes) = copy {
                self.captured.push(Captured {
                    to,
                    kind: header.kind,
                    tick: header.tick,
                    bytes,
                });
            }
        }
        Ok(id)
    }

    fn poll(&mut self) -> Self::Events {
        self.inner.poll()
    }

    fn close(&mut self, handle: ConnectionHandle) {
        self.inner.close(handle);
    }
}
