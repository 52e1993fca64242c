//! Per-kind handler table.

use crate::{MessageKind, WireMessage};

/// Handler signature: the host, a sender context (usually a connection
/// handle) and the framed message.
pub type Handler<H, C, E> = fn(&mut H, C, &WireMessage<'_>) -> Result<(), E>;

/// Maps each [`MessageKind`] to at most one handler.
///
/// The table is `Copy`, so a host can look a handler up and then call it
/// with `&mut self` without holding a borrow of its own table.
pub struct HandlerTable<H, C, E> {
    handlers: [Option<Handler<H, C, E>>; MessageKind::COUNT],
}

impl<H, C, E> Clone for HandlerTable<H, C, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<H, C, E> Copy for HandlerTable<H, C, E> {}

impl<H, C, E> Default for HandlerTable<H, C, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H, C, E> std::fmt::Debug for HandlerTable<H, C, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registered: Vec<MessageKind> = MessageKind::ALL
            .into_iter()
            .filter(|kind| self.handlers[kind.index()].is_some())
            .collect();
        f.debug_struct("HandlerTable")
            .field("registered", &registered)
            .finish()
    }
}

impl<H, C, E> HandlerTable<H, C, E> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            handlers: [None; MessageKind::COUNT],
        }
    }

    /// Installs `handler` for `kind`, replacing any previous one.
    #[must_use]
    pub fn on(mut self, kind: MessageKind, handler: Handler<H, C, E>) -> Self {
        self.handlers[kind.index()] = Some(handler);
        self
    }

    #[must_use]
    pub fn get(&self, kind: MessageKind) -> Option<Handler<H, C, E>> {
        self.handlers[kind.index()]
    }

    /// Runs the handler for `message`, or returns `None` if none is registered.
    pub fn dispatch(
        &self,
        host: &mut H,
        sender: C,
        message: &WireMessage<'_>,
    ) -> Option<Result<(), E>> {
        self.get(message.kind())
            .map(|handler| handler(host, sender, message))
    }
}
