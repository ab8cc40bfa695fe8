//! Event dispatch for connection and session notifications.
//!
//! Listener resolution is two-level: a connection consults its own
//! listener table first and, only when no local listener handled the
//! event, forwards the identical context to its container's table. The
//! context is plain data; back-references to the originating connection
//! and container are carried as identifiers.

use std::collections::HashMap;

use bytes::Bytes;

use amqmux_codec::ErrorCondition;

/// Named events raised through the dispatch bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Remote open processed; the connection is open.
    ConnectionOpen,
    /// Remote close processed; the connection is closing or closed.
    ConnectionClose,
    /// A session completed its begin handshake.
    SessionBegin,
    /// A session received the peer's end.
    SessionEnd,
    /// A link attach was received.
    LinkAttach,
    /// A link detach was received.
    LinkDetach,
    /// A transfer was received; the payload is the message body.
    Message,
    /// A disposition was received for outgoing transfers.
    Disposition,
}

impl EventKind {
    pub fn name(self) -> &'static str {
        match self {
            EventKind::ConnectionOpen => "connection_open",
            EventKind::ConnectionClose => "connection_close",
            EventKind::SessionBegin => "session_begin",
            EventKind::SessionEnd => "session_end",
            EventKind::LinkAttach => "link_attach",
            EventKind::LinkDetach => "link_detach",
            EventKind::Message => "message",
            EventKind::Disposition => "disposition",
        }
    }
}

/// Context handed to every listener for one event.
#[derive(Debug, Clone)]
pub struct EventContext {
    pub kind: EventKind,
    /// Process-unique id of the originating connection.
    pub connection_id: u64,
    /// Container identity of the originating connection.
    pub container_id: String,
    /// Local channel of the session the event concerns, if any.
    pub channel: Option<u16>,
    /// Link handle the event concerns, if any.
    pub handle: Option<u32>,
    /// Message body for [`EventKind::Message`].
    pub payload: Option<Bytes>,
    /// Error condition carried by a close or detach, if any.
    pub error: Option<ErrorCondition>,
}

impl EventContext {
    pub fn new(kind: EventKind, connection_id: u64, container_id: String) -> Self {
        Self {
            kind,
            connection_id,
            container_id,
            channel: None,
            handle: None,
            payload: None,
            error: None,
        }
    }

    pub fn with_channel(mut self, channel: u16) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn with_handle(mut self, handle: u32) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn with_payload(mut self, payload: Bytes) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_error(mut self, error: Option<ErrorCondition>) -> Self {
        self.error = error;
        self
    }
}

type Listener = Box<dyn FnMut(&EventContext) + Send>;

/// Table of listeners keyed by event kind.
#[derive(Default)]
pub struct Dispatcher {
    listeners: HashMap<EventKind, Vec<Listener>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Listeners for one kind run in registration
    /// order.
    pub fn on(&mut self, kind: EventKind, listener: impl FnMut(&EventContext) + Send + 'static) {
        self.listeners.entry(kind).or_default().push(Box::new(listener));
    }

    /// Invoke every listener registered for the context's kind. Returns
    /// whether any listener ran.
    pub fn dispatch(&mut self, context: &EventContext) -> bool {
        let Some(listeners) = self.listeners.get_mut(&context.kind) else {
            return false;
        };
        if listeners.is_empty() {
            return false;
        }
        for listener in listeners.iter_mut() {
            listener(context);
        }
        true
    }
}
