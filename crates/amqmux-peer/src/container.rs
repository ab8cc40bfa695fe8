use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::connection::{Connection, ConnectionOptions};
use crate::events::{Dispatcher, EventContext, EventKind};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_CONTAINER_SEQ: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_connection_id() -> u64 {
    NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)
}

pub(crate) fn generate_container_id() -> String {
    let seq = NEXT_CONTAINER_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("amqmux-{}-{}", std::process::id(), seq)
}

/// Shared aggregator for a group of connections.
///
/// A container supplies the shared container identity, default options
/// with per-connection override, and the fallback listener set consulted
/// when a connection has no local listener for an event.
#[derive(Clone)]
pub struct Container {
    inner: Arc<Inner>,
}

struct Inner {
    id: String,
    options: Mutex<HashMap<String, String>>,
    dispatcher: Mutex<Dispatcher>,
}

impl Container {
    /// Create a container with a freshly generated identity.
    pub fn new() -> Self {
        Self::with_id(generate_container_id())
    }

    /// Create a container with an explicit identity.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: id.into(),
                options: Mutex::new(HashMap::new()),
                dispatcher: Mutex::new(Dispatcher::new()),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Set a default option inherited by this container's connections.
    pub fn set_option(&self, name: impl Into<String>, value: impl Into<String>) {
        self.lock_options().insert(name.into(), value.into());
    }

    /// Look up a container-level option.
    pub fn option(&self, name: &str) -> Option<String> {
        self.lock_options().get(name).cloned()
    }

    /// Register a container-wide listener, observing events from every
    /// connection that has no local listener for them.
    pub fn on(&self, kind: EventKind, listener: impl FnMut(&EventContext) + Send + 'static) {
        self.lock_dispatcher().on(kind, listener);
    }

    pub(crate) fn dispatch(&self, context: &EventContext) -> bool {
        self.lock_dispatcher().dispatch(context)
    }

    // Listener callbacks can panic; recover the data rather than poison
    // every later caller.
    fn lock_options(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.inner
            .options
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn lock_dispatcher(&self) -> std::sync::MutexGuard<'_, Dispatcher> {
        self.inner
            .dispatcher
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Create a connection owned by this container, with default options.
    pub fn connection(&self) -> Connection {
        self.connection_with_options(ConnectionOptions::default())
    }

    /// Create a connection owned by this container.
    pub fn connection_with_options(&self, options: ConnectionOptions) -> Connection {
        Connection::with_container(options, Some(self.clone()))
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}
