//! AMQP 1.0 connection core.
//!
//! One [`Connection`] owns one byte stream and multiplexes any number of
//! [`Session`]s over it by channel number. Inbound bytes flow through the
//! reassembler and are routed to the owning session; outbound state
//! changes coalesce into single deferred processing passes so a burst of
//! open/attach/transfer calls becomes one batch of writes. Connection and
//! session notifications surface through a two-level dispatch bridge:
//! per-connection listeners first, [`Container`]-wide listeners as the
//! fallback.

pub mod connection;
pub mod connector;
pub mod container;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod listener;
pub mod session;

pub use connection::{Connection, ConnectionOptions};
pub use connector::{connect, connect_with_container};
pub use container::Container;
pub use endpoint::EndpointState;
pub use error::{PeerError, Result};
pub use events::{Dispatcher, EventContext, EventKind};
pub use listener::ConnectionListener;
pub use session::{Link, Session};
