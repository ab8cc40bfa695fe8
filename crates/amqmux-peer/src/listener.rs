use std::net::{SocketAddr, TcpListener, ToSocketAddrs};

use tracing::debug;

use crate::connection::Connection;
use crate::container::Container;
use crate::error::Result;

/// Accepts inbound transports and adopts each into a connection owned by
/// a shared container.
pub struct ConnectionListener {
    listener: TcpListener,
    container: Container,
}

impl ConnectionListener {
    /// Bind to `addr` with a freshly generated container.
    pub fn bind(addr: impl ToSocketAddrs) -> Result<Self> {
        Self::bind_with_container(addr, Container::new())
    }

    /// Bind to `addr`; accepted connections belong to `container` and
    /// fall back to its listeners and options.
    pub fn bind_with_container(addr: impl ToSocketAddrs, container: Container) -> Result<Self> {
        let listener = TcpListener::bind(addr)?;
        Ok(Self {
            listener,
            container,
        })
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept the next transport and adopt it into a new connection.
    ///
    /// The connection has not opened yet; it answers the peer's open once
    /// [`Connection::run`] processes it.
    pub fn accept(&self) -> Result<Connection> {
        let (stream, addr) = self.listener.accept()?;
        debug!(peer = %addr, "inbound transport accepted");
        let mut connection = self.container.connection();
        connection.accept(stream)?;
        Ok(connection)
    }
}
