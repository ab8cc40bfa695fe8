use std::net::ToSocketAddrs;

use crate::connection::{Connection, ConnectionOptions};
use crate::container::Container;
use crate::error::Result;

/// Dial a peer and start the open handshake.
///
/// The returned connection has sent its header and open frame; drive it
/// with [`Connection::run`] to complete the handshake and receive frames.
pub fn connect(addr: impl ToSocketAddrs, options: ConnectionOptions) -> Result<Connection> {
    let mut connection = Connection::new(options);
    connection.open();
    connection.connect(addr)?;
    connection.process()?;
    Ok(connection)
}

/// Dial a peer with a connection owned by `container`.
pub fn connect_with_container(
    addr: impl ToSocketAddrs,
    options: ConnectionOptions,
    container: &Container,
) -> Result<Connection> {
    let mut connection = container.connection_with_options(options);
    connection.open();
    connection.connect(addr)?;
    connection.process()?;
    Ok(connection)
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::net::TcpListener;
    use std::thread;

    use super::*;

    #[test]
    fn connect_sends_header_then_open() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
        let addr = listener.local_addr().expect("listener should have an addr");

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept should succeed");
            let mut bytes = Vec::new();
            stream
                .read_to_end(&mut bytes)
                .expect("read should succeed");
            bytes
        });

        let connection = connect(addr, ConnectionOptions::default()).expect("connect should work");
        drop(connection);

        let bytes = server.join().expect("server thread should finish");
        assert!(bytes.len() > 8);
        assert_eq!(&bytes[..8], b"AMQP\x00\x01\x00\x00");
        // The first frame after the header is the open performative.
        let frame = amqmux_codec::decode_frame(&bytes[8..]).expect("open frame should decode");
        assert_eq!(frame.performative.name(), "open");
        assert_eq!(frame.channel, 0);
    }
}
