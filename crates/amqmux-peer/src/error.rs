use amqmux_codec::ProtocolHeader;

/// Errors that can occur while driving a connection.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Frame reassembly or encoding error.
    #[error("frame error: {0}")]
    Frame(#[from] amqmux_frame::FrameError),

    /// Transport-level I/O error.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer sent a protocol header this implementation cannot speak.
    #[error("unsupported protocol header: {0}")]
    UnsupportedProtocol(ProtocolHeader),

    /// The peer violated the connection state machine. Fatal: the caller
    /// is expected to tear the connection down.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    /// A non-begin frame arrived on a channel never opened by a begin.
    #[error("{performative} frame on unmapped channel {channel}")]
    UnknownChannel {
        channel: u16,
        performative: &'static str,
    },

    /// A begin frame whose remote-channel field does not resolve to a
    /// known local session.
    #[error("begin references unknown local channel {channel}")]
    ChannelConsistency { channel: u16 },

    /// A local operation named a channel with no session behind it.
    #[error("no local session on channel {0}")]
    NoSuchSession(u16),

    /// An operation that needs an attached transport was called before
    /// `connect` or `accept`.
    #[error("no transport attached")]
    NotConnected,
}

pub type Result<T> = std::result::Result<T, PeerError>;
