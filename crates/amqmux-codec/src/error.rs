/// Errors that can occur while encoding or decoding AMQP wire data.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The 8-byte protocol header is not a recognised AMQP header.
    #[error("invalid protocol header {0:02x?}")]
    InvalidHeader([u8; 8]),

    /// The buffer ended before the structure it encodes was complete.
    #[error("truncated {0}")]
    Truncated(&'static str),

    /// A frame or performative field violates the wire layout.
    #[error("malformed {0}")]
    Malformed(&'static str),

    /// A type constructor byte this codec does not understand.
    #[error("unsupported type constructor 0x{0:02x}")]
    UnsupportedConstructor(u8),

    /// A described value whose descriptor is not a transport performative.
    #[error("unknown descriptor 0x{0:02x}")]
    UnknownDescriptor(u64),

    /// A string or symbol field that is not valid UTF-8.
    #[error("invalid utf-8 in {0}")]
    InvalidUtf8(&'static str),
}

pub type Result<T> = std::result::Result<T, CodecError>;
