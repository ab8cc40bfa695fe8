/// Errors that can occur while reassembling or writing frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame body or protocol header failed to decode.
    #[error("codec error: {0}")]
    Codec(#[from] amqmux_codec::CodecError),

    /// A size prefix smaller than the fixed frame header.
    #[error("frame size {0} below minimum")]
    SizeTooSmall(usize),

    /// A frame larger than the configured maximum.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// An I/O error occurred while draining the output queue.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport was closed while a write was in progress.
    #[error("connection closed (incomplete write)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
