use std::fmt;
use std::io;

use amqmux_frame::FrameError;
use amqmux_peer::PeerError;

// Exit codes loosely follow sysexits where one fits.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const USAGE: i32 = 64;
pub const DATA_INVALID: i32 = 65;
pub const PROTOCOL: i32 = 76;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::FrameTooLarge { .. } | FrameError::SizeTooSmall(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(PROTOCOL, format!("{context}: {other}")),
    }
}

pub fn peer_error(context: &str, err: PeerError) -> CliError {
    match err {
        PeerError::Io(source) => io_error(context, source),
        PeerError::Frame(source) => frame_error(context, source),
        PeerError::UnsupportedProtocol(_)
        | PeerError::ProtocolViolation(_)
        | PeerError::UnknownChannel { .. }
        | PeerError::ChannelConsistency { .. } => {
            CliError::new(PROTOCOL, format!("{context}: {err}"))
        }
        PeerError::NoSuchSession(_) | PeerError::NotConnected => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
    }
}
