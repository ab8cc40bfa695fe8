//! AMQP 1.0 wire codec.
//!
//! Everything here operates on in-memory buffers and knows nothing about
//! sockets or connection state. The layers above feed it byte slices and
//! get back the protocol header, frame boundaries, and decoded
//! performatives:
//! - An 8-byte protocol header exchanged once per direction at stream start
//! - Frames: a 4-byte big-endian total size, doff, frame type, channel,
//!   then an encoded performative plus optional payload
//! - Performatives: described lists using the standard transport
//!   descriptor codes (open 0x10 through close 0x18)

pub mod error;
pub mod header;
pub mod performative;
pub mod value;
pub mod wire;

pub use error::{CodecError, Result};
pub use header::{ProtocolHeader, HEADER_SIZE};
pub use performative::{
    Attach, Begin, Close, Detach, Disposition, End, ErrorCondition, Flow, Open, Performative,
    Role, Transfer,
};
pub use value::Value;
pub use wire::{decode_frame, encode_frame, Frame, AMQP_FRAME_TYPE, FRAME_HEADER_SIZE};
