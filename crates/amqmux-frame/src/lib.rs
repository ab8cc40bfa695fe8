//! Frame reassembly and ordered output for a single AMQP byte stream.
//!
//! The transport hands [`FrameDecoder`] raw chunks of whatever size the
//! socket produced; it hands back the one-time protocol header followed by
//! complete frames, in arrival order, however the bytes were split. The
//! outbound direction is [`OutputQueue`]: encoded buffers queue in FIFO
//! order and drain to the transport once one is attached.

pub mod decoder;
pub mod error;
pub mod output;

pub use decoder::{FrameDecoder, Segment};
pub use error::{FrameError, Result};
pub use output::OutputQueue;

/// Default maximum frame size accepted or produced: 1 MiB.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;
