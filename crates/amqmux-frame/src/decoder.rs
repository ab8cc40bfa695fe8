use bytes::BytesMut;
use tracing::trace;

use amqmux_codec::{decode_frame, Frame, ProtocolHeader, FRAME_HEADER_SIZE, HEADER_SIZE};

use crate::error::{FrameError, Result};
use crate::DEFAULT_MAX_FRAME_SIZE;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// One unit yielded by the reassembler.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// The 8-byte protocol header. Yielded exactly once, before any frame.
    Header(ProtocolHeader),
    /// A complete decoded frame.
    Frame(Frame),
}

/// Reassembles a stream of arbitrarily-chunked bytes into the protocol
/// header and complete frames.
///
/// Bytes that do not yet form a complete header or frame stay buffered;
/// nothing is ever discarded, so the decoded sequence is independent of
/// how the transport chunked the stream.
pub struct FrameDecoder {
    buf: BytesMut,
    header: Option<ProtocolHeader>,
    max_frame_size: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            header: None,
            max_frame_size,
        }
    }

    /// Append a chunk received from the transport.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pull the next complete segment, or `Ok(None)` if more bytes are
    /// needed. Call in a loop after each [`feed`](Self::feed) so frames
    /// that arrived in one chunk are handled in arrival order.
    pub fn next_segment(&mut self) -> Result<Option<Segment>> {
        if self.header.is_none() {
            if self.buf.len() < HEADER_SIZE {
                return Ok(None);
            }
            let mut raw = [0u8; HEADER_SIZE];
            raw.copy_from_slice(&self.buf.split_to(HEADER_SIZE));
            let header = ProtocolHeader::decode(raw)?;
            trace!(%header, "protocol header received");
            self.header = Some(header);
            return Ok(Some(Segment::Header(header)));
        }

        if self.buf.len() < 4 {
            return Ok(None);
        }
        let size = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
        if size < FRAME_HEADER_SIZE {
            return Err(FrameError::SizeTooSmall(size));
        }
        if size > self.max_frame_size {
            return Err(FrameError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }
        if self.buf.len() < size {
            return Ok(None);
        }

        let raw = self.buf.split_to(size);
        let frame = decode_frame(raw.as_ref())?;
        trace!(channel = frame.channel, performative = frame.performative.name(), "frame received");
        Ok(Some(Segment::Frame(frame)))
    }

    /// Whether the protocol header has been consumed from the stream.
    pub fn header_received(&self) -> bool {
        self.header.is_some()
    }

    /// Number of buffered bytes not yet forming a complete segment.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Tighten or relax the frame size limit (after open negotiation).
    pub fn set_max_frame_size(&mut self, max_frame_size: usize) {
        self.max_frame_size = max_frame_size;
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
