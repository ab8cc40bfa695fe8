use std::collections::VecDeque;
use std::io::{ErrorKind, Write};

use bytes::{Bytes, BytesMut};
use tracing::trace;

use amqmux_codec::{encode_frame, Performative, ProtocolHeader};

use crate::error::{FrameError, Result};
use crate::DEFAULT_MAX_FRAME_SIZE;

/// FIFO of encoded buffers awaiting transmission.
///
/// The queue is the single owner of outbound ordering: buffers queued
/// before a transport is attached are drained, in enqueue order, ahead of
/// anything queued later. There is one producer and one consumer (the
/// connection that owns the queue), so draining needs no synchronisation.
pub struct OutputQueue {
    pending: VecDeque<Bytes>,
    max_frame_size: usize,
}

impl OutputQueue {
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            max_frame_size,
        }
    }

    /// Queue the 8-byte protocol header.
    pub fn queue_header(&mut self, header: &ProtocolHeader) {
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        self.pending.push_back(buf.freeze());
    }

    /// Encode a frame and queue it. Returns the encoded size in bytes.
    pub fn queue_frame(
        &mut self,
        channel: u16,
        performative: &Performative,
        payload: &[u8],
    ) -> Result<usize> {
        let mut buf = BytesMut::new();
        let size = encode_frame(&mut buf, channel, performative, payload);
        if size > self.max_frame_size {
            return Err(FrameError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }
        trace!(channel, performative = performative.name(), size, "frame queued");
        self.pending.push_back(buf.freeze());
        Ok(size)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of queued buffers.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Tighten or relax the frame size limit (after open negotiation).
    pub fn set_max_frame_size(&mut self, max_frame_size: usize) {
        self.max_frame_size = max_frame_size;
    }

    /// Drain every queued buffer into `sink`, oldest first.
    ///
    /// Each buffer is written completely before the next one starts, so the
    /// wire order equals the enqueue order.
    pub fn flush<W: Write>(&mut self, sink: &mut W) -> Result<()> {
        while let Some(buf) = self.pending.front() {
            write_all(sink, buf)?;
            self.pending.pop_front();
        }
        loop {
            match sink.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }
}

impl Default for OutputQueue {
    fn default() -> Self {
        Self::new()
    }
}

fn write_all<W: Write>(sink: &mut W, buf: &[u8]) -> Result<()> {
    let mut offset = 0usize;
    while offset < buf.len() {
        match sink.write(&buf[offset..]) {
            Ok(0) => return Err(FrameError::ConnectionClosed),
            Ok(n) => offset += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
    Ok(())
}
