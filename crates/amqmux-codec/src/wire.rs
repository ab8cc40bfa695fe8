//! Frame-level layout: size prefix, data offset, frame type, channel.
//!
//! The reassembly layer above finds frame boundaries with nothing but the
//! 4-byte size prefix; this module owns everything inside a delimited
//! frame.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{CodecError, Result};
use crate::performative::Performative;
use crate::value::Value;

/// Bytes of fixed frame header: size (4), doff (1), type (1), channel (2).
pub const FRAME_HEADER_SIZE: usize = 8;

/// Frame type byte for AMQP frames.
pub const AMQP_FRAME_TYPE: u8 = 0;

// Data offset in 4-byte words. We always emit the minimal header.
const DOFF: u8 = 2;

/// A complete decoded frame: routing channel, performative, and any
/// payload bytes that followed the performative (transfer bodies).
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub channel: u16,
    pub performative: Performative,
    pub payload: Bytes,
}

/// Encode a frame and append it to `dst`. Returns the number of bytes
/// written.
pub fn encode_frame(
    dst: &mut BytesMut,
    channel: u16,
    performative: &Performative,
    payload: &[u8],
) -> usize {
    let mut body = BytesMut::new();
    performative.to_value().encode(&mut body);

    let size = FRAME_HEADER_SIZE + body.len() + payload.len();
    dst.reserve(size);
    dst.put_u32(size as u32);
    dst.put_u8(DOFF);
    dst.put_u8(AMQP_FRAME_TYPE);
    dst.put_u16(channel);
    dst.put_slice(&body);
    dst.put_slice(payload);
    size
}

/// Decode one complete frame from `frame`, which must be exactly the bytes
/// delimited by the size prefix (prefix included).
pub fn decode_frame(frame: &[u8]) -> Result<Frame> {
    if frame.len() < FRAME_HEADER_SIZE {
        return Err(CodecError::Truncated("frame header"));
    }
    let size = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
    if size != frame.len() {
        return Err(CodecError::Malformed("frame size"));
    }
    let doff = usize::from(frame[4]) * 4;
    if doff < FRAME_HEADER_SIZE || doff > frame.len() {
        return Err(CodecError::Malformed("frame doff"));
    }
    if frame[5] != AMQP_FRAME_TYPE {
        return Err(CodecError::Malformed("frame type"));
    }
    let channel = u16::from_be_bytes([frame[6], frame[7]]);

    let mut body = &frame[doff..];
    if body.is_empty() {
        return Err(CodecError::Malformed("empty frame body"));
    }
    let value = Value::decode(&mut body)?;
    let performative = Performative::from_value(&value)?;

    Ok(Frame {
        channel,
        performative,
        payload: Bytes::copy_from_slice(body),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::performative::{Begin, Open, Transfer};

    #[test]
    fn roundtrip_frame_without_payload() {
        let mut buf = BytesMut::new();
        let begin = Performative::Begin(Begin {
            remote_channel: None,
            next_outgoing_id: 0,
            incoming_window: 2048,
            outgoing_window: 2048,
            handle_max: None,
        });
        let written = encode_frame(&mut buf, 5, &begin, &[]);

        assert_eq!(written, buf.len());
        assert_eq!(&buf[0..4], (buf.len() as u32).to_be_bytes().as_slice());

        let frame = decode_frame(buf.as_ref()).unwrap();
        assert_eq!(frame.channel, 5);
        assert_eq!(frame.performative, begin);
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn roundtrip_frame_with_payload() {
        let mut buf = BytesMut::new();
        let transfer = Performative::Transfer(Transfer {
            handle: 0,
            delivery_id: Some(0),
            delivery_tag: Some(Bytes::from_static(b"\x00")),
            message_format: Some(0),
            settled: Some(true),
        });
        encode_frame(&mut buf, 1, &transfer, b"hello amqp");

        let frame = decode_frame(buf.as_ref()).unwrap();
        assert_eq!(frame.channel, 1);
        assert_eq!(frame.payload.as_ref(), b"hello amqp");
    }

    #[test]
    fn size_must_match_slice_length() {
        let mut buf = BytesMut::new();
        let open = Performative::Open(Open {
            container_id: "c".to_string(),
            ..Open::default()
        });
        encode_frame(&mut buf, 0, &open, &[]);
        buf.extend_from_slice(b"extra");

        assert!(matches!(
            decode_frame(buf.as_ref()),
            Err(CodecError::Malformed("frame size"))
        ));
    }

    #[test]
    fn non_amqp_frame_type_is_rejected() {
        let mut buf = BytesMut::new();
        let open = Performative::Open(Open {
            container_id: "c".to_string(),
            ..Open::default()
        });
        encode_frame(&mut buf, 0, &open, &[]);
        buf[5] = 1; // SASL frame type

        assert!(matches!(
            decode_frame(buf.as_ref()),
            Err(CodecError::Malformed("frame type"))
        ));
    }

    #[test]
    fn extended_header_is_skipped_via_doff() {
        let mut inner = BytesMut::new();
        let open = Performative::Open(Open {
            container_id: "c".to_string(),
            ..Open::default()
        });
        open.to_value().encode(&mut inner);

        // Hand-build a frame with doff = 3 (one extra 4-byte word).
        let size = FRAME_HEADER_SIZE + 4 + inner.len();
        let mut buf = BytesMut::new();
        buf.put_u32(size as u32);
        buf.put_u8(3);
        buf.put_u8(AMQP_FRAME_TYPE);
        buf.put_u16(9);
        buf.put_slice(&[0xde, 0xad, 0xbe, 0xef]);
        buf.put_slice(&inner);

        let frame = decode_frame(buf.as_ref()).unwrap();
        assert_eq!(frame.channel, 9);
        assert_eq!(frame.performative.name(), "open");
    }

    #[test]
    fn truncated_header_is_an_error() {
        assert!(matches!(
            decode_frame(&[0, 0, 0, 9, 2]),
            Err(CodecError::Truncated("frame header"))
        ));
    }
}
