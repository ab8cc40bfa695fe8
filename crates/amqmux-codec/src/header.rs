use bytes::{BufMut, BytesMut};

use crate::error::{CodecError, Result};

/// Size of the protocol header in bytes.
pub const HEADER_SIZE: usize = 8;

const PREFIX: [u8; 4] = *b"AMQP";

/// The 8-byte protocol-version header exchanged once per direction before
/// any frame: `"AMQP"`, protocol id, major, minor, revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolHeader {
    /// Protocol id. 0 is plain AMQP; 2 and 3 (TLS, SASL) are negotiated by
    /// outer layers this codec does not implement.
    pub protocol_id: u8,
    pub major: u8,
    pub minor: u8,
    pub revision: u8,
}

impl ProtocolHeader {
    /// The plain AMQP 1.0.0 header.
    pub fn amqp() -> Self {
        Self {
            protocol_id: 0,
            major: 1,
            minor: 0,
            revision: 0,
        }
    }

    /// Parse a header from exactly [`HEADER_SIZE`] bytes.
    pub fn decode(bytes: [u8; HEADER_SIZE]) -> Result<Self> {
        if bytes[0..4] != PREFIX {
            return Err(CodecError::InvalidHeader(bytes));
        }
        Ok(Self {
            protocol_id: bytes[4],
            major: bytes[5],
            minor: bytes[6],
            revision: bytes[7],
        })
    }

    /// Append the wire form of this header to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_SIZE);
        dst.put_slice(&PREFIX);
        dst.put_u8(self.protocol_id);
        dst.put_u8(self.major);
        dst.put_u8(self.minor);
        dst.put_u8(self.revision);
    }
}

impl std::fmt::Display for ProtocolHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "AMQP({}) {}.{}.{}",
            self.protocol_id, self.major, self.minor, self.revision
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_amqp_header() {
        let mut buf = BytesMut::new();
        ProtocolHeader::amqp().encode(&mut buf);

        assert_eq!(buf.as_ref(), b"AMQP\x00\x01\x00\x00");

        let decoded = ProtocolHeader::decode(buf.as_ref().try_into().unwrap()).unwrap();
        assert_eq!(decoded, ProtocolHeader::amqp());
    }

    #[test]
    fn rejects_non_amqp_prefix() {
        let err = ProtocolHeader::decode(*b"HTTP\x00\x01\x00\x00").unwrap_err();
        assert!(matches!(err, CodecError::InvalidHeader(_)));
    }

    #[test]
    fn preserves_protocol_id() {
        let sasl = ProtocolHeader {
            protocol_id: 3,
            major: 1,
            minor: 0,
            revision: 0,
        };
        let mut buf = BytesMut::new();
        sasl.encode(&mut buf);
        let decoded = ProtocolHeader::decode(buf.as_ref().try_into().unwrap()).unwrap();
        assert_eq!(decoded.protocol_id, 3);
    }
}
