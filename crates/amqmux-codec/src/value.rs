//! Primitive AMQP type model.
//!
//! This is the subset of the AMQP 1.0 type system the transport
//! performatives need: null, booleans, the unsigned integers, binary,
//! strings, symbols, lists, and described values. Encoding always picks
//! the smallest constructor that fits; decoding accepts every constructor
//! listed here.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{CodecError, Result};

// Type constructor bytes.
const NULL: u8 = 0x40;
const BOOL_TRUE: u8 = 0x41;
const BOOL_FALSE: u8 = 0x42;
const BOOL_BYTE: u8 = 0x56;
const USHORT: u8 = 0x60;
const UINT: u8 = 0x70;
const SMALL_UINT: u8 = 0x52;
const UINT_ZERO: u8 = 0x43;
const ULONG: u8 = 0x80;
const SMALL_ULONG: u8 = 0x53;
const ULONG_ZERO: u8 = 0x44;
const VBIN8: u8 = 0xa0;
const VBIN32: u8 = 0xb0;
const STR8: u8 = 0xa1;
const STR32: u8 = 0xb1;
const SYM8: u8 = 0xa3;
const SYM32: u8 = 0xb3;
const LIST0: u8 = 0x45;
const LIST8: u8 = 0xc0;
const LIST32: u8 = 0xd0;
const DESCRIBED: u8 = 0x00;

/// A decoded AMQP primitive value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Ushort(u16),
    Uint(u32),
    Ulong(u64),
    Binary(Bytes),
    Str(String),
    Symbol(String),
    List(Vec<Value>),
    Described {
        descriptor: Box<Value>,
        value: Box<Value>,
    },
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> Option<u16> {
        match self {
            Value::Ushort(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::Uint(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Ulong(v) => Some(*v),
            Value::Uint(v) => Some(u64::from(*v)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) | Value::Symbol(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Binary(v) => Some(v),
            _ => None,
        }
    }

    /// Append the wire form of this value to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        match self {
            Value::Null => dst.put_u8(NULL),
            Value::Bool(true) => dst.put_u8(BOOL_TRUE),
            Value::Bool(false) => dst.put_u8(BOOL_FALSE),
            Value::Ushort(v) => {
                dst.put_u8(USHORT);
                dst.put_u16(*v);
            }
            Value::Uint(0) => dst.put_u8(UINT_ZERO),
            Value::Uint(v) if *v <= 0xff => {
                dst.put_u8(SMALL_UINT);
                dst.put_u8(*v as u8);
            }
            Value::Uint(v) => {
                dst.put_u8(UINT);
                dst.put_u32(*v);
            }
            Value::Ulong(0) => dst.put_u8(ULONG_ZERO),
            Value::Ulong(v) if *v <= 0xff => {
                dst.put_u8(SMALL_ULONG);
                dst.put_u8(*v as u8);
            }
            Value::Ulong(v) => {
                dst.put_u8(ULONG);
                dst.put_u64(*v);
            }
            Value::Binary(v) => encode_variable(dst, VBIN8, VBIN32, v),
            Value::Str(v) => encode_variable(dst, STR8, STR32, v.as_bytes()),
            Value::Symbol(v) => encode_variable(dst, SYM8, SYM32, v.as_bytes()),
            Value::List(items) => encode_list(dst, items),
            Value::Described { descriptor, value } => {
                dst.put_u8(DESCRIBED);
                descriptor.encode(dst);
                value.encode(dst);
            }
        }
    }

    /// Decode one value from the front of `src`, advancing past it.
    pub fn decode(src: &mut &[u8]) -> Result<Value> {
        let constructor = take_u8(src, "value constructor")?;
        match constructor {
            NULL => Ok(Value::Null),
            BOOL_TRUE => Ok(Value::Bool(true)),
            BOOL_FALSE => Ok(Value::Bool(false)),
            BOOL_BYTE => match take_u8(src, "boolean")? {
                0 => Ok(Value::Bool(false)),
                1 => Ok(Value::Bool(true)),
                _ => Err(CodecError::Malformed("boolean")),
            },
            USHORT => Ok(Value::Ushort(take_u16(src, "ushort")?)),
            UINT => Ok(Value::Uint(take_u32(src, "uint")?)),
            SMALL_UINT => Ok(Value::Uint(u32::from(take_u8(src, "uint")?))),
            UINT_ZERO => Ok(Value::Uint(0)),
            ULONG => Ok(Value::Ulong(take_u64(src, "ulong")?)),
            SMALL_ULONG => Ok(Value::Ulong(u64::from(take_u8(src, "ulong")?))),
            ULONG_ZERO => Ok(Value::Ulong(0)),
            VBIN8 | VBIN32 => {
                let data = take_variable(src, constructor == VBIN32, "binary")?;
                Ok(Value::Binary(Bytes::copy_from_slice(data)))
            }
            STR8 | STR32 => {
                let data = take_variable(src, constructor == STR32, "string")?;
                let text = std::str::from_utf8(data)
                    .map_err(|_| CodecError::InvalidUtf8("string"))?;
                Ok(Value::Str(text.to_string()))
            }
            SYM8 | SYM32 => {
                let data = take_variable(src, constructor == SYM32, "symbol")?;
                let text = std::str::from_utf8(data)
                    .map_err(|_| CodecError::InvalidUtf8("symbol"))?;
                Ok(Value::Symbol(text.to_string()))
            }
            LIST0 => Ok(Value::List(Vec::new())),
            LIST8 | LIST32 => decode_list(src, constructor == LIST32),
            DESCRIBED => {
                let descriptor = Value::decode(src)?;
                let value = Value::decode(src)?;
                Ok(Value::Described {
                    descriptor: Box::new(descriptor),
                    value: Box::new(value),
                })
            }
            other => Err(CodecError::UnsupportedConstructor(other)),
        }
    }
}

fn encode_variable(dst: &mut BytesMut, small: u8, large: u8, data: &[u8]) {
    if data.len() <= 0xff {
        dst.put_u8(small);
        dst.put_u8(data.len() as u8);
    } else {
        dst.put_u8(large);
        dst.put_u32(data.len() as u32);
    }
    dst.put_slice(data);
}

fn encode_list(dst: &mut BytesMut, items: &[Value]) {
    if items.is_empty() {
        dst.put_u8(LIST0);
        return;
    }
    let mut body = BytesMut::new();
    for item in items {
        item.encode(&mut body);
    }
    // Size covers the count field plus the encoded elements.
    if body.len() + 1 <= 0xff && items.len() <= 0xff {
        dst.put_u8(LIST8);
        dst.put_u8((body.len() + 1) as u8);
        dst.put_u8(items.len() as u8);
    } else {
        dst.put_u8(LIST32);
        dst.put_u32((body.len() + 4) as u32);
        dst.put_u32(items.len() as u32);
    }
    dst.put_slice(&body);
}

fn decode_list(src: &mut &[u8], wide: bool) -> Result<Value> {
    let (size, count_width) = if wide {
        (take_u32(src, "list size")? as usize, 4)
    } else {
        (usize::from(take_u8(src, "list size")?), 1)
    };
    if size < count_width {
        return Err(CodecError::Malformed("list size"));
    }
    let mut region = take(src, size, "list body")?;
    let count = if wide {
        take_u32(&mut region, "list count")? as usize
    } else {
        usize::from(take_u8(&mut region, "list count")?)
    };
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(Value::decode(&mut region)?);
    }
    Ok(Value::List(items))
}

fn take<'a>(src: &mut &'a [u8], n: usize, what: &'static str) -> Result<&'a [u8]> {
    if src.len() < n {
        return Err(CodecError::Truncated(what));
    }
    let (head, tail) = src.split_at(n);
    *src = tail;
    Ok(head)
}

fn take_u8(src: &mut &[u8], what: &'static str) -> Result<u8> {
    Ok(take(src, 1, what)?[0])
}

fn take_u16(src: &mut &[u8], what: &'static str) -> Result<u16> {
    let bytes = take(src, 2, what)?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn take_u32(src: &mut &[u8], what: &'static str) -> Result<u32> {
    let bytes = take(src, 4, what)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn take_u64(src: &mut &[u8], what: &'static str) -> Result<u64> {
    let bytes = take(src, 8, what)?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    Ok(u64::from_be_bytes(raw))
}

fn take_variable<'a>(src: &mut &'a [u8], wide: bool, what: &'static str) -> Result<&'a [u8]> {
    let len = if wide {
        take_u32(src, what)? as usize
    } else {
        usize::from(take_u8(src, what)?)
    };
    take(src, len, what)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: Value) -> Value {
        let mut buf = BytesMut::new();
        value.encode(&mut buf);
        let mut src = buf.as_ref();
        let decoded = Value::decode(&mut src).expect("value should decode");
        assert!(src.is_empty(), "decode should consume the whole encoding");
        decoded
    }

    #[test]
    fn roundtrip_scalars() {
        for value in [
            Value::Null,
            Value::Bool(true),
            Value::Bool(false),
            Value::Ushort(0),
            Value::Ushort(65535),
            Value::Uint(0),
            Value::Uint(200),
            Value::Uint(1_000_000),
            Value::Ulong(0),
            Value::Ulong(0x18),
            Value::Ulong(u64::MAX),
        ] {
            assert_eq!(roundtrip(value.clone()), value);
        }
    }

    #[test]
    fn roundtrip_variable_width() {
        let long_text = "x".repeat(300);
        for value in [
            Value::Str("container-1".to_string()),
            Value::Str(long_text.clone()),
            Value::Symbol("amqp:connection:forced".to_string()),
            Value::Binary(Bytes::from_static(b"\x00\x01\x02")),
            Value::Binary(Bytes::from(vec![0xab; 700])),
        ] {
            assert_eq!(roundtrip(value.clone()), value);
        }
    }

    #[test]
    fn uint_picks_smallest_constructor() {
        let mut buf = BytesMut::new();
        Value::Uint(0).encode(&mut buf);
        assert_eq!(buf.as_ref(), &[0x43]);

        buf.clear();
        Value::Uint(7).encode(&mut buf);
        assert_eq!(buf.as_ref(), &[0x52, 7]);

        buf.clear();
        Value::Uint(0x1_0000).encode(&mut buf);
        assert_eq!(buf.as_ref(), &[0x70, 0, 1, 0, 0]);
    }

    #[test]
    fn roundtrip_lists() {
        let empty = Value::List(Vec::new());
        assert_eq!(roundtrip(empty.clone()), empty);

        let nested = Value::List(vec![
            Value::Str("name".to_string()),
            Value::Uint(3),
            Value::List(vec![Value::Bool(true), Value::Null]),
        ]);
        assert_eq!(roundtrip(nested.clone()), nested);
    }

    #[test]
    fn large_list_uses_list32() {
        let items: Vec<Value> = (0..300).map(Value::Uint).collect();
        let value = Value::List(items);
        let mut buf = BytesMut::new();
        value.encode(&mut buf);
        assert_eq!(buf[0], 0xd0);
        assert_eq!(roundtrip(value.clone()), value);
    }

    #[test]
    fn roundtrip_described() {
        let value = Value::Described {
            descriptor: Box::new(Value::Ulong(0x10)),
            value: Box::new(Value::List(vec![Value::Str("c".to_string())])),
        };
        assert_eq!(roundtrip(value.clone()), value);
    }

    #[test]
    fn truncated_input_is_an_error() {
        let mut buf = BytesMut::new();
        Value::Str("hello".to_string()).encode(&mut buf);
        let short = &buf.as_ref()[..buf.len() - 1];
        let mut src = short;
        assert!(matches!(
            Value::decode(&mut src),
            Err(CodecError::Truncated(_))
        ));
    }

    #[test]
    fn unknown_constructor_is_an_error() {
        let mut src: &[u8] = &[0x74, 0, 0, 0, 0];
        assert!(matches!(
            Value::decode(&mut src),
            Err(CodecError::UnsupportedConstructor(0x74))
        ));
    }

    #[test]
    fn bool_byte_form_is_accepted() {
        let mut src: &[u8] = &[0x56, 0x01];
        assert_eq!(Value::decode(&mut src).unwrap(), Value::Bool(true));
        let mut src: &[u8] = &[0x56, 0x02];
        assert!(Value::decode(&mut src).is_err());
    }
}
