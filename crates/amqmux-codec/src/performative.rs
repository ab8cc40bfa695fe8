//! The nine AMQP 1.0 transport performatives.
//!
//! Each performative is a described list on the wire: constructor 0x00, a
//! ulong descriptor code, then a list of fields in standard order. Optional
//! trailing fields are trimmed when encoding and default when decoding, so
//! both short and padded encodings interoperate.

use bytes::Bytes;

use crate::error::{CodecError, Result};
use crate::value::Value;

pub const OPEN_CODE: u64 = 0x10;
pub const BEGIN_CODE: u64 = 0x11;
pub const ATTACH_CODE: u64 = 0x12;
pub const FLOW_CODE: u64 = 0x13;
pub const TRANSFER_CODE: u64 = 0x14;
pub const DISPOSITION_CODE: u64 = 0x15;
pub const DETACH_CODE: u64 = 0x16;
pub const END_CODE: u64 = 0x17;
pub const CLOSE_CODE: u64 = 0x18;
pub const ERROR_CODE: u64 = 0x1d;

/// Link direction as carried in attach and disposition frames.
///
/// On the wire this is a boolean: false is the sender role, true the
/// receiver role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
}

impl Role {
    pub fn reciprocal(self) -> Self {
        match self {
            Role::Sender => Role::Receiver,
            Role::Receiver => Role::Sender,
        }
    }

    fn to_value(self) -> Value {
        Value::Bool(self == Role::Receiver)
    }

    fn from_bool(receiver: bool) -> Self {
        if receiver {
            Role::Receiver
        } else {
            Role::Sender
        }
    }
}

/// Connection-level open declaration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Open {
    pub container_id: String,
    pub hostname: Option<String>,
    pub max_frame_size: Option<u32>,
    pub channel_max: Option<u16>,
    pub idle_timeout: Option<u32>,
}

/// Session-level begin declaration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Begin {
    /// The channel the peer that initiated the session is using. Absent on
    /// the initiating begin; set on the answering begin.
    pub remote_channel: Option<u16>,
    pub next_outgoing_id: u32,
    pub incoming_window: u32,
    pub outgoing_window: u32,
    pub handle_max: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attach {
    pub name: String,
    pub handle: u32,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Flow {
    pub next_incoming_id: Option<u32>,
    pub incoming_window: u32,
    pub next_outgoing_id: u32,
    pub outgoing_window: u32,
    pub handle: Option<u32>,
    pub delivery_count: Option<u32>,
    pub link_credit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Transfer {
    pub handle: u32,
    pub delivery_id: Option<u32>,
    pub delivery_tag: Option<Bytes>,
    pub message_format: Option<u32>,
    pub settled: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Disposition {
    pub role: Role,
    pub first: u32,
    pub last: Option<u32>,
    pub settled: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detach {
    pub handle: u32,
    pub closed: bool,
    pub error: Option<ErrorCondition>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct End {
    pub error: Option<ErrorCondition>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Close {
    pub error: Option<ErrorCondition>,
}

/// Error carried by close, end, and detach frames (descriptor 0x1d).
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorCondition {
    pub condition: String,
    pub description: Option<String>,
}

impl ErrorCondition {
    pub fn new(condition: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            condition: condition.into(),
            description: Some(description.into()),
        }
    }

    fn to_value(&self) -> Value {
        let fields = vec![
            Value::Symbol(self.condition.clone()),
            match &self.description {
                Some(text) => Value::Str(text.clone()),
                None => Value::Null,
            },
        ];
        described(ERROR_CODE, fields)
    }

    fn from_value(value: &Value) -> Result<Self> {
        let (code, fields) = split_described(value)?;
        if code != ERROR_CODE {
            return Err(CodecError::UnknownDescriptor(code));
        }
        Ok(Self {
            condition: req_str(&fields, 0, "error condition")?,
            description: opt_str(&fields, 1),
        })
    }
}

/// A decoded transport performative.
#[derive(Debug, Clone, PartialEq)]
pub enum Performative {
    Open(Open),
    Begin(Begin),
    Attach(Attach),
    Flow(Flow),
    Transfer(Transfer),
    Disposition(Disposition),
    Detach(Detach),
    End(End),
    Close(Close),
}

impl Performative {
    /// The lowercase performative name, as used for event dispatch.
    pub fn name(&self) -> &'static str {
        match self {
            Performative::Open(_) => "open",
            Performative::Begin(_) => "begin",
            Performative::Attach(_) => "attach",
            Performative::Flow(_) => "flow",
            Performative::Transfer(_) => "transfer",
            Performative::Disposition(_) => "disposition",
            Performative::Detach(_) => "detach",
            Performative::End(_) => "end",
            Performative::Close(_) => "close",
        }
    }

    /// Encode this performative as a described list value.
    pub fn to_value(&self) -> Value {
        match self {
            Performative::Open(open) => described(
                OPEN_CODE,
                vec![
                    Value::Str(open.container_id.clone()),
                    opt_string_value(&open.hostname),
                    opt_u32_value(open.max_frame_size),
                    opt_u16_value(open.channel_max),
                    opt_u32_value(open.idle_timeout),
                ],
            ),
            Performative::Begin(begin) => described(
                BEGIN_CODE,
                vec![
                    opt_u16_value(begin.remote_channel),
                    Value::Uint(begin.next_outgoing_id),
                    Value::Uint(begin.incoming_window),
                    Value::Uint(begin.outgoing_window),
                    opt_u32_value(begin.handle_max),
                ],
            ),
            Performative::Attach(attach) => described(
                ATTACH_CODE,
                vec![
                    Value::Str(attach.name.clone()),
                    Value::Uint(attach.handle),
                    attach.role.to_value(),
                ],
            ),
            Performative::Flow(flow) => described(
                FLOW_CODE,
                vec![
                    opt_u32_value(flow.next_incoming_id),
                    Value::Uint(flow.incoming_window),
                    Value::Uint(flow.next_outgoing_id),
                    Value::Uint(flow.outgoing_window),
                    opt_u32_value(flow.handle),
                    opt_u32_value(flow.delivery_count),
                    opt_u32_value(flow.link_credit),
                ],
            ),
            Performative::Transfer(transfer) => described(
                TRANSFER_CODE,
                vec![
                    Value::Uint(transfer.handle),
                    opt_u32_value(transfer.delivery_id),
                    match &transfer.delivery_tag {
                        Some(tag) => Value::Binary(tag.clone()),
                        None => Value::Null,
                    },
                    opt_u32_value(transfer.message_format),
                    opt_bool_value(transfer.settled),
                ],
            ),
            Performative::Disposition(disposition) => described(
                DISPOSITION_CODE,
                vec![
                    disposition.role.to_value(),
                    Value::Uint(disposition.first),
                    opt_u32_value(disposition.last),
                    opt_bool_value(disposition.settled),
                ],
            ),
            Performative::Detach(detach) => described(
                DETACH_CODE,
                vec![
                    Value::Uint(detach.handle),
                    Value::Bool(detach.closed),
                    opt_error_value(&detach.error),
                ],
            ),
            Performative::End(end) => described(END_CODE, vec![opt_error_value(&end.error)]),
            Performative::Close(close) => described(CLOSE_CODE, vec![opt_error_value(&close.error)]),
        }
    }

    /// Decode a performative from a described list value.
    pub fn from_value(value: &Value) -> Result<Performative> {
        let (code, fields) = split_described(value)?;
        match code {
            OPEN_CODE => Ok(Performative::Open(Open {
                container_id: req_str(&fields, 0, "open container-id")?,
                hostname: opt_str(&fields, 1),
                max_frame_size: opt_u32(&fields, 2),
                channel_max: opt_u16(&fields, 3),
                idle_timeout: opt_u32(&fields, 4),
            })),
            BEGIN_CODE => Ok(Performative::Begin(Begin {
                remote_channel: opt_u16(&fields, 0),
                next_outgoing_id: req_u32(&fields, 1, "begin next-outgoing-id")?,
                incoming_window: req_u32(&fields, 2, "begin incoming-window")?,
                outgoing_window: req_u32(&fields, 3, "begin outgoing-window")?,
                handle_max: opt_u32(&fields, 4),
            })),
            ATTACH_CODE => Ok(Performative::Attach(Attach {
                name: req_str(&fields, 0, "attach name")?,
                handle: req_u32(&fields, 1, "attach handle")?,
                role: Role::from_bool(req_bool(&fields, 2, "attach role")?),
            })),
            FLOW_CODE => Ok(Performative::Flow(Flow {
                next_incoming_id: opt_u32(&fields, 0),
                incoming_window: req_u32(&fields, 1, "flow incoming-window")?,
                next_outgoing_id: req_u32(&fields, 2, "flow next-outgoing-id")?,
                outgoing_window: req_u32(&fields, 3, "flow outgoing-window")?,
                handle: opt_u32(&fields, 4),
                delivery_count: opt_u32(&fields, 5),
                link_credit: opt_u32(&fields, 6),
            })),
            TRANSFER_CODE => Ok(Performative::Transfer(Transfer {
                handle: req_u32(&fields, 0, "transfer handle")?,
                delivery_id: opt_u32(&fields, 1),
                delivery_tag: opt_bytes(&fields, 2),
                message_format: opt_u32(&fields, 3),
                settled: opt_bool(&fields, 4),
            })),
            DISPOSITION_CODE => Ok(Performative::Disposition(Disposition {
                role: Role::from_bool(req_bool(&fields, 0, "disposition role")?),
                first: req_u32(&fields, 1, "disposition first")?,
                last: opt_u32(&fields, 2),
                settled: opt_bool(&fields, 3),
            })),
            DETACH_CODE => Ok(Performative::Detach(Detach {
                handle: req_u32(&fields, 0, "detach handle")?,
                closed: opt_bool(&fields, 1).unwrap_or(false),
                error: opt_error(&fields, 2)?,
            })),
            END_CODE => Ok(Performative::End(End {
                error: opt_error(&fields, 0)?,
            })),
            CLOSE_CODE => Ok(Performative::Close(Close {
                error: opt_error(&fields, 0)?,
            })),
            other => Err(CodecError::UnknownDescriptor(other)),
        }
    }
}

fn described(code: u64, mut fields: Vec<Value>) -> Value {
    while fields.last().is_some_and(Value::is_null) {
        fields.pop();
    }
    Value::Described {
        descriptor: Box::new(Value::Ulong(code)),
        value: Box::new(Value::List(fields)),
    }
}

fn split_described(value: &Value) -> Result<(u64, Vec<Value>)> {
    let Value::Described { descriptor, value } = value else {
        return Err(CodecError::Malformed("performative"));
    };
    let code = descriptor
        .as_u64()
        .ok_or(CodecError::Malformed("performative descriptor"))?;
    let Value::List(fields) = value.as_ref() else {
        return Err(CodecError::Malformed("performative body"));
    };
    Ok((code, fields.clone()))
}

fn opt_string_value(value: &Option<String>) -> Value {
    match value {
        Some(text) => Value::Str(text.clone()),
        None => Value::Null,
    }
}

fn opt_u16_value(value: Option<u16>) -> Value {
    match value {
        Some(v) => Value::Ushort(v),
        None => Value::Null,
    }
}

fn opt_u32_value(value: Option<u32>) -> Value {
    match value {
        Some(v) => Value::Uint(v),
        None => Value::Null,
    }
}

fn opt_bool_value(value: Option<bool>) -> Value {
    match value {
        Some(v) => Value::Bool(v),
        None => Value::Null,
    }
}

fn opt_error_value(value: &Option<ErrorCondition>) -> Value {
    match value {
        Some(error) => error.to_value(),
        None => Value::Null,
    }
}

fn field(fields: &[Value], idx: usize) -> Option<&Value> {
    fields.get(idx).filter(|value| !value.is_null())
}

fn req_str(fields: &[Value], idx: usize, what: &'static str) -> Result<String> {
    field(fields, idx)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(CodecError::Malformed(what))
}

fn req_u32(fields: &[Value], idx: usize, what: &'static str) -> Result<u32> {
    field(fields, idx)
        .and_then(Value::as_u32)
        .ok_or(CodecError::Malformed(what))
}

fn req_bool(fields: &[Value], idx: usize, what: &'static str) -> Result<bool> {
    field(fields, idx)
        .and_then(Value::as_bool)
        .ok_or(CodecError::Malformed(what))
}

fn opt_str(fields: &[Value], idx: usize) -> Option<String> {
    field(fields, idx).and_then(Value::as_str).map(str::to_string)
}

fn opt_u16(fields: &[Value], idx: usize) -> Option<u16> {
    field(fields, idx).and_then(Value::as_u16)
}

fn opt_u32(fields: &[Value], idx: usize) -> Option<u32> {
    field(fields, idx).and_then(Value::as_u32)
}

fn opt_bool(fields: &[Value], idx: usize) -> Option<bool> {
    field(fields, idx).and_then(Value::as_bool)
}

fn opt_bytes(fields: &[Value], idx: usize) -> Option<Bytes> {
    field(fields, idx).and_then(Value::as_bytes).cloned()
}

fn opt_error(fields: &[Value], idx: usize) -> Result<Option<ErrorCondition>> {
    match field(fields, idx) {
        Some(value) => Ok(Some(ErrorCondition::from_value(value)?)),
        None => Ok(None),
    }
}
