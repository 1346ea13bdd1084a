//! Shared frame model and protobuf codec for the session transport.
//!
//! This crate owns the wire representation used by both `server` and `cli`.
//! Payloads stay flexible (`serde_json::Value`) while frames travel as
//! protobuf for compact binary transport. Nothing here inspects payloads;
//! ordering and lifecycle rules belong to the `session` crate.

use std::time::{SystemTime, UNIX_EPOCH};

use prost::Message;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Frame data key for error messages.
pub const FRAME_MESSAGE: &str = "message";

/// Frame data key for grepable error codes.
pub const FRAME_CODE: &str = "code";

/// Error returned by [`decode_frame`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The raw bytes could not be decoded as a protobuf `WireFrame`.
    #[error("failed to decode protobuf frame: {0}")]
    Decode(#[from] prost::DecodeError),
    /// The `status` integer on the wire does not map to a known [`Status`] variant.
    #[error("invalid frame status: {0}")]
    InvalidStatus(i32),
}

/// Lifecycle position of a frame within one call.
///
/// A call is `request` followed, per direction, by `item* → done` or
/// `item* → error`. `cancel` may appear at any point and ends both directions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Opens a call. Client to server only.
    Request,
    /// One message on a direction (non-terminal).
    Item,
    /// Clean end-of-stream for the sending direction.
    Done,
    /// Error terminal for the sending direction.
    Error,
    /// Aborts the whole call.
    Cancel,
}

impl Status {
    /// Terminal statuses end a direction.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Cancel)
    }

    /// Convert status into wire enum integer value.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Request => WireFrameStatus::Request as i32,
            Self::Item => WireFrameStatus::Item as i32,
            Self::Done => WireFrameStatus::Done as i32,
            Self::Error => WireFrameStatus::Error as i32,
            Self::Cancel => WireFrameStatus::Cancel as i32,
        }
    }

    /// Parse a status from wire enum integer value.
    fn from_i32(value: i32) -> Result<Self, CodecError> {
        match WireFrameStatus::try_from(value) {
            Ok(WireFrameStatus::Request) => Ok(Self::Request),
            Ok(WireFrameStatus::Item) => Ok(Self::Item),
            Ok(WireFrameStatus::Done) => Ok(Self::Done),
            Ok(WireFrameStatus::Error) => Ok(Self::Error),
            Ok(WireFrameStatus::Cancel) => Ok(Self::Cancel),
            Err(_) => Err(CodecError::InvalidStatus(value)),
        }
    }
}

/// A single message on the session wire protocol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Unique identifier for this frame (UUID string).
    pub id: String,
    /// Call this frame belongs to. Shared by every frame of one session.
    pub call_id: String,
    /// Per-direction sequence number. `Request` and `Cancel` frames carry 0.
    pub seq: u64,
    /// Milliseconds since the Unix epoch when the frame was created.
    pub ts: i64,
    /// Fully qualified call name, e.g. `"TestService/GetTest"`.
    pub method: String,
    /// Lifecycle position of the frame.
    pub status: Status,
    /// Arbitrary JSON payload.
    pub data: Value,
}

impl Frame {
    /// Create a frame with a fresh id and timestamp.
    pub fn new(call_id: impl Into<String>, method: impl Into<String>, seq: u64, status: Status, data: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            call_id: call_id.into(),
            seq,
            ts: now_ms(),
            method: method.into(),
            status,
            data,
        }
    }

    /// Create the frame that opens a call.
    pub fn request(call_id: impl Into<String>, method: impl Into<String>) -> Self {
        Self::new(call_id, method, 0, Status::Request, Value::Object(Map::new()))
    }

    /// Create a cancel frame for a call.
    pub fn cancel(call_id: impl Into<String>, method: impl Into<String>) -> Self {
        Self::new(call_id, method, 0, Status::Cancel, Value::Object(Map::new()))
    }

    /// Create an error terminal carrying a code and message.
    pub fn error(call_id: impl Into<String>, method: impl Into<String>, seq: u64, code: &str, message: &str) -> Self {
        let mut data = Map::new();
        data.insert(FRAME_CODE.into(), Value::String(code.to_owned()));
        data.insert(FRAME_MESSAGE.into(), Value::String(message.to_owned()));
        Self::new(call_id, method, seq, Status::Error, Value::Object(data))
    }

    /// Read a string field from an object payload.
    #[must_use]
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}

/// Current time as milliseconds since Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

/// Encode a frame into protobuf bytes.
#[must_use]
pub fn encode_frame(frame: &Frame) -> Vec<u8> {
    let wire = frame_to_wire(frame);

    let mut out = Vec::with_capacity(wire.encoded_len());
    // Encoding into a growable Vec cannot hit `BufferTooSmall`, the only
    // error prost reports here.
    wire.encode(&mut out).unwrap_or_default();
    out
}

/// Decode protobuf bytes into a frame.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] for malformed bytes and
/// [`CodecError::InvalidStatus`] for out-of-range status values.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, CodecError> {
    let wire = WireFrame::decode(bytes)?;
    wire_to_frame(wire)
}

fn frame_to_wire(frame: &Frame) -> WireFrame {
    WireFrame {
        id: frame.id.clone(),
        call_id: frame.call_id.clone(),
        seq: frame.seq,
        ts: frame.ts,
        method: frame.method.clone(),
        status: frame.status.as_i32(),
        data: Some(json_to_proto_value(&frame.data)),
    }
}

fn wire_to_frame(wire: WireFrame) -> Result<Frame, CodecError> {
    Ok(Frame {
        id: wire.id,
        call_id: wire.call_id,
        seq: wire.seq,
        ts: wire.ts,
        method: wire.method,
        status: Status::from_i32(wire.status)?,
        data: wire
            .data
            .map_or(Value::Object(Map::new()), |v| proto_to_json_value(&v)),
    })
}

fn json_to_proto_value(value: &Value) -> prost_types::Value {
    use prost_types::value::Kind;

    let kind = match value {
        Value::Null => Kind::NullValue(prost_types::NullValue::NullValue as i32),
        Value::Bool(v) => Kind::BoolValue(*v),
        Value::Number(v) => Kind::NumberValue(v.as_f64().unwrap_or(0.0)),
        Value::String(v) => Kind::StringValue(v.clone()),
        Value::Array(v) => Kind::ListValue(prost_types::ListValue { values: v.iter().map(json_to_proto_value).collect() }),
        Value::Object(v) => Kind::StructValue(prost_types::Struct {
            fields: v
                .iter()
                .map(|(k, v)| (k.clone(), json_to_proto_value(v)))
                .collect(),
        }),
    };

    prost_types::Value { kind: Some(kind) }
}

fn proto_to_json_value(value: &prost_types::Value) -> Value {
    use prost_types::value::Kind;

    let Some(kind) = &value.kind else {
        return Value::Null;
    };

    match kind {
        Kind::NullValue(_) => Value::Null,
        Kind::NumberValue(v) => number_to_json(*v),
        Kind::StringValue(v) => Value::String(v.clone()),
        Kind::BoolValue(v) => Value::Bool(*v),
        Kind::StructValue(v) => Value::Object(
            v.fields
                .iter()
                .map(|(k, v)| (k.clone(), proto_to_json_value(v)))
                .collect(),
        ),
        Kind::ListValue(v) => Value::Array(v.values.iter().map(proto_to_json_value).collect()),
    }
}

/// Protobuf numbers are doubles. Integral values come back as JSON integers
/// so that typed payloads with integer fields decode after a round trip.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn number_to_json(v: f64) -> Value {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    if v.fract() == 0.0 && v.abs() <= MAX_EXACT {
        return Value::from(v as i64);
    }
    serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number)
}

#[derive(Clone, PartialEq, Message)]
struct WireFrame {
    #[prost(string, tag = "1")]
    id: String,
    #[prost(string, tag = "2")]
    call_id: String,
    #[prost(uint64, tag = "3")]
    seq: u64,
    #[prost(int64, tag = "4")]
    ts: i64,
    #[prost(string, tag = "5")]
    method: String,
    #[prost(enumeration = "WireFrameStatus", tag = "6")]
    status: i32,
    #[prost(message, optional, tag = "7")]
    data: Option<prost_types::Value>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
enum WireFrameStatus {
    Request = 0,
    Item = 1,
    Done = 2,
    Error = 3,
    Cancel = 4,
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
