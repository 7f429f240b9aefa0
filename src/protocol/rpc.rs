//! # RPC Envelopes
//!
//! Calls and their results as [`Message`]s.
//!
//! ## Binary Bodies
//! ```text
//! Request:  [CallId(8)] [MethodKey(16)] [Flags(1)] [Trace(25) if flags & TRACE] [Payload(..)]
//! Response: [CallId(8)] [Status(2)] [Payload(..)]
//! ```
//! Integers are little-endian. A non-OK response carries a UTF-8 description as its payload;
//! application-level failures are always encoded by the handler inside an OK payload.
//!
//! In JSON the payload is a base64 string.

use crate::core::message::{Message, MessageType};
use crate::error::{ProtocolError, Result, StatusCode};
use crate::protocol::method::MethodKey;
use crate::protocol::trace::{TraceHeader, TRACE_HEADER_SIZE};
use bytes::{Buf, BufMut, Bytes};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;

const FLAG_TRACE: u8 = 0b0000_0001;

const REQUEST_FIXED: usize = 8 + MethodKey::LEN + 1;
const RESPONSE_FIXED: usize = 8 + 2;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub call_id: u64,
    pub method: MethodKey,
    pub trace: Option<TraceHeader>,
    pub payload: Bytes,
}

impl Request {
    pub fn new(call_id: u64, method: MethodKey, payload: impl Into<Bytes>) -> Self {
        Self {
            call_id,
            method,
            trace: None,
            payload: payload.into(),
        }
    }

    pub fn with_trace(mut self, trace: Option<TraceHeader>) -> Self {
        self.trace = trace;
        self
    }
}

#[derive(Serialize, Deserialize)]
struct RequestJson {
    call_id: u64,
    method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    trace: Option<TraceHeader>,
    #[serde(with = "base64_payload")]
    payload: Bytes,
}

impl Message for Request {
    fn message_type(&self) -> MessageType {
        MessageType::REQUEST
    }

    fn marshal(&self) -> Result<Vec<u8>> {
        let trace_len = if self.trace.is_some() {
            TRACE_HEADER_SIZE
        } else {
            0
        };
        let mut buf = Vec::with_capacity(REQUEST_FIXED + trace_len + self.payload.len());
        buf.put_u64_le(self.call_id);
        buf.put_slice(self.method.as_bytes());
        match &self.trace {
            Some(trace) => {
                buf.put_u8(FLAG_TRACE);
                buf.put_slice(&trace.encode());
            }
            None => buf.put_u8(0),
        }
        buf.put_slice(&self.payload);
        Ok(buf)
    }

    fn unmarshal(&mut self, data: &[u8]) -> Result<()> {
        if data.len() < REQUEST_FIXED {
            return Err(ProtocolError::DeserializeError(format!(
                "Request body too short: {} bytes",
                data.len()
            )));
        }
        let mut buf = data;
        let call_id = buf.get_u64_le();
        let mut method = [0u8; MethodKey::LEN];
        buf.copy_to_slice(&mut method);
        let flags = buf.get_u8();

        let trace = if flags & FLAG_TRACE != 0 {
            let trace = TraceHeader::decode(buf)?;
            buf.advance(TRACE_HEADER_SIZE);
            Some(trace)
        } else {
            None
        };

        *self = Request {
            call_id,
            method: MethodKey::from_bytes(method),
            trace,
            payload: Bytes::copy_from_slice(buf),
        };
        Ok(())
    }

    fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(RequestJson {
            call_id: self.call_id,
            method: self.method.to_hex(),
            trace: self.trace,
            payload: self.payload.clone(),
        })?)
    }

    fn merge_json(&mut self, data: Value) -> Result<()> {
        let json: RequestJson = serde_json::from_value(data)?;
        let method = MethodKey::from_hex(&json.method).ok_or_else(|| {
            ProtocolError::DeserializeError(format!("Invalid method key: {}", json.method))
        })?;
        *self = Request {
            call_id: json.call_id,
            method,
            trace: json.trace,
            payload: json.payload,
        };
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub call_id: u64,
    pub status: StatusCode,
    pub payload: Bytes,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            call_id: 0,
            status: StatusCode::Ok,
            payload: Bytes::new(),
        }
    }
}

impl Response {
    pub fn ok(call_id: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            call_id,
            status: StatusCode::Ok,
            payload: payload.into(),
        }
    }

    /// Failed call; the error's description becomes the payload
    pub fn from_error(call_id: u64, err: &ProtocolError) -> Self {
        Self {
            call_id,
            status: err.status_code(),
            payload: Bytes::from(err.to_string()),
        }
    }

    /// The payload of an OK response, or the remote failure as an error
    pub fn into_result(self) -> Result<Bytes> {
        if self.status.is_ok() {
            return Ok(self.payload);
        }
        Err(ProtocolError::Remote {
            status: self.status,
            message: String::from_utf8_lossy(&self.payload).into_owned(),
        })
    }
}

#[derive(Serialize, Deserialize)]
struct ResponseJson {
    call_id: u64,
    status: u16,
    #[serde(with = "base64_payload")]
    payload: Bytes,
}

impl Message for Response {
    fn message_type(&self) -> MessageType {
        MessageType::RESPONSE
    }

    fn marshal(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(RESPONSE_FIXED + self.payload.len());
        buf.put_u64_le(self.call_id);
        buf.put_u16_le(self.status.as_u16());
        buf.put_slice(&self.payload);
        Ok(buf)
    }

    fn unmarshal(&mut self, data: &[u8]) -> Result<()> {
        if data.len() < RESPONSE_FIXED {
            return Err(ProtocolError::DeserializeError(format!(
                "Response body too short: {} bytes",
                data.len()
            )));
        }
        let mut buf = data;
        let call_id = buf.get_u64_le();
        let status = StatusCode::from_u16(buf.get_u16_le());
        *self = Response {
            call_id,
            status,
            payload: Bytes::copy_from_slice(buf),
        };
        Ok(())
    }

    fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(ResponseJson {
            call_id: self.call_id,
            status: self.status.as_u16(),
            payload: self.payload.clone(),
        })?)
    }

    fn merge_json(&mut self, data: Value) -> Result<()> {
        let json: ResponseJson = serde_json::from_value(data)?;
        *self = Response {
            call_id: json.call_id,
            status: StatusCode::from_u16(json.status),
            payload: json.payload,
        };
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

mod base64_payload {
    use base64::prelude::*;
    use bytes::Bytes;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(payload: &Bytes, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&BASE64_STANDARD.encode(payload))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Bytes, D::Error> {
        let text = String::deserialize(d)?;
        BASE64_STANDARD
            .decode(text.as_bytes())
            .map(Bytes::from)
            .map_err(|e| D::Error::custom(format!("payload is not base64: {e}")))
    }
}
