//! # Trace Context Propagation
//!
//! Carries the caller's span across the process boundary as a fixed 25-byte region:
//!
//! ```text
//! [TraceId(16)] [SpanId(8)] [Flags(1)]
//! ```
//!
//! The region is only written when the caller has a valid span. Presence is recorded
//! separately by the enclosing envelope, so an all-zero trace id is never mistaken for
//! "no trace".

use crate::error::{ProtocolError, Result};
use opentelemetry::trace::{
    SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState,
};
use opentelemetry::Context;
use serde::{Deserialize, Serialize};

pub const TRACE_HEADER_SIZE: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceHeader {
    pub trace_id: [u8; 16],
    pub span_id: [u8; 8],
    pub flags: u8,
}

impl TraceHeader {
    /// Capture the active span of `cx`, if it has a valid one
    pub fn from_context(cx: &Context) -> Option<Self> {
        let span = cx.span();
        let span_context = span.span_context();
        if !span_context.is_valid() {
            return None;
        }
        Some(Self {
            trace_id: span_context.trace_id().to_bytes(),
            span_id: span_context.span_id().to_bytes(),
            flags: span_context.trace_flags().to_u8(),
        })
    }

    /// A context whose parent is this header's span, marked remote
    pub fn to_context(&self) -> Context {
        let span_context = SpanContext::new(
            TraceId::from_bytes(self.trace_id),
            SpanId::from_bytes(self.span_id),
            TraceFlags::new(self.flags),
            true,
            TraceState::default(),
        );
        Context::new().with_remote_span_context(span_context)
    }

    pub fn encode(&self) -> [u8; TRACE_HEADER_SIZE] {
        let mut buf = [0u8; TRACE_HEADER_SIZE];
        buf[..16].copy_from_slice(&self.trace_id);
        buf[16..24].copy_from_slice(&self.span_id);
        buf[24] = self.flags;
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < TRACE_HEADER_SIZE {
            return Err(ProtocolError::DeserializeError(format!(
                "Trace region needs {TRACE_HEADER_SIZE} bytes, got {}",
                buf.len()
            )));
        }
        let mut trace_id = [0u8; 16];
        let mut span_id = [0u8; 8];
        trace_id.copy_from_slice(&buf[..16]);
        span_id.copy_from_slice(&buf[16..24]);
        Ok(Self {
            trace_id,
            span_id,
            flags: buf[24],
        })
    }
}

/// Copy the active span of `cx` into `buf[..25]`.
///
/// Leaves `buf` untouched and returns `false` when there is no valid span.
pub fn write_trace_context(cx: &Context, buf: &mut [u8]) -> Result<bool> {
    if buf.len() < TRACE_HEADER_SIZE {
        return Err(ProtocolError::DeserializeError(format!(
            "Trace region needs {TRACE_HEADER_SIZE} bytes, got {}",
            buf.len()
        )));
    }
    match TraceHeader::from_context(cx) {
        Some(header) => {
            buf[..TRACE_HEADER_SIZE].copy_from_slice(&header.encode());
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Rebuild the remote parent context from `buf[..25]`.
///
/// Only call this when the envelope says a trace was embedded.
pub fn read_trace_context(buf: &[u8]) -> Result<Context> {
    Ok(TraceHeader::decode(buf)?.to_context())
}
