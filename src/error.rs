//! # Error Types
//!
//! Crate-wide error handling for the RPC transport core.
//!
//! ## Error Categories
//! - **I/O Errors**: socket and file system failures
//! - **Framing Errors**: bad magic, unsupported version, oversized length, checksum mismatch.
//!   All of them are connection-fatal: the stream has no resynchronization point, so the owner
//!   must close it and re-establish a fresh one.
//! - **Resolution Errors**: unknown version tokens, cancellation while blocked
//! - **Dispatch Errors**: method not found, unexpected message types, remote failures
//!
//! Application errors never show up here. They travel inside response payloads.
//!
//! ## Example Usage
//! ```rust
//! use rpc_transport::error::{ProtocolError, Result, StatusCode};
//!
//! fn lookup(found: bool) -> Result<()> {
//!     if found {
//!         Ok(())
//!     } else {
//!         Err(ProtocolError::Remote {
//!             status: StatusCode::MethodNotFound,
//!             message: "no such method".into(),
//!         })
//!     }
//! }
//!
//! assert!(lookup(true).is_ok());
//! assert_eq!(lookup(false).unwrap_err().status_code(), StatusCode::MethodNotFound);
//! ```

use crate::protocol::method::MethodKey;
use std::io;
use thiserror::Error;

/// Transport-level outcome carried in every RPC response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum StatusCode {
    Ok = 0,
    MethodNotFound = 1,
    HandlerError = 2,
    BadRequest = 3,
}

impl StatusCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Unknown codes collapse into `HandlerError` so newer peers never break older ones.
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => StatusCode::Ok,
            1 => StatusCode::MethodNotFound,
            3 => StatusCode::BadRequest,
            _ => StatusCode::HandlerError,
        }
    }

    pub fn is_ok(self) -> bool {
        self == StatusCode::Ok
    }
}

// ProtocolError is the primary error type for all transport operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Binary serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Deserialize error: {0}")]
    DeserializeError(String),

    #[error("Invalid packet magic: {0:02x?}")]
    InvalidMagic([u8; 4]),

    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(u16),

    #[error("Packet too large: {size} bytes (max {max})")]
    OversizedPacket { size: usize, max: usize },

    #[error("Checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timeout occurred")]
    Timeout,

    #[error("Unrecognized resolution version: {0}")]
    UnknownVersion(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("No endpoints available")]
    NoEndpoints,

    #[error("Invalid network address: {0}")]
    InvalidAddress(String),

    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(String),

    #[error("Method not found: {0}")]
    MethodNotFound(MethodKey),

    #[error("Unexpected message type: {0}")]
    UnexpectedMessage(u16),

    #[error("Remote error ({status:?}): {message}")]
    Remote { status: StatusCode, message: String },

    #[error("Handler error: {0}")]
    Handler(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ProtocolError {
    /// Errors after which the byte stream can no longer be trusted.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::Io(_)
                | ProtocolError::InvalidMagic(_)
                | ProtocolError::UnsupportedVersion(_)
                | ProtocolError::OversizedPacket { .. }
                | ProtocolError::ChecksumMismatch { .. }
                | ProtocolError::ConnectionClosed
                | ProtocolError::UnexpectedMessage(_)
        )
    }

    /// Status code reported to a remote caller when this error ends a call.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProtocolError::MethodNotFound(_) => StatusCode::MethodNotFound,
            ProtocolError::Remote { status, .. } => *status,
            ProtocolError::Serialization(_)
            | ProtocolError::Json(_)
            | ProtocolError::DeserializeError(_) => StatusCode::BadRequest,
            _ => StatusCode::HandlerError,
        }
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_roundtrip() {
        for code in [
            StatusCode::Ok,
            StatusCode::MethodNotFound,
            StatusCode::HandlerError,
            StatusCode::BadRequest,
        ] {
            assert_eq!(StatusCode::from_u16(code.as_u16()), code);
        }
        assert_eq!(StatusCode::from_u16(999), StatusCode::HandlerError);
    }

    #[test]
    fn test_framing_errors_are_fatal() {
        assert!(ProtocolError::InvalidMagic([0; 4]).is_connection_fatal());
        assert!(ProtocolError::ChecksumMismatch {
            expected: 1,
            actual: 2
        }
        .is_connection_fatal());
        assert!(!ProtocolError::Cancelled.is_connection_fatal());
        assert!(!ProtocolError::MethodNotFound(MethodKey::new("a", "b")).is_connection_fatal());
    }

    #[test]
    fn test_method_not_found_maps_to_status() {
        let err = ProtocolError::MethodNotFound(MethodKey::new("inventory", "Get"));
        assert_eq!(err.status_code(), StatusCode::MethodNotFound);
        assert_eq!(
            ProtocolError::Handler("boom".into()).status_code(),
            StatusCode::HandlerError
        );
    }

    #[test]
    fn test_descriptions_sent_to_callers() {
        let key = MethodKey::new("inventory", "Get");
        assert_eq!(
            ProtocolError::MethodNotFound(key).to_string(),
            format!("Method not found: {key}")
        );
        assert_eq!(
            ProtocolError::OversizedPacket { size: 9, max: 8 }.to_string(),
            "Packet too large: 9 bytes (max 8)"
        );
        assert_eq!(ProtocolError::ConnectionClosed.to_string(), "Connection closed");
    }
}
