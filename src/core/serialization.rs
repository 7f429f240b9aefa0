//! # Serialization Formats
//!
//! Selects which [`PacketCodec`] frames messages on a connection.
//!
//! - **Binary**: fixed 28-byte header, CRC32-checked payload (default, fastest)
//! - **JSON**: length-prefixed `{type, timestamp, sequence, data}` documents (debugging, interop)
//!
//! Both ends of a connection must agree on the format; nothing on the wire negotiates it.

use crate::core::codec::{BinaryCodec, PacketCodec};
use crate::core::json::JsonCodec;
use crate::core::message::MessageRegistry;
use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Supported wire formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializationFormat {
    /// Fixed-header binary packets (default)
    #[default]
    Binary,
    /// Human-readable JSON envelopes
    Json,
}

impl SerializationFormat {
    /// Get human-readable name
    pub fn name(self) -> &'static str {
        match self {
            SerializationFormat::Binary => "Binary",
            SerializationFormat::Json => "JSON",
        }
    }

    /// Build the codec for this format around a frozen message registry
    pub fn codec(self, registry: Arc<MessageRegistry>, max_payload: usize) -> Arc<dyn PacketCodec> {
        match self {
            SerializationFormat::Binary => Arc::new(BinaryCodec::new(registry, max_payload)),
            SerializationFormat::Json => Arc::new(JsonCodec::new(registry, max_payload)),
        }
    }
}

impl fmt::Display for SerializationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SerializationFormat {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binary" => Ok(SerializationFormat::Binary),
            "json" => Ok(SerializationFormat::Json),
            other => Err(ProtocolError::ConfigError(format!(
                "Unknown serialization format: {other}"
            ))),
        }
    }
}
