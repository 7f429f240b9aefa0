//! # Messages
//!
//! Logical payloads carried inside packets. A [`Message`] knows its wire type and how to
//! marshal itself for both codecs; the [`MessageRegistry`] rebuilds concrete messages from
//! a type tag when frames arrive.
//!
//! Most messages only need serde derives and a [`TypedMessage`] impl:
//!
//! ```rust
//! use rpc_transport::core::message::{MessageRegistry, MessageType, TypedMessage};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Default, Serialize, Deserialize)]
//! struct Heartbeat {
//!     tick: u64,
//! }
//!
//! impl TypedMessage for Heartbeat {
//!     const MESSAGE_TYPE: MessageType = MessageType(100);
//! }
//!
//! let mut registry = MessageRegistry::with_defaults();
//! registry.register::<Heartbeat>();
//! assert!(registry.contains(MessageType(100)));
//! ```

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;

/// Numeric tag identifying a message kind on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageType(pub u16);

impl MessageType {
    pub const REQUEST: MessageType = MessageType(1);
    pub const RESPONSE: MessageType = MessageType(2);
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A payload that both codecs can carry
pub trait Message: fmt::Debug + Send + Sync + 'static {
    fn message_type(&self) -> MessageType;

    /// Binary body used by the binary codec
    fn marshal(&self) -> Result<Vec<u8>>;

    /// Replace `self` with the contents of a binary body
    fn unmarshal(&mut self, data: &[u8]) -> Result<()>;

    /// JSON value placed in the envelope's `data` field
    fn to_json(&self) -> Result<Value>;

    /// Replace `self` with the contents of an envelope's `data` field
    fn merge_json(&mut self, data: Value) -> Result<()>;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl dyn Message {
    pub fn downcast_ref<T: Message>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast<T: Message>(self: Box<Self>) -> Option<Box<T>> {
        self.into_any().downcast::<T>().ok()
    }
}

/// Serde-backed messages: bincode on the binary wire, serde_json in JSON envelopes
pub trait TypedMessage:
    Serialize + DeserializeOwned + fmt::Debug + Default + Send + Sync + 'static
{
    const MESSAGE_TYPE: MessageType;
}

impl<T: TypedMessage> Message for T {
    fn message_type(&self) -> MessageType {
        T::MESSAGE_TYPE
    }

    fn marshal(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    fn unmarshal(&mut self, data: &[u8]) -> Result<()> {
        *self = bincode::deserialize(data)?;
        Ok(())
    }

    fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    fn merge_json(&mut self, data: Value) -> Result<()> {
        *self = serde_json::from_value(data)?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

/// Fallback for types nobody registered. Keeps whatever arrived so it can be inspected or
/// forwarded: raw bytes from the binary codec, a field map from the JSON codec.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericMessage {
    pub message_type: MessageType,
    pub raw: Vec<u8>,
    pub fields: Map<String, Value>,
}

impl GenericMessage {
    pub fn new(message_type: MessageType) -> Self {
        Self {
            message_type,
            raw: Vec::new(),
            fields: Map::new(),
        }
    }
}

impl Message for GenericMessage {
    fn message_type(&self) -> MessageType {
        self.message_type
    }

    fn marshal(&self) -> Result<Vec<u8>> {
        Ok(self.raw.clone())
    }

    fn unmarshal(&mut self, data: &[u8]) -> Result<()> {
        self.raw = data.to_vec();
        Ok(())
    }

    fn to_json(&self) -> Result<Value> {
        Ok(Value::Object(self.fields.clone()))
    }

    fn merge_json(&mut self, data: Value) -> Result<()> {
        match data {
            Value::Object(map) => self.fields = map,
            Value::Null => self.fields.clear(),
            other => {
                self.fields.clear();
                self.fields.insert("value".to_string(), other);
            }
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

pub type MessageFactory = fn() -> Box<dyn Message>;

/// Maps wire types to constructors. Filled during startup, then shared behind an `Arc`
/// and only read.
#[derive(Clone, Default)]
pub struct MessageRegistry {
    factories: HashMap<MessageType, MessageFactory>,
}

impl MessageRegistry {
    /// An empty registry. Every frame decodes to [`GenericMessage`].
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that knows the RPC envelopes
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_factory(MessageType::REQUEST, || {
            Box::new(crate::protocol::rpc::Request::default()) as Box<dyn Message>
        });
        registry.register_factory(MessageType::RESPONSE, || {
            Box::new(crate::protocol::rpc::Response::default()) as Box<dyn Message>
        });
        registry
    }

    pub fn register_factory(&mut self, message_type: MessageType, factory: MessageFactory) -> &mut Self {
        if self.factories.insert(message_type, factory).is_some() {
            tracing::debug!(%message_type, "Replaced message factory");
        }
        self
    }

    pub fn register<T: TypedMessage>(&mut self) -> &mut Self {
        self.register_factory(T::MESSAGE_TYPE, || Box::new(T::default()) as Box<dyn Message>)
    }

    pub fn contains(&self, message_type: MessageType) -> bool {
        self.factories.contains_key(&message_type)
    }

    /// Blank message for `message_type`, ready to be unmarshaled into
    pub fn create(&self, message_type: MessageType) -> Box<dyn Message> {
        match self.factories.get(&message_type) {
            Some(factory) => factory(),
            None => Box::new(GenericMessage::new(message_type)),
        }
    }
}

impl fmt::Debug for MessageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.factories.keys().map(|t| t.0).collect();
        types.sort_unstable();
        f.debug_struct("MessageRegistry").field("types", &types).finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Chat {
        channel: String,
        text: String,
    }

    impl TypedMessage for Chat {
        const MESSAGE_TYPE: MessageType = MessageType(42);
    }

    #[test]
    fn test_typed_message_binary_roundtrip() {
        let msg = Chat {
            channel: "world".into(),
            text: "hello".into(),
        };
        let bytes = msg.marshal().unwrap();

        let mut decoded = Chat::default();
        decoded.unmarshal(&bytes).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_typed_message_json_roundtrip() {
        let msg = Chat {
            channel: "guild".into(),
            text: "gg".into(),
        };
        let value = msg.to_json().unwrap();
        assert_eq!(value["channel"], "guild");

        let mut decoded = Chat::default();
        decoded.merge_json(value).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_registry_falls_back_to_generic() {
        let registry = MessageRegistry::new();
        let msg = registry.create(MessageType(7));
        assert_eq!(msg.message_type(), MessageType(7));
        assert!(msg.downcast_ref::<GenericMessage>().is_some());
    }

    #[test]
    fn test_registry_builds_registered_type() {
        let mut registry = MessageRegistry::new();
        registry.register::<Chat>();
        let msg = registry.create(MessageType(42));
        let chat = msg.downcast::<Chat>().expect("registered type");
        assert_eq!(*chat, Chat::default());
    }

    #[test]
    fn test_generic_wraps_non_object_json() {
        let mut msg = GenericMessage::new(MessageType(9));
        msg.merge_json(Value::from(5)).unwrap();
        assert_eq!(msg.fields.get("value"), Some(&Value::from(5)));
    }
}
