//! # rpc-transport
//!
//! Transport and service-discovery core for a distributed RPC runtime.
//!
//! Independently deployed processes find each other through versioned endpoint
//! resolution, exchange framed binary or JSON messages over byte streams, and dispatch
//! incoming calls by a 128-bit method fingerprint instead of string comparison.
//!
//! ## Layers
//! - [`resolver`]: versioned, long-polling endpoint resolution
//! - [`balancer`]: endpoint selection for new links
//! - [`core`]: packet framing, codecs, message registry, incremental reader/writer
//! - [`protocol`]: method keys, the frozen handler map, RPC envelopes, trace context
//! - [`transport`]: `tcp` and `unix` streams and listeners
//! - [`service`]: [`Connection`] (client) and [`Server`]
//!
//! ## Example
//! ```rust,no_run
//! use rpc_transport::{Connection, HandlerMap, Listener, RpcConfig, Server};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> rpc_transport::Result<()> {
//! let config = RpcConfig::default();
//!
//! let mut handlers = HandlerMap::builder();
//! handlers.register("inventory", "Count", |_cx, payload| async move { Ok(payload) });
//! let server = Server::from_config(handlers.freeze(), &config);
//! let listener = Listener::bind(&config.server.address.parse()?).await?;
//! tokio::spawn(async move { server.serve(listener, CancellationToken::new()).await });
//!
//! let conn = Connection::from_config(&config)?;
//! conn.start().await?;
//! let reply = conn
//!     .call(&opentelemetry::Context::current(), "inventory", "Count", &b"sword"[..])
//!     .await?;
//! # let _ = reply;
//! # Ok(())
//! # }
//! ```

pub mod balancer;
pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod resolver;
pub mod service;
pub mod transport;
pub mod utils;

pub use balancer::{Balancer, RandomBalancer, RoundRobinBalancer};
pub use config::RpcConfig;
pub use core::codec::{BinaryCodec, PacketCodec};
pub use core::json::JsonCodec;
pub use core::message::{Message, MessageRegistry, MessageType, TypedMessage};
pub use core::packet::Packet;
pub use core::serialization::SerializationFormat;
pub use error::{ProtocolError, Result, StatusCode};
pub use protocol::dispatcher::{CallContext, HandlerMap, HandlerMapBuilder};
pub use protocol::method::{make_method_key, MethodKey};
pub use resolver::{
    ConstantResolver, Endpoint, FileResolver, NetworkAddress, Resolution, Resolver, Version,
    WatchResolver,
};
pub use service::{Connection, Server};
pub use transport::Listener;
