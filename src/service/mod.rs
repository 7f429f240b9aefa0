//! # Services
//!
//! The two ends of an RPC channel.
//!
//! - [`Connection`]: client side. Resolver, balancer, codec and reader/writer composed into
//!   one logical channel with call multiplexing.
//! - [`Server`]: accept loop dispatching requests to a frozen
//!   [`HandlerMap`](crate::protocol::dispatcher::HandlerMap).

pub mod connection;
pub mod server;

pub use connection::Connection;
pub use server::Server;
