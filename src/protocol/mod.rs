//! # RPC Protocol Layer
//!
//! Everything above raw framing: method fingerprints, the dispatch table, call/response
//! envelopes and trace-context propagation.
//!
//! ## Components
//! - **Method**: 128-bit `MethodKey` fingerprints of `component.method`
//! - **Dispatcher**: builder-then-freeze `HandlerMap` with lock-free lookups
//! - **Rpc**: `Request` / `Response` messages correlated by call id
//! - **Trace**: 25-byte span region embedded in requests when tracing is active

pub mod dispatcher;
pub mod method;
pub mod rpc;
pub mod trace;
