//! # Utility Modules
//!
//! Supporting utilities for logging and timing.
//!
//! ## Components
//! - **Logging**: `tracing-subscriber` setup driven by [`crate::config::LoggingConfig`]
//! - **Time**: wall-clock timestamps stamped into frame headers

pub mod logging;
pub mod time;
