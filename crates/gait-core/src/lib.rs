//! # gait-core
//!
//! Foundation utilities shared by the gait live-channel crates:
//!
//! - **Backoff**: [`BackoffPolicy`] deciding whether and when to reconnect
//! - **Logging**: `tracing` subscriber setup and in-memory capture for tests

#![deny(unsafe_code)]

pub mod backoff;
pub mod logging;

pub use backoff::{BackoffDecision, BackoffPolicy, calculate_backoff_delay};
pub use logging::{LogFormat, init_subscriber};
