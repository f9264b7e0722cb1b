//! Relay module - TCP listener, per-connection handling, endpoint registry.
//!
//! Provides:
//! - [`ConnectionRegistry`] - concurrency-safe table of live endpoints
//! - [`TcpFrameRelay`] - accept loop and per-connection frame relaying

mod listener;
mod registry;

pub use listener::TcpFrameRelay;
pub use registry::{ConnectionRegistry, RegistrationGuard};
