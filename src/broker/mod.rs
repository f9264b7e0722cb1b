//! Broker module - MQTT session ownership and reconnection.
//!
//! Provides:
//! - [`ReconnectState`] - bounded exponential backoff bookkeeping
//! - [`BrokerConnection`] - the publish/subscribe session handle
//! - [`SessionState`] - the session lifecycle states

mod backoff;
mod connection;

pub use backoff::{ReconnectState, MAX_RECONNECT_ATTEMPTS, MAX_RECONNECT_DELAY};
pub use connection::{BrokerConnection, SessionState};
