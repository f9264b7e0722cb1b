//! Error types for the bridge.

use thiserror::Error;

/// Main error type for all bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed or failed validation.
    #[error("config error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error (broker payloads).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Control-protocol encode/decode error.
    #[error("codec error: {0}")]
    Codec(String),

    /// Request rejected by the MQTT client (publish/subscribe).
    #[error("MQTT client error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// Broker session error (connect, transport, protocol).
    #[error("broker connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),

    /// Operation requires a connected broker session.
    #[error("broker session is not connected")]
    NotConnected,

    /// Reconnection gave up after the configured number of attempts.
    ///
    /// This is fatal: the owning process must shut the whole bridge
    /// down, not just the broker session.
    #[error("broker reconnect failed after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    /// An internal channel closed while the bridge was still running.
    #[error("internal channel closed")]
    ChannelClosed,
}

/// Result type alias using BridgeError.
pub type Result<T> = std::result::Result<T, BridgeError>;
