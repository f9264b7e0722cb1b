//! # osc-mqtt-bridge
//!
//! Bridges two messaging domains used in live-control setups: an OSC
//! control-protocol transport reachable over TCP (SLIP-style
//! `0xC0`-delimited frames) and an MQTT broker carrying
//! topic-structured JSON payloads. Network-resident control surfaces
//! exchange state with broker-based automation without either side
//! knowing the other's protocol.
//!
//! ## Architecture
//!
//! - **Relay** (TCP): accepts device connections, reassembles frames
//!   split across arbitrary packet boundaries, forwards them to the
//!   local delivery point, and writes broadcast frames back.
//! - **Broker session**: one supervising task owns the MQTT event loop;
//!   disconnects trigger bounded exponential-backoff reconnection.
//! - **Router**: two independent pipelines translate address/value
//!   messages into status topics + JSON payloads and back, including
//!   the momentary-press convention (auto-reset `0.0` after a `1.0`).
//!
//! ## Example
//!
//! ```ignore
//! use osc_mqtt_bridge::{Bridge, BridgeConfig};
//!
//! #[tokio::main]
//! async fn main() -> osc_mqtt_bridge::Result<()> {
//!     let config = BridgeConfig::load("config/config.yaml".as_ref())?;
//!     let mut bridge = Bridge::start(&config).await?;
//!
//!     tokio::select! {
//!         _ = tokio::signal::ctrl_c() => {}
//!         fatal = bridge.wait_fatal() => return Err(fatal),
//!     }
//!     bridge.stop().await;
//!     Ok(())
//! }
//! ```

pub mod broker;
pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod relay;
pub mod router;
pub mod supervisor;

mod bridge;

pub use bridge::Bridge;
pub use broker::{BrokerConnection, ReconnectState, SessionState};
pub use codec::{ControlCodec, OscCodec};
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use protocol::{BrokerMessage, ControlMessage, FrameBuffer, Value};
pub use relay::{ConnectionRegistry, TcpFrameRelay};
pub use router::MessageRouter;
pub use supervisor::TaskSupervisor;
