//! Control-protocol codec boundary.
//!
//! The bridge never interprets control payloads itself; it hands a
//! complete frame to a [`ControlCodec`] and gets back an address +
//! values tuple (and the reverse on the outbound path). [`OscCodec`] is
//! the default implementation, a thin adapter over the `rosc` OSC stack.

use std::sync::Arc;

use bytes::Bytes;

use crate::error::{BridgeError, Result};
use crate::protocol::{ControlMessage, Value};

/// Encode/decode boundary to the control-protocol stack.
///
/// Implementations must be cheap to share across connection handlers
/// and router workers.
pub trait ControlCodec: Send + Sync {
    /// Encode a control message into a single un-framed wire payload.
    fn encode(&self, message: &ControlMessage) -> Result<Bytes>;

    /// Decode one complete frame into a control message.
    fn decode(&self, frame: &[u8]) -> Result<ControlMessage>;
}

/// Shared codec handle.
pub type SharedCodec = Arc<dyn ControlCodec>;

/// OSC codec backed by `rosc`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OscCodec;

impl OscCodec {
    /// Create a new OSC codec.
    pub fn new() -> Self {
        Self
    }
}

impl ControlCodec for OscCodec {
    fn encode(&self, message: &ControlMessage) -> Result<Bytes> {
        let packet = rosc::OscPacket::Message(rosc::OscMessage {
            addr: message.address.clone(),
            args: message.values.iter().map(value_to_osc).collect(),
        });
        let encoded = rosc::encoder::encode(&packet)
            .map_err(|e| BridgeError::Codec(format!("encode {}: {e:?}", message.address)))?;
        Ok(Bytes::from(encoded))
    }

    fn decode(&self, frame: &[u8]) -> Result<ControlMessage> {
        let (_, packet) = rosc::decoder::decode_udp(frame)
            .map_err(|e| BridgeError::Codec(format!("decode: {e:?}")))?;
        match packet {
            rosc::OscPacket::Message(msg) => Ok(ControlMessage {
                address: msg.addr,
                values: msg.args.iter().filter_map(osc_to_value).collect(),
            }),
            rosc::OscPacket::Bundle(_) => {
                Err(BridgeError::Codec("bundles are not relayed".to_string()))
            }
        }
    }
}

fn value_to_osc(value: &Value) -> rosc::OscType {
    match value {
        Value::Int(v) => rosc::OscType::Int(*v),
        Value::Long(v) => rosc::OscType::Long(*v),
        Value::Float(v) => rosc::OscType::Float(*v),
        Value::Double(v) => rosc::OscType::Double(*v),
        Value::Str(v) => rosc::OscType::String(v.clone()),
        Value::Bool(v) => rosc::OscType::Bool(*v),
        Value::Bytes(v) => rosc::OscType::Blob(v.clone()),
    }
}

/// Argument types outside the bridged scalar set are skipped.
fn osc_to_value(arg: &rosc::OscType) -> Option<Value> {
    match arg {
        rosc::OscType::Int(v) => Some(Value::Int(*v)),
        rosc::OscType::Long(v) => Some(Value::Long(*v)),
        rosc::OscType::Float(v) => Some(Value::Float(*v)),
        rosc::OscType::Double(v) => Some(Value::Double(*v)),
        rosc::OscType::String(v) => Some(Value::Str(v.clone())),
        rosc::OscType::Bool(v) => Some(Value::Bool(*v)),
        rosc::OscType::Blob(v) => Some(Value::Bytes(v.clone())),
        _ => None,
    }
}
