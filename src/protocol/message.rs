//! Control and broker message types, plus the JSON payload shaping rules
//! shared by both router pipelines.
//!
//! A control message carries an address and an ordered run of scalar
//! values; a broker message carries a topic and a JSON payload. The
//! shaping convention is: exactly one value serializes as a bare scalar,
//! anything else as a JSON array.

use serde_json::{json, Value as JsonValue};

/// A scalar value in a control message.
///
/// The numeric variants mirror what the control-protocol stack can put
/// on the wire; byte values are rendered as UTF-8 text when they cross
/// into JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    Bool(bool),
    Bytes(Vec<u8>),
}

impl Value {
    /// Render this value as JSON.
    ///
    /// Byte values are decoded to text before serialization; non-finite
    /// floats degrade to `null` (JSON has no representation for them).
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Int(v) => json!(v),
            Value::Long(v) => json!(v),
            Value::Float(v) => json!(v),
            Value::Double(v) => json!(v),
            Value::Str(v) => json!(v),
            Value::Bool(v) => json!(v),
            Value::Bytes(v) => json!(String::from_utf8_lossy(v)),
        }
    }

    /// Build a value from a scalar JSON payload element.
    ///
    /// Integers map to `Int` (widening to `Long` when they do not fit),
    /// other numbers to `Float` - the 32-bit types the control protocol
    /// favors. Objects and nested arrays have no control representation
    /// and yield `None`.
    pub fn from_json(value: &JsonValue) -> Option<Value> {
        match value {
            JsonValue::Bool(b) => Some(Value::Bool(*b)),
            JsonValue::String(s) => Some(Value::Str(s.clone())),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    if let Ok(small) = i32::try_from(i) {
                        Some(Value::Int(small))
                    } else {
                        Some(Value::Long(i))
                    }
                } else {
                    n.as_f64().map(|f| Value::Float(f as f32))
                }
            }
            _ => None,
        }
    }
}

/// An address + ordered values tuple in the bridged control protocol.
///
/// Created per decoded frame, passed by value through exactly one queue
/// hop, and discarded after translation.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlMessage {
    /// Control address, e.g. `/ch/01/mix/fader`.
    pub address: String,
    /// Ordered argument values.
    pub values: Vec<Value>,
}

impl ControlMessage {
    /// Create a new control message.
    pub fn new(address: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            address: address.into(),
            values,
        }
    }
}

/// A topic + JSON payload pair in the publish/subscribe system.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerMessage {
    /// Full broker topic.
    pub topic: String,
    /// JSON payload: a bare scalar, or an array for multi-value messages.
    pub payload: JsonValue,
}

impl BrokerMessage {
    /// Create a new broker message.
    pub fn new(topic: impl Into<String>, payload: JsonValue) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }
}

/// Shape control values into a broker payload.
///
/// Exactly one value becomes the bare scalar; anything else becomes a
/// JSON array in value order.
pub fn payload_from_values(values: &[Value]) -> JsonValue {
    match values {
        [single] => single.to_json(),
        many => JsonValue::Array(many.iter().map(Value::to_json).collect()),
    }
}

/// Normalize a broker payload into an ordered value sequence.
///
/// A JSON array maps element-wise; a bare scalar is wrapped into a
/// single-element sequence. Elements with no control representation are
/// skipped.
pub fn values_from_payload(payload: &JsonValue) -> Vec<Value> {
    match payload {
        JsonValue::Array(items) => items.iter().filter_map(Value::from_json).collect(),
        scalar => Value::from_json(scalar).into_iter().collect(),
    }
}

/// Whether a broker payload triggers the momentary convention.
///
/// Only the bare numeric value `1.0` (pre-normalization) triggers the
/// delayed `0.0` follow-up; arrays never do, even `[1.0]`.
pub fn is_momentary_trigger(payload: &JsonValue) -> bool {
    payload.as_f64() == Some(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_value_is_bare_scalar() {
        let payload = payload_from_values(&[Value::Float(0.75)]);
        assert_eq!(payload, json!(0.75));
    }

    #[test]
    fn test_multi_value_is_array() {
        let payload = payload_from_values(&[Value::Str("on".into()), Value::Int(3)]);
        assert_eq!(payload, json!(["on", 3]));
    }

    #[test]
    fn test_empty_values_is_empty_array() {
        assert_eq!(payload_from_values(&[]), json!([]));
    }

    #[test]
    fn test_bytes_render_as_text() {
        let payload = payload_from_values(&[Value::Bytes(b"/label".to_vec())]);
        assert_eq!(payload, json!("/label"));
    }

    #[test]
    fn test_scalar_payload_wrapped() {
        assert_eq!(values_from_payload(&json!(0.5)), vec![Value::Float(0.5)]);
        assert_eq!(values_from_payload(&json!(7)), vec![Value::Int(7)]);
        assert_eq!(values_from_payload(&json!(true)), vec![Value::Bool(true)]);
        assert_eq!(
            values_from_payload(&json!("mute")),
            vec![Value::Str("mute".into())]
        );
    }

    #[test]
    fn test_array_payload_maps_elementwise() {
        let values = values_from_payload(&json!(["on", 3, 0.25]));
        assert_eq!(
            values,
            vec![Value::Str("on".into()), Value::Int(3), Value::Float(0.25)]
        );
    }

    #[test]
    fn test_large_integer_widens() {
        let values = values_from_payload(&json!(5_000_000_000i64));
        assert_eq!(values, vec![Value::Long(5_000_000_000)]);
    }

    #[test]
    fn test_unrepresentable_elements_skipped() {
        let values = values_from_payload(&json!([1, {"nested": true}, 2]));
        assert_eq!(values, vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_momentary_trigger() {
        assert!(is_momentary_trigger(&json!(1.0)));
        assert!(is_momentary_trigger(&json!(1)));
        assert!(!is_momentary_trigger(&json!(0.0)));
        assert!(!is_momentary_trigger(&json!(2.0)));
        assert!(!is_momentary_trigger(&json!([1.0])));
        assert!(!is_momentary_trigger(&json!("1")));
        assert!(!is_momentary_trigger(&json!(true)));
    }
}
