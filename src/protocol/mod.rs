//! Protocol module - delimiter framing and message types.
//!
//! This module implements the pure (no I/O) half of the relay:
//! - `0xC0`-delimited frame reassembly over arbitrary TCP chunking
//! - control/broker message types and the JSON payload shaping rules

mod frame_buffer;
mod message;

pub use frame_buffer::{build_frame, FrameBuffer, FRAME_DELIMITER, READ_BUFFER_SIZE};
pub use message::{
    is_momentary_trigger, payload_from_values, values_from_payload, BrokerMessage, ControlMessage,
    Value,
};
