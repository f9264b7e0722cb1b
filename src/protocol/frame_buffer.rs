//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management. Frames are
//! runs of bytes bounded by the `0xC0` delimiter; the buffer holds the
//! suffix of the most recent read that has not yet seen a terminating
//! delimiter (the pending tail).
//!
//! # Example
//!
//! ```
//! use osc_mqtt_bridge::protocol::FrameBuffer;
//!
//! let mut buffer = FrameBuffer::new();
//!
//! // Data arrives in arbitrary chunks from the socket
//! let frames = buffer.feed(&[0xC0, b'a', b'b']);
//! assert!(frames.is_empty());
//! let frames = buffer.feed(&[b'c', 0xC0]);
//! assert_eq!(frames, vec![bytes::Bytes::from_static(b"abc")]);
//! ```

use bytes::{Bytes, BytesMut};

/// Delimiter byte separating frames on the wire.
pub const FRAME_DELIMITER: u8 = 0xC0;

/// Per-read buffer size for the relay (1 MiB).
pub const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Buffer for accumulating incoming bytes and extracting complete frames.
///
/// One instance per connection; the pending tail is exclusively owned by
/// that connection's handler, so no locking is needed.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    /// Bytes seen since the last delimiter.
    tail: BytesMut,
}

impl FrameBuffer {
    /// Create a new, empty frame buffer.
    pub fn new() -> Self {
        Self {
            tail: BytesMut::new(),
        }
    }

    /// Feed a chunk of raw bytes and extract all complete frames.
    ///
    /// A frame is the non-empty byte run strictly between two delimiters
    /// (or stream start). Empty runs - back-to-back delimiters - are
    /// silently dropped. Bytes after the final delimiter become the new
    /// pending tail and are emitted once their terminating delimiter
    /// arrives, regardless of how the stream was chunked.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Bytes> {
        let mut frames = Vec::new();
        let mut rest = data;

        while let Some(pos) = rest.iter().position(|&b| b == FRAME_DELIMITER) {
            self.tail.extend_from_slice(&rest[..pos]);
            if !self.tail.is_empty() {
                frames.push(self.tail.split().freeze());
            }
            rest = &rest[pos + 1..];
        }
        self.tail.extend_from_slice(rest);

        frames
    }

    /// Number of buffered bytes awaiting a delimiter.
    pub fn pending_len(&self) -> usize {
        self.tail.len()
    }

    /// Check if the buffer holds no partial frame.
    pub fn is_empty(&self) -> bool {
        self.tail.is_empty()
    }

    /// Discard any partial frame.
    pub fn clear(&mut self) {
        self.tail.clear();
    }
}

/// Wrap an encoded message in delimiters for the wire.
pub fn build_frame(payload: &[u8]) -> Bytes {
    let mut framed = BytesMut::with_capacity(payload.len() + 2);
    framed.extend_from_slice(&[FRAME_DELIMITER]);
    framed.extend_from_slice(payload);
    framed.extend_from_slice(&[FRAME_DELIMITER]);
    framed.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(buffer: &mut FrameBuffer, chunks: &[&[u8]]) -> Vec<Bytes> {
        let mut frames = Vec::new();
        for chunk in chunks {
            frames.extend(buffer.feed(chunk));
        }
        frames
    }

    #[test]
    fn test_single_complete_frame() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.feed(b"\xC0hello\xC0");

        assert_eq!(frames, vec![Bytes::from_static(b"hello")]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_frames_in_one_feed() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.feed(b"\xC0first\xC0second\xC0third\xC0");

        assert_eq!(
            frames,
            vec![
                Bytes::from_static(b"first"),
                Bytes::from_static(b"second"),
                Bytes::from_static(b"third"),
            ]
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_frame_spanning_reads() {
        let mut buffer = FrameBuffer::new();

        assert!(buffer.feed(b"\xC0hel").is_empty());
        assert_eq!(buffer.pending_len(), 3);
        assert!(buffer.feed(b"lo wor").is_empty());

        let frames = buffer.feed(b"ld\xC0");
        assert_eq!(frames, vec![Bytes::from_static(b"hello world")]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_leading_bytes_before_first_delimiter_form_a_frame() {
        // Stream start counts as a frame boundary.
        let mut buffer = FrameBuffer::new();
        let frames = buffer.feed(b"head\xC0tail");

        assert_eq!(frames, vec![Bytes::from_static(b"head")]);
        assert_eq!(buffer.pending_len(), 4);
    }

    #[test]
    fn test_empty_frames_dropped() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.feed(b"\xC0\xC0\xC0a\xC0\xC0b\xC0");

        assert_eq!(
            frames,
            vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]
        );
    }

    #[test]
    fn test_delimiter_run_split_across_reads() {
        let mut buffer = FrameBuffer::new();
        let frames = feed_all(&mut buffer, &[b"\xC0a\xC0", b"\xC0", b"\xC0b\xC0"]);

        assert_eq!(
            frames,
            vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]
        );
    }

    #[test]
    fn test_byte_at_a_time() {
        let stream = b"\xC0one\xC0two\xC0\xC0three\xC0";
        let mut buffer = FrameBuffer::new();
        let mut frames = Vec::new();

        for byte in stream {
            frames.extend(buffer.feed(&[*byte]));
        }

        assert_eq!(
            frames,
            vec![
                Bytes::from_static(b"one"),
                Bytes::from_static(b"two"),
                Bytes::from_static(b"three"),
            ]
        );
    }

    #[test]
    fn test_chunking_invariance() {
        // The same byte stream must yield the same frames regardless of
        // where the chunk boundaries fall.
        let stream: &[u8] = b"\xC0alpha\xC0beta\xC0\xC0gamma\xC0delta";
        let expected = vec![
            Bytes::from_static(b"alpha"),
            Bytes::from_static(b"beta"),
            Bytes::from_static(b"gamma"),
        ];

        for split in 0..=stream.len() {
            let mut buffer = FrameBuffer::new();
            let frames = feed_all(&mut buffer, &[&stream[..split], &stream[split..]]);
            assert_eq!(frames, expected, "split at {}", split);
            assert_eq!(buffer.pending_len(), 5); // "delta" never terminated
        }
    }

    #[test]
    fn test_delimiter_payload_bytes_inside_frame_are_boundaries() {
        // 0xC0 is in-band: it always terminates a frame.
        let mut buffer = FrameBuffer::new();
        let frames = buffer.feed(b"\xC0ab\xC0cd\xC0");
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn test_clear_discards_partial() {
        let mut buffer = FrameBuffer::new();
        buffer.feed(b"\xC0partial");
        assert!(!buffer.is_empty());

        buffer.clear();
        assert!(buffer.is_empty());

        let frames = buffer.feed(b"whole\xC0");
        assert_eq!(frames, vec![Bytes::from_static(b"whole")]);
    }

    #[test]
    fn test_build_frame_wraps_payload() {
        let framed = build_frame(b"abc");
        assert_eq!(&framed[..], b"\xC0abc\xC0");

        let mut buffer = FrameBuffer::new();
        let frames = buffer.feed(&framed);
        assert_eq!(frames, vec![Bytes::from_static(b"abc")]);
    }
}
