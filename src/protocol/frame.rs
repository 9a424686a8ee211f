//! Frame codec for the length-prefixed NexusTalk stream
//!
//! Every frame is `[type:1][length:2 BE][payload]`, except
//! LONG_PLAYBACK_PACKET which carries a 4-byte big-endian length. The decoder
//! accepts arbitrary chunk boundaries and never loses, duplicates, or
//! reorders bytes: incomplete frames simply wait for more data.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::constants::packet_type;

const SHORT_HEADER_LEN: usize = 3;
const LONG_HEADER_LEN: usize = 5;

/// A complete decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Packet type code
    pub packet_type: u8,
    /// Raw payload bytes (protobuf-encoded for all known types)
    pub payload: Bytes,
}

/// Reassembles frames from an inbound byte stream
///
/// Callers feed chunks with [`extend`](FrameDecoder::extend) and then loop on
/// [`next_frame`](FrameDecoder::next_frame) until it returns `None`. The loop
/// keeps a backlog of queued complete frames bounded on the heap instead of
/// recursing per frame.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    /// Create an empty decoder
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    /// Append an inbound chunk
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Pop the next complete frame, or `None` if more bytes are needed
    pub fn next_frame(&mut self) -> Option<Frame> {
        if self.buf.is_empty() {
            return None;
        }

        let packet_type = self.buf[0];
        let header_len = if packet_type == packet_type::LONG_PLAYBACK_PACKET {
            LONG_HEADER_LEN
        } else {
            SHORT_HEADER_LEN
        };
        if self.buf.len() < header_len {
            return None;
        }

        let payload_len = if header_len == LONG_HEADER_LEN {
            u32::from_be_bytes([self.buf[1], self.buf[2], self.buf[3], self.buf[4]]) as usize
        } else {
            u16::from_be_bytes([self.buf[1], self.buf[2]]) as usize
        };
        if self.buf.len() < header_len + payload_len {
            return None;
        }

        self.buf.advance(header_len);
        let payload = self.buf.split_to(payload_len).freeze();
        Some(Frame {
            packet_type,
            payload,
        })
    }

    /// Number of buffered, not-yet-decoded bytes
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }

    /// Discard any partial frame (used when a connection is torn down)
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

/// Prepend the frame header to a serialized payload
pub fn encode_frame(packet_type: u8, payload: &[u8]) -> Bytes {
    let long = packet_type == packet_type::LONG_PLAYBACK_PACKET;
    let header_len = if long { LONG_HEADER_LEN } else { SHORT_HEADER_LEN };
    let mut buf = BytesMut::with_capacity(header_len + payload.len());
    buf.put_u8(packet_type);
    if long {
        buf.put_u32(payload.len() as u32);
    } else {
        buf.put_u16(payload.len() as u16);
    }
    buf.put_slice(payload);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(decoder: &mut FrameDecoder) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(frame) = decoder.next_frame() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_single_frame() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&encode_frame(packet_type::OK, &[]));

        let frames = drain(&mut decoder);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].packet_type, packet_type::OK);
        assert!(frames[0].payload.is_empty());
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn test_long_frame_uses_four_byte_length() {
        let payload = vec![0xAB; 70_000]; // does not fit a u16 length
        let encoded = encode_frame(packet_type::LONG_PLAYBACK_PACKET, &payload);
        assert_eq!(encoded[0], 0xCD);
        assert_eq!(&encoded[1..5], &70_000u32.to_be_bytes());

        let mut decoder = FrameDecoder::new();
        decoder.extend(&encoded);
        let frames = drain(&mut decoder);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload.len(), 70_000);
    }

    #[test]
    fn test_chunk_boundary_independence() {
        // The reassembled sequence must match regardless of how the byte
        // stream is split across deliveries.
        let mut stream = Vec::new();
        stream.extend_from_slice(&encode_frame(packet_type::OK, &[]));
        stream.extend_from_slice(&encode_frame(packet_type::PLAYBACK_PACKET, &[1, 2, 3, 4]));
        stream.extend_from_slice(&encode_frame(packet_type::ERROR, &[9]));
        stream.extend_from_slice(&encode_frame(
            packet_type::LONG_PLAYBACK_PACKET,
            &[7; 300],
        ));

        let mut all_at_once = FrameDecoder::new();
        all_at_once.extend(&stream);
        let expected = drain(&mut all_at_once);
        assert_eq!(expected.len(), 4);

        for chunk_size in [1, 2, 3, 5, 7, 64] {
            let mut decoder = FrameDecoder::new();
            let mut frames = Vec::new();
            for chunk in stream.chunks(chunk_size) {
                decoder.extend(chunk);
                frames.extend(drain(&mut decoder));
            }
            assert_eq!(frames, expected, "chunk_size={}", chunk_size);
            assert_eq!(decoder.pending_len(), 0);
        }
    }

    #[test]
    fn test_incomplete_header_waits() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&[packet_type::PLAYBACK_PACKET, 0x00]);
        assert!(decoder.next_frame().is_none());

        decoder.extend(&[0x02, 0xAA]);
        assert!(decoder.next_frame().is_none()); // payload still short

        decoder.extend(&[0xBB]);
        let frame = decoder.next_frame().unwrap();
        assert_eq!(&frame.payload[..], &[0xAA, 0xBB]);
    }

    #[test]
    fn test_many_frames_in_one_chunk() {
        let mut stream = Vec::new();
        for i in 0..1000u16 {
            stream.extend_from_slice(&encode_frame(packet_type::PING, &i.to_be_bytes()));
        }
        let mut decoder = FrameDecoder::new();
        decoder.extend(&stream);
        let frames = drain(&mut decoder);
        assert_eq!(frames.len(), 1000);
        assert_eq!(&frames[999].payload[..], &999u16.to_be_bytes());
    }

    #[test]
    fn test_clear_discards_partial() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&[packet_type::PLAYBACK_PACKET, 0x00, 0x09, 0x01]);
        decoder.clear();
        assert_eq!(decoder.pending_len(), 0);
        assert!(decoder.next_frame().is_none());
    }
}
