//! Protocol-Buffers wire-format codec
//!
//! NexusTalk payloads are protobuf-encoded but the message set is small and
//! fixed, so this is a hand-rolled field-level codec rather than generated
//! code: varint, zig-zag signed varint, length-delimited bytes/strings,
//! fixed64 doubles, and nested length-delimited messages.
//!
//! Wire types:
//! ```text
//! 0 - Varint
//! 1 - 64-bit (fixed64 / double)
//! 2 - Length-delimited (string / bytes / nested message)
//! 5 - 32-bit (fixed32, skipped only)
//! ```
//!
//! Unknown fields are skipped by wire type so newer camera firmware can add
//! fields without breaking us.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

const WIRE_VARINT: u8 = 0;
const WIRE_FIXED64: u8 = 1;
const WIRE_LENGTH_DELIMITED: u8 = 2;
const WIRE_FIXED32: u8 = 5;

/// Incremental builder for an outgoing protobuf payload
#[derive(Debug, Default)]
pub struct MessageWriter {
    buf: BytesMut,
}

impl MessageWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    fn write_key(&mut self, field: u32, wire_type: u8) {
        self.write_varint(((field as u64) << 3) | wire_type as u64);
    }

    fn write_varint(&mut self, mut value: u64) {
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                self.buf.put_u8(byte);
                return;
            }
            self.buf.put_u8(byte | 0x80);
        }
    }

    /// Write an unsigned varint field
    pub fn varint_field(&mut self, field: u32, value: u64) -> &mut Self {
        self.write_key(field, WIRE_VARINT);
        self.write_varint(value);
        self
    }

    /// Write a signed varint field (zig-zag encoded)
    pub fn svarint_field(&mut self, field: u32, value: i64) -> &mut Self {
        let encoded = ((value << 1) ^ (value >> 63)) as u64;
        self.varint_field(field, encoded)
    }

    /// Write a bool field (varint 0/1)
    pub fn bool_field(&mut self, field: u32, value: bool) -> &mut Self {
        self.varint_field(field, value as u64)
    }

    /// Write a length-delimited bytes field
    pub fn bytes_field(&mut self, field: u32, value: &[u8]) -> &mut Self {
        self.write_key(field, WIRE_LENGTH_DELIMITED);
        self.write_varint(value.len() as u64);
        self.buf.put_slice(value);
        self
    }

    /// Write a length-delimited UTF-8 string field
    pub fn string_field(&mut self, field: u32, value: &str) -> &mut Self {
        self.bytes_field(field, value.as_bytes())
    }

    /// Write a fixed64 double field
    pub fn double_field(&mut self, field: u32, value: f64) -> &mut Self {
        self.write_key(field, WIRE_FIXED64);
        self.buf.put_f64_le(value);
        self
    }

    /// Write a nested message as a length-delimited field
    pub fn message_field(&mut self, field: u32, message: MessageWriter) -> &mut Self {
        self.bytes_field(field, &message.buf)
    }

    /// Consume the writer and return the encoded payload
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Wire type of a decoded field key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Varint,
    Fixed64,
    LengthDelimited,
    Fixed32,
}

/// Cursor over an incoming protobuf payload
///
/// Callers loop on `next_field()` and dispatch on field number, skipping
/// anything they do not understand.
#[derive(Debug)]
pub struct MessageReader<'a> {
    buf: &'a [u8],
}

impl<'a> MessageReader<'a> {
    /// Wrap a payload slice
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Decode the next field key, or `None` at end of payload
    pub fn next_field(&mut self) -> Result<Option<(u32, WireType)>, ProtocolError> {
        if self.buf.is_empty() {
            return Ok(None);
        }
        let key = self.read_varint()?;
        let wire_type = match (key & 0x7) as u8 {
            WIRE_VARINT => WireType::Varint,
            WIRE_FIXED64 => WireType::Fixed64,
            WIRE_LENGTH_DELIMITED => WireType::LengthDelimited,
            WIRE_FIXED32 => WireType::Fixed32,
            other => return Err(ProtocolError::UnexpectedWireType(other)),
        };
        Ok(Some(((key >> 3) as u32, wire_type)))
    }

    /// Read an unsigned varint value
    pub fn read_varint(&mut self) -> Result<u64, ProtocolError> {
        let mut value = 0u64;
        for shift in 0..10 {
            if self.buf.is_empty() {
                return Err(ProtocolError::Truncated);
            }
            let byte = self.buf.get_u8();
            value |= ((byte & 0x7F) as u64) << (shift * 7);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(ProtocolError::InvalidVarint)
    }

    /// Read a zig-zag encoded signed varint
    pub fn read_svarint(&mut self) -> Result<i64, ProtocolError> {
        let encoded = self.read_varint()?;
        Ok(((encoded >> 1) as i64) ^ -((encoded & 1) as i64))
    }

    /// Read a bool (varint 0/1)
    pub fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.read_varint()? != 0)
    }

    /// Read a length-delimited bytes field
    pub fn read_bytes(&mut self) -> Result<&'a [u8], ProtocolError> {
        let len = self.read_varint()? as usize;
        if self.buf.len() < len {
            return Err(ProtocolError::Truncated);
        }
        let (value, rest) = self.buf.split_at(len);
        self.buf = rest;
        Ok(value)
    }

    /// Read a length-delimited UTF-8 string field
    pub fn read_string(&mut self) -> Result<&'a str, ProtocolError> {
        std::str::from_utf8(self.read_bytes()?).map_err(|_| ProtocolError::InvalidUtf8)
    }

    /// Read a fixed64 double field
    pub fn read_double(&mut self) -> Result<f64, ProtocolError> {
        if self.buf.len() < 8 {
            return Err(ProtocolError::Truncated);
        }
        Ok(self.buf.get_f64_le())
    }

    /// Enter a nested length-delimited message
    pub fn read_message(&mut self) -> Result<MessageReader<'a>, ProtocolError> {
        Ok(MessageReader::new(self.read_bytes()?))
    }

    /// Skip a field of the given wire type
    pub fn skip(&mut self, wire_type: WireType) -> Result<(), ProtocolError> {
        match wire_type {
            WireType::Varint => {
                self.read_varint()?;
            }
            WireType::Fixed64 => {
                if self.buf.len() < 8 {
                    return Err(ProtocolError::Truncated);
                }
                self.buf.advance(8);
            }
            WireType::LengthDelimited => {
                self.read_bytes()?;
            }
            WireType::Fixed32 => {
                if self.buf.len() < 4 {
                    return Err(ProtocolError::Truncated);
                }
                self.buf.advance(4);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_roundtrip() {
        let mut w = MessageWriter::new();
        w.varint_field(1, 0)
            .varint_field(2, 127)
            .varint_field(3, 128)
            .varint_field(4, u64::MAX);
        let payload = w.finish();

        let mut r = MessageReader::new(&payload);
        let mut seen = Vec::new();
        while let Some((field, wt)) = r.next_field().unwrap() {
            assert_eq!(wt, WireType::Varint);
            seen.push((field, r.read_varint().unwrap()));
        }
        assert_eq!(seen, vec![(1, 0), (2, 127), (3, 128), (4, u64::MAX)]);
    }

    #[test]
    fn test_svarint_zigzag() {
        let mut w = MessageWriter::new();
        w.svarint_field(1, -1).svarint_field(2, 1).svarint_field(3, -300);
        let payload = w.finish();

        let mut r = MessageReader::new(&payload);
        r.next_field().unwrap();
        assert_eq!(r.read_svarint().unwrap(), -1);
        r.next_field().unwrap();
        assert_eq!(r.read_svarint().unwrap(), 1);
        r.next_field().unwrap();
        assert_eq!(r.read_svarint().unwrap(), -300);
    }

    #[test]
    fn test_zigzag_wire_bytes() {
        // -1 encodes as 1, 1 encodes as 2
        let mut w = MessageWriter::new();
        w.svarint_field(1, -1);
        assert_eq!(&w.finish()[..], &[0x08, 0x01]);

        let mut w = MessageWriter::new();
        w.svarint_field(1, 1);
        assert_eq!(&w.finish()[..], &[0x08, 0x02]);
    }

    #[test]
    fn test_string_and_bytes() {
        let mut w = MessageWriter::new();
        w.string_field(2, "cam.example").bytes_field(4, &[0xDE, 0xAD]);
        let payload = w.finish();

        let mut r = MessageReader::new(&payload);
        let (field, wt) = r.next_field().unwrap().unwrap();
        assert_eq!((field, wt), (2, WireType::LengthDelimited));
        assert_eq!(r.read_string().unwrap(), "cam.example");
        r.next_field().unwrap();
        assert_eq!(r.read_bytes().unwrap(), &[0xDE, 0xAD]);
    }

    #[test]
    fn test_double_field() {
        let mut w = MessageWriter::new();
        w.double_field(5, 1234.5);
        let payload = w.finish();

        let mut r = MessageReader::new(&payload);
        let (field, wt) = r.next_field().unwrap().unwrap();
        assert_eq!((field, wt), (5, WireType::Fixed64));
        assert_eq!(r.read_double().unwrap(), 1234.5);
    }

    #[test]
    fn test_nested_message() {
        let mut inner = MessageWriter::new();
        inner.varint_field(1, 42).string_field(2, "inner");
        let mut outer = MessageWriter::new();
        outer.varint_field(1, 7).message_field(12, inner);
        let payload = outer.finish();

        let mut r = MessageReader::new(&payload);
        r.next_field().unwrap();
        assert_eq!(r.read_varint().unwrap(), 7);
        let (field, _) = r.next_field().unwrap().unwrap();
        assert_eq!(field, 12);
        let mut nested = r.read_message().unwrap();
        nested.next_field().unwrap();
        assert_eq!(nested.read_varint().unwrap(), 42);
        nested.next_field().unwrap();
        assert_eq!(nested.read_string().unwrap(), "inner");
        assert!(nested.next_field().unwrap().is_none());
    }

    #[test]
    fn test_skip_unknown_fields() {
        let mut w = MessageWriter::new();
        w.varint_field(9, 1)
            .double_field(10, 0.5)
            .bytes_field(11, b"junk")
            .varint_field(1, 99);
        let payload = w.finish();

        let mut r = MessageReader::new(&payload);
        let mut found = None;
        while let Some((field, wt)) = r.next_field().unwrap() {
            if field == 1 {
                found = Some(r.read_varint().unwrap());
            } else {
                r.skip(wt).unwrap();
            }
        }
        assert_eq!(found, Some(99));
    }

    #[test]
    fn test_truncated_payload() {
        // Length-delimited field claiming more bytes than present
        let mut r = MessageReader::new(&[0x12, 0x05, 0x01]);
        r.next_field().unwrap();
        assert_eq!(r.read_bytes(), Err(ProtocolError::Truncated));
    }

    #[test]
    fn test_overlong_varint_rejected() {
        let bad = [0xFF; 11];
        let mut r = MessageReader::new(&bad);
        assert_eq!(r.read_varint(), Err(ProtocolError::InvalidVarint));
    }
}
