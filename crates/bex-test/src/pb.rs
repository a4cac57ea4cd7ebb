//! A minimal protobuf wire-format writer.
//!
//! Only what tests need: varint, zigzag, fixed32/64, length-delimited and
//! nested messages, appended in call order (so repeated fields are written
//! in the order the builder sees them).

use bytes::Bytes;

/// Builder for one wire-format message.
#[derive(Debug, Clone, Default)]
pub struct Message {
    buf: Vec<u8>,
}

fn push_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    fn tag(mut self, field: u32, wire_type: u8) -> Self {
        push_varint(&mut self.buf, (u64::from(field) << 3) | u64::from(wire_type));
        self
    }

    /// Plain varint field.
    pub fn varint(self, field: u32, value: u64) -> Self {
        let mut m = self.tag(field, 0);
        push_varint(&mut m.buf, value);
        m
    }

    /// Zigzag-encoded signed varint field.
    pub fn sint(self, field: u32, value: i64) -> Self {
        self.varint(field, (value.wrapping_shl(1) ^ (value >> 63)) as u64)
    }

    /// Double-precision float (fixed64) field.
    pub fn double(self, field: u32, value: f64) -> Self {
        let mut m = self.tag(field, 1);
        m.buf.extend_from_slice(&value.to_bits().to_le_bytes());
        m
    }

    /// Single-precision float (fixed32) field.
    pub fn float(self, field: u32, value: f32) -> Self {
        let mut m = self.tag(field, 5);
        m.buf.extend_from_slice(&value.to_bits().to_le_bytes());
        m
    }

    pub fn fixed64(self, field: u32, value: u64) -> Self {
        let mut m = self.tag(field, 1);
        m.buf.extend_from_slice(&value.to_le_bytes());
        m
    }

    pub fn fixed32(self, field: u32, value: u32) -> Self {
        let mut m = self.tag(field, 5);
        m.buf.extend_from_slice(&value.to_le_bytes());
        m
    }

    /// Length-delimited UTF-8 field.
    pub fn string(self, field: u32, value: &str) -> Self {
        self.bytes(field, value.as_bytes())
    }

    /// Length-delimited raw bytes field.
    pub fn bytes(self, field: u32, value: &[u8]) -> Self {
        let mut m = self.tag(field, 2);
        push_varint(&mut m.buf, value.len() as u64);
        m.buf.extend_from_slice(value);
        m
    }

    /// Nested message field.
    pub fn message(self, field: u32, inner: Message) -> Self {
        self.bytes(field, &inner.buf)
    }

    /// Finishes the message.
    pub fn encode(self) -> Bytes {
        self.buf.into()
    }
}
