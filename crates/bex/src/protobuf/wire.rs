//! Low-level protocol-buffer wire reading: varints, tags and field skipping.

use crate::error::DecodeError;

/// Wire types of the protobuf encoding. Groups (3/4) are not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WireType {
    Varint,
    Fixed64,
    Len,
    Fixed32,
}

impl WireType {
    fn from_raw(raw: u8, field: u32) -> Result<Self, DecodeError> {
        match raw {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::Fixed64),
            2 => Ok(WireType::Len),
            5 => Ok(WireType::Fixed32),
            other => Err(DecodeError::UnsupportedWireType {
                field,
                wire_type: other,
            }),
        }
    }

    pub(crate) fn raw(self) -> u8 {
        match self {
            WireType::Varint => 0,
            WireType::Fixed64 => 1,
            WireType::Len => 2,
            WireType::Fixed32 => 5,
        }
    }
}

/// Zigzag decoding for signed varint interpretations.
pub(crate) fn zigzag(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Cursor over one message region.
pub(crate) struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn has_remaining(&self) -> bool {
        self.pos < self.buf.len()
    }

    fn byte(&mut self) -> Result<u8, DecodeError> {
        let b = self
            .buf
            .get(self.pos)
            .copied()
            .ok_or(DecodeError::Truncated { offset: self.pos })?;
        self.pos += 1;
        Ok(b)
    }

    pub(crate) fn varint(&mut self) -> Result<u64, DecodeError> {
        let start = self.pos;
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let b = self.byte()?;
            if shift >= 64 {
                return Err(DecodeError::VarintOverflow { offset: start });
            }
            value |= u64::from(b & 0x7f) << shift;
            if b & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    /// Reads the next field tag: (field number, wire type).
    pub(crate) fn tag(&mut self) -> Result<(u32, WireType), DecodeError> {
        let offset = self.pos;
        let raw = self.varint()?;
        let field = (raw >> 3) as u32;
        if field == 0 {
            return Err(DecodeError::InvalidFieldNumber { offset });
        }
        Ok((field, WireType::from_raw((raw & 0x7) as u8, field)?))
    }

    pub(crate) fn fixed32(&mut self) -> Result<u32, DecodeError> {
        let mut bytes = [0u8; 4];
        for b in &mut bytes {
            *b = self.byte()?;
        }
        Ok(u32::from_le_bytes(bytes))
    }

    pub(crate) fn fixed64(&mut self) -> Result<u64, DecodeError> {
        let mut bytes = [0u8; 8];
        for b in &mut bytes {
            *b = self.byte()?;
        }
        Ok(u64::from_le_bytes(bytes))
    }

    /// Reads a length prefix and returns the payload's byte range within the
    /// region, advancing past it.
    pub(crate) fn len_delimited(&mut self) -> Result<(usize, usize), DecodeError> {
        let len = self.varint()? as usize;
        let start = self.pos;
        let end = start
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or(DecodeError::Truncated { offset: start })?;
        self.pos = end;
        Ok((start, end))
    }

    pub(crate) fn skip(&mut self, wire_type: WireType) -> Result<(), DecodeError> {
        match wire_type {
            WireType::Varint => {
                self.varint()?;
            }
            WireType::Fixed64 => {
                self.fixed64()?;
            }
            WireType::Fixed32 => {
                self.fixed32()?;
            }
            WireType::Len => {
                self.len_delimited()?;
            }
        }
        Ok(())
    }
}
