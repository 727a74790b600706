//! Bounds-checked reading over a byte slice
//!
//! Every read either returns the requested bytes or a [`DecodeError`]
//! naming the offset; a truncated or corrupt file never reads past its end.

use thiserror::Error;

/// Longest variable-length quantity allowed in a Standard MIDI File
pub const MAX_VLQ_BYTES: usize = 4;

/// Largest value a variable-length quantity can carry
pub const MAX_VLQ_VALUE: u32 = 0x0FFF_FFFF;

/// Malformed performance file
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unexpected end of data at offset {offset} (needed {needed} more bytes)")]
    UnexpectedEnd { offset: usize, needed: usize },

    #[error("variable-length quantity at offset {offset} is longer than 4 bytes")]
    VlqTooLong { offset: usize },

    #[error("no MThd header in the first {searched} bytes")]
    MissingHeader { searched: usize },

    #[error("header declares no tracks")]
    NoTracks,

    #[error("MTrk chunk {index} not found")]
    MissingTrack { index: usize },

    #[error("SMPTE time division 0x{0:04X} is not supported")]
    SmpteDivision(u16),

    #[error("time division of zero ticks per quarter note")]
    ZeroDivision,

    #[error("data byte 0x{byte:02X} at offset {offset} with no running status")]
    NoRunningStatus { offset: usize, byte: u8 },

    #[error("unexpected status byte 0x{byte:02X} at offset {offset}")]
    UnexpectedStatus { offset: usize, byte: u8 },
}

#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn need(&self, count: usize) -> Result<(), DecodeError> {
        if self.remaining() < count {
            return Err(DecodeError::UnexpectedEnd {
                offset: self.pos,
                needed: count - self.remaining(),
            });
        }
        Ok(())
    }

    pub fn peek_u8(&self) -> Result<u8, DecodeError> {
        self.need(1)?;
        Ok(self.data[self.pos])
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let byte = self.peek_u8()?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], DecodeError> {
        self.need(count)?;
        let bytes = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(bytes)
    }

    pub fn skip(&mut self, count: usize) -> Result<(), DecodeError> {
        self.read_bytes(count).map(|_| ())
    }

    fn read_be(&mut self, width: usize) -> Result<u32, DecodeError> {
        Ok(self
            .read_bytes(width)?
            .iter()
            .fold(0u32, |acc, b| (acc << 8) | u32::from(*b)))
    }

    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        self.read_be(2).map(|v| v as u16)
    }

    pub fn read_u24(&mut self) -> Result<u32, DecodeError> {
        self.read_be(3)
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        self.read_be(4)
    }

    /// Variable-length quantity: 7 bits per byte, most significant first,
    /// high bit set on every byte but the last
    pub fn read_vlq(&mut self) -> Result<u32, DecodeError> {
        let start = self.pos;
        let mut value = 0u32;
        for _ in 0..MAX_VLQ_BYTES {
            let byte = self.read_u8()?;
            value = (value << 7) | u32::from(byte & 0x7F);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(DecodeError::VlqTooLong { offset: start })
    }
}
