//! Bit-level reader and writer for codestream fields.
//!
//! Bits are packed LSB-first within each byte. Reads past the end of the
//! span report `FrameError::NeedMoreData` so callers can tell truncation
//! apart from malformed data.

use crate::error::{FrameError, Result};

/// One of the four distributions of a `U32Enc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum U32Dist {
    Val(u32),
    Bits(u32, u32),
}

/// Variable-length u32 field: a 2-bit selector picks one distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct U32Enc(pub [U32Dist; 4]);

impl U32Enc {
    /// Finds the selector able to represent `value`, for writers.
    pub fn selector_for(&self, value: u32) -> Option<(usize, u32, u32)> {
        for (i, d) in self.0.iter().enumerate() {
            match *d {
                U32Dist::Val(v) if v == value => return Some((i, 0, 0)),
                U32Dist::Bits(n, offset) if value >= offset => {
                    let rest = value - offset;
                    if n == 32 || (rest as u64) < (1u64 << n) {
                        return Some((i, n, rest));
                    }
                }
                _ => {}
            }
        }
        None
    }
}

#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, bit_pos: 0 }
    }

    pub fn read_bits(&mut self, count: u32) -> Result<u32> {
        debug_assert!(count <= 32);
        if count == 0 {
            return Ok(0);
        }
        if self.bit_pos + count as usize > self.data.len() * 8 {
            self.bit_pos = self.data.len() * 8;
            return Err(FrameError::NeedMoreData);
        }
        let mut value = 0u64;
        let mut written = 0u32;
        while written < count {
            let byte = self.data[self.bit_pos / 8] as u64;
            let offset = (self.bit_pos % 8) as u32;
            let take = (8 - offset).min(count - written);
            let bits = (byte >> offset) & ((1u64 << take) - 1);
            value |= bits << written;
            written += take;
            self.bit_pos += take as usize;
        }
        Ok(value as u32)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_bits(1)? == 1)
    }

    pub fn read_u32(&mut self, enc: &U32Enc) -> Result<u32> {
        let selector = self.read_bits(2)? as usize;
        match enc.0[selector] {
            U32Dist::Val(v) => Ok(v),
            U32Dist::Bits(n, offset) => {
                let raw = self.read_bits(n)?;
                raw.checked_add(offset).ok_or(FrameError::InvalidHeader)
            }
        }
    }

    pub fn skip_bits(&mut self, count: usize) -> Result<()> {
        if self.bit_pos + count > self.data.len() * 8 {
            self.bit_pos = self.data.len() * 8;
            return Err(FrameError::NeedMoreData);
        }
        self.bit_pos += count;
        Ok(())
    }

    /// Skips to the next byte boundary; the skipped bits must be zero.
    pub fn jump_to_byte_boundary(&mut self) -> Result<()> {
        let rem = (8 - self.bit_pos % 8) % 8;
        if rem > 0 && self.read_bits(rem as u32)? != 0 {
            return Err(FrameError::InvalidPadding);
        }
        Ok(())
    }

    pub fn total_bits_consumed(&self) -> usize {
        self.bit_pos
    }

    pub fn total_bytes(&self) -> usize {
        self.data.len()
    }

    pub fn bits_remaining(&self) -> usize {
        self.data.len() * 8 - self.bit_pos
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// A reader over `len` bytes starting `offset` bytes into this reader's span,
    /// clipped to the bytes actually present.
    pub fn sub_reader(&self, offset: usize, len: usize) -> BitReader<'a> {
        let start = offset.min(self.data.len());
        let end = offset.saturating_add(len).min(self.data.len());
        BitReader::new(&self.data[start..end])
    }
}

pub struct BitWriter {
    data: Vec<u8>,
    bit_buffer: u64,
    bits_count: u32,
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl BitWriter {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            bit_buffer: 0,
            bits_count: 0,
        }
    }

    pub fn write(&mut self, count: u32, value: u32) {
        debug_assert!(count <= 32);
        debug_assert!(count == 32 || (value as u64) < (1u64 << count));
        self.bit_buffer |= (value as u64) << self.bits_count;
        self.bits_count += count;
        while self.bits_count >= 8 {
            self.data.push(self.bit_buffer as u8);
            self.bit_buffer >>= 8;
            self.bits_count -= 8;
        }
    }

    pub fn write_bool(&mut self, bit: bool) {
        self.write(1, bit as u32);
    }

    pub fn write_u32(&mut self, enc: &U32Enc, value: u32) -> Result<()> {
        let (selector, nbits, rest) = enc
            .selector_for(value)
            .ok_or(FrameError::InvalidArgument)?;
        self.write(2, selector as u32);
        self.write(nbits, rest);
        Ok(())
    }

    pub fn zero_pad_to_byte(&mut self) {
        if self.bits_count > 0 {
            self.write(8 - self.bits_count, 0);
        }
    }

    pub fn bits_written(&self) -> usize {
        self.data.len() * 8 + self.bits_count as usize
    }

    pub fn append_bytes(&mut self, bytes: &[u8]) {
        debug_assert_eq!(self.bits_count, 0);
        self.data.extend_from_slice(bytes);
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.zero_pad_to_byte();
        self.data
    }
}
