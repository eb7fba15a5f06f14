//! Residual coder shared by the modular and VarDCT paths.
//!
//! A signed value is zigzag-mapped, then stored as a 5-bit length followed by
//! the length-1 low bits (the leading one is implicit). Length 0 encodes zero.

use crate::bit_reader::{BitReader, BitWriter};
use crate::error::{FrameError, Result};

pub const MAX_SYMBOL_BITS: u32 = 31;

pub fn zigzag(v: i32) -> u32 {
    ((v << 1) ^ (v >> 31)) as u32
}

pub fn unzigzag(u: u32) -> i32 {
    ((u >> 1) as i32) ^ -((u & 1) as i32)
}

/// Number of bits the coder spends on the magnitude of `v`.
pub fn symbol_bits(v: i32) -> u32 {
    32 - zigzag(v).leading_zeros()
}

pub fn read_unsigned(br: &mut BitReader) -> Result<u32> {
    let nbits = br.read_bits(5)?;
    if nbits == 0 {
        return Ok(0);
    }
    if nbits > MAX_SYMBOL_BITS {
        return Err(FrameError::InvalidModularStream);
    }
    let low = br.read_bits(nbits - 1)?;
    Ok((1u32 << (nbits - 1)) | low)
}

pub fn read_signed(br: &mut BitReader) -> Result<i32> {
    Ok(unzigzag(read_unsigned(br)?))
}

/// Reads a signed value whose coded length may not exceed `max_bits`.
pub fn read_signed_bounded(br: &mut BitReader, max_bits: u32) -> Result<i32> {
    let nbits = br.read_bits(5)?;
    if nbits == 0 {
        return Ok(0);
    }
    if nbits > max_bits {
        return Err(FrameError::InvalidCoefficients);
    }
    let low = br.read_bits(nbits - 1)?;
    Ok(unzigzag((1u32 << (nbits - 1)) | low))
}

pub fn write_unsigned(w: &mut BitWriter, u: u32) {
    let nbits = 32 - u.leading_zeros();
    debug_assert!(nbits <= MAX_SYMBOL_BITS);
    w.write(5, nbits);
    if nbits > 1 {
        w.write(nbits - 1, u & ((1u32 << (nbits - 1)) - 1));
    }
}

pub fn write_signed(w: &mut BitWriter, v: i32) {
    write_unsigned(w, zigzag(v));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zigzag_mapping() {
        assert_eq!(zigzag(0), 0);
        assert_eq!(zigzag(-1), 1);
        assert_eq!(zigzag(1), 2);
        assert_eq!(zigzag(-2), 3);
        for v in [-70000, -255, -1, 0, 7, 4096, 1 << 20] {
            assert_eq!(unzigzag(zigzag(v)), v);
        }
    }

    #[test]
    fn test_symbol_lengths() {
        assert_eq!(symbol_bits(0), 0);
        assert_eq!(symbol_bits(-1), 1);
        assert_eq!(symbol_bits(1), 2);
        assert_eq!(symbol_bits(255), 9);
    }

    #[test]
    fn test_bounded_read_rejects_long_symbols() {
        let mut w = BitWriter::new();
        write_signed(&mut w, 300);
        write_signed(&mut w, 3);
        let bytes = w.finish();
        let mut br = BitReader::new(&bytes);
        assert_eq!(read_signed_bounded(&mut br, 4), Err(FrameError::InvalidCoefficients));

        let mut br = BitReader::new(&bytes);
        assert_eq!(read_signed(&mut br).unwrap(), 300);
        assert_eq!(read_signed_bounded(&mut br, 3).unwrap(), 3);
    }
}
