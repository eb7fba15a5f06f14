//! Coefficient orders: the sequence in which a block's 63 AC coefficients
//! are stored.

use crate::bit_reader::BitReader;
use crate::entropy::read_unsigned;
use crate::error::{FrameError, Result};
use crate::vardct::dct::{BLOCK_SIZE, ZIGZAG_ORDER};

pub const NUM_AC: usize = BLOCK_SIZE - 1;

pub type CoeffOrder = [u8; NUM_AC];

pub fn default_order() -> CoeffOrder {
    let mut order = [0u8; NUM_AC];
    for (i, o) in order.iter_mut().enumerate() {
        *o = ZIGZAG_ORDER[i + 1] as u8;
    }
    order
}

/// Reads a permutation of the default order as a Lehmer code.
fn decode_permutation(br: &mut BitReader) -> Result<CoeffOrder> {
    let mut remaining: Vec<u8> = default_order().to_vec();
    let mut order = [0u8; NUM_AC];
    for (i, o) in order.iter_mut().enumerate() {
        let idx = read_unsigned(br)? as usize;
        if idx >= NUM_AC - i {
            return Err(FrameError::InvalidHeader);
        }
        *o = remaining.remove(idx);
    }
    Ok(order)
}

/// Orders for the three channels of one pass: a 1-bit flag, then one
/// permutation per channel when set.
pub fn decode_coeff_orders(br: &mut BitReader) -> Result<[CoeffOrder; 3]> {
    if !br.read_bool()? {
        return Ok([default_order(); 3]);
    }
    Ok([
        decode_permutation(br)?,
        decode_permutation(br)?,
        decode_permutation(br)?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bit_reader::BitWriter;
    use crate::entropy::write_unsigned;

    #[test]
    fn test_default_order_starts_after_dc() {
        let order = default_order();
        assert_eq!(order[0], 1);
        assert_eq!(order[1], 8);
        assert!(!order.contains(&0));
    }

    #[test]
    fn test_reversed_permutation() {
        let mut w = BitWriter::new();
        w.write_bool(true);
        for _ in 0..3 {
            for i in 0..NUM_AC {
                write_unsigned(&mut w, (NUM_AC - 1 - i) as u32);
            }
        }
        let bytes = w.finish();
        let orders = decode_coeff_orders(&mut BitReader::new(&bytes)).unwrap();
        let mut expected = default_order();
        expected.reverse();
        assert_eq!(orders[2], expected);
    }

    #[test]
    fn test_out_of_range_index() {
        let mut w = BitWriter::new();
        w.write_bool(true);
        write_unsigned(&mut w, NUM_AC as u32);
        let bytes = w.finish();
        assert_eq!(
            decode_coeff_orders(&mut BitReader::new(&bytes)),
            Err(FrameError::InvalidHeader)
        );
    }
}
