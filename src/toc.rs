//! Table of contents: byte size of every section of a frame.

use crate::bit_reader::{BitReader, U32Dist, U32Enc};
use crate::error::{FrameError, Result};

pub const TOC_ENTRY_ENC: U32Enc = U32Enc([
    U32Dist::Bits(10, 0),
    U32Dist::Bits(14, 1024),
    U32Dist::Bits(22, 17408),
    U32Dist::Bits(30, 4211712),
]);

/// Number of TOC entries for a frame; a single-group, single-pass frame has one.
pub fn num_toc_entries(
    num_groups: usize,
    num_dc_groups: usize,
    num_passes: usize,
    has_ac_global: bool,
) -> usize {
    if num_groups == 1 && num_passes == 1 {
        return 1;
    }
    1 + num_dc_groups + has_ac_global as usize + num_groups * num_passes
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Toc {
    /// Offset of each section relative to the end of the TOC.
    pub offsets: Vec<u64>,
    pub sizes: Vec<u32>,
    pub total_size: u64,
}

impl Toc {
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }
}

/// Reads `num_entries` section sizes and aligns the reader to the next byte.
pub fn read_toc(num_entries: usize, br: &mut BitReader) -> Result<Toc> {
    if num_entries == 0 || num_entries > (1 << 22) {
        return Err(FrameError::InvalidToc);
    }
    let mut toc = Toc {
        offsets: Vec::with_capacity(num_entries),
        sizes: Vec::with_capacity(num_entries),
        total_size: 0,
    };
    for _ in 0..num_entries {
        let size = br.read_u32(&TOC_ENTRY_ENC)?;
        toc.offsets.push(toc.total_size);
        toc.total_size = toc
            .total_size
            .checked_add(size as u64)
            .ok_or(FrameError::InvalidToc)?;
        toc.sizes.push(size);
    }
    br.jump_to_byte_boundary()?;
    Ok(toc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bit_reader::BitWriter;

    #[test]
    fn test_entry_count() {
        assert_eq!(num_toc_entries(1, 1, 1, true), 1);
        assert_eq!(num_toc_entries(2, 1, 2, true), 2 + 1 + 4);
        assert_eq!(num_toc_entries(1, 1, 3, true), 2 + 1 + 3);
    }

    #[test]
    fn test_offsets_are_prefix_sums() {
        let mut w = BitWriter::new();
        for size in [5u32, 1500, 0, 20000] {
            w.write_u32(&TOC_ENTRY_ENC, size).unwrap();
        }
        let bytes = w.finish();
        let mut br = BitReader::new(&bytes);
        let toc = read_toc(4, &mut br).unwrap();
        assert_eq!(toc.sizes, vec![5, 1500, 0, 20000]);
        assert_eq!(toc.offsets, vec![0, 5, 1505, 1505]);
        assert_eq!(toc.total_size, 21505);
        assert_eq!(br.total_bits_consumed() % 8, 0);
    }

    #[test]
    fn test_truncated_toc() {
        let bytes = [0u8];
        let mut br = BitReader::new(&bytes);
        assert_eq!(read_toc(3, &mut br), Err(FrameError::NeedMoreData));
    }
}
