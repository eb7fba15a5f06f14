//! Frame tiling geometry and size limits.

use crate::error::{FrameError, Result};
use crate::image::Rect;

pub const BLOCK_DIM: usize = 8;

/// Geometry derived once from the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameDimensions {
    /// Coded size, before upsampling.
    pub xsize: usize,
    pub ysize: usize,
    pub xsize_upsampled: usize,
    pub ysize_upsampled: usize,
    /// Coded size rounded up to whole blocks for VarDCT frames.
    pub xsize_padded: usize,
    pub ysize_padded: usize,
    pub upsampling: usize,
    pub group_dim: usize,
    pub dc_group_dim: usize,
    pub xsize_blocks: usize,
    pub ysize_blocks: usize,
    pub xsize_groups: usize,
    pub ysize_groups: usize,
    pub xsize_dc_groups: usize,
    pub ysize_dc_groups: usize,
    pub num_groups: usize,
    pub num_dc_groups: usize,
}

impl FrameDimensions {
    pub fn new(
        xsize_upsampled: usize,
        ysize_upsampled: usize,
        upsampling: usize,
        group_dim: usize,
        block_padded: bool,
    ) -> Self {
        let upsampling = upsampling.max(1);
        let xsize = xsize_upsampled.div_ceil(upsampling);
        let ysize = ysize_upsampled.div_ceil(upsampling);
        let xsize_blocks = xsize.div_ceil(BLOCK_DIM);
        let ysize_blocks = ysize.div_ceil(BLOCK_DIM);
        let (xsize_padded, ysize_padded) = if block_padded {
            (xsize_blocks * BLOCK_DIM, ysize_blocks * BLOCK_DIM)
        } else {
            (xsize, ysize)
        };
        let dc_group_dim = group_dim * BLOCK_DIM;
        let xsize_groups = xsize.div_ceil(group_dim);
        let ysize_groups = ysize.div_ceil(group_dim);
        let xsize_dc_groups = xsize.div_ceil(dc_group_dim);
        let ysize_dc_groups = ysize.div_ceil(dc_group_dim);
        Self {
            xsize,
            ysize,
            xsize_upsampled,
            ysize_upsampled,
            xsize_padded,
            ysize_padded,
            upsampling,
            group_dim,
            dc_group_dim,
            xsize_blocks,
            ysize_blocks,
            xsize_groups,
            ysize_groups,
            xsize_dc_groups,
            ysize_dc_groups,
            num_groups: xsize_groups * ysize_groups,
            num_dc_groups: xsize_dc_groups * ysize_dc_groups,
        }
    }

    /// Pixel rectangle of AC group `g`, clipped to the coded frame.
    pub fn group_rect(&self, g: usize) -> Rect {
        let gx = g % self.xsize_groups;
        let gy = g / self.xsize_groups;
        Rect::clipped(
            gx * self.group_dim,
            gy * self.group_dim,
            self.group_dim,
            self.group_dim,
            self.xsize,
            self.ysize,
        )
    }

    /// Pixel rectangle of DC group `g`, clipped to the coded frame.
    pub fn dc_group_rect(&self, g: usize) -> Rect {
        let gx = g % self.xsize_dc_groups;
        let gy = g / self.xsize_dc_groups;
        Rect::clipped(
            gx * self.dc_group_dim,
            gy * self.dc_group_dim,
            self.dc_group_dim,
            self.dc_group_dim,
            self.xsize,
            self.ysize,
        )
    }

    /// Block rectangle (in 8x8 block units) of AC group `g`.
    pub fn group_block_rect(&self, g: usize) -> Rect {
        let group_blocks = self.group_dim / BLOCK_DIM;
        let gx = g % self.xsize_groups;
        let gy = g / self.xsize_groups;
        Rect::clipped(
            gx * group_blocks,
            gy * group_blocks,
            group_blocks,
            group_blocks,
            self.xsize_blocks,
            self.ysize_blocks,
        )
    }

    /// Block rectangle (in 8x8 block units) of DC group `g`.
    pub fn dc_group_block_rect(&self, g: usize) -> Rect {
        let gx = g % self.xsize_dc_groups;
        let gy = g / self.xsize_dc_groups;
        Rect::clipped(
            gx * self.group_dim,
            gy * self.group_dim,
            self.group_dim,
            self.group_dim,
            self.xsize_blocks,
            self.ysize_blocks,
        )
    }
}

/// Caller-supplied bounds checked before any buffer is allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeConstraints {
    pub dec_max_xsize: usize,
    pub dec_max_ysize: usize,
    pub dec_max_pixels: usize,
}

impl Default for SizeConstraints {
    fn default() -> Self {
        Self {
            dec_max_xsize: 1 << 18,
            dec_max_ysize: 1 << 18,
            dec_max_pixels: 1 << 28,
        }
    }
}

pub fn verify_dimensions(
    constraints: &SizeConstraints,
    xsize: usize,
    ysize: usize,
) -> Result<()> {
    if xsize == 0 || ysize == 0 {
        return Err(FrameError::InvalidHeader);
    }
    if xsize > constraints.dec_max_xsize
        || ysize > constraints.dec_max_ysize
        || xsize
            .checked_mul(ysize)
            .is_none_or(|pixels| pixels > constraints.dec_max_pixels)
    {
        return Err(FrameError::DimensionsExceeded);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_counts() {
        let d = FrameDimensions::new(300, 64, 1, 256, true);
        assert_eq!(d.num_groups, 2);
        assert_eq!(d.num_dc_groups, 1);
        assert_eq!(d.xsize_blocks, 38);
        assert_eq!(d.xsize_padded, 304);
        assert_eq!(d.group_rect(1), Rect::new(256, 0, 44, 64));
        assert_eq!(d.group_block_rect(1), Rect::new(32, 0, 6, 8));
    }

    #[test]
    fn test_upsampling_shrinks_coded_size() {
        let d = FrameDimensions::new(257, 100, 2, 128, false);
        assert_eq!((d.xsize, d.ysize), (129, 50));
        assert_eq!(d.num_groups, 2);
        assert_eq!(d.xsize_padded, 129);
    }

    #[test]
    fn test_size_constraints() {
        let c = SizeConstraints {
            dec_max_xsize: 100,
            dec_max_ysize: 100,
            dec_max_pixels: 5000,
        };
        assert!(verify_dimensions(&c, 50, 100).is_ok());
        assert_eq!(verify_dimensions(&c, 101, 1), Err(FrameError::DimensionsExceeded));
        assert_eq!(verify_dimensions(&c, 100, 100), Err(FrameError::DimensionsExceeded));
    }
}
