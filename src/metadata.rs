//! Image-level metadata shared by every frame of a codestream.

use crate::bit_reader::{BitReader, U32Dist, U32Enc};
use crate::error::{FrameError, Result};

/// First 16 bits of a codestream (bytes `FF 0A`).
pub const CODESTREAM_SIGNATURE: u32 = 0x0AFF;

pub const SIZE_ENC: U32Enc = U32Enc([
    U32Dist::Bits(9, 1),
    U32Dist::Bits(13, 1),
    U32Dist::Bits(18, 1),
    U32Dist::Bits(30, 1),
]);

pub const BIT_DEPTH_ENC: U32Enc = U32Enc([
    U32Dist::Val(8),
    U32Dist::Val(10),
    U32Dist::Val(12),
    U32Dist::Bits(6, 1),
]);

pub const NUM_EXTRA_ENC: U32Enc = U32Enc([
    U32Dist::Val(0),
    U32Dist::Val(1),
    U32Dist::Bits(4, 2),
    U32Dist::Bits(12, 1),
]);

pub const MAX_BIT_DEPTH: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtraChannelInfo {
    pub bit_depth: u32,
    pub is_alpha: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMetadata {
    pub xsize: usize,
    pub ysize: usize,
    pub bit_depth: u32,
    pub is_gray: bool,
    pub xyb_encoded: bool,
    pub have_animation: bool,
    pub extra_channel_info: Vec<ExtraChannelInfo>,
}

impl Default for ImageMetadata {
    fn default() -> Self {
        Self {
            xsize: 0,
            ysize: 0,
            bit_depth: 8,
            is_gray: false,
            xyb_encoded: false,
            have_animation: false,
            extra_channel_info: Vec::new(),
        }
    }
}

impl ImageMetadata {
    pub fn read(br: &mut BitReader) -> Result<Self> {
        if br.read_bits(16)? != CODESTREAM_SIGNATURE {
            return Err(FrameError::InvalidSignature);
        }
        let xsize = br.read_u32(&SIZE_ENC)? as usize;
        let ysize = br.read_u32(&SIZE_ENC)? as usize;
        let bit_depth = br.read_u32(&BIT_DEPTH_ENC)?;
        if bit_depth == 0 || bit_depth > MAX_BIT_DEPTH {
            return Err(FrameError::Unsupported);
        }
        let is_gray = br.read_bool()?;
        let xyb_encoded = br.read_bool()?;
        let have_animation = br.read_bool()?;
        let num_extra = br.read_u32(&NUM_EXTRA_ENC)? as usize;
        let mut extra_channel_info = Vec::with_capacity(num_extra.min(256));
        for _ in 0..num_extra {
            let bit_depth = br.read_u32(&BIT_DEPTH_ENC)?;
            if bit_depth == 0 || bit_depth > MAX_BIT_DEPTH {
                return Err(FrameError::Unsupported);
            }
            let is_alpha = br.read_bool()?;
            extra_channel_info.push(ExtraChannelInfo { bit_depth, is_alpha });
        }
        br.jump_to_byte_boundary()?;
        Ok(Self {
            xsize,
            ysize,
            bit_depth,
            is_gray,
            xyb_encoded,
            have_animation,
            extra_channel_info,
        })
    }

    pub fn num_color_channels(&self) -> usize {
        if self.is_gray { 1 } else { 3 }
    }

    pub fn num_extra_channels(&self) -> usize {
        self.extra_channel_info.len()
    }

    pub fn max_sample_value(&self) -> i32 {
        (1i32 << self.bit_depth) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_signature() {
        let bytes = [0xFF, 0xD8, 0, 0];
        let mut br = BitReader::new(&bytes);
        assert_eq!(ImageMetadata::read(&mut br), Err(FrameError::InvalidSignature));
    }
}
