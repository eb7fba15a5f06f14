//! Chroma-from-luma factors.

use crate::bit_reader::{BitReader, U32Dist, U32Enc};
use crate::error::Result;

pub const DEFAULT_COLOR_FACTOR: u32 = 84;

pub const COLOR_FACTOR_ENC: U32Enc = U32Enc([
    U32Dist::Val(84),
    U32Dist::Val(256),
    U32Dist::Bits(8, 2),
    U32Dist::Bits(16, 258),
]);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorCorrelationMap {
    pub color_factor: u32,
    pub base_correlation_x: f32,
    pub base_correlation_b: f32,
    pub ytox_dc: i32,
    pub ytob_dc: i32,
}

impl Default for ColorCorrelationMap {
    fn default() -> Self {
        Self {
            color_factor: DEFAULT_COLOR_FACTOR,
            base_correlation_x: 0.0,
            base_correlation_b: 0.0,
            ytox_dc: 0,
            ytob_dc: 0,
        }
    }
}

fn read_centered_byte(br: &mut BitReader) -> Result<i32> {
    Ok(br.read_bits(8)? as i32 - 128)
}

impl ColorCorrelationMap {
    pub fn decode_dc(br: &mut BitReader) -> Result<Self> {
        if br.read_bool()? {
            return Ok(Self::default());
        }
        let color_factor = br.read_u32(&COLOR_FACTOR_ENC)?;
        let base_correlation_x = read_centered_byte(br)? as f32 / 128.0;
        let base_correlation_b = read_centered_byte(br)? as f32 / 128.0;
        let ytox_dc = read_centered_byte(br)?;
        let ytob_dc = read_centered_byte(br)?;
        Ok(Self {
            color_factor,
            base_correlation_x,
            base_correlation_b,
            ytox_dc,
            ytob_dc,
        })
    }

    pub fn y_to_x_dc(&self) -> f32 {
        self.base_correlation_x + self.ytox_dc as f32 / self.color_factor as f32
    }

    pub fn y_to_b_dc(&self) -> f32 {
        self.base_correlation_b + self.ytob_dc as f32 / self.color_factor as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bit_reader::BitWriter;

    #[test]
    fn test_explicit_factors() {
        let mut w = BitWriter::new();
        w.write_bool(false);
        w.write_u32(&COLOR_FACTOR_ENC, 256).unwrap();
        w.write(8, 128 + 64);
        w.write(8, 128);
        w.write(8, 128 + 128 - 1);
        w.write(8, 0);
        let bytes = w.finish();
        let cmap = ColorCorrelationMap::decode_dc(&mut BitReader::new(&bytes)).unwrap();
        assert!((cmap.y_to_x_dc() - (0.5 + 127.0 / 256.0)).abs() < 1e-6);
        assert!((cmap.y_to_b_dc() + 0.5).abs() < 1e-6);
    }
}
