//! Global quantizer and dequantization matrices.

use crate::bit_reader::{BitReader, U32Dist, U32Enc};
use crate::error::{FrameError, Result};
use crate::vardct::dct::BLOCK_SIZE;

pub const GLOBAL_SCALE_ENC: U32Enc = U32Enc([
    U32Dist::Bits(11, 1),
    U32Dist::Bits(11, 2049),
    U32Dist::Bits(12, 4097),
    U32Dist::Bits(16, 8193),
]);
pub const QUANT_DC_ENC: U32Enc = U32Enc([
    U32Dist::Val(16),
    U32Dist::Bits(5, 1),
    U32Dist::Bits(8, 1),
    U32Dist::Bits(16, 1),
]);

pub const GLOBAL_SCALE_DENOM: f32 = 65536.0;

/// Denominator of a raw table holding integer JPEG quantization steps.
pub const JPEG_QTABLE_DEN: f32 = 1.0 / (8.0 * 255.0);

/// Default DC step per channel (X, Y, B).
pub const DEFAULT_DC_QUANT: [f32; 3] = [1.0 / 4096.0, 1.0 / 512.0, 1.0 / 256.0];

/// Standard JPEG luminance table (quality 50), natural order.
pub const STD_LUMINANCE_QUANT_TABLE: [u8; BLOCK_SIZE] = [
    16, 11, 10, 16, 24, 40, 51, 61,
    12, 12, 14, 19, 26, 58, 60, 55,
    14, 13, 16, 24, 40, 57, 69, 56,
    14, 17, 22, 29, 51, 87, 80, 62,
    18, 22, 37, 56, 68, 109, 103, 77,
    24, 35, 55, 64, 81, 104, 113, 92,
    49, 64, 78, 87, 103, 121, 120, 101,
    72, 92, 95, 98, 112, 100, 103, 99,
];

/// Standard JPEG chrominance table (quality 50), natural order.
pub const STD_CHROMINANCE_QUANT_TABLE: [u8; BLOCK_SIZE] = [
    17, 18, 24, 47, 99, 99, 99, 99,
    18, 21, 26, 66, 99, 99, 99, 99,
    24, 26, 56, 99, 99, 99, 99, 99,
    47, 66, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantizer {
    pub global_scale: u32,
    pub quant_dc: u32,
}

impl Default for Quantizer {
    fn default() -> Self {
        Self {
            global_scale: 65536,
            quant_dc: 1,
        }
    }
}

impl Quantizer {
    pub fn decode(br: &mut BitReader) -> Result<Self> {
        let global_scale = br.read_u32(&GLOBAL_SCALE_ENC)?;
        let quant_dc = br.read_u32(&QUANT_DC_ENC)?;
        Ok(Self {
            global_scale,
            quant_dc,
        })
    }

    pub fn inv_global_scale(&self) -> f32 {
        GLOBAL_SCALE_DENOM / self.global_scale as f32
    }

    pub fn mul_dc(&self) -> f32 {
        self.inv_global_scale() / self.quant_dc as f32
    }
}

/// How the AC dequantization steps are defined.
#[derive(Debug, Clone, PartialEq)]
pub enum QuantEncoding {
    /// Built-in tables.
    Library,
    /// Built-in tables multiplied by one factor per channel.
    Scaled([f32; 3]),
    /// Explicit integer steps (`3 * 64`, natural order) times a denominator.
    Raw { table: Vec<i32>, den: f32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DequantMatrices {
    pub dc_quant: [f32; 3],
    pub encoding: QuantEncoding,
}

impl Default for DequantMatrices {
    fn default() -> Self {
        Self {
            dc_quant: DEFAULT_DC_QUANT,
            encoding: QuantEncoding::Library,
        }
    }
}

fn library_step(c: usize, k: usize) -> f32 {
    let table = if c == 1 {
        &STD_LUMINANCE_QUANT_TABLE
    } else {
        &STD_CHROMINANCE_QUANT_TABLE
    };
    table[k] as f32 / 255.0
}

impl DequantMatrices {
    /// DC part, read in the DC-global section.
    pub fn decode_dc(&mut self, br: &mut BitReader) -> Result<()> {
        if br.read_bool()? {
            self.dc_quant = DEFAULT_DC_QUANT;
            return Ok(());
        }
        for q in self.dc_quant.iter_mut() {
            let raw = br.read_bits(16)?;
            if raw == 0 {
                return Err(FrameError::InvalidQuantTable);
            }
            *q = raw as f32 / GLOBAL_SCALE_DENOM;
        }
        Ok(())
    }

    /// AC part, read in the AC-global section.
    pub fn decode(&mut self, br: &mut BitReader) -> Result<()> {
        self.encoding = match br.read_bits(2)? {
            0 => QuantEncoding::Library,
            1 => {
                let mut mul = [0.0f32; 3];
                for m in mul.iter_mut() {
                    let raw = br.read_bits(16)?;
                    if raw == 0 {
                        return Err(FrameError::InvalidQuantTable);
                    }
                    *m = raw as f32 / 4096.0;
                }
                QuantEncoding::Scaled(mul)
            }
            2 => {
                let den = f32::from_bits(br.read_bits(32)?);
                if !den.is_finite() || den <= 0.0 {
                    return Err(FrameError::InvalidQuantTable);
                }
                let mut table = Vec::with_capacity(3 * BLOCK_SIZE);
                for _ in 0..3 * BLOCK_SIZE {
                    let v = crate::entropy::read_unsigned(br)?;
                    if v == 0 || v > i32::MAX as u32 {
                        return Err(FrameError::InvalidQuantTable);
                    }
                    table.push(v as i32);
                }
                QuantEncoding::Raw { table, den }
            }
            _ => return Err(FrameError::InvalidQuantTable),
        };
        Ok(())
    }

    /// Dequantization step of coefficient `k` (natural order) in channel `c`,
    /// in the units the IDCT expects.
    pub fn ac_step(&self, c: usize, k: usize) -> f32 {
        match &self.encoding {
            QuantEncoding::Library => library_step(c, k),
            QuantEncoding::Scaled(mul) => library_step(c, k) * mul[c],
            QuantEncoding::Raw { table, den } => table[c * BLOCK_SIZE + k] as f32 * den * 8.0,
        }
    }

    /// The raw integer table, if it is a JPEG quantization table.
    pub fn jpeg_table(&self) -> Option<&[i32]> {
        match &self.encoding {
            QuantEncoding::Raw { table, den } if (den - JPEG_QTABLE_DEN).abs() <= 1e-8 => {
                Some(table)
            }
            _ => None,
        }
    }
}
