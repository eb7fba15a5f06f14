//! DC-group payload of VarDCT frames: quantized DC, AC metadata, and the
//! adaptive smoothing applied once every DC group is in.

use crate::bit_reader::BitReader;
use crate::entropy::{read_signed, read_unsigned};
use crate::error::{FrameError, Result};
use crate::image::{Plane, Rect};
use crate::vardct::color_correlation::ColorCorrelationMap;
use crate::vardct::quantizer::{DequantMatrices, Quantizer};

pub const MAX_QUANT_FIELD: u32 = 256;

/// Bit of `used_acs` for the 8x8 DCT, the only transform supported.
pub const DCT8_BIT: u32 = 1;

/// Decoded DC of one DC group, in block units local to `block_rect`.
#[derive(Debug, Clone, PartialEq)]
pub struct DcGroupData {
    pub block_rect: Rect,
    pub quant_dc: [Plane<i32>; 3],
    pub dc: [Plane<f32>; 3],
}

pub fn decode_dc_group(
    br: &mut BitReader,
    block_rect: Rect,
    quantizer: &Quantizer,
    matrices: &DequantMatrices,
    cmap: &ColorCorrelationMap,
) -> Result<DcGroupData> {
    let (w, h) = (block_rect.xsize, block_rect.ysize);
    let mut quant_dc = [Plane::new(w, h), Plane::new(w, h), Plane::new(w, h)];
    for plane in quant_dc.iter_mut() {
        for y in 0..h {
            for x in 0..w {
                let pred: i32 = if x > 0 {
                    plane.get(x - 1, y)
                } else if y > 0 {
                    plane.get(x, y - 1)
                } else {
                    0
                };
                let v = pred
                    .checked_add(read_signed(br)?)
                    .ok_or(FrameError::InvalidCoefficients)?;
                plane.set(x, y, v);
            }
        }
    }

    let mul_dc = quantizer.mul_dc();
    let mut dc = [Plane::new(w, h), Plane::new(w, h), Plane::new(w, h)];
    for c in 0..3 {
        let step = matrices.dc_quant[c] * mul_dc;
        for (d, &q) in dc[c].data_mut().iter_mut().zip(quant_dc[c].data()) {
            *d = q as f32 * step;
        }
    }
    let (ytox, ytob) = (cmap.y_to_x_dc(), cmap.y_to_b_dc());
    let [x_plane, y_plane, b_plane] = &mut dc;
    for i in 0..w * h {
        let y = y_plane.data()[i];
        x_plane.data_mut()[i] += ytox * y;
        b_plane.data_mut()[i] += ytob * y;
    }
    Ok(DcGroupData {
        block_rect,
        quant_dc,
        dc,
    })
}

/// Per-block transform choice and quantization field of one DC group.
#[derive(Debug, Clone, PartialEq)]
pub struct AcMetadata {
    pub block_rect: Rect,
    pub quant_field: Plane<u32>,
    pub used_acs: u32,
}

pub fn decode_ac_metadata(br: &mut BitReader, block_rect: Rect) -> Result<AcMetadata> {
    let mut quant_field = Plane::new(block_rect.xsize, block_rect.ysize);
    let mut used_acs = 0;
    for y in 0..block_rect.ysize {
        for x in 0..block_rect.xsize {
            if read_unsigned(br)? != 0 {
                return Err(FrameError::Unsupported);
            }
            used_acs |= DCT8_BIT;
            let qf = read_unsigned(br)? + 1;
            if qf > MAX_QUANT_FIELD {
                return Err(FrameError::InvalidHeader);
            }
            quant_field.set(x, y, qf);
        }
    }
    Ok(AcMetadata {
        block_rect,
        quant_field,
        used_acs,
    })
}

const SMOOTH_CENTER: f32 = 0.05226273532324128;
const SMOOTH_SIDE: f32 = 0.20345139757231578;
const SMOOTH_DIAG: f32 = 0.0334829185968739;

/// Blends interior DC values towards a 3x3 weighted average, less so where
/// the average departs from the original by more than the quantization step.
pub fn adaptive_dc_smoothing(dc_factors: [f32; 3], dc: &mut [Plane<f32>; 3]) {
    let xsize = dc[0].width();
    let ysize = dc[0].height();
    if xsize < 3 || ysize < 3 {
        return;
    }
    let src = dc.clone();
    for y in 1..ysize - 1 {
        for x in 1..xsize - 1 {
            let mut smoothed = [0.0f32; 3];
            let mut gap = 0.5f32;
            for c in 0..3 {
                let p = &src[c];
                let side = p.get(x - 1, y) + p.get(x + 1, y) + p.get(x, y - 1) + p.get(x, y + 1);
                let diag = p.get(x - 1, y - 1)
                    + p.get(x + 1, y - 1)
                    + p.get(x - 1, y + 1)
                    + p.get(x + 1, y + 1);
                smoothed[c] = SMOOTH_CENTER * p.get(x, y) + SMOOTH_SIDE * side + SMOOTH_DIAG * diag;
                gap = gap.max((p.get(x, y) - smoothed[c]).abs() / dc_factors[c]);
            }
            let factor = (3.0 - 4.0 * gap).max(0.0);
            for c in 0..3 {
                let v = src[c].get(x, y);
                dc[c].set(x, y, (smoothed[c] - v) * factor + v);
            }
        }
    }
}
