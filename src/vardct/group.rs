//! AC data of VarDCT frames: the global coefficient layout, per-group pass
//! decoding and the reconstruction of group pixels.

use crate::bit_reader::BitReader;
use crate::entropy::{read_signed_bounded, read_unsigned};
use crate::error::{FrameError, Result};
use crate::image::{Plane, Rect};
use crate::vardct::block_context::BlockCtxMap;
use crate::vardct::coeff_order::{CoeffOrder, NUM_AC, decode_coeff_orders};
use crate::vardct::coefficients::ceil_log2_nonzero;
use crate::vardct::color_correlation::ColorCorrelationMap;
use crate::vardct::dct::{BLOCK_DIM, BLOCK_SIZE, idct_8x8};
use crate::vardct::quantizer::{DequantMatrices, Quantizer};

const MAX_BITS_PER_CONTEXT: u32 = 5;

/// Channels are coded luma first so chroma can be predicted from it.
pub const CHANNEL_CODING_ORDER: [usize; 3] = [1, 0, 2];

/// Side information shared by every AC group of a frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcGlobalInfo {
    pub num_histograms: usize,
    /// Coefficient order per pass and channel.
    pub orders: Vec<[CoeffOrder; 3]>,
    /// Maximum coded length per pass and context.
    pub max_bits: Vec<Vec<u32>>,
}

impl AcGlobalInfo {
    pub fn decode(
        br: &mut BitReader,
        num_groups: usize,
        num_passes: usize,
        ctx_map: &BlockCtxMap,
    ) -> Result<Self> {
        let num_histograms = 1 + br.read_bits(ceil_log2_nonzero(num_groups))? as usize;
        if num_histograms > num_groups {
            return Err(FrameError::InvalidHeader);
        }
        let num_contexts = num_histograms * ctx_map.num_ac_contexts;
        let mut orders = Vec::with_capacity(num_passes);
        let mut max_bits = Vec::with_capacity(num_passes);
        for _ in 0..num_passes {
            orders.push(decode_coeff_orders(br)?);
            let mut pass_bits = Vec::with_capacity(num_contexts);
            for _ in 0..num_contexts {
                pass_bits.push(br.read_bits(MAX_BITS_PER_CONTEXT)?);
            }
            max_bits.push(pass_bits);
        }
        Ok(Self {
            num_histograms,
            orders,
            max_bits,
        })
    }

    /// Largest coefficient length any pass may produce.
    pub fn max_num_bits_ac(&self) -> u32 {
        self.max_bits
            .iter()
            .flat_map(|p| p.iter().copied())
            .max()
            .unwrap_or(0)
    }
}

/// Length of a group's coefficient buffer: three channels of 64 coefficients
/// per block, for a full group of `group_dim` pixels.
pub fn group_coefficient_len(group_dim: usize) -> usize {
    let blocks = group_dim / BLOCK_DIM;
    3 * blocks * blocks * BLOCK_SIZE
}

fn coeff_index(num_blocks: usize, c: usize, block: usize) -> usize {
    (c * num_blocks + block) * BLOCK_SIZE
}

/// Adds the coefficients of one pass to `acc`, laid out per channel and block
/// in natural order.
pub fn decode_group_pass(
    br: &mut BitReader,
    pass: usize,
    shift: u32,
    info: &AcGlobalInfo,
    ctx_map: &BlockCtxMap,
    block_rect: Rect,
    acc: &mut [i32],
) -> Result<()> {
    let histogram = br.read_bits(ceil_log2_nonzero(info.num_histograms))? as usize;
    if histogram >= info.num_histograms {
        return Err(FrameError::InvalidCoefficients);
    }
    let orders = &info.orders[pass];
    let max_bits = &info.max_bits[pass];
    let num_blocks = block_rect.area();
    for block in 0..num_blocks {
        for c in CHANNEL_CODING_ORDER {
            let num_nonzeros = read_unsigned(br)? as usize;
            if num_nonzeros > NUM_AC {
                return Err(FrameError::InvalidCoefficients);
            }
            let bits = max_bits[ctx_map.context(histogram, c)];
            let base = coeff_index(num_blocks, c, block);
            for &pos in orders[c].iter().take(num_nonzeros) {
                let v = read_signed_bounded(br, bits)?;
                let shifted = i32::try_from((v as i64) << shift)
                    .map_err(|_| FrameError::InvalidCoefficients)?;
                let slot = &mut acc[base + pos as usize];
                *slot = slot
                    .checked_add(shifted)
                    .ok_or(FrameError::InvalidCoefficients)?;
            }
        }
    }
    Ok(())
}

/// Everything needed to turn coefficients back into pixels.
pub struct Dequantizer<'a> {
    pub matrices: &'a DequantMatrices,
    pub quantizer: &'a Quantizer,
    pub cmap: &'a ColorCorrelationMap,
    /// Frame-wide DC per channel, one value per block.
    pub dc: &'a [Plane<f32>; 3],
    pub quant_field: &'a Plane<u32>,
}

/// Reconstructs the pixels of a group. The planes cover `block_rect` scaled to
/// pixels.
pub fn render_group(dq: &Dequantizer, block_rect: Rect, acc: Option<&[i32]>) -> [Plane<f32>; 3] {
    let (w, h) = (block_rect.xsize * BLOCK_DIM, block_rect.ysize * BLOCK_DIM);
    let mut out = [Plane::new(w, h), Plane::new(w, h), Plane::new(w, h)];
    let num_blocks = block_rect.area();
    let inv_global_scale = dq.quantizer.inv_global_scale();
    let (ytox, ytob) = (dq.cmap.y_to_x_dc(), dq.cmap.y_to_b_dc());
    let mut coefs = [[0.0f32; BLOCK_SIZE]; 3];
    let mut pixels = [0.0f32; BLOCK_SIZE];
    for by in 0..block_rect.ysize {
        for bx in 0..block_rect.xsize {
            let block = by * block_rect.xsize + bx;
            let (fx, fy) = (block_rect.x0 + bx, block_rect.y0 + by);
            let scale = inv_global_scale / dq.quant_field.get(fx, fy).max(1) as f32;
            for c in 0..3 {
                let coef = &mut coefs[c];
                coef.fill(0.0);
                coef[0] = dq.dc[c].get(fx, fy) * BLOCK_DIM as f32;
                if let Some(acc) = acc {
                    let base = coeff_index(num_blocks, c, block);
                    for k in 1..BLOCK_SIZE {
                        let q = acc[base + k];
                        if q != 0 {
                            coef[k] = q as f32 * dq.matrices.ac_step(c, k) * scale;
                        }
                    }
                }
            }
            for k in 1..BLOCK_SIZE {
                let y = coefs[1][k];
                coefs[0][k] += ytox * y;
                coefs[2][k] += ytob * y;
            }
            for c in 0..3 {
                idct_8x8(&coefs[c], &mut pixels);
                for iy in 0..BLOCK_DIM {
                    let row = out[c].row_mut(by * BLOCK_DIM + iy);
                    row[bx * BLOCK_DIM..(bx + 1) * BLOCK_DIM]
                        .copy_from_slice(&pixels[iy * BLOCK_DIM..(iy + 1) * BLOCK_DIM]);
                }
            }
        }
    }
    out
}

/// Quantized coefficients of every block of a group, per channel, in raster
/// order: DC at index 0, AC at natural positions.
pub fn jpeg_group_blocks(
    block_rect: Rect,
    acc: Option<&[i32]>,
    quant_dc: &[Plane<i32>; 3],
) -> [Vec<[i16; BLOCK_SIZE]>; 3] {
    let num_blocks = block_rect.area();
    let mut out: [Vec<[i16; BLOCK_SIZE]>; 3] = Default::default();
    for (c, blocks) in out.iter_mut().enumerate() {
        blocks.reserve(num_blocks);
        for by in 0..block_rect.ysize {
            for bx in 0..block_rect.xsize {
                let block = by * block_rect.xsize + bx;
                let mut coeffs = [0i16; BLOCK_SIZE];
                let dc = quant_dc[c].get(block_rect.x0 + bx, block_rect.y0 + by);
                coeffs[0] = dc.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
                if let Some(acc) = acc {
                    let base = coeff_index(num_blocks, c, block);
                    for k in 1..BLOCK_SIZE {
                        coeffs[k] = acc[base + k].clamp(i16::MIN as i32, i16::MAX as i32) as i16;
                    }
                }
                blocks.push(coeffs);
            }
        }
    }
    out
}
