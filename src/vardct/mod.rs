//! Transform-coded (VarDCT) frames.

pub mod block_context;
pub mod coeff_order;
pub mod coefficients;
pub mod color_correlation;
pub mod dc;
pub mod dct;
pub mod group;
pub mod quantizer;

use crate::dimensions::FrameDimensions;
use crate::error::{FrameError, Result};
use crate::image::Plane;
use coefficients::CoefficientStorage;
use dc::{AcMetadata, DcGroupData, adaptive_dc_smoothing};
use group::AcGlobalInfo;
use quantizer::{DequantMatrices, Quantizer};

/// Per-frame VarDCT state, indexed in 8x8 block units.
#[derive(Debug, Default)]
pub struct VarDctFrame {
    pub dc: [Plane<f32>; 3],
    pub quant_dc: [Plane<i32>; 3],
    pub quant_field: Plane<u32>,
    pub used_acs: u32,
    pub ac_global: AcGlobalInfo,
    pub coefficients: CoefficientStorage,
}

impl VarDctFrame {
    pub fn new(dim: &FrameDimensions) -> Self {
        let (w, h) = (dim.xsize_blocks, dim.ysize_blocks);
        Self {
            dc: [Plane::new(w, h), Plane::new(w, h), Plane::new(w, h)],
            quant_dc: [Plane::new(w, h), Plane::new(w, h), Plane::new(w, h)],
            quant_field: Plane::filled(w, h, 1),
            used_acs: 0,
            ac_global: AcGlobalInfo::default(),
            coefficients: CoefficientStorage::default(),
        }
    }

    pub fn store_dc_group(&mut self, data: &DcGroupData) {
        let r = data.block_rect;
        for c in 0..3 {
            self.dc[c].paste(&data.dc[c], r.x0, r.y0);
            self.quant_dc[c].paste(&data.quant_dc[c], r.x0, r.y0);
        }
    }

    pub fn store_ac_metadata(&mut self, meta: &AcMetadata) {
        let r = meta.block_rect;
        self.quant_field.paste(&meta.quant_field, r.x0, r.y0);
        self.used_acs |= meta.used_acs;
    }

    /// Takes the DC image from a previously decoded DC frame.
    pub fn load_dc_frame(&mut self, planes: &[Plane<f32>]) -> Result<()> {
        if planes.len() != 3 {
            return Err(FrameError::InvalidHeader);
        }
        for (dst, src) in self.dc.iter_mut().zip(planes) {
            if src.width() != dst.width() || src.height() != dst.height() {
                return Err(FrameError::InvalidHeader);
            }
            *dst = src.clone();
        }
        Ok(())
    }

    pub fn smooth_dc(&mut self, matrices: &DequantMatrices, quantizer: &Quantizer) {
        let mul = quantizer.mul_dc();
        let factors = [
            matrices.dc_quant[0] * mul,
            matrices.dc_quant[1] * mul,
            matrices.dc_quant[2] * mul,
        ];
        adaptive_dc_smoothing(factors, &mut self.dc);
    }
}

/// VarDCT channel feeding each JPEG component.
pub fn jpeg_order(is_ycbcr: bool, is_gray: bool) -> [usize; 3] {
    if is_gray {
        [0, 0, 0]
    } else if is_ycbcr {
        [1, 0, 2]
    } else {
        [0, 1, 2]
    }
}
