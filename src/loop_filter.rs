//! Restoration filters run on the coded-resolution planes before upsampling:
//! a 3x3 gaborish smoothing and an edge preserving filter steered by a
//! per-block sigma.

use crate::dimensions::BLOCK_DIM;
use crate::image::Plane;

const GAB_WEIGHT_SIDE: f32 = 0.115169525;
const GAB_WEIGHT_DIAG: f32 = 0.061248592;

/// Blocks whose sigma is below this are left untouched.
pub const EPF_MIN_SIGMA: f32 = 1e-4;
/// Scales the quantization step of a VarDCT block into a sigma.
pub const EPF_QUANT_MUL: f32 = 0.03;
/// Modular sigmas are given in 8-bit sample units.
pub const EPF_MODULAR_SIGMA_SCALE: f32 = 1.0 / 255.0;
/// Neighbours further than this many sigmas away get zero weight.
const EPF_RANGE: f32 = 3.0;

pub fn vardct_sigma(inv_global_scale: f32, quant_field: u32) -> f32 {
    EPF_QUANT_MUL * inv_global_scale / quant_field.max(1) as f32
}

fn clamped(v: isize, len: usize) -> usize {
    v.clamp(0, len as isize - 1) as usize
}

pub fn gaborish(planes: &mut [Plane<f32>]) {
    let norm = 1.0 / (1.0 + 4.0 * GAB_WEIGHT_SIDE + 4.0 * GAB_WEIGHT_DIAG);
    for plane in planes.iter_mut() {
        let (w, h) = (plane.width(), plane.height());
        if w == 0 || h == 0 {
            continue;
        }
        let src = plane.clone();
        for y in 0..h {
            let ym = clamped(y as isize - 1, h);
            let yp = clamped(y as isize + 1, h);
            for x in 0..w {
                let xm = clamped(x as isize - 1, w);
                let xp = clamped(x as isize + 1, w);
                let side = src.get(xm, y) + src.get(xp, y) + src.get(x, ym) + src.get(x, yp);
                let diag = src.get(xm, ym) + src.get(xp, ym) + src.get(xm, yp) + src.get(xp, yp);
                let v = (src.get(x, y) + GAB_WEIGHT_SIDE * side + GAB_WEIGHT_DIAG * diag) * norm;
                plane.set(x, y, v);
            }
        }
    }
}

/// Edge preserving filter over all channels jointly: each neighbour is
/// weighted by how close it is to the center pixel relative to the block sigma.
pub fn edge_preserving_filter(planes: &mut [Plane<f32>], sigma: &Plane<f32>, iters: u32) {
    let Some(first) = planes.first() else {
        return;
    };
    let (w, h) = (first.width(), first.height());
    if sigma.width() == 0 || sigma.height() == 0 {
        return;
    }
    for _ in 0..iters {
        let src: Vec<Plane<f32>> = planes.to_vec();
        for y in 0..h {
            let by = (y / BLOCK_DIM).min(sigma.height() - 1);
            for x in 0..w {
                let bx = (x / BLOCK_DIM).min(sigma.width() - 1);
                let s = sigma.get(bx, by);
                if s < EPF_MIN_SIGMA {
                    continue;
                }
                let neighbours = [
                    (clamped(x as isize - 1, w), y),
                    (clamped(x as isize + 1, w), y),
                    (x, clamped(y as isize - 1, h)),
                    (x, clamped(y as isize + 1, h)),
                ];
                let mut total_weight = 1.0f32;
                let mut weights = [0.0f32; 4];
                for (weight, &(nx, ny)) in weights.iter_mut().zip(&neighbours) {
                    let dist: f32 = src.iter().map(|p| (p.get(x, y) - p.get(nx, ny)).abs()).sum();
                    *weight = (1.0 - dist / (EPF_RANGE * s)).max(0.0);
                    total_weight += *weight;
                }
                for (plane, p) in planes.iter_mut().zip(&src) {
                    let mut acc = p.get(x, y);
                    for (weight, &(nx, ny)) in weights.iter().zip(&neighbours) {
                        acc += weight * p.get(nx, ny);
                    }
                    plane.set(x, y, acc / total_weight);
                }
            }
        }
    }
}
