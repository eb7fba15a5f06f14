//! Synthetic noise: intensity-dependent strength LUT and deterministic
//! per-group random planes.

use crate::bit_reader::BitReader;
use crate::error::Result;
use crate::image::Plane;

pub const NOISE_LUT_SIZE: usize = 8;
const NOISE_LUT_BITS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NoiseParams {
    pub lut: [f32; NOISE_LUT_SIZE],
}

impl NoiseParams {
    pub fn decode(br: &mut BitReader) -> Result<Self> {
        let mut lut = [0.0f32; NOISE_LUT_SIZE];
        for v in lut.iter_mut() {
            *v = br.read_bits(NOISE_LUT_BITS)? as f32 / (1 << NOISE_LUT_BITS) as f32;
        }
        Ok(Self { lut })
    }

    pub fn has_any(&self) -> bool {
        self.lut.iter().any(|&v| v.abs() > 1e-3)
    }

    /// Noise strength for an intensity in [0, 1], linearly interpolated.
    pub fn strength(&self, intensity: f32) -> f32 {
        let scaled = intensity.clamp(0.0, 1.0) * (NOISE_LUT_SIZE - 1) as f32;
        let lo = (scaled as usize).min(NOISE_LUT_SIZE - 2);
        let frac = scaled - lo as f32;
        self.lut[lo] * (1.0 - frac) + self.lut[lo + 1] * frac
    }
}

fn split_mix_64(z: u64) -> u64 {
    let z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    let z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

pub struct Xorshift128Plus {
    s0: u64,
    s1: u64,
}

impl Xorshift128Plus {
    pub fn new_with_seeds(seed0: u32, seed1: u32, seed2: u32, seed3: u32) -> Self {
        let s0 = split_mix_64(((seed0 as u64) << 32) | seed1 as u64);
        let s1 = split_mix_64(((seed2 as u64) << 32) | seed3 as u64);
        Self { s0, s1 }
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut s1 = self.s0;
        let s0 = self.s1;
        let bits = s1.wrapping_add(s0);
        self.s0 = s0;
        s1 ^= s1 << 23;
        self.s1 = s1 ^ s0 ^ (s1 >> 18) ^ (s0 >> 5);
        bits
    }

    /// Uniform sample in [-0.5, 0.5) built from the top 23 random bits.
    pub fn next_centered_f32(&mut self) -> f32 {
        let mantissa = (self.next_u64() >> 41) as u32;
        f32::from_bits(mantissa | 0x3F80_0000) - 1.5
    }
}

/// Three noise planes covering `xsize x ysize` pixels whose top-left corner
/// sits at `(x0, y0)` of the upsampled frame.
pub fn random_3_planes(
    visible_frame_index: usize,
    nonvisible_frame_index: usize,
    x0: usize,
    y0: usize,
    xsize: usize,
    ysize: usize,
) -> [Plane<f32>; 3] {
    let mut rng = Xorshift128Plus::new_with_seeds(
        visible_frame_index as u32,
        nonvisible_frame_index as u32,
        x0 as u32,
        y0 as u32,
    );
    let mut planes = [
        Plane::new(xsize, ysize),
        Plane::new(xsize, ysize),
        Plane::new(xsize, ysize),
    ];
    for plane in planes.iter_mut() {
        for v in plane.data_mut() {
            *v = rng.next_centered_f32();
        }
    }
    planes
}
