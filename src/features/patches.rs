//! Patch dictionary: rectangles copied from reference frames and blended
//! onto the current frame.

use num_enum::TryFromPrimitive;

use crate::bit_reader::BitReader;
use crate::decoder_state::ReferenceFrame;
use crate::entropy::read_unsigned;
use crate::error::{FrameError, Result};
use crate::frame_header::MAX_NUM_REFERENCE_FRAMES;
use crate::image::Plane;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, TryFromPrimitive)]
#[repr(u32)]
pub enum PatchBlendMode {
    #[default]
    None = 0,
    Replace = 1,
    Add = 2,
    Mul = 3,
    BlendAbove = 4,
    BlendBelow = 5,
    AlphaWeightedAddAbove = 6,
    AlphaWeightedAddBelow = 7,
}

impl PatchBlendMode {
    pub fn uses_alpha(self) -> bool {
        matches!(
            self,
            Self::BlendAbove
                | Self::BlendBelow
                | Self::AlphaWeightedAddAbove
                | Self::AlphaWeightedAddBelow
        )
    }

    pub fn uses_clamp(self) -> bool {
        self == Self::Mul || self.uses_alpha()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PatchBlending {
    pub mode: PatchBlendMode,
    pub alpha_channel: usize,
    pub clamp: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchReferencePosition {
    pub reference: usize,
    pub x0: usize,
    pub y0: usize,
    pub xsize: usize,
    pub ysize: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchPosition {
    pub x: usize,
    pub y: usize,
    pub ref_pos_idx: usize,
    /// Index 0 blends the color channels, index `1 + i` extra channel `i`.
    pub blending: Vec<PatchBlending>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchesDictionary {
    pub ref_positions: Vec<PatchReferencePosition>,
    pub positions: Vec<PatchPosition>,
}

impl PatchesDictionary {
    pub fn clear(&mut self) {
        self.ref_positions.clear();
        self.positions.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Reads the dictionary. The flag is set when any patch touches extra channels.
    pub fn decode(
        br: &mut BitReader,
        xsize: usize,
        ysize: usize,
        num_extra: usize,
        reference_frames: &[Option<ReferenceFrame>; MAX_NUM_REFERENCE_FRAMES],
    ) -> Result<(Self, bool)> {
        let max_patches = 1024 + xsize * ysize / 16;
        let num_ref_patches = read_unsigned(br)? as usize;
        if num_ref_patches > max_patches {
            return Err(FrameError::InvalidHeader);
        }
        let mut dict = Self::default();
        let mut uses_extra_channels = false;
        for _ in 0..num_ref_patches {
            let reference = read_unsigned(br)? as usize;
            if reference >= MAX_NUM_REFERENCE_FRAMES {
                return Err(FrameError::InvalidHeader);
            }
            let x0 = read_unsigned(br)? as usize;
            let y0 = read_unsigned(br)? as usize;
            let pxsize = read_unsigned(br)? as usize + 1;
            let pysize = read_unsigned(br)? as usize + 1;
            let Some(ref_frame) = &reference_frames[reference] else {
                return Err(FrameError::MissingReference);
            };
            if x0 + pxsize > ref_frame.xsize() || y0 + pysize > ref_frame.ysize() {
                return Err(FrameError::InvalidHeader);
            }
            let ref_pos_idx = dict.ref_positions.len();
            dict.ref_positions.push(PatchReferencePosition {
                reference,
                x0,
                y0,
                xsize: pxsize,
                ysize: pysize,
            });

            let count = read_unsigned(br)? as usize + 1;
            if dict.positions.len() + count > max_patches {
                return Err(FrameError::InvalidHeader);
            }
            for _ in 0..count {
                let x = read_unsigned(br)? as usize;
                let y = read_unsigned(br)? as usize;
                if x + pxsize > xsize || y + pysize > ysize {
                    return Err(FrameError::InvalidHeader);
                }
                let mut blending = Vec::with_capacity(1 + num_extra);
                for j in 0..1 + num_extra {
                    let mode = PatchBlendMode::try_from(br.read_bits(3)?)
                        .map_err(|_| FrameError::InvalidHeader)?;
                    let mut b = PatchBlending {
                        mode,
                        ..Default::default()
                    };
                    if mode.uses_alpha() && num_extra > 1 {
                        b.alpha_channel = read_unsigned(br)? as usize;
                        if b.alpha_channel >= num_extra {
                            return Err(FrameError::InvalidHeader);
                        }
                    }
                    if mode.uses_clamp() {
                        b.clamp = br.read_bool()?;
                    }
                    if j > 0 && mode != PatchBlendMode::None {
                        uses_extra_channels = true;
                    }
                    blending.push(b);
                }
                dict.positions.push(PatchPosition {
                    x,
                    y,
                    ref_pos_idx,
                    blending,
                });
            }
        }
        Ok((dict, uses_extra_channels))
    }

    /// Bitmask of the reference slots the patches read from.
    pub fn get_references(&self) -> u32 {
        self.ref_positions
            .iter()
            .fold(0, |acc, r| acc | (1 << r.reference))
    }

    /// Blends every patch onto `color` and `extra`.
    pub fn apply(
        &self,
        color: &mut [Plane<f32>],
        extra: &mut [Plane<f32>],
        reference_frames: &[Option<ReferenceFrame>; MAX_NUM_REFERENCE_FRAMES],
    ) -> Result<()> {
        for pos in &self.positions {
            let rp = self.ref_positions[pos.ref_pos_idx];
            let Some(rf) = &reference_frames[rp.reference] else {
                return Err(FrameError::MissingReference);
            };
            for dy in 0..rp.ysize {
                let y = pos.y + dy;
                let sy = rp.y0 + dy;
                for dx in 0..rp.xsize {
                    let x = pos.x + dx;
                    let sx = rp.x0 + dx;
                    if x >= color.first().map_or(0, |p| p.width()) {
                        break;
                    }
                    let alpha = |b: &PatchBlending, from_ref: bool| -> f32 {
                        let a = if from_ref {
                            rf.extra.get(b.alpha_channel).map(|p| p.get(sx, sy))
                        } else {
                            extra.get(b.alpha_channel).map(|p| p.get(x, y))
                        }
                        .unwrap_or(1.0);
                        if b.clamp { a.clamp(0.0, 1.0) } else { a }
                    };
                    let color_blend = pos.blending[0];
                    let fg_alpha = alpha(&color_blend, true);
                    let bg_alpha = alpha(&color_blend, false);
                    for (c, plane) in color.iter_mut().enumerate() {
                        if y >= plane.height() {
                            continue;
                        }
                        let src = &rf.color[c.min(rf.color.len() - 1)];
                        let fg = src.get(sx, sy);
                        let bg = plane.get(x, y);
                        plane.set(x, y, blend(color_blend, fg, bg, fg_alpha, bg_alpha));
                    }
                    for (i, plane) in extra.iter_mut().enumerate() {
                        let b = pos.blending[1 + i];
                        if b.mode == PatchBlendMode::None || y >= plane.height() || x >= plane.width() {
                            continue;
                        }
                        let Some(src) = rf.extra.get(i) else {
                            continue;
                        };
                        let fg = src.get(sx, sy);
                        let bg = plane.get(x, y);
                        let fg_a = rf.extra.get(b.alpha_channel).map_or(1.0, |p| p.get(sx, sy));
                        let out = blend(b, fg, bg, fg_a, 1.0);
                        plane.set(x, y, out);
                    }
                }
            }
        }
        Ok(())
    }
}

fn blend(b: PatchBlending, fg: f32, bg: f32, fg_alpha: f32, bg_alpha: f32) -> f32 {
    match b.mode {
        PatchBlendMode::None => bg,
        PatchBlendMode::Replace => fg,
        PatchBlendMode::Add => bg + fg,
        PatchBlendMode::Mul => {
            let fg = if b.clamp { fg.clamp(0.0, 1.0) } else { fg };
            bg * fg
        }
        PatchBlendMode::BlendAbove => fg_alpha * fg + (1.0 - fg_alpha) * bg,
        PatchBlendMode::BlendBelow => bg_alpha * bg + (1.0 - bg_alpha) * fg,
        PatchBlendMode::AlphaWeightedAddAbove => bg + fg * fg_alpha,
        PatchBlendMode::AlphaWeightedAddBelow => fg + bg * bg_alpha,
    }
}
