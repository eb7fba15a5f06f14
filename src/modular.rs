//! Modular (integer, lossless capable) channel coding.
//!
//! Samples are split into resolution levels by the alignment of their
//! coordinates: `level = min(3, trailing_zeros(x | y))`. Level 3 travels in the
//! DC groups, the finer levels in the AC passes of the pass schedule. Every
//! sample below level 3 is predicted from its parent on the next coarser grid,
//! so a level that has not arrived yet can be drawn by copying parents.

use tracing::debug;

use crate::bit_reader::BitReader;
use crate::dimensions::FrameDimensions;
use crate::entropy::read_signed;
use crate::error::{FrameError, Result};
use crate::frame_header::{ColorTransform, FrameEncoding, FrameHeader};
use crate::image::{Plane, Rect};
use crate::metadata::ImageMetadata;

pub const DC_LEVEL: i32 = 3;
const DC_STEP: usize = 1 << DC_LEVEL;

fn level(x: usize, y: usize) -> i32 {
    ((x | y).trailing_zeros() as i32).min(DC_LEVEL)
}

fn parent(x: usize, y: usize, level: i32) -> (usize, usize) {
    let mask = !((1usize << (level + 1)) - 1);
    (x & mask, y & mask)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModularChannel {
    pub plane: Plane<i32>,
    pub hshift: u32,
    pub vshift: u32,
    pub max_value: i32,
}

impl ModularChannel {
    /// The part of this channel covering `rect` of the frame.
    pub fn rect_for(&self, rect: Rect) -> Rect {
        let x0 = rect.x0 >> self.hshift;
        let y0 = rect.y0 >> self.vshift;
        let x1 = rect.x1().div_ceil(1 << self.hshift).min(self.plane.width());
        let y1 = rect.y1().div_ceil(1 << self.vshift).min(self.plane.height());
        Rect::new(x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0))
    }
}

/// Integer samples of some channels over a frame rectangle, as produced by one
/// group task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModularUpdate {
    pub rects: Vec<Rect>,
    pub planes: Vec<Plane<i32>>,
}

#[derive(Debug, Clone, Default)]
pub struct ModularFrame {
    pub channels: Vec<ModularChannel>,
    /// Leading channels that carry color rather than extra channels.
    pub num_color: usize,
    /// Reversible YCoCg over the color channels; needs the whole image.
    pub use_ycocg: bool,
    color_offset: f32,
}

impl ModularFrame {
    pub fn new(
        header: &FrameHeader,
        metadata: &ImageMetadata,
        dim: &FrameDimensions,
    ) -> Result<Self> {
        let mut channels = Vec::new();
        let mut num_color = 0;
        let mut color_offset = 0.0;
        if header.encoding == FrameEncoding::Modular {
            if header.color_transform == ColorTransform::Xyb {
                return Err(FrameError::Unsupported);
            }
            num_color = metadata.num_color_channels();
            let ycbcr = header.color_transform == ColorTransform::YCbCr;
            if ycbcr {
                color_offset = 0.5;
            }
            for c in 0..num_color {
                let (hshift, vshift) = if ycbcr {
                    (
                        header.chroma_subsampling.h_shift(c),
                        header.chroma_subsampling.v_shift(c),
                    )
                } else {
                    (0, 0)
                };
                channels.push(Self::channel(dim, hshift, vshift, metadata.max_sample_value()));
            }
        }
        let ups = header.upsampling;
        for (i, info) in metadata.extra_channel_info.iter().enumerate() {
            let ec_ups = header.extra_channel_upsampling.get(i).copied().unwrap_or(1);
            if ec_ups < ups || ec_ups % ups != 0 {
                return Err(FrameError::InvalidHeader);
            }
            let shift = (ec_ups / ups).trailing_zeros();
            let max_value = (1i32 << info.bit_depth) - 1;
            channels.push(Self::channel(dim, shift, shift, max_value));
        }
        Ok(Self {
            channels,
            num_color,
            use_ycocg: false,
            color_offset,
        })
    }

    fn channel(dim: &FrameDimensions, hshift: u32, vshift: u32, max_value: i32) -> ModularChannel {
        let w = dim.xsize.div_ceil(1 << hshift);
        let h = dim.ysize.div_ceil(1 << vshift);
        ModularChannel {
            plane: Plane::new(w, h),
            hshift,
            vshift,
            max_value,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn decode_global_info(&mut self, br: &mut BitReader) -> Result<()> {
        self.use_ycocg = self.num_color == 3 && br.read_bool()?;
        if self.use_ycocg {
            debug!("modular frame uses YCoCg, decoding as full image");
        }
        Ok(())
    }

    /// Whole-image frames cannot render a group before every group is in.
    pub fn is_full_image(&self) -> bool {
        self.use_ycocg
    }

    /// Copies the current samples under `rect`.
    pub fn snapshot(&self, rect: Rect) -> ModularUpdate {
        let rects: Vec<Rect> = self.channels.iter().map(|ch| ch.rect_for(rect)).collect();
        let planes = self
            .channels
            .iter()
            .zip(&rects)
            .map(|(ch, r)| ch.plane.crop(*r))
            .collect();
        ModularUpdate { rects, planes }
    }

    pub fn apply(&mut self, update: &ModularUpdate) {
        for ((ch, r), p) in self.channels.iter_mut().zip(&update.rects).zip(&update.planes) {
            ch.plane.paste(p, r.x0, r.y0);
        }
    }

    /// Reads the level-3 samples of a DC group.
    pub fn decode_dc_group(&self, br: &mut BitReader, rect: Rect) -> Result<ModularUpdate> {
        let mut update = self.snapshot(rect);
        for (r, plane) in update.rects.iter().zip(update.planes.iter_mut()) {
            for y in (0..r.ysize).step_by(DC_STEP) {
                for x in (0..r.xsize).step_by(DC_STEP) {
                    let pred = if x >= DC_STEP {
                        plane.get(x - DC_STEP, y)
                    } else if y >= DC_STEP {
                        plane.get(x, y - DC_STEP)
                    } else {
                        0
                    };
                    let v = pred
                        .checked_add(read_signed(br)?)
                        .ok_or(FrameError::InvalidModularStream)?;
                    plane.set(x, y, v);
                }
            }
        }
        Ok(update)
    }

    /// Decodes levels `max_shift` down to `min_shift` of one pass into
    /// `update`. Without a reader every residual is zero, which copies parents.
    pub fn decode_pass(
        &self,
        mut br: Option<&mut BitReader>,
        update: &mut ModularUpdate,
        min_shift: i32,
        max_shift: i32,
    ) -> Result<()> {
        if min_shift > max_shift || max_shift >= DC_LEVEL {
            return Ok(());
        }
        for (r, plane) in update.rects.iter().zip(update.planes.iter_mut()) {
            for s in (min_shift.max(0)..=max_shift).rev() {
                for y in 0..r.ysize {
                    for x in 0..r.xsize {
                        let (ax, ay) = (r.x0 + x, r.y0 + y);
                        if level(ax, ay) != s {
                            continue;
                        }
                        let (px, py) = parent(ax, ay, s);
                        let pred = plane.get(px - r.x0, py - r.y0);
                        let residual = match br.as_deref_mut() {
                            Some(br) => read_signed(br)?,
                            None => 0,
                        };
                        let v = pred
                            .checked_add(residual)
                            .ok_or(FrameError::InvalidModularStream)?;
                        plane.set(x, y, v);
                    }
                }
            }
        }
        Ok(())
    }

    fn to_float(&self, c: usize, v: i32) -> f32 {
        let max = self.channels[c].max_value.max(1) as f32;
        let offset = if c < self.num_color { self.color_offset } else { 0.0 };
        v as f32 / max - offset
    }

    /// Float planes covering `rect` of the frame at full resolution, expanding
    /// subsampled channels by repetition.
    pub fn group_to_float(&self, rect: Rect, update: &ModularUpdate) -> Vec<Plane<f32>> {
        let mut out = Vec::with_capacity(self.channels.len());
        for (c, ch) in self.channels.iter().enumerate() {
            let r = update.rects[c];
            let src = &update.planes[c];
            let mut plane = Plane::new(rect.xsize, rect.ysize);
            for y in 0..rect.ysize {
                let sy = ((rect.y0 + y) >> ch.vshift) - r.y0;
                for x in 0..rect.xsize {
                    let sx = ((rect.x0 + x) >> ch.hshift) - r.x0;
                    plane.set(x, y, self.to_float(c, src.get(sx, sy)));
                }
            }
            out.push(plane);
        }
        out
    }

    /// Converts a whole-image frame to floats, undoing the color transform.
    /// Returns `None` for frames whose groups were converted individually.
    pub fn finalize_decoding(&mut self, inplace: bool, xsize: usize, ysize: usize) -> Option<Vec<Plane<f32>>> {
        if !self.is_full_image() {
            return None;
        }
        let rect = Rect::new(0, 0, xsize, ysize);
        let mut update = self.snapshot(rect);
        inverse_ycocg(&mut update.planes[..3]);
        let out = self.group_to_float(rect, &update);
        if inplace {
            self.apply(&update);
            self.use_ycocg = false;
        }
        Some(out)
    }
}

/// Reversible YCoCg-R, channels ordered Y, Co, Cg in and R, G, B out.
fn inverse_ycocg(planes: &mut [Plane<i32>]) {
    let [y_plane, co_plane, cg_plane] = planes else {
        return;
    };
    for i in 0..y_plane.data().len() {
        let (y, co, cg) = (y_plane.data()[i], co_plane.data()[i], cg_plane.data()[i]);
        let tmp = y.wrapping_sub(cg >> 1);
        let g = cg.wrapping_add(tmp);
        let b = tmp.wrapping_sub(co >> 1);
        let r = b.wrapping_add(co);
        y_plane.data_mut()[i] = r;
        co_plane.data_mut()[i] = g;
        cg_plane.data_mut()[i] = b;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bit_reader::BitWriter;
    use crate::entropy::write_signed;
    use crate::metadata::ExtraChannelInfo;

    fn modular_header() -> FrameHeader {
        FrameHeader {
            encoding: FrameEncoding::Modular,
            group_size_shift: 0,
            ..Default::default()
        }
    }

    fn gray_metadata(xsize: usize, ysize: usize) -> ImageMetadata {
        ImageMetadata {
            xsize,
            ysize,
            is_gray: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_levels_and_parents() {
        assert_eq!(level(0, 0), 3);
        assert_eq!(level(16, 8), 3);
        assert_eq!(level(4, 8), 2);
        assert_eq!(level(3, 0), 0);
        assert_eq!(parent(12, 4, 2), (8, 0));
        assert_eq!(parent(5, 3, 0), (4, 2));
    }

    #[test]
    fn test_zero_fill_copies_parents() {
        let header = modular_header();
        let metadata = gray_metadata(16, 16);
        let dim = FrameDimensions::new(16, 16, 1, 128, false);
        let mut frame = ModularFrame::new(&header, &metadata, &dim).unwrap();
        let rect = Rect::new(0, 0, 16, 16);

        let mut w = BitWriter::new();
        for v in [10, 20, 5, -10] {
            write_signed(&mut w, v);
        }
        let bytes = w.finish();
        let dc = frame.decode_dc_group(&mut BitReader::new(&bytes), rect).unwrap();
        frame.apply(&dc);
        assert_eq!(frame.channels[0].plane.get(8, 0), 30);
        assert_eq!(frame.channels[0].plane.get(0, 8), 15);
        assert_eq!(frame.channels[0].plane.get(8, 8), 5);

        let mut update = frame.snapshot(rect);
        frame.decode_pass(None, &mut update, 0, 2).unwrap();
        let p = &update.planes[0];
        assert_eq!(p.get(7, 7), 10);
        assert_eq!(p.get(9, 3), 30);
        assert_eq!(p.get(15, 15), 5);
    }

    #[test]
    fn test_ycocg_is_reversible() {
        let (r, g, b) = (200, 13, 77);
        let co = r - b;
        let tmp = b + (co >> 1);
        let cg = g - tmp;
        let y = tmp + (cg >> 1);
        let mut planes = vec![
            Plane::filled(1, 1, y),
            Plane::filled(1, 1, co),
            Plane::filled(1, 1, cg),
        ];
        inverse_ycocg(&mut planes);
        assert_eq!(
            (planes[0].get(0, 0), planes[1].get(0, 0), planes[2].get(0, 0)),
            (r, g, b)
        );
    }

    #[test]
    fn test_extra_channel_upsampling_must_be_multiple() {
        let mut header = modular_header();
        header.upsampling = 2;
        header.extra_channel_upsampling = vec![1];
        let mut metadata = gray_metadata(32, 32);
        metadata.extra_channel_info.push(ExtraChannelInfo {
            bit_depth: 8,
            is_alpha: true,
        });
        let dim = FrameDimensions::new(32, 32, 2, 128, false);
        assert!(matches!(
            ModularFrame::new(&header, &metadata, &dim),
            Err(FrameError::InvalidHeader)
        ));
        header.extra_channel_upsampling = vec![4];
        let frame = ModularFrame::new(&header, &metadata, &dim).unwrap();
        assert_eq!(frame.channels[1].hshift, 1);
        assert_eq!(frame.channels[1].plane.width(), 8);
    }
}
