//! Compositing a frame onto the canvas held in a reference slot.

use crate::decoder_state::ReferenceFrame;
use crate::frame_header::{BlendMode, BlendingInfo, FrameHeader, MAX_NUM_REFERENCE_FRAMES};
use crate::image::Plane;

/// Canvas planes after blending the frame at its origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Canvas {
    pub color: Vec<Plane<f32>>,
    pub extra: Vec<Plane<f32>>,
}

fn background(
    source: Option<&ReferenceFrame>,
    count: usize,
    pick: impl Fn(&ReferenceFrame, usize) -> Option<&Plane<f32>>,
    xsize: usize,
    ysize: usize,
) -> Vec<Plane<f32>> {
    (0..count)
        .map(|c| {
            source
                .and_then(|rf| pick(rf, c))
                .filter(|p| p.width() == xsize && p.height() == ysize)
                .cloned()
                .unwrap_or_else(|| Plane::new(xsize, ysize))
        })
        .collect()
}

fn blend_sample(info: &BlendingInfo, fg: f32, bg: f32, alpha: f32) -> f32 {
    let alpha = if info.clamp { alpha.clamp(0.0, 1.0) } else { alpha };
    match info.mode {
        BlendMode::Replace => fg,
        BlendMode::Add => bg + fg,
        BlendMode::Blend => fg * alpha + bg * (1.0 - alpha),
        BlendMode::MulAdd => bg + fg * alpha,
        BlendMode::Mul => {
            let fg = if info.clamp { fg.clamp(0.0, 1.0) } else { fg };
            bg * fg
        }
    }
}

/// Blends `color`/`extra` (frame-sized) onto a `xsize x ysize` canvas taken
/// from the reference slot named by each channel's blending info.
pub fn blend_onto_canvas(
    header: &FrameHeader,
    color: &[Plane<f32>],
    extra: &[Plane<f32>],
    xsize: usize,
    ysize: usize,
    reference_frames: &[Option<ReferenceFrame>; MAX_NUM_REFERENCE_FRAMES],
) -> Canvas {
    let color_info = header.blending_info;
    let color_source = reference_frames[color_info.source].as_ref();
    let mut canvas = Canvas {
        color: background(color_source, color.len(), |rf, c| rf.color.get(c), xsize, ysize),
        extra: (0..extra.len())
            .map(|i| {
                let info = header.extra_channel_blending_info.get(i).copied().unwrap_or_default();
                let source = reference_frames[info.source].as_ref();
                background(source, 1, |rf, _| rf.extra.get(i), xsize, ysize)
                    .pop()
                    .unwrap_or_else(|| Plane::new(xsize, ysize))
            })
            .collect(),
    };
    let bg_extra = canvas.extra.clone();

    let Some(first) = color.first() else {
        return canvas;
    };
    let (fw, fh) = (first.width() as i64, first.height() as i64);
    let (ox, oy) = header.frame_origin;
    let x_begin = ox.max(0);
    let y_begin = oy.max(0);
    let x_end = (ox + fw).min(xsize as i64);
    let y_end = (oy + fh).min(ysize as i64);

    for cy in y_begin..y_end {
        for cx in x_begin..x_end {
            let (fx, fy) = ((cx - ox) as usize, (cy - oy) as usize);
            let (cx, cy) = (cx as usize, cy as usize);
            let fg_alpha = |info: &BlendingInfo| {
                extra.get(info.alpha_channel).map_or(1.0, |p| p.get(fx, fy))
            };
            let a = fg_alpha(&color_info);
            for (dst, src) in canvas.color.iter_mut().zip(color) {
                let bg = dst.get(cx, cy);
                dst.set(cx, cy, blend_sample(&color_info, src.get(fx, fy), bg, a));
            }
            for (i, (dst, src)) in canvas.extra.iter_mut().zip(extra).enumerate() {
                let info = header.extra_channel_blending_info.get(i).copied().unwrap_or_default();
                let fg = src.get(fx, fy);
                let bg = bg_extra[i].get(cx, cy);
                let out = if info.mode == BlendMode::Blend && info.alpha_channel == i {
                    let fa = if info.clamp { fg.clamp(0.0, 1.0) } else { fg };
                    fa + bg * (1.0 - fa)
                } else {
                    blend_sample(&info, fg, bg, fg_alpha(&info))
                };
                dst.set(cx, cy, out);
            }
        }
    }
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(value: f32, size: usize) -> ReferenceFrame {
        ReferenceFrame {
            color: vec![Plane::filled(size, size, value); 3],
            extra: vec![Plane::filled(size, size, 1.0)],
            saved_before_color_transform: false,
        }
    }

    #[test]
    fn test_cropped_add_onto_reference() {
        let mut refs: [Option<ReferenceFrame>; 4] = Default::default();
        refs[1] = Some(slot(0.25, 8));
        let header = FrameHeader {
            custom_size_or_origin: true,
            frame_origin: (6, -1),
            blending_info: BlendingInfo {
                mode: BlendMode::Add,
                source: 1,
                ..Default::default()
            },
            ..Default::default()
        };
        let color = vec![Plane::filled(4, 4, 0.5f32); 3];
        let canvas = blend_onto_canvas(&header, &color, &[], 8, 8, &refs);
        assert_eq!(canvas.color[0].get(7, 2), 0.75);
        assert_eq!(canvas.color[0].get(6, 3), 0.25);
        assert_eq!(canvas.color[0].get(5, 0), 0.25);
    }

    #[test]
    fn test_alpha_blend_and_alpha_compositing() {
        let mut refs: [Option<ReferenceFrame>; 4] = Default::default();
        refs[0] = Some(slot(1.0, 2));
        let blend = BlendingInfo {
            mode: BlendMode::Blend,
            alpha_channel: 0,
            clamp: false,
            source: 0,
        };
        let header = FrameHeader {
            blending_info: blend,
            extra_channel_blending_info: vec![blend],
            ..Default::default()
        };
        let color = vec![Plane::filled(2, 2, 0.0f32); 3];
        let extra = vec![Plane::filled(2, 2, 0.25f32)];
        let canvas = blend_onto_canvas(&header, &color, &extra, 2, 2, &refs);
        assert_eq!(canvas.color[1].get(0, 0), 0.75);
        assert_eq!(canvas.extra[0].get(1, 1), 1.0);
    }

    #[test]
    fn test_empty_source_is_black() {
        let refs: [Option<ReferenceFrame>; 4] = Default::default();
        let header = FrameHeader {
            custom_size_or_origin: true,
            frame_origin: (1, 1),
            ..Default::default()
        };
        let color = vec![Plane::filled(1, 1, 0.5f32)];
        let canvas = blend_onto_canvas(&header, &color, &[], 3, 3, &refs);
        assert_eq!(canvas.color[0].data(), &[0.0, 0.0, 0.0, 0.0, 0.5, 0.0, 0.0, 0.0, 0.0]);
    }
}
