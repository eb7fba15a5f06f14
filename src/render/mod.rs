//! Render pipeline: collects per-group pixels and, once every group is in,
//! runs the frame-wide stages that turn them into the output image.
//!
//! Stage order: loop filter, crop to the coded size, patches, splines,
//! upsampling, noise, DC-frame and pre-color-transform captures, color
//! transform, gray reduction, blending, post-blend capture.

pub mod blending;
pub mod color;

use tracing::{debug, trace};

use crate::decoder_state::ReferenceFrame;
use crate::dimensions::FrameDimensions;
use crate::error::{FrameError, Result};
use crate::features::ImageFeatures;
use crate::frame_header::{ColorTransform, FrameHeader, FrameType, MAX_NUM_REFERENCE_FRAMES};
use crate::image::{Plane, Rect};
use crate::loop_filter::{edge_preserving_filter, gaborish};
use crate::metadata::ImageMetadata;
use blending::blend_onto_canvas;
use color::{xyb_to_linear_rgb, ycbcr_to_rgb};

/// Read-only inputs of a render.
pub struct RenderContext<'a> {
    pub header: &'a FrameHeader,
    pub metadata: &'a ImageMetadata,
    pub features: &'a ImageFeatures,
    pub reference_frames: &'a [Option<ReferenceFrame>; MAX_NUM_REFERENCE_FRAMES],
    pub coalescing: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RenderedFrame {
    pub xsize: usize,
    pub ysize: usize,
    pub origin: (i64, i64),
    pub color: Vec<Plane<f32>>,
    pub extra: Vec<Plane<f32>>,
    pub is_internal_color: bool,
    /// What the frame leaves in its reference slot, if it can be referenced.
    pub reference: Option<ReferenceFrame>,
    /// Internal-space color of a DC frame.
    pub dc_frame: Option<Vec<Plane<f32>>>,
}

#[derive(Debug, Clone, Default)]
pub struct RenderPipeline {
    dim: FrameDimensions,
    color: Vec<Plane<f32>>,
    extra: Vec<Plane<f32>>,
    noise: Option<[Plane<f32>; 3]>,
    /// Edge preserving filter strength, one value per 8x8 block.
    sigma: Plane<f32>,
    group_done: Vec<bool>,
}

fn upsample_nearest(plane: &Plane<f32>, factor: usize, xsize: usize, ysize: usize) -> Plane<f32> {
    let mut out = Plane::new(xsize, ysize);
    for y in 0..ysize {
        let src = plane.row((y / factor).min(plane.height() - 1));
        for (x, v) in out.row_mut(y).iter_mut().enumerate() {
            *v = src[(x / factor).min(src.len() - 1)];
        }
    }
    out
}

impl RenderPipeline {
    pub fn new(dim: FrameDimensions, num_color: usize, num_extra: usize, has_noise: bool) -> Self {
        let (w, h) = (dim.xsize_padded, dim.ysize_padded);
        let noise = has_noise.then(|| {
            let (uw, uh) = (dim.xsize_upsampled, dim.ysize_upsampled);
            [Plane::new(uw, uh), Plane::new(uw, uh), Plane::new(uw, uh)]
        });
        Self {
            dim,
            color: vec![Plane::new(w, h); num_color],
            extra: vec![Plane::new(w, h); num_extra],
            noise,
            sigma: Plane::new(dim.xsize_blocks, dim.ysize_blocks),
            group_done: vec![false; dim.num_groups],
        }
    }

    pub fn clear_done(&mut self, g: usize) {
        self.group_done[g] = false;
    }

    pub fn mark_done(&mut self, g: usize) {
        self.group_done[g] = true;
    }

    pub fn is_done(&self, g: usize) -> bool {
        self.group_done[g]
    }

    pub fn all_done(&self) -> bool {
        self.group_done.iter().all(|&d| d)
    }

    /// Writes color planes whose top-left pixel is `(x0, y0)` of the frame.
    pub fn set_color(&mut self, x0: usize, y0: usize, planes: &[Plane<f32>]) {
        for (dst, src) in self.color.iter_mut().zip(planes) {
            dst.paste(src, x0, y0);
        }
    }

    pub fn set_extra(&mut self, x0: usize, y0: usize, planes: &[Plane<f32>]) {
        for (dst, src) in self.extra.iter_mut().zip(planes) {
            dst.paste(src, x0, y0);
        }
    }

    /// Writes noise planes at `(x0, y0)` of the upsampled frame.
    pub fn set_noise(&mut self, x0: usize, y0: usize, planes: &[Plane<f32>; 3]) {
        if let Some(noise) = &mut self.noise {
            for (dst, src) in noise.iter_mut().zip(planes) {
                dst.paste(src, x0, y0);
            }
        }
    }

    pub fn set_sigma(&mut self, block_rect: Rect, sigma: &Plane<f32>) {
        self.sigma.paste(sigma, block_rect.x0, block_rect.y0);
    }

    pub fn fill_sigma(&mut self, block_rect: Rect, value: f32) {
        self.set_sigma(block_rect, &Plane::filled(block_rect.xsize, block_rect.ysize, value));
    }

    /// Runs every stage over the collected groups.
    pub fn render(&self, ctx: &RenderContext) -> Result<RenderedFrame> {
        if !self.all_done() {
            return Err(FrameError::InvalidOperation);
        }
        let header = ctx.header;
        let dim = &self.dim;
        let mut color = self.color.clone();
        let mut extra = self.extra.clone();

        if header.loop_filter.gab {
            gaborish(&mut color);
        }
        if header.loop_filter.epf_iters > 0 {
            edge_preserving_filter(&mut color, &self.sigma, header.loop_filter.epf_iters);
        }

        let coded = Rect::new(0, 0, dim.xsize, dim.ysize);
        for p in color.iter_mut().chain(extra.iter_mut()) {
            *p = p.crop(coded);
        }

        if !ctx.features.patches.is_empty() {
            ctx.features
                .patches
                .apply(&mut color, &mut extra, ctx.reference_frames)?;
        }
        if !ctx.features.splines.is_empty() {
            ctx.features.splines.apply(&mut color);
        }

        let (xs, ys) = (dim.xsize_upsampled, dim.ysize_upsampled);
        if dim.upsampling > 1 {
            trace!(factor = dim.upsampling, "upsampling");
            for p in color.iter_mut().chain(extra.iter_mut()) {
                *p = upsample_nearest(p, dim.upsampling, xs, ys);
            }
        }

        if let (Some(params), Some(noise)) = (&ctx.features.noise, &self.noise) {
            if color.len() == 3 {
                for i in 0..xs * ys {
                    let strength = params.strength(color[1].data()[i]);
                    for (plane, n) in color.iter_mut().zip(noise) {
                        plane.data_mut()[i] += strength * n.data()[i];
                    }
                }
            }
        }

        let mut rendered = RenderedFrame {
            xsize: xs,
            ysize: ys,
            origin: header.frame_origin,
            ..Default::default()
        };
        if header.frame_type == FrameType::DcFrame {
            debug!(dc_level = header.dc_level, "keeping DC frame in internal color");
            rendered.dc_frame = Some(color.clone());
            rendered.color = color;
            rendered.extra = extra;
            rendered.is_internal_color = true;
            return Ok(rendered);
        }
        let referenced = header.can_be_referenced();
        if referenced && header.save_before_color_transform {
            rendered.reference = Some(ReferenceFrame {
                color: color.clone(),
                extra: extra.clone(),
                saved_before_color_transform: true,
            });
        }

        match header.color_transform {
            ColorTransform::Xyb => xyb_to_linear_rgb(&mut color),
            ColorTransform::YCbCr => ycbcr_to_rgb(&mut color),
            ColorTransform::None => {}
        }
        if ctx.metadata.is_gray && color.len() == 3 {
            let luma = color.swap_remove(1);
            color = vec![luma];
        }

        let blends = matches!(header.frame_type, FrameType::Regular | FrameType::SkipProgressive)
            && ctx.coalescing;
        if blends {
            let canvas = blend_onto_canvas(
                header,
                &color,
                &extra,
                ctx.metadata.xsize,
                ctx.metadata.ysize,
                ctx.reference_frames,
            );
            rendered.xsize = ctx.metadata.xsize;
            rendered.ysize = ctx.metadata.ysize;
            rendered.origin = (0, 0);
            color = canvas.color;
            extra = canvas.extra;
        }
        if referenced && !header.save_before_color_transform {
            rendered.reference = Some(ReferenceFrame {
                color: color.clone(),
                extra: extra.clone(),
                saved_before_color_transform: false,
            });
        }
        rendered.color = color;
        rendered.extra = extra;
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_header::LoopFilter;

    fn no_filter_header(xsize: usize, ysize: usize) -> FrameHeader {
        FrameHeader {
            frame_size: (xsize, ysize),
            loop_filter: LoopFilter {
                gab: false,
                epf_iters: 0,
                epf_sigma_for_modular: 1.0,
            },
            ..Default::default()
        }
    }

    fn metadata(xsize: usize, ysize: usize) -> ImageMetadata {
        ImageMetadata {
            xsize,
            ysize,
            ..Default::default()
        }
    }

    #[test]
    fn test_render_requires_every_group() {
        let header = no_filter_header(300, 40);
        let dim = header.to_frame_dimensions();
        let mut pipeline = RenderPipeline::new(dim, 3, 0, false);
        let md = metadata(300, 40);
        let features = ImageFeatures::default();
        let refs = Default::default();
        let ctx = RenderContext {
            header: &header,
            metadata: &md,
            features: &features,
            reference_frames: &refs,
            coalescing: true,
        };
        pipeline.mark_done(0);
        assert!(matches!(pipeline.render(&ctx), Err(FrameError::InvalidOperation)));
        pipeline.mark_done(1);
        let out = pipeline.render(&ctx).unwrap();
        assert_eq!((out.xsize, out.ysize), (300, 40));
        assert_eq!(out.color[0].width(), 300);
        assert!(out.reference.is_none());
    }

    #[test]
    fn test_upsampled_group_and_reference_capture() {
        let mut header = no_filter_header(16, 16);
        header.upsampling = 2;
        header.is_last = false;
        header.save_as_reference = 2;
        let dim = header.to_frame_dimensions();
        let mut pipeline = RenderPipeline::new(dim, 3, 0, false);
        let mut planes = vec![Plane::new(8, 8); 3];
        planes[0].set(1, 0, 0.5f32);
        pipeline.set_color(0, 0, &planes);
        pipeline.mark_done(0);
        let md = metadata(16, 16);
        let features = ImageFeatures::default();
        let refs = Default::default();
        let ctx = RenderContext {
            header: &header,
            metadata: &md,
            features: &features,
            reference_frames: &refs,
            coalescing: true,
        };
        let out = pipeline.render(&ctx).unwrap();
        assert_eq!(out.color[0].get(2, 1), 0.5);
        assert_eq!(out.color[0].get(1, 1), 0.0);
        let reference = out.reference.unwrap();
        assert!(!reference.saved_before_color_transform);
        assert_eq!(reference.color[0].get(3, 0), 0.5);
    }
}
