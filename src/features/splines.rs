//! Splines: polylines of Gaussian blobs added on top of the decoded image.

use crate::bit_reader::BitReader;
use crate::entropy::{read_signed, read_unsigned};
use crate::error::{FrameError, Result};
use crate::image::Plane;
use crate::vardct::color_correlation::ColorCorrelationMap;

const MAX_NUM_SPLINES_BASE: usize = 256;
const MAX_NUM_SPLINES: usize = 1 << 20;
const MAX_NUM_CONTROL_POINTS: usize = 1 << 20;
const MAX_DRAW_SAMPLES: usize = 1 << 22;
const MAX_COORDINATE: i64 = 1 << 23;

#[derive(Debug, Clone, PartialEq)]
pub struct Spline {
    pub control_points: Vec<(i64, i64)>,
    /// Added value per color channel, before chroma from luma.
    pub color: [f32; 3],
    pub sigma: f32,
}

/// One precomputed blob of the draw cache.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SplineSegment {
    x: f32,
    y: f32,
    sigma: f32,
    color: [f32; 3],
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Splines {
    pub splines: Vec<Spline>,
    segments: Vec<SplineSegment>,
}

impl Splines {
    pub fn clear(&mut self) {
        self.splines.clear();
        self.segments.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.splines.is_empty()
    }

    pub fn decode(br: &mut BitReader, num_pixels: usize) -> Result<Self> {
        let num_splines = read_unsigned(br)? as usize + 1;
        let max_splines = (MAX_NUM_SPLINES_BASE + num_pixels / 4).min(MAX_NUM_SPLINES);
        if num_splines > max_splines {
            return Err(FrameError::TooManySplines);
        }
        let max_control_points = (num_pixels / 2 + 64).min(MAX_NUM_CONTROL_POINTS);
        let mut total_points = 0usize;
        let mut splines = Vec::with_capacity(num_splines);
        for _ in 0..num_splines {
            let num_points = read_unsigned(br)? as usize + 1;
            total_points += num_points;
            if total_points > max_control_points {
                return Err(FrameError::TooManySplines);
            }
            let mut x = read_signed(br)? as i64;
            let mut y = read_signed(br)? as i64;
            let mut control_points = Vec::with_capacity(num_points);
            control_points.push((x, y));
            for _ in 1..num_points {
                x += read_signed(br)? as i64;
                y += read_signed(br)? as i64;
                if x.abs() > MAX_COORDINATE || y.abs() > MAX_COORDINATE {
                    return Err(FrameError::InvalidHeader);
                }
                control_points.push((x, y));
            }
            let mut color = [0.0f32; 3];
            for c in color.iter_mut() {
                *c = read_signed(br)? as f32 / 256.0;
            }
            let sigma = (read_unsigned(br)? + 1) as f32 / 4.0;
            splines.push(Spline {
                control_points,
                color,
                sigma,
            });
        }
        Ok(Self {
            splines,
            segments: Vec::new(),
        })
    }

    /// Samples every spline at unit arc length and applies chroma from luma to
    /// the colors.
    pub fn initialize_draw_cache(
        &mut self,
        xsize: usize,
        ysize: usize,
        cmap: &ColorCorrelationMap,
    ) -> Result<()> {
        self.segments.clear();
        let margin = |sigma: f32| (3.0 * sigma).ceil() as i64;
        for spline in &self.splines {
            let mut color = spline.color;
            color[0] += cmap.y_to_x_dc() * color[1];
            color[2] += cmap.y_to_b_dc() * color[1];
            let m = margin(spline.sigma);
            let mut push = |x: f32, y: f32| -> Result<()> {
                if (x as i64) < -m
                    || (y as i64) < -m
                    || x as i64 > xsize as i64 + m
                    || y as i64 > ysize as i64 + m
                {
                    return Ok(());
                }
                if self.segments.len() >= MAX_DRAW_SAMPLES {
                    return Err(FrameError::TooManySplines);
                }
                self.segments.push(SplineSegment {
                    x,
                    y,
                    sigma: spline.sigma,
                    color,
                });
                Ok(())
            };
            let (fx, fy) = spline.control_points[0];
            push(fx as f32, fy as f32)?;
            for pair in spline.control_points.windows(2) {
                let (x0, y0) = (pair[0].0 as f32, pair[0].1 as f32);
                let (x1, y1) = (pair[1].0 as f32, pair[1].1 as f32);
                let len = ((x1 - x0).powi(2) + (y1 - y0).powi(2)).sqrt();
                let steps = len.ceil().max(1.0) as usize;
                for s in 1..=steps {
                    let t = s as f32 / steps as f32;
                    push(x0 + (x1 - x0) * t, y0 + (y1 - y0) * t)?;
                }
            }
        }
        Ok(())
    }

    /// Adds the cached blobs to the color planes.
    pub fn apply(&self, color: &mut [Plane<f32>]) {
        let single_channel = color.len() == 1;
        for seg in &self.segments {
            let radius = (3.0 * seg.sigma).ceil() as i64;
            let inv_two_sigma_sq = 1.0 / (2.0 * seg.sigma * seg.sigma);
            for (c, plane) in color.iter_mut().enumerate() {
                let (w, h) = (plane.width() as i64, plane.height() as i64);
                let value = if single_channel { seg.color[1] } else { seg.color[c] };
                let cx = seg.x.round() as i64;
                let cy = seg.y.round() as i64;
                for y in (cy - radius).max(0)..(cy + radius + 1).min(h) {
                    for x in (cx - radius).max(0)..(cx + radius + 1).min(w) {
                        let d2 = (x as f32 - seg.x).powi(2) + (y as f32 - seg.y).powi(2);
                        let weight = (-d2 * inv_two_sigma_sq).exp();
                        let (ux, uy) = (x as usize, y as usize);
                        plane.set(ux, uy, plane.get(ux, uy) + value * weight);
                    }
                }
            }
        }
    }
}
