//! Planar image buffers and the decoded frame container.

/// An axis-aligned rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x0: usize,
    pub y0: usize,
    pub xsize: usize,
    pub ysize: usize,
}

impl Rect {
    pub fn new(x0: usize, y0: usize, xsize: usize, ysize: usize) -> Self {
        Self { x0, y0, xsize, ysize }
    }

    /// Builds a rect clipped so that it does not extend past `(xend, yend)`.
    pub fn clipped(x0: usize, y0: usize, xsize: usize, ysize: usize, xend: usize, yend: usize) -> Self {
        let xsize = xsize.min(xend.saturating_sub(x0));
        let ysize = ysize.min(yend.saturating_sub(y0));
        Self { x0, y0, xsize, ysize }
    }

    pub fn x1(&self) -> usize {
        self.x0 + self.xsize
    }

    pub fn y1(&self) -> usize {
        self.y0 + self.ysize
    }

    pub fn is_empty(&self) -> bool {
        self.xsize == 0 || self.ysize == 0
    }

    pub fn area(&self) -> usize {
        self.xsize * self.ysize
    }

    pub fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.x0 && x < self.x1() && y >= self.y0 && y < self.y1()
    }
}

/// A single channel stored row-major without padding.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Plane<T> {
    width: usize,
    height: usize,
    data: Vec<T>,
}

impl<T: Copy + Default> Plane<T> {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![T::default(); width * height],
        }
    }

    pub fn filled(width: usize, height: usize, value: T) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, x: usize, y: usize) -> T {
        self.data[y * self.width + x]
    }

    pub fn set(&mut self, x: usize, y: usize, v: T) {
        self.data[y * self.width + x] = v;
    }

    pub fn row(&self, y: usize) -> &[T] {
        &self.data[y * self.width..(y + 1) * self.width]
    }

    pub fn row_mut(&mut self, y: usize) -> &mut [T] {
        &mut self.data[y * self.width..(y + 1) * self.width]
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn fill(&mut self, value: T) {
        self.data.iter_mut().for_each(|v| *v = value);
    }

    /// Copies `rect` of this plane into a new plane.
    pub fn crop(&self, rect: Rect) -> Plane<T> {
        let mut out = Plane::new(rect.xsize, rect.ysize);
        for y in 0..rect.ysize {
            out.row_mut(y)
                .copy_from_slice(&self.row(rect.y0 + y)[rect.x0..rect.x1()]);
        }
        out
    }

    /// Writes `src` into this plane with its top-left corner at `(x0, y0)`,
    /// clipping whatever falls outside.
    pub fn paste(&mut self, src: &Plane<T>, x0: usize, y0: usize) {
        let w = src.width.min(self.width.saturating_sub(x0));
        let h = src.height.min(self.height.saturating_sub(y0));
        for y in 0..h {
            self.row_mut(y0 + y)[x0..x0 + w].copy_from_slice(&src.row(y)[..w]);
        }
    }
}

/// Coefficients of a legacy JPEG component, kept for lossless transcoding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JpegComponent {
    pub quant_idx: usize,
    pub width_in_blocks: usize,
    pub height_in_blocks: usize,
    pub h_samp_factor: u8,
    pub v_samp_factor: u8,
    /// Quantized coefficients in natural order, 64 per block.
    pub coeffs: Vec<i16>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JpegQuantTable {
    pub values: [i32; 64],
}

impl Default for JpegQuantTable {
    fn default() -> Self {
        Self { values: [0; 64] }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JpegData {
    pub width: usize,
    pub height: usize,
    pub components: Vec<JpegComponent>,
    pub quant: Vec<JpegQuantTable>,
}

/// Destination of a decoded frame.
#[derive(Debug, Clone, Default)]
pub struct ImageBundle {
    pub xsize: usize,
    pub ysize: usize,
    /// Color planes, nominal range [0, 1]. Gray images carry one plane.
    pub color: Vec<Plane<f32>>,
    pub extra_channels: Vec<Plane<f32>>,
    pub origin: (i64, i64),
    pub duration: u32,
    /// Set when the frame was kept in XYB / YCbCr rather than converted.
    pub is_internal_color: bool,
    pub jpeg_data: Option<JpegData>,
    pub decoded_bytes: usize,
}

impl ImageBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// A destination that receives quantized JPEG coefficients instead of pixels.
    pub fn for_jpeg(jpeg_data: JpegData) -> Self {
        Self {
            jpeg_data: Some(jpeg_data),
            ..Self::default()
        }
    }

    pub fn is_jpeg(&self) -> bool {
        self.jpeg_data.is_some()
    }

    pub fn remove_color(&mut self) {
        self.color.clear();
        self.xsize = 0;
        self.ysize = 0;
    }

    pub fn clear_extra_channels(&mut self) {
        self.extra_channels.clear();
    }

    /// Interleaved 8-bit samples, clamped.
    pub fn to_u8_interleaved(&self) -> Vec<u8> {
        let channels = self.color.len();
        let mut out = Vec::with_capacity(self.xsize * self.ysize * channels);
        for y in 0..self.ysize {
            for x in 0..self.xsize {
                for plane in &self.color {
                    let v = plane.get(x, y);
                    out.push((v * 255.0).round().clamp(0.0, 255.0) as u8);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clipped_rect() {
        let r = Rect::clipped(192, 64, 128, 128, 256, 100);
        assert_eq!(r, Rect::new(192, 64, 64, 36));
        assert!(Rect::clipped(300, 0, 128, 128, 256, 100).is_empty());
    }

    #[test]
    fn test_crop_and_paste() {
        let mut p = Plane::<i32>::new(4, 4);
        for y in 0..4 {
            for x in 0..4 {
                p.set(x, y, (y * 4 + x) as i32);
            }
        }
        let c = p.crop(Rect::new(1, 2, 2, 2));
        assert_eq!(c.data(), &[9, 10, 13, 14]);

        let mut dst = Plane::<i32>::new(3, 3);
        dst.paste(&c, 2, 2);
        assert_eq!(dst.get(2, 2), 9);
        assert_eq!(dst.get(1, 1), 0);
    }
}
