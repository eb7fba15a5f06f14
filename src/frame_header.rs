//! Per-frame header: coding mode, tiling, pass schedule, blending and flags.

use num_enum::TryFromPrimitive;

use crate::bit_reader::{BitReader, U32Dist, U32Enc};
use crate::dimensions::FrameDimensions;
use crate::error::{FrameError, Result};
use crate::metadata::{ImageMetadata, SIZE_ENC};

pub const MAX_NUM_PASSES: usize = 11;
pub const MAX_NUM_REFERENCE_FRAMES: usize = 4;
pub const MAX_DC_LEVEL: u32 = 4;

pub const NUM_PASSES_ENC: U32Enc = U32Enc([
    U32Dist::Val(1),
    U32Dist::Val(2),
    U32Dist::Val(3),
    U32Dist::Bits(3, 4),
]);
pub const NUM_DOWNSAMPLE_ENC: U32Enc = U32Enc([
    U32Dist::Val(0),
    U32Dist::Val(1),
    U32Dist::Val(2),
    U32Dist::Bits(1, 3),
]);
pub const DOWNSAMPLE_ENC: U32Enc = U32Enc([
    U32Dist::Val(1),
    U32Dist::Val(2),
    U32Dist::Val(4),
    U32Dist::Val(8),
]);
pub const LAST_PASS_ENC: U32Enc = U32Enc([
    U32Dist::Val(0),
    U32Dist::Val(1),
    U32Dist::Val(2),
    U32Dist::Bits(3, 0),
]);
pub const UPSAMPLING_ENC: U32Enc = DOWNSAMPLE_ENC;
pub const DC_LEVEL_ENC: U32Enc = U32Enc([
    U32Dist::Val(1),
    U32Dist::Val(2),
    U32Dist::Val(3),
    U32Dist::Val(4),
]);
pub const ORIGIN_ENC: U32Enc = U32Enc([
    U32Dist::Bits(8, 0),
    U32Dist::Bits(11, 256),
    U32Dist::Bits(14, 2304),
    U32Dist::Bits(30, 18688),
]);
pub const BLEND_MODE_ENC: U32Enc = U32Enc([
    U32Dist::Val(0),
    U32Dist::Val(1),
    U32Dist::Val(2),
    U32Dist::Bits(2, 3),
]);
pub const ALPHA_CHANNEL_ENC: U32Enc = U32Enc([
    U32Dist::Val(0),
    U32Dist::Val(1),
    U32Dist::Val(2),
    U32Dist::Bits(3, 3),
]);
pub const DURATION_ENC: U32Enc = U32Enc([
    U32Dist::Val(0),
    U32Dist::Val(1),
    U32Dist::Bits(8, 0),
    U32Dist::Bits(32, 0),
]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, TryFromPrimitive)]
#[repr(u32)]
pub enum FrameType {
    #[default]
    Regular = 0,
    DcFrame = 1,
    ReferenceOnly = 2,
    SkipProgressive = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, TryFromPrimitive)]
#[repr(u32)]
pub enum FrameEncoding {
    #[default]
    VarDct = 0,
    Modular = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorTransform {
    Xyb,
    #[default]
    None,
    YCbCr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, TryFromPrimitive)]
#[repr(u32)]
pub enum BlendMode {
    #[default]
    Replace = 0,
    Add = 1,
    Blend = 2,
    MulAdd = 3,
    Mul = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlendingInfo {
    pub mode: BlendMode,
    pub alpha_channel: usize,
    pub clamp: bool,
    /// Reference slot the frame is blended onto.
    pub source: usize,
}

impl BlendingInfo {
    fn read(br: &mut BitReader, num_extra: usize, cropped: bool) -> Result<Self> {
        let mode = BlendMode::try_from(br.read_u32(&BLEND_MODE_ENC)?)
            .map_err(|_| FrameError::InvalidHeader)?;
        let mut info = BlendingInfo {
            mode,
            ..Default::default()
        };
        if num_extra > 0 && matches!(mode, BlendMode::Blend | BlendMode::MulAdd) {
            info.alpha_channel = br.read_u32(&ALPHA_CHANNEL_ENC)? as usize;
            if info.alpha_channel >= num_extra {
                return Err(FrameError::InvalidHeader);
            }
            info.clamp = br.read_bool()?;
        }
        if mode != BlendMode::Replace || cropped {
            info.source = br.read_bits(2)? as usize;
        }
        Ok(info)
    }
}

/// Per-channel chroma subsampling mode: 0 = 4:4:4, 1 = 4:2:0, 2 = 4:2:2, 3 = 4:4:0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChromaSubsampling {
    pub channel_mode: [u8; 3],
}

const H_SHIFT: [u32; 4] = [0, 1, 1, 0];
const V_SHIFT: [u32; 4] = [0, 1, 0, 1];

impl ChromaSubsampling {
    pub fn is_444(&self) -> bool {
        self.channel_mode.iter().all(|&m| m == 0)
    }

    pub fn raw_h_shift(&self, c: usize) -> u32 {
        H_SHIFT[self.channel_mode[c] as usize]
    }

    pub fn raw_v_shift(&self, c: usize) -> u32 {
        V_SHIFT[self.channel_mode[c] as usize]
    }

    pub fn max_h_shift(&self) -> u32 {
        (0..3).map(|c| self.raw_h_shift(c)).max().unwrap_or(0)
    }

    pub fn max_v_shift(&self) -> u32 {
        (0..3).map(|c| self.raw_v_shift(c)).max().unwrap_or(0)
    }

    pub fn h_shift(&self, c: usize) -> u32 {
        self.max_h_shift() - self.raw_h_shift(c)
    }

    pub fn v_shift(&self, c: usize) -> u32 {
        self.max_v_shift() - self.raw_v_shift(c)
    }
}

/// Progressive pass schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passes {
    pub num_passes: usize,
    /// Left shift applied to the AC coefficients of each pass.
    pub shift: Vec<u32>,
    pub downsample: Vec<u32>,
    pub last_pass: Vec<u32>,
}

impl Default for Passes {
    fn default() -> Self {
        Self {
            num_passes: 1,
            shift: vec![0],
            downsample: Vec::new(),
            last_pass: Vec::new(),
        }
    }
}

impl Passes {
    fn read(br: &mut BitReader) -> Result<Self> {
        let num_passes = br.read_u32(&NUM_PASSES_ENC)? as usize;
        if num_passes > MAX_NUM_PASSES {
            return Err(FrameError::InvalidHeader);
        }
        if num_passes == 1 {
            return Ok(Self::default());
        }
        let num_downsample = br.read_u32(&NUM_DOWNSAMPLE_ENC)? as usize;
        if num_downsample > 4 || num_downsample >= num_passes {
            return Err(FrameError::InvalidHeader);
        }
        let mut shift = Vec::with_capacity(num_passes);
        for _ in 0..num_passes - 1 {
            shift.push(br.read_bits(2)?);
        }
        shift.push(0);
        let mut downsample = Vec::with_capacity(num_downsample);
        for _ in 0..num_downsample {
            let d = br.read_u32(&DOWNSAMPLE_ENC)?;
            if downsample.last().is_some_and(|&prev| d >= prev) {
                return Err(FrameError::InvalidHeader);
            }
            downsample.push(d);
        }
        let mut last_pass = Vec::with_capacity(num_downsample);
        for _ in 0..num_downsample {
            let l = br.read_u32(&LAST_PASS_ENC)?;
            if l as usize >= num_passes || last_pass.last().is_some_and(|&prev| l <= prev) {
                return Err(FrameError::InvalidHeader);
            }
            last_pass.push(l);
        }
        Ok(Self {
            num_passes,
            shift,
            downsample,
            last_pass,
        })
    }

    /// Inclusive range of resolution shifts completed by `pass`.
    ///
    /// A pass whose bracket is empty returns `min_shift > max_shift`.
    pub fn downsampling_bracket(&self, pass: usize) -> (i32, i32) {
        let mut max_shift = 2;
        let mut min_shift = 3;
        let mut i = 0;
        loop {
            for (j, &last) in self.last_pass.iter().enumerate() {
                if i == last as usize {
                    min_shift = match self.downsample[j] {
                        8 => 3,
                        4 => 2,
                        2 => 1,
                        _ => 0,
                    };
                }
            }
            if i == self.num_passes - 1 {
                min_shift = 0;
            }
            if i == pass {
                return (min_shift, max_shift);
            }
            max_shift = min_shift - 1;
            i += 1;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopFilter {
    pub gab: bool,
    pub epf_iters: u32,
    pub epf_sigma_for_modular: f32,
}

impl Default for LoopFilter {
    fn default() -> Self {
        Self {
            gab: true,
            epf_iters: 1,
            epf_sigma_for_modular: 1.0,
        }
    }
}

impl LoopFilter {
    fn read(br: &mut BitReader, encoding: FrameEncoding) -> Result<Self> {
        if br.read_bool()? {
            return Ok(Self::default());
        }
        let gab = br.read_bool()?;
        let epf_iters = br.read_bits(2)?;
        let mut epf_sigma_for_modular = 1.0;
        if epf_iters > 0 && encoding == FrameEncoding::Modular {
            let raw = br.read_bits(8)?;
            if raw == 0 {
                return Err(FrameError::InvalidHeader);
            }
            epf_sigma_for_modular = raw as f32 / 16.0;
        }
        Ok(Self {
            gab,
            epf_iters,
            epf_sigma_for_modular,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameHeader {
    pub frame_type: FrameType,
    pub encoding: FrameEncoding,
    pub flags: u32,
    pub color_transform: ColorTransform,
    pub chroma_subsampling: ChromaSubsampling,
    pub upsampling: u32,
    pub extra_channel_upsampling: Vec<u32>,
    pub group_size_shift: u32,
    pub passes: Passes,
    pub dc_level: u32,
    pub custom_size_or_origin: bool,
    pub frame_origin: (i64, i64),
    pub frame_size: (usize, usize),
    pub blending_info: BlendingInfo,
    pub extra_channel_blending_info: Vec<BlendingInfo>,
    pub duration: u32,
    pub is_last: bool,
    pub save_as_reference: usize,
    pub save_before_color_transform: bool,
    pub loop_filter: LoopFilter,
    /// Not serialized: set by the caller when decoding the preview frame.
    pub is_preview: bool,
}

impl Default for FrameHeader {
    fn default() -> Self {
        Self {
            frame_type: FrameType::Regular,
            encoding: FrameEncoding::VarDct,
            flags: 0,
            color_transform: ColorTransform::None,
            chroma_subsampling: ChromaSubsampling::default(),
            upsampling: 1,
            extra_channel_upsampling: Vec::new(),
            group_size_shift: 1,
            passes: Passes::default(),
            dc_level: 0,
            custom_size_or_origin: false,
            frame_origin: (0, 0),
            frame_size: (0, 0),
            blending_info: BlendingInfo::default(),
            extra_channel_blending_info: Vec::new(),
            duration: 0,
            is_last: true,
            save_as_reference: 0,
            save_before_color_transform: false,
            loop_filter: LoopFilter::default(),
            is_preview: false,
        }
    }
}

fn unpack_signed(v: u32) -> i64 {
    if v & 1 == 0 {
        (v >> 1) as i64
    } else {
        -(((v >> 1) as i64) + 1)
    }
}

impl FrameHeader {
    pub const NOISE: u32 = 1;
    pub const PATCHES: u32 = 2;
    pub const SPLINES: u32 = 16;
    pub const USE_DC_FRAME: u32 = 32;
    pub const SKIP_ADAPTIVE_DC_SMOOTHING: u32 = 128;

    fn defaults_for(metadata: &ImageMetadata) -> Self {
        let num_extra = metadata.num_extra_channels();
        Self {
            color_transform: if metadata.xyb_encoded {
                ColorTransform::Xyb
            } else {
                ColorTransform::None
            },
            extra_channel_upsampling: vec![1; num_extra],
            extra_channel_blending_info: vec![BlendingInfo::default(); num_extra],
            frame_size: (metadata.xsize, metadata.ysize),
            ..Self::default()
        }
    }

    pub fn read(br: &mut BitReader, metadata: &ImageMetadata) -> Result<Self> {
        let mut h = Self::defaults_for(metadata);
        if br.read_bool()? {
            return Ok(h);
        }
        let num_extra = metadata.num_extra_channels();

        h.frame_type =
            FrameType::try_from(br.read_bits(2)?).map_err(|_| FrameError::InvalidHeader)?;
        h.encoding =
            FrameEncoding::try_from(br.read_bits(1)?).map_err(|_| FrameError::InvalidHeader)?;
        h.flags = br.read_bits(8)?;

        if !metadata.xyb_encoded && br.read_bool()? {
            h.color_transform = ColorTransform::YCbCr;
        }
        if h.color_transform == ColorTransform::YCbCr && !h.has(Self::USE_DC_FRAME) {
            for c in 0..3 {
                h.chroma_subsampling.channel_mode[c] = br.read_bits(2)? as u8;
            }
        }
        if !h.has(Self::USE_DC_FRAME) {
            h.upsampling = br.read_u32(&UPSAMPLING_ENC)?;
            for ups in h.extra_channel_upsampling.iter_mut() {
                *ups = br.read_u32(&UPSAMPLING_ENC)?;
            }
        }
        if h.encoding == FrameEncoding::Modular {
            h.group_size_shift = br.read_bits(2)?;
        }
        if h.frame_type != FrameType::ReferenceOnly {
            h.passes = Passes::read(br)?;
        }
        if h.frame_type == FrameType::DcFrame {
            h.dc_level = br.read_u32(&DC_LEVEL_ENC)?;
        }
        if h.frame_type != FrameType::DcFrame {
            h.custom_size_or_origin = br.read_bool()?;
            if h.custom_size_or_origin {
                let x0 = unpack_signed(br.read_u32(&ORIGIN_ENC)?);
                let y0 = unpack_signed(br.read_u32(&ORIGIN_ENC)?);
                h.frame_origin = (x0, y0);
                let xs = br.read_u32(&SIZE_ENC)? as usize;
                let ys = br.read_u32(&SIZE_ENC)? as usize;
                h.frame_size = (xs, ys);
            }
        }
        if matches!(h.frame_type, FrameType::Regular | FrameType::SkipProgressive) {
            let cropped = h.custom_size_or_origin;
            h.blending_info = BlendingInfo::read(br, num_extra, cropped)?;
            for info in h.extra_channel_blending_info.iter_mut() {
                *info = BlendingInfo::read(br, num_extra, cropped)?;
            }
            if metadata.have_animation {
                h.duration = br.read_u32(&DURATION_ENC)?;
            }
            h.is_last = br.read_bool()?;
        } else {
            h.is_last = false;
        }
        if h.frame_type != FrameType::DcFrame && !h.is_last {
            h.save_as_reference = br.read_bits(2)? as usize;
        }
        if h.can_be_referenced() {
            h.save_before_color_transform = br.read_bool()?;
        }
        h.loop_filter = LoopFilter::read(br, h.encoding)?;
        Ok(h)
    }

    /// Header used when the real one is missing but a cached DC frame can stand in.
    pub fn dc_frame_fallback(metadata: &ImageMetadata) -> Self {
        let mut h = Self::defaults_for(metadata);
        h.flags |= Self::USE_DC_FRAME;
        h.encoding = FrameEncoding::VarDct;
        h.dc_level = 0;
        h
    }

    pub fn has(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }

    pub fn can_be_referenced(&self) -> bool {
        !self.is_last
            && self.frame_type != FrameType::DcFrame
            && (self.duration == 0 || self.save_as_reference != 0)
    }

    pub fn group_dim(&self) -> usize {
        match self.encoding {
            FrameEncoding::Modular => 128 << self.group_size_shift,
            FrameEncoding::VarDct => 256,
        }
    }

    pub fn to_frame_dimensions(&self) -> FrameDimensions {
        let (mut xsize, mut ysize) = self.frame_size;
        if self.frame_type == FrameType::DcFrame {
            let shift = 3 * self.dc_level;
            xsize = xsize.div_ceil(1 << shift);
            ysize = ysize.div_ceil(1 << shift);
        }
        FrameDimensions::new(
            xsize,
            ysize,
            self.upsampling as usize,
            self.group_dim(),
            self.encoding == FrameEncoding::VarDct,
        )
    }

    /// True if the frame is composited onto earlier content.
    pub fn has_blending(&self) -> bool {
        self.blending_info.mode != BlendMode::Replace
            || self.custom_size_or_origin
            || self
                .extra_channel_blending_info
                .iter()
                .any(|b| b.mode != BlendMode::Replace)
    }

    /// Whether this frame increments the visible-frame counter.
    pub fn is_visible(&self) -> bool {
        !self.is_preview
            && (self.is_last || self.duration > 0)
            && matches!(self.frame_type, FrameType::Regular | FrameType::SkipProgressive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passes(num_passes: usize, downsample: &[u32], last_pass: &[u32]) -> Passes {
        Passes {
            num_passes,
            shift: vec![0; num_passes],
            downsample: downsample.to_vec(),
            last_pass: last_pass.to_vec(),
        }
    }

    #[test]
    fn test_bracket_single_pass_covers_everything_below_dc() {
        let p = Passes::default();
        assert_eq!(p.downsampling_bracket(0), (0, 2));
    }

    #[test]
    fn test_bracket_with_downsample_schedule() {
        // pass 0 completes 4x, pass 1 completes 2x, pass 2 completes full resolution.
        let p = passes(3, &[4, 2], &[0, 1]);
        assert_eq!(p.downsampling_bracket(0), (2, 2));
        assert_eq!(p.downsampling_bracket(1), (1, 1));
        assert_eq!(p.downsampling_bracket(2), (0, 0));
    }

    #[test]
    fn test_bracket_empty_pass() {
        // Without a downsample schedule every pass before the last adds nothing.
        let p = passes(2, &[], &[]);
        let (lo, hi) = p.downsampling_bracket(0);
        assert!(lo > hi);
        assert_eq!(p.downsampling_bracket(1), (0, 2));
    }

    #[test]
    fn test_chroma_shifts() {
        let cs = ChromaSubsampling {
            channel_mode: [0, 1, 1],
        };
        assert!(!cs.is_444());
        assert_eq!(cs.max_h_shift(), 1);
        assert_eq!(cs.h_shift(0), 1);
        assert_eq!(cs.h_shift(1), 0);
    }

    #[test]
    fn test_all_default_header() {
        let metadata = ImageMetadata {
            xsize: 300,
            ysize: 200,
            ..Default::default()
        };
        let bytes = [1u8];
        let mut br = BitReader::new(&bytes);
        let h = FrameHeader::read(&mut br, &metadata).unwrap();
        assert_eq!(h.encoding, FrameEncoding::VarDct);
        assert!(h.is_last);
        assert_eq!(h.frame_size, (300, 200));
        assert!(!h.can_be_referenced());
    }

    #[test]
    fn test_signed_origin_unpacking() {
        assert_eq!(unpack_signed(0), 0);
        assert_eq!(unpack_signed(1), -1);
        assert_eq!(unpack_signed(4), 2);
    }
}
