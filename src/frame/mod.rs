//! Frame decoder: owns the per-frame state and drives the section scheduler.
//!
//! A decoder is initialized once per frame with [`FrameDecoder::init_frame`],
//! receives sections through [`FrameDecoder::process_sections`] over one or
//! more calls, and is closed by exactly one [`FrameDecoder::finalize_frame`].

mod ac;
mod dc;
mod finalize;
pub mod progress;
mod scheduler;
pub mod section;

use std::sync::Mutex;

use tracing::debug;

use crate::bit_reader::BitReader;
use crate::decoder_state::{DecoderState, ReferenceFrame};
use crate::dimensions::{FrameDimensions, SizeConstraints, verify_dimensions};
use crate::error::{FrameError, Result};
use crate::frame_header::{BlendMode, FrameEncoding, FrameHeader, FrameType};
use crate::image::{ImageBundle, Plane};
use crate::modular::ModularFrame;
use crate::parallel::ThreadPool;
use crate::render::RenderPipeline;
use crate::toc::{Toc, read_toc};
use crate::vardct::{VarDctFrame, jpeg_order};
use progress::ProgressState;
use section::SectionLayout;

pub use section::{SectionInfo, SectionKind, SectionStatus};

/// Coefficient scratch buffers, one per worker or per task, whichever is fewer.
#[derive(Debug, Default)]
pub(crate) struct GroupScratch {
    slots: Vec<Mutex<Vec<i32>>>,
    use_task_id: bool,
}

impl GroupScratch {
    pub(crate) fn prepare(&mut self, num_threads: usize, num_tasks: usize) {
        let wanted = num_threads.min(num_tasks).max(1);
        if self.slots.len() < wanted {
            self.slots.resize_with(wanted, || Mutex::new(Vec::new()));
        }
        self.use_task_id = num_threads > num_tasks;
    }

    pub(crate) fn location(&self, thread: usize, task: usize) -> usize {
        if self.use_task_id { task } else { thread }
    }

    pub(crate) fn slot(&self, thread: usize, task: usize) -> Result<&Mutex<Vec<i32>>> {
        self.slots
            .get(self.location(thread, task))
            .ok_or(FrameError::InvalidOperation)
    }
}

pub struct FrameDecoder<'a> {
    dec_state: &'a mut DecoderState,
    pool: &'a ThreadPool,
    frame_header: FrameHeader,
    frame_dim: FrameDimensions,
    layout: SectionLayout,
    toc: Toc,
    progress: ProgressState,
    vardct: VarDctFrame,
    modular: ModularFrame,
    pipeline: RenderPipeline,
    decoded: ImageBundle,
    scratch: GroupScratch,
    constraints: SizeConstraints,
    allow_partial_frames: bool,
    allow_partial_dc_global: bool,
    pause_at_progressive: bool,
    coalescing: bool,
    allocated: bool,
    num_renders: usize,
    /// Captured by the last render, moved into its slot on finalization.
    pending_reference: Option<ReferenceFrame>,
    pending_dc_frame: Option<Vec<Plane<f32>>>,
}

impl<'a> FrameDecoder<'a> {
    pub fn new(dec_state: &'a mut DecoderState, pool: &'a ThreadPool) -> Self {
        Self {
            dec_state,
            pool,
            frame_header: FrameHeader::default(),
            frame_dim: FrameDimensions::default(),
            layout: SectionLayout::default(),
            toc: Toc::default(),
            progress: ProgressState::finalized(),
            vardct: VarDctFrame::default(),
            modular: ModularFrame::default(),
            pipeline: RenderPipeline::default(),
            decoded: ImageBundle::new(),
            scratch: GroupScratch::default(),
            constraints: SizeConstraints::default(),
            allow_partial_frames: false,
            allow_partial_dc_global: false,
            pause_at_progressive: false,
            coalescing: true,
            allocated: false,
            num_renders: 0,
            pending_reference: None,
            pending_dc_frame: None,
        }
    }

    pub fn set_size_constraints(&mut self, constraints: SizeConstraints) {
        self.constraints = constraints;
    }

    pub fn set_pause_at_progressive(&mut self, pause: bool) {
        self.pause_at_progressive = pause;
    }

    pub fn set_coalescing(&mut self, coalescing: bool) {
        self.coalescing = coalescing;
    }

    /// Caps the passes decoded per group; later passes are ignored.
    pub fn set_max_passes(&mut self, max_passes: usize) {
        self.progress.max_passes = max_passes.min(self.frame_header.passes.num_passes);
    }

    /// Reads the frame header and TOC and prepares the per-frame state.
    ///
    /// With `allow_partial_frames`, a missing header falls back to the cached
    /// DC frame and a truncated TOC is tolerated. Without `output_needed` only
    /// the header and TOC are read.
    pub fn init_frame(
        &mut self,
        br: &mut BitReader,
        decoded: ImageBundle,
        is_preview: bool,
        allow_partial_frames: bool,
        allow_partial_dc_global: bool,
        output_needed: bool,
    ) -> Result<()> {
        if !self.progress.is_finalized {
            return Err(FrameError::InvalidOperation);
        }
        self.decoded = decoded;
        self.allow_partial_frames = allow_partial_frames;
        self.allow_partial_dc_global = allow_partial_dc_global;
        self.dec_state.reset_frame_state();

        let metadata = &self.dec_state.metadata;
        let mut header = match FrameHeader::read(br, metadata) {
            Ok(h) => h,
            Err(e)
                if allow_partial_frames
                    && !e.is_fatal()
                    && self.dec_state.dc_frames[0].is_some() =>
            {
                debug!("frame header missing, falling back to the cached DC frame");
                FrameHeader::dc_frame_fallback(metadata)
            }
            Err(e) => return Err(e),
        };
        header.is_preview = is_preview;
        let dim = header.to_frame_dimensions();
        verify_dimensions(&self.constraints, dim.xsize, dim.ysize)?;

        self.decoded.remove_color();
        self.decoded.clear_extra_channels();
        self.decoded.duration = header.duration;
        self.dec_state.update_frame_indices(&header);

        let layout = SectionLayout::new(dim.num_groups, dim.num_dc_groups, header.passes.num_passes);
        self.toc = match read_toc(layout.num_sections(), br) {
            Ok(toc) => toc,
            Err(e) if allow_partial_frames && !e.is_fatal() => Toc::default(),
            Err(e) => return Err(e),
        };

        let is_vardct = header.encoding == FrameEncoding::VarDct;
        if is_vardct
            && !header.chroma_subsampling.is_444()
            && !header.has(FrameHeader::SKIP_ADAPTIVE_DC_SMOOTHING)
        {
            return Err(FrameError::IncompatibleSubsampling);
        }
        debug!(
            frame_type = ?header.frame_type,
            encoding = ?header.encoding,
            xsize = dim.xsize,
            ysize = dim.ysize,
            num_groups = dim.num_groups,
            num_dc_groups = dim.num_dc_groups,
            num_passes = header.passes.num_passes,
            "frame initialized"
        );
        self.frame_header = header;
        self.frame_dim = dim;
        self.layout = layout;
        if !output_needed {
            return Ok(());
        }
        self.init_frame_state()
    }

    fn init_frame_state(&mut self) -> Result<()> {
        let header = &self.frame_header;
        let dim = &self.frame_dim;
        let metadata = &self.dec_state.metadata;
        let is_vardct = header.encoding == FrameEncoding::VarDct;
        // Any subsampled VarDCT frame stops here, including the ones that
        // passed the adaptive smoothing check in `init_frame`.
        if is_vardct && !header.chroma_subsampling.is_444() {
            return Err(FrameError::Unsupported);
        }

        self.modular = ModularFrame::new(header, metadata, dim)?;
        self.vardct = if is_vardct {
            VarDctFrame::new(dim)
        } else {
            VarDctFrame::default()
        };
        if is_vardct && header.has(FrameHeader::USE_DC_FRAME) {
            let planes = self
                .dec_state
                .dc_frames
                .get(header.dc_level as usize)
                .and_then(|f| f.as_ref())
                .ok_or(FrameError::MissingReference)?;
            self.vardct.load_dc_frame(planes)?;
        }
        let num_color = if is_vardct { 3 } else { self.modular.num_color };
        self.pipeline = RenderPipeline::new(
            *dim,
            num_color,
            metadata.num_extra_channels(),
            header.has(FrameHeader::NOISE),
        );

        if let Some(jpeg) = self.decoded.jpeg_data.as_mut() {
            if !is_vardct {
                return Err(FrameError::Unsupported);
            }
            let num_components = jpeg.components.len();
            if num_components != 1 && num_components != 3 {
                return Err(FrameError::InvalidArgument);
            }
            if metadata.xyb_encoded {
                return Err(FrameError::Unsupported);
            }
            let c_map = jpeg_order(true, num_components == 1);
            jpeg.width = dim.xsize;
            jpeg.height = dim.ysize;
            let cs = &header.chroma_subsampling;
            for c in 0..num_components {
                let component = &mut jpeg.components[c_map[c]];
                component.width_in_blocks = dim.xsize_blocks >> cs.h_shift(c);
                component.height_in_blocks = dim.ysize_blocks >> cs.v_shift(c);
                component.h_samp_factor = 1 << cs.raw_h_shift(c);
                component.v_samp_factor = 1 << cs.raw_v_shift(c);
                component.coeffs =
                    vec![0; component.width_in_blocks * component.height_in_blocks * 64];
            }
        }

        let max_passes = self.frame_header.passes.num_passes;
        self.progress = ProgressState::new(&self.layout);
        self.progress.max_passes = max_passes;
        self.allocated = false;
        self.num_renders = 0;
        self.pending_reference = None;
        self.pending_dc_frame = None;
        Ok(())
    }

    pub fn frame_header(&self) -> &FrameHeader {
        &self.frame_header
    }

    pub fn frame_dimensions(&self) -> &FrameDimensions {
        &self.frame_dim
    }

    pub fn progress(&self) -> &ProgressState {
        &self.progress
    }

    pub fn num_sections(&self) -> usize {
        self.toc.len()
    }

    /// Section offsets relative to the end of the TOC.
    pub fn section_offsets(&self) -> &[u64] {
        &self.toc.offsets
    }

    pub fn section_sizes(&self) -> &[u32] {
        &self.toc.sizes
    }

    pub fn section_layout(&self) -> &SectionLayout {
        &self.layout
    }

    pub fn num_renders(&self) -> usize {
        self.num_renders
    }

    pub fn is_finalized(&self) -> bool {
        self.progress.is_finalized
    }

    /// The destination image as last rendered.
    pub fn decoded(&self) -> &ImageBundle {
        &self.decoded
    }

    pub fn take_decoded(&mut self) -> ImageBundle {
        std::mem::take(&mut self.decoded)
    }

    pub fn state(&self) -> &DecoderState {
        self.dec_state
    }

    pub fn has_everything(&self) -> bool {
        self.progress.has_everything()
    }

    /// Bitmask of the slots this frame reads: bits 0..3 for reference frames,
    /// bits 4..7 for DC levels. Zero once finalized or while incomplete.
    pub fn references(&self) -> u32 {
        if self.progress.is_finalized || !self.has_everything() {
            return 0;
        }
        let header = &self.frame_header;
        let mut result = 0u32;
        if matches!(header.frame_type, FrameType::Regular | FrameType::SkipProgressive) {
            let cropped = header.custom_size_or_origin;
            let infos = std::iter::once(&header.blending_info).chain(&header.extra_channel_blending_info);
            for info in infos {
                if cropped || info.mode != BlendMode::Replace {
                    result |= 1 << info.source;
                }
            }
        }
        if header.has(FrameHeader::PATCHES) {
            result |= self.dec_state.shared.features.patches.get_references();
        }
        if header.has(FrameHeader::USE_DC_FRAME) {
            result |= 16 << header.dc_level;
        }
        result
    }

    /// Bitmask of the slot a frame with `header` fills, in the layout of
    /// [`FrameDecoder::references`].
    pub fn saved_as(header: &FrameHeader) -> u32 {
        if header.frame_type == FrameType::DcFrame {
            16 << header.dc_level.saturating_sub(1)
        } else if header.can_be_referenced() {
            1 << header.save_as_reference
        } else {
            0
        }
    }

    fn is_jpeg(&self) -> bool {
        self.decoded.is_jpeg()
    }

    fn is_vardct(&self) -> bool {
        self.frame_header.encoding == FrameEncoding::VarDct
    }

    fn allocate_output(&mut self) {
        if self.allocated {
            return;
        }
        self.decoded.xsize = self.frame_dim.xsize_upsampled;
        self.decoded.ysize = self.frame_dim.ysize_upsampled;
        self.decoded.origin = self.frame_header.frame_origin;
        self.allocated = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_indexing() {
        let mut scratch = GroupScratch::default();
        scratch.prepare(8, 3);
        assert_eq!(scratch.slots.len(), 3);
        assert_eq!(scratch.location(5, 2), 2);
        scratch.prepare(2, 10);
        assert_eq!(scratch.slots.len(), 3);
        assert_eq!(scratch.location(1, 9), 1);
        assert!(scratch.slot(1, 9).is_ok());
    }

    #[test]
    fn test_saved_as() {
        let dc = FrameHeader {
            frame_type: FrameType::DcFrame,
            dc_level: 2,
            is_last: false,
            ..Default::default()
        };
        assert_eq!(FrameDecoder::saved_as(&dc), 32);
        let reference = FrameHeader {
            is_last: false,
            save_as_reference: 3,
            ..Default::default()
        };
        assert_eq!(FrameDecoder::saved_as(&reference), 8);
        assert_eq!(FrameDecoder::saved_as(&FrameHeader::default()), 0);
    }
}
