//! State kept by a decoding session across frames.

use tracing::trace;

use crate::features::ImageFeatures;
use crate::frame_header::{FrameHeader, MAX_DC_LEVEL, MAX_NUM_REFERENCE_FRAMES};
use crate::image::Plane;
use crate::metadata::ImageMetadata;
use crate::vardct::block_context::BlockCtxMap;
use crate::vardct::color_correlation::ColorCorrelationMap;
use crate::vardct::quantizer::{DequantMatrices, Quantizer};

/// A decoded frame kept for later frames to blend from or copy patches out of.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceFrame {
    pub color: Vec<Plane<f32>>,
    pub extra: Vec<Plane<f32>>,
    /// Stored in the frame's internal color space rather than the output one.
    pub saved_before_color_transform: bool,
}

impl ReferenceFrame {
    pub fn xsize(&self) -> usize {
        self.color.first().map_or(0, |p| p.width())
    }

    pub fn ysize(&self) -> usize {
        self.color.first().map_or(0, |p| p.height())
    }
}

/// Per-frame side information decoded by the global sections.
#[derive(Debug, Clone, Default)]
pub struct SharedState {
    pub matrices: DequantMatrices,
    pub quantizer: Quantizer,
    pub block_ctx_map: BlockCtxMap,
    pub cmap: ColorCorrelationMap,
    pub features: ImageFeatures,
}

#[derive(Debug, Clone, Default)]
pub struct DecoderState {
    pub metadata: ImageMetadata,
    pub reference_frames: [Option<ReferenceFrame>; MAX_NUM_REFERENCE_FRAMES],
    /// Internal-space planes of DC frames, by level minus one.
    pub dc_frames: [Option<Vec<Plane<f32>>>; MAX_DC_LEVEL as usize],
    pub visible_frame_index: usize,
    pub nonvisible_frame_index: usize,
    pub shared: SharedState,
}

impl DecoderState {
    pub fn new(metadata: ImageMetadata) -> Self {
        Self {
            metadata,
            ..Default::default()
        }
    }

    /// Forgets the side information of the previous frame.
    pub fn reset_frame_state(&mut self) {
        self.shared = SharedState::default();
    }

    /// Noise seeds depend on these counters, so every frame updates them.
    pub fn update_frame_indices(&mut self, header: &FrameHeader) {
        if header.is_visible() {
            self.visible_frame_index += 1;
            self.nonvisible_frame_index = 0;
        } else {
            self.nonvisible_frame_index += 1;
        }
        trace!(
            visible = self.visible_frame_index,
            nonvisible = self.nonvisible_frame_index,
            "frame indices"
        );
    }
}
