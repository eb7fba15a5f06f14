//! Rendering of the current progress and frame finalization.

use tracing::{debug, instrument, warn};

use super::ac::AcGroupRequest;
use super::FrameDecoder;
use crate::error::{FrameError, Result};
use crate::frame_header::FrameType;
use crate::render::RenderContext;

impl<'a> FrameDecoder<'a> {
    /// Renders whatever has been decoded so far into the destination image.
    ///
    /// Groups missing passes are drawn from what they have, with absent
    /// passes treated as zero. Returns `false` when no meaningful image can
    /// be produced yet: blended frames are only drawn once finalized.
    #[instrument(level = "debug", skip_all)]
    pub fn flush(&mut self) -> Result<bool> {
        let header = &self.frame_header;
        if header.has_blending() && !self.progress.is_finalized {
            return Ok(false);
        }
        if header.frame_type == FrameType::SkipProgressive && !self.progress.is_finalized {
            return Ok(true);
        }
        if self.is_jpeg() {
            return Ok(true);
        }
        self.allocate_output();

        let num_passes = self.frame_header.passes.num_passes;
        if self.progress.completely_decoded_ac_pass() < num_passes {
            let dc_only = !self.progress.decoded_ac_global;
            let requests: Vec<Option<AcGroupRequest>> = self
                .progress
                .decoded_passes_per_ac_group
                .iter()
                .map(|&passes| {
                    (passes < num_passes).then(|| AcGroupRequest {
                        readers: Vec::new(),
                        force_draw: true,
                        dc_only,
                    })
                })
                .collect();
            let mut num_drawn = 0;
            for (g, request) in requests.iter().enumerate() {
                if request.is_some() {
                    self.pipeline.clear_done(g);
                    num_drawn += 1;
                }
            }
            debug!(groups = num_drawn, dc_only, "drawing incomplete groups");
            self.process_ac_groups(&requests, FrameError::DrawGroupsFailed, "ForceDrawGroup")?;
        }

        let dim = self.frame_dim;
        let inplace = self.progress.is_finalized;
        if let Some(mut planes) = self.modular.finalize_decoding(inplace, dim.xsize, dim.ysize) {
            let extra = planes.split_off(self.modular.num_color.min(planes.len()));
            if !planes.is_empty() {
                self.pipeline.set_color(0, 0, &planes);
            }
            if !extra.is_empty() {
                self.pipeline.set_extra(0, 0, &extra);
            }
            for g in 0..dim.num_groups {
                self.pipeline.mark_done(g);
            }
        }

        let ctx = RenderContext {
            header: &self.frame_header,
            metadata: &self.dec_state.metadata,
            features: &self.dec_state.shared.features,
            reference_frames: &self.dec_state.reference_frames,
            coalescing: self.coalescing,
        };
        let rendered = self.pipeline.render(&ctx)?;
        let decoded = &mut self.decoded;
        decoded.xsize = rendered.xsize;
        decoded.ysize = rendered.ysize;
        decoded.origin = rendered.origin;
        decoded.color = rendered.color;
        decoded.extra_channels = rendered.extra;
        decoded.is_internal_color = rendered.is_internal_color;
        self.pending_reference = rendered.reference;
        self.pending_dc_frame = rendered.dc_frame;
        self.num_renders += 1;
        debug!(
            renders = self.num_renders,
            xsize = self.decoded.xsize,
            ysize = self.decoded.ysize,
            "rendered frame"
        );
        Ok(true)
    }

    /// Closes the frame: renders it a final time and stores it into the
    /// reference or DC slot it is saved as. Must be called exactly once.
    #[instrument(level = "debug", skip_all)]
    pub fn finalize_frame(&mut self) -> Result<()> {
        if self.progress.is_finalized {
            return Err(FrameError::FinalizedTwice);
        }
        self.progress.is_finalized = true;
        if self.is_jpeg() {
            return Ok(());
        }
        if !self.progress.finalized_dc {
            // The filter needs per-block strengths from every DC group.
            self.frame_header.loop_filter.epf_iters = 0;
        }
        if !self.progress.has_everything() && !self.allow_partial_frames {
            return Err(FrameError::NotFullyDecoded);
        }
        if !self.progress.has_everything() {
            warn!(
                dc_groups_missing = self
                    .progress
                    .decoded_dc_groups
                    .iter()
                    .filter(|&&d| !d)
                    .count(),
                passes = self.progress.completely_decoded_ac_pass(),
                "finalizing a partially decoded frame"
            );
        }
        if !self.progress.finalized_dc {
            self.allocate_output();
        }
        self.flush()?;

        let header = &self.frame_header;
        if header.can_be_referenced() {
            if let Some(reference) = self.pending_reference.take() {
                debug!(slot = header.save_as_reference, "saving reference frame");
                self.dec_state.reference_frames[header.save_as_reference] = Some(reference);
            }
        }
        if header.frame_type == FrameType::DcFrame && header.dc_level > 0 {
            if let Some(planes) = self.pending_dc_frame.take() {
                debug!(dc_level = header.dc_level, "saving DC frame");
                self.dec_state.dc_frames[header.dc_level as usize - 1] = Some(planes);
            }
        }
        Ok(())
    }
}
