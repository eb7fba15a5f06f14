//! DC phase: global DC side information, DC groups and DC finalization.

use tracing::{debug, trace};

use super::FrameDecoder;
use crate::bit_reader::BitReader;
use crate::decoder_state::SharedState;
use crate::error::{FrameError, Result};
use crate::features::ImageFeatures;
use crate::features::noise::NoiseParams;
use crate::features::patches::PatchesDictionary;
use crate::features::splines::Splines;
use crate::frame_header::FrameHeader;
use crate::image::Plane;
use crate::loop_filter::{EPF_MODULAR_SIGMA_SCALE, vardct_sigma};
use crate::modular::ModularUpdate;
use crate::parallel::reduce_task_results;
use crate::vardct::block_context::BlockCtxMap;
use crate::vardct::color_correlation::ColorCorrelationMap;
use crate::vardct::dc::{AcMetadata, DcGroupData, decode_ac_metadata, decode_dc_group};
use crate::vardct::quantizer::{DequantMatrices, Quantizer};

/// What a DC group task hands back to the scheduler.
pub(super) struct DcGroupOutput {
    pub group: usize,
    pub vardct: Option<DcGroupData>,
    pub modular: ModularUpdate,
    pub ac_metadata: Option<AcMetadata>,
    /// Reader position after the group, for the implicit single section.
    pub bits_consumed: usize,
}

/// Result of one group task.
pub(super) enum TaskOutcome<T> {
    /// Nothing submitted for this group.
    Idle,
    /// Ran out of data while partial frames are allowed.
    Incomplete,
    Decoded(T),
}

impl<'a> FrameDecoder<'a> {
    /// Decodes the DC-global section. Everything is committed at once, so a
    /// truncated section leaves the previous state untouched.
    pub(super) fn process_dc_global(&mut self, br: &mut BitReader) -> Result<()> {
        let header = &self.frame_header;
        let dim = &self.frame_dim;
        let num_extra = self.dec_state.metadata.num_extra_channels();
        let mut features = ImageFeatures::default();

        if header.has(FrameHeader::PATCHES) {
            let (patches, uses_extra_channels) = PatchesDictionary::decode(
                br,
                dim.xsize,
                dim.ysize,
                num_extra,
                &self.dec_state.reference_frames,
            )?;
            if uses_extra_channels
                && header.upsampling != 1
                && header
                    .extra_channel_upsampling
                    .iter()
                    .any(|&ups| ups != header.upsampling)
            {
                return Err(FrameError::PatchesUpsamplingMismatch);
            }
            features.patches = patches;
        }
        if header.has(FrameHeader::SPLINES) {
            features.splines = Splines::decode(br, dim.xsize * dim.ysize)?;
        }
        if header.has(FrameHeader::NOISE) {
            features.noise = Some(NoiseParams::decode(br)?);
        }

        let mut shared = SharedState {
            matrices: DequantMatrices::default(),
            quantizer: Quantizer::default(),
            block_ctx_map: BlockCtxMap::default(),
            cmap: ColorCorrelationMap::default(),
            features: ImageFeatures::default(),
        };
        if !self.allow_partial_dc_global || br.bits_remaining() > 0 {
            shared.matrices.decode_dc(br)?;
            if self.is_vardct() {
                shared.quantizer = Quantizer::decode(br)?;
                shared.block_ctx_map = BlockCtxMap::decode(br)?;
                shared.cmap = ColorCorrelationMap::decode_dc(br)?;
            }
        }
        if header.has(FrameHeader::SPLINES) {
            features
                .splines
                .initialize_draw_cache(dim.xsize, dim.ysize, &shared.cmap)?;
        }
        let mut modular = self.modular.clone();
        modular.decode_global_info(br)?;

        shared.features = features;
        self.dec_state.shared = shared;
        self.modular = modular;
        self.progress.decoded_dc_global = true;
        debug!(
            patches = self.dec_state.shared.features.patches.positions.len(),
            splines = self.dec_state.shared.features.splines.splines.len(),
            noise = self.dec_state.shared.features.noise.is_some(),
            full_image = self.modular.is_full_image(),
            "decoded DC global"
        );
        Ok(())
    }

    fn decode_dc_group_task(&self, g: usize, br: &mut BitReader) -> Result<DcGroupOutput> {
        let header = &self.frame_header;
        let rect = self.frame_dim.dc_group_rect(g);
        let block_rect = self.frame_dim.dc_group_block_rect(g);
        let shared = &self.dec_state.shared;
        let is_vardct = self.is_vardct();

        let vardct = if is_vardct && !header.has(FrameHeader::USE_DC_FRAME) {
            Some(decode_dc_group(
                br,
                block_rect,
                &shared.quantizer,
                &shared.matrices,
                &shared.cmap,
            )?)
        } else {
            None
        };
        let modular = self.modular.decode_dc_group(br, rect)?;
        let ac_metadata = if is_vardct {
            Some(decode_ac_metadata(br, block_rect)?)
        } else {
            None
        };
        Ok(DcGroupOutput {
            group: g,
            vardct,
            modular,
            ac_metadata,
            bits_consumed: br.total_bits_consumed(),
        })
    }

    /// Runs the submitted DC groups in parallel, one optional reader per group.
    pub(super) fn process_dc_groups(
        &mut self,
        readers: &[Option<BitReader>],
    ) -> Result<Vec<TaskOutcome<usize>>> {
        let allow_partial = self.allow_partial_frames;
        let this = &*self;
        let (_, results) = self.pool.run(
            readers.len(),
            |_| Ok(()),
            |_, g, _thread| {
                let Some(br) = &readers[g] else {
                    return Ok(TaskOutcome::Idle);
                };
                if this.progress.decoded_dc_groups[g] {
                    return Ok(TaskOutcome::Idle);
                }
                let mut br = br.clone();
                match this.decode_dc_group_task(g, &mut br) {
                    Ok(out) => Ok(TaskOutcome::Decoded(out)),
                    Err(e) if allow_partial && !e.is_fatal() => Ok(TaskOutcome::Incomplete),
                    Err(e) => Err(e),
                }
            },
            "DecodeDCGroup",
        )?;
        let outcomes = reduce_task_results(results, FrameError::DcGroupFailed)?;

        let mut summary = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            summary.push(match outcome {
                TaskOutcome::Idle => TaskOutcome::Idle,
                TaskOutcome::Incomplete => TaskOutcome::Incomplete,
                TaskOutcome::Decoded(out) => {
                    let bits = out.bits_consumed;
                    self.merge_dc_group(out)?;
                    TaskOutcome::Decoded(bits)
                }
            });
        }
        Ok(summary)
    }

    fn merge_dc_group(&mut self, out: DcGroupOutput) -> Result<()> {
        let g = out.group;
        if let Some(data) = &out.vardct {
            self.vardct.store_dc_group(data);
        }
        self.modular.apply(&out.modular);
        let lf = self.frame_header.loop_filter;
        if let Some(meta) = &out.ac_metadata {
            self.vardct.store_ac_metadata(meta);
            if lf.epf_iters > 0 {
                let inv_global_scale = self.dec_state.shared.quantizer.inv_global_scale();
                let r = meta.block_rect;
                let mut sigma = Plane::new(r.xsize, r.ysize);
                for (s, &qf) in sigma.data_mut().iter_mut().zip(meta.quant_field.data()) {
                    *s = vardct_sigma(inv_global_scale, qf);
                }
                self.pipeline.set_sigma(r, &sigma);
            }
        } else if lf.epf_iters > 0 {
            let sigma = lf.epf_sigma_for_modular * EPF_MODULAR_SIGMA_SCALE;
            self.pipeline
                .fill_sigma(self.frame_dim.dc_group_block_rect(g), sigma);
        }
        self.progress.decoded_dc_groups[g] = true;
        trace!(group = g, "decoded DC group");
        Ok(())
    }

    /// Adaptive DC smoothing, once, after every DC group is in.
    pub(super) fn finalize_dc(&mut self) {
        let header = &self.frame_header;
        if self.is_vardct()
            && !header.has(FrameHeader::SKIP_ADAPTIVE_DC_SMOOTHING)
            && !header.has(FrameHeader::USE_DC_FRAME)
        {
            let shared = &self.dec_state.shared;
            self.vardct.smooth_dc(&shared.matrices, &shared.quantizer);
        }
        self.progress.finalized_dc = true;
        debug!("DC finalized");
    }
}
