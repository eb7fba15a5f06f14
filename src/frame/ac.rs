//! AC phase: global AC side information and the per-group pass decoding.

use tracing::{debug, trace};

use super::dc::TaskOutcome;
use super::{FrameDecoder, GroupScratch};
use crate::bit_reader::BitReader;
use crate::error::{FrameError, Result};
use crate::features::noise::random_3_planes;
use crate::frame_header::{ColorTransform, FrameHeader};
use crate::image::{Plane, Rect};
use crate::modular::ModularUpdate;
use crate::parallel::reduce_task_results;
use crate::vardct::coefficients::{CoefficientStorage, use_16_bit_coefficients};
use crate::vardct::dct::{BLOCK_DIM, BLOCK_SIZE};
use crate::vardct::group::{
    AcGlobalInfo, Dequantizer, decode_group_pass, group_coefficient_len, jpeg_group_blocks,
    render_group,
};
use crate::vardct::jpeg_order;

/// Work for one AC group: a reader per new pass, and whether the passes
/// after them are drawn as placeholders.
#[derive(Debug, Clone, Default)]
pub(super) struct AcGroupRequest<'r> {
    pub readers: Vec<BitReader<'r>>,
    pub force_draw: bool,
    /// AC-global is missing, so only DC can be drawn.
    pub dc_only: bool,
}

/// Planes whose top-left pixel sits at `(x0, y0)`.
type Placed<P> = (usize, usize, P);

struct AcGroupOutput {
    group: usize,
    new_passes: usize,
    color: Option<Placed<Vec<Plane<f32>>>>,
    extra: Option<Placed<Vec<Plane<f32>>>>,
    noise: Vec<Placed<[Plane<f32>; 3]>>,
    modular: Option<ModularUpdate>,
    jpeg: Option<[Vec<[i16; BLOCK_SIZE]>; 3]>,
    /// The group's pixels are final for the render pipeline.
    done: bool,
}

impl<'a> FrameDecoder<'a> {
    pub(super) fn process_ac_global(&mut self, br: &mut BitReader) -> Result<()> {
        if !self.progress.finalized_dc {
            return Err(FrameError::InvalidOperation);
        }
        if self.is_vardct() {
            let num_passes = self.frame_header.passes.num_passes;
            let dim = &self.frame_dim;
            let mut matrices = self.dec_state.shared.matrices.clone();
            matrices.decode(br)?;
            let info = AcGlobalInfo::decode(
                br,
                dim.num_groups,
                num_passes,
                &self.dec_state.shared.block_ctx_map,
            )?;
            let use_16_bit = use_16_bit_coefficients(info.max_num_bits_ac(), num_passes, self.is_jpeg());
            let store = num_passes > 1;
            self.vardct.coefficients = CoefficientStorage::new(
                use_16_bit,
                store,
                dim.num_groups,
                group_coefficient_len(dim.group_dim),
            );
            debug!(
                num_histograms = info.num_histograms,
                max_num_bits_ac = info.max_num_bits_ac(),
                use_16_bit,
                store,
                "decoded AC global"
            );
            self.vardct.ac_global = info;
            self.dec_state.shared.matrices = matrices;
        }
        if self.is_jpeg() {
            self.set_jpeg_quant_tables()?;
        }
        self.progress.decoded_ac_global = true;
        Ok(())
    }

    /// Copies the raw quantization table into the JPEG quant slots the
    /// components use. Unused slots repeat the previous one; slot 0 must be used.
    fn set_jpeg_quant_tables(&mut self) -> Result<()> {
        let table = self
            .dec_state
            .shared
            .matrices
            .jpeg_table()
            .ok_or(FrameError::InvalidQuantTable)?;
        let is_ycbcr = self.frame_header.color_transform == ColorTransform::YCbCr;
        let Some(jpeg) = self.decoded.jpeg_data.as_mut() else {
            return Ok(());
        };
        let num_components = jpeg.components.len();
        let is_gray = num_components == 1;
        let c_map = jpeg_order(is_ycbcr, is_gray);
        let mut qt_set = vec![false; jpeg.quant.len()];
        for c in 0..num_components {
            // Gray images read the table of the second channel.
            let quant_c = if is_gray { 1 } else { c };
            let qpos = jpeg.components[c_map[c]].quant_idx;
            if qpos >= jpeg.quant.len() {
                return Err(FrameError::InvalidQuantTable);
            }
            qt_set[qpos] = true;
            for x in 0..BLOCK_DIM {
                for y in 0..BLOCK_DIM {
                    jpeg.quant[qpos].values[x * BLOCK_DIM + y] =
                        table[quant_c * BLOCK_SIZE + y * BLOCK_DIM + x];
                }
            }
        }
        for i in 0..jpeg.quant.len() {
            if qt_set[i] {
                continue;
            }
            if i == 0 {
                return Err(FrameError::UnusedFirstQuantTable);
            }
            jpeg.quant[i].values = jpeg.quant[i - 1].values;
        }
        Ok(())
    }

    fn decode_ac_group_task(
        &self,
        g: usize,
        request: &AcGroupRequest,
        scratch: &GroupScratch,
        thread: usize,
    ) -> Result<AcGroupOutput> {
        let header = &self.frame_header;
        let dim = &self.frame_dim;
        let num_passes = header.passes.num_passes;
        let first_pass = self.progress.decoded_passes_per_ac_group[g];
        let num_new = request.readers.len();
        let mut readers = request.readers.clone();
        let mut out = AcGroupOutput {
            group: g,
            new_passes: num_new,
            color: None,
            extra: None,
            noise: Vec::new(),
            modular: None,
            jpeg: None,
            done: false,
        };

        if self.is_vardct() {
            let block_rect = dim.group_block_rect(g);
            let shared = &self.dec_state.shared;
            let coefficients = &self.vardct.coefficients;
            let mut acc = scratch
                .slot(thread, g)?
                .lock()
                .map_err(|_| FrameError::InvalidOperation)?;
            if !request.dc_only {
                acc.clear();
                acc.resize(group_coefficient_len(dim.group_dim), 0);
                if coefficients.is_stored() {
                    coefficients.load(g, &mut acc)?;
                }
                for (i, br) in readers.iter_mut().enumerate() {
                    let pass = first_pass + i;
                    let shift = header.passes.shift.get(pass).copied().unwrap_or(0);
                    decode_group_pass(
                        br,
                        pass,
                        shift,
                        &self.vardct.ac_global,
                        &shared.block_ctx_map,
                        block_rect,
                        &mut acc,
                    )?;
                }
                if coefficients.is_stored() && num_new > 0 {
                    coefficients.store(g, &acc)?;
                }
            }
            let coeffs = (!request.dc_only).then_some(&acc[..]);
            if self.is_jpeg() {
                out.jpeg = Some(jpeg_group_blocks(block_rect, coeffs, &self.vardct.quant_dc));
            } else {
                let dq = Dequantizer {
                    matrices: &shared.matrices,
                    quantizer: &shared.quantizer,
                    cmap: &shared.cmap,
                    dc: &self.vardct.dc,
                    quant_field: &self.vardct.quant_field,
                };
                let planes = render_group(&dq, block_rect, coeffs);
                out.color = Some((
                    block_rect.x0 * BLOCK_DIM,
                    block_rect.y0 * BLOCK_DIM,
                    planes.into_iter().collect(),
                ));
            }
        }

        let full_image = self.modular.is_full_image();
        if !self.modular.is_empty() {
            let rect = dim.group_rect(g);
            let mut update = self.modular.snapshot(rect);
            for (i, br) in readers.iter_mut().enumerate() {
                let (min_shift, max_shift) = header.passes.downsampling_bracket(first_pass + i);
                self.modular
                    .decode_pass(Some(br), &mut update, min_shift, max_shift)?;
            }
            let draw = if request.force_draw {
                let mut draw = update.clone();
                for pass in first_pass + num_new..num_passes {
                    let (min_shift, max_shift) = header.passes.downsampling_bracket(pass);
                    self.modular.decode_pass(None, &mut draw, min_shift, max_shift)?;
                }
                Some(draw)
            } else {
                None
            };
            if !full_image {
                let mut planes = self
                    .modular
                    .group_to_float(rect, draw.as_ref().unwrap_or(&update));
                let extra = planes.split_off(self.modular.num_color);
                if !planes.is_empty() {
                    out.color = Some((rect.x0, rect.y0, planes));
                }
                if !extra.is_empty() {
                    out.extra = Some((rect.x0, rect.y0, extra));
                }
            }
            out.modular = Some(match draw {
                Some(draw) if full_image => draw,
                _ => update,
            });
        }

        if header.has(FrameHeader::NOISE) {
            let ups = dim.upsampling;
            let gd = dim.group_dim;
            let gx = g % dim.xsize_groups;
            let gy = g / dim.xsize_groups;
            for iy in 0..ups {
                for ix in 0..ups {
                    let x0 = (gx * ups + ix) * gd;
                    let y0 = (gy * ups + iy) * gd;
                    let r = Rect::clipped(x0, y0, gd, gd, dim.xsize_upsampled, dim.ysize_upsampled);
                    if r.is_empty() {
                        continue;
                    }
                    let planes = random_3_planes(
                        self.dec_state.visible_frame_index,
                        self.dec_state.nonvisible_frame_index,
                        x0,
                        y0,
                        r.xsize,
                        r.ysize,
                    );
                    out.noise.push((x0, y0, planes));
                }
            }
        }

        out.done = !full_image && !self.is_jpeg();
        Ok(out)
    }

    /// Runs the requested AC groups in parallel and merges what they decoded.
    pub(super) fn process_ac_groups(
        &mut self,
        requests: &[Option<AcGroupRequest>],
        aggregate: FrameError,
        name: &str,
    ) -> Result<Vec<TaskOutcome<()>>> {
        let num_tasks = requests.len();
        let allow_partial = self.allow_partial_frames;
        let scratch = std::mem::take(&mut self.scratch);
        let this = &*self;
        let (scratch, results) = this.pool.run(
            num_tasks,
            move |num_threads| {
                let mut scratch = scratch;
                scratch.prepare(num_threads, num_tasks);
                Ok(scratch)
            },
            |scratch, g, thread| {
                let Some(request) = &requests[g] else {
                    return Ok(TaskOutcome::Idle);
                };
                match this.decode_ac_group_task(g, request, scratch, thread) {
                    Ok(out) => Ok(TaskOutcome::Decoded(out)),
                    Err(e) if allow_partial && !e.is_fatal() => Ok(TaskOutcome::Incomplete),
                    Err(e) => Err(e),
                }
            },
            name,
        )?;
        self.scratch = scratch;
        let outcomes = reduce_task_results(results, aggregate)?;

        let mut summary = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            summary.push(match outcome {
                TaskOutcome::Idle => TaskOutcome::Idle,
                TaskOutcome::Incomplete => TaskOutcome::Incomplete,
                TaskOutcome::Decoded(out) => {
                    self.merge_ac_group(out);
                    TaskOutcome::Decoded(())
                }
            });
        }
        Ok(summary)
    }

    fn merge_ac_group(&mut self, out: AcGroupOutput) {
        let g = out.group;
        self.progress.decoded_passes_per_ac_group[g] += out.new_passes;
        if let Some(update) = &out.modular {
            self.modular.apply(update);
        }
        if let Some((x0, y0, planes)) = &out.color {
            self.pipeline.set_color(*x0, *y0, planes);
        }
        if let Some((x0, y0, planes)) = &out.extra {
            self.pipeline.set_extra(*x0, *y0, planes);
        }
        for (x0, y0, planes) in &out.noise {
            self.pipeline.set_noise(*x0, *y0, planes);
        }
        if let Some(blocks) = &out.jpeg {
            self.write_jpeg_blocks(g, blocks);
        }
        if out.done {
            self.pipeline.mark_done(g);
        }
        trace!(
            group = g,
            passes = self.progress.decoded_passes_per_ac_group[g],
            "decoded AC group"
        );
    }

    fn write_jpeg_blocks(&mut self, g: usize, blocks: &[Vec<[i16; BLOCK_SIZE]>; 3]) {
        let block_rect = self.frame_dim.group_block_rect(g);
        let is_ycbcr = self.frame_header.color_transform == ColorTransform::YCbCr;
        let Some(jpeg) = self.decoded.jpeg_data.as_mut() else {
            return;
        };
        let is_gray = jpeg.components.len() == 1;
        let c_map = jpeg_order(is_ycbcr, is_gray);
        for (c, channel_blocks) in blocks.iter().enumerate() {
            if is_gray && c != 1 {
                continue;
            }
            let Some(component) = jpeg.components.get_mut(c_map[c]) else {
                continue;
            };
            let w = component.width_in_blocks;
            for by in 0..block_rect.ysize {
                for bx in 0..block_rect.xsize {
                    let (x, y) = (block_rect.x0 + bx, block_rect.y0 + by);
                    if x >= w || y >= component.height_in_blocks {
                        continue;
                    }
                    let dst = (y * w + x) * BLOCK_SIZE;
                    component.coeffs[dst..dst + BLOCK_SIZE]
                        .copy_from_slice(&channel_blocks[by * block_rect.xsize + bx]);
                }
            }
        }
    }
}
