//! Codestream-level decoding: the per-frame driver that feeds TOC sections to
//! the scheduler, and a session that decodes every frame of a codestream.

use tracing::{debug, info, instrument, warn};

use crate::bit_reader::BitReader;
use crate::decoder_state::DecoderState;
use crate::dimensions::SizeConstraints;
use crate::error::{FrameError, Result};
use crate::frame::section::SectionLayout;
use crate::frame::{FrameDecoder, SectionInfo, SectionStatus};
use crate::frame_header::{FrameEncoding, FrameHeader, FrameType};
use crate::image::ImageBundle;
use crate::metadata::ImageMetadata;
use crate::parallel::ThreadPool;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecompressParams {
    /// Accept a codestream that ends inside a frame.
    pub allow_partial_files: bool,
    /// Accept sections that are only partially present.
    pub allow_more_progressive_steps: bool,
    pub max_passes: usize,
    /// Stop once this downsampling factor is reached; 8 or more decodes DC only.
    pub max_downsampling: usize,
    pub pause_at_progressive: bool,
    pub coalescing: bool,
    /// Worker threads; 0 decodes on the calling thread.
    pub num_threads: usize,
}

impl Default for DecompressParams {
    fn default() -> Self {
        Self {
            allow_partial_files: false,
            allow_more_progressive_steps: false,
            max_passes: usize::MAX,
            max_downsampling: 1,
            pause_at_progressive: false,
            coalescing: true,
            num_threads: 0,
        }
    }
}

/// Passes to decode for a frame given the caller's pass and downsampling
/// limits. Reference-only frames are always decoded completely.
pub fn max_passes_for(params: &DecompressParams, header: &FrameHeader) -> usize {
    let passes = &header.passes;
    let mut max_passes = params.max_passes;
    let max_downsampling = params
        .max_downsampling
        .checked_shr(3 * header.dc_level)
        .unwrap_or(0)
        .max(1);
    if max_downsampling >= 8 {
        max_passes = 0;
    } else {
        for (&downsample, &last_pass) in passes.downsample.iter().zip(&passes.last_pass) {
            if max_downsampling >= downsample as usize && max_passes > last_pass as usize {
                max_passes = last_pass as usize + 1;
            }
        }
    }
    if header.frame_type == FrameType::ReferenceOnly {
        max_passes = passes.num_passes;
    }
    max_passes.min(passes.num_passes)
}

/// Decodes the frame starting at `br` into `decoded`, leaving `br` after the
/// frame. Sections are read from the bytes present; with partial files
/// allowed, a truncated frame decodes to whatever its sections hold.
#[instrument(level = "debug", skip_all, fields(is_preview = is_preview))]
pub fn decode_frame(
    params: &DecompressParams,
    frame_decoder: &mut FrameDecoder,
    br: &mut BitReader,
    decoded: ImageBundle,
    is_preview: bool,
) -> Result<ImageBundle> {
    let allow_partial_dc_global =
        params.allow_partial_files && params.allow_more_progressive_steps;
    frame_decoder.init_frame(
        br,
        decoded,
        is_preview,
        params.allow_partial_files,
        allow_partial_dc_global,
        true,
    )?;
    let max_passes = max_passes_for(params, frame_decoder.frame_header());
    frame_decoder.set_max_passes(max_passes);
    frame_decoder.set_pause_at_progressive(params.pause_at_progressive);
    frame_decoder.set_coalescing(params.coalescing);

    let pos = br.total_bits_consumed() / 8;
    let total_bytes = br.total_bytes();
    let is_modular = frame_decoder.frame_header().encoding == FrameEncoding::Modular;
    let offsets = frame_decoder.section_offsets().to_vec();
    let sizes = frame_decoder.section_sizes().to_vec();

    let mut sections = Vec::with_capacity(sizes.len());
    let mut bytes_to_skip = 0usize;
    for (i, (&offset, &size)) in offsets.iter().zip(&sizes).enumerate() {
        let b = offset as usize;
        let e = b + size as usize;
        bytes_to_skip = bytes_to_skip.max(e);
        let starts_early = params.allow_more_progressive_steps && (i == 0 || is_modular);
        let needed = if starts_early { b } else { e };
        if pos + needed <= total_bytes || (i == 0 && params.allow_more_progressive_steps) {
            sections.push(SectionInfo::new(i, br.sub_reader(pos + b, e - b)));
        } else if !params.allow_partial_files {
            return Err(FrameError::PrematureEnd);
        }
    }
    debug!(
        available = sections.len(),
        total = sizes.len(),
        max_passes,
        "submitting sections"
    );

    let status = frame_decoder.process_sections(&sections)?;
    let mut processed_bytes = 0usize;
    for (section, s) in sections.iter().zip(&status) {
        match s {
            SectionStatus::Done => processed_bytes += sizes[section.id] as usize,
            SectionStatus::Partial if params.allow_more_progressive_steps => {}
            SectionStatus::Skipped if params.max_downsampling > 1 => {}
            _ => {
                warn!(section = section.id, status = ?s, "unexpected section status");
                return Err(FrameError::InvalidSectionStatus);
            }
        }
    }

    if let Err(e) = br.skip_bits(bytes_to_skip * 8) {
        if !params.allow_partial_files {
            return Err(e);
        }
    }
    frame_decoder.finalize_frame()?;
    let mut image = frame_decoder.take_decoded();
    image.decoded_bytes = processed_bytes;
    Ok(image)
}

/// A displayed frame and the header it was coded with.
#[derive(Debug, Clone)]
pub struct FrameOutput {
    pub header: FrameHeader,
    pub image: ImageBundle,
}

/// Header-level description of one frame, for inspection.
#[derive(Debug, Clone)]
pub struct FrameInfo {
    pub header: FrameHeader,
    pub layout: SectionLayout,
    /// Byte offset of the first section in the codestream.
    pub sections_start: usize,
    pub section_sizes: Vec<u32>,
}

/// Decodes whole codestreams, keeping reference frames between frames.
pub struct Decoder {
    params: DecompressParams,
    constraints: SizeConstraints,
    pool: ThreadPool,
    state: DecoderState,
}

impl Decoder {
    pub fn new(params: DecompressParams) -> Result<Self> {
        let pool = ThreadPool::new(params.num_threads)?;
        Ok(Self {
            params,
            constraints: SizeConstraints::default(),
            pool,
            state: DecoderState::default(),
        })
    }

    pub fn set_size_constraints(&mut self, constraints: SizeConstraints) {
        self.constraints = constraints;
    }

    pub fn state(&self) -> &DecoderState {
        &self.state
    }

    /// Decodes every frame of `data` and returns the displayed ones.
    pub fn decode(&mut self, data: &[u8]) -> Result<(ImageMetadata, Vec<FrameOutput>)> {
        let mut br = BitReader::new(data);
        let metadata = ImageMetadata::read(&mut br)?;
        info!(
            xsize = metadata.xsize,
            ysize = metadata.ysize,
            extra_channels = metadata.num_extra_channels(),
            "decoding codestream"
        );
        self.state = DecoderState::new(metadata.clone());
        let mut frames = Vec::new();
        loop {
            let mut frame_decoder = FrameDecoder::new(&mut self.state, &self.pool);
            frame_decoder.set_size_constraints(self.constraints);
            let image = decode_frame(&self.params, &mut frame_decoder, &mut br, ImageBundle::new(), false)?;
            let header = frame_decoder.frame_header().clone();
            debug!(
                frame_type = ?header.frame_type,
                is_last = header.is_last,
                decoded_bytes = image.decoded_bytes,
                "frame decoded"
            );
            let is_last = header.is_last;
            if header.is_visible() {
                frames.push(FrameOutput { header, image });
            }
            if is_last {
                break;
            }
            if br.bits_remaining() == 0 {
                if self.params.allow_partial_files {
                    break;
                }
                return Err(FrameError::PrematureEnd);
            }
        }
        Ok((metadata, frames))
    }

    /// Reads the frame headers and TOCs of `data` without decoding sections.
    pub fn inspect(&mut self, data: &[u8]) -> Result<(ImageMetadata, Vec<FrameInfo>)> {
        let mut br = BitReader::new(data);
        let metadata = ImageMetadata::read(&mut br)?;
        self.state = DecoderState::new(metadata.clone());
        let mut infos = Vec::new();
        loop {
            let mut frame_decoder = FrameDecoder::new(&mut self.state, &self.pool);
            frame_decoder.set_size_constraints(self.constraints);
            frame_decoder.init_frame(&mut br, ImageBundle::new(), false, false, false, false)?;
            let info = FrameInfo {
                header: frame_decoder.frame_header().clone(),
                layout: *frame_decoder.section_layout(),
                sections_start: br.total_bits_consumed() / 8,
                section_sizes: frame_decoder.section_sizes().to_vec(),
            };
            let total: usize = info.section_sizes.iter().map(|&s| s as usize).sum();
            br.skip_bits(total * 8)?;
            let is_last = info.header.is_last;
            infos.push(info);
            if is_last || br.bits_remaining() == 0 {
                break;
            }
        }
        Ok((metadata, infos))
    }
}
