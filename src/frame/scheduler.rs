//! Section scheduler: sorts submitted sections by phase and runs every phase
//! whose dependencies are satisfied.

use tracing::{debug, instrument};

use super::ac::AcGroupRequest;
use super::dc::TaskOutcome;
use super::section::{SectionInfo, SectionKind, SectionStatus};
use super::FrameDecoder;
use crate::bit_reader::BitReader;
use crate::error::{FrameError, Result};

/// Maps a phase result onto the status of its section. Running out of data
/// is recoverable only when partial input is allowed; anything else aborts.
fn partial_on_truncation(result: Result<()>, allow_partial: bool) -> Result<SectionStatus> {
    match result {
        Ok(()) => Ok(SectionStatus::Done),
        Err(e) if allow_partial && !e.is_fatal() => Ok(SectionStatus::Partial),
        Err(e) => Err(e),
    }
}

impl<'a> FrameDecoder<'a> {
    /// Processes any subset of the frame's sections, in any order. Returns
    /// one status per input section. Sections that are not `Done` may be
    /// submitted again in a later call.
    #[instrument(level = "debug", skip_all, fields(num_sections = sections.len()))]
    pub fn process_sections(&mut self, sections: &[SectionInfo]) -> Result<Vec<SectionStatus>> {
        if self.progress.is_finalized {
            return Err(FrameError::InvalidOperation);
        }
        if sections.is_empty() {
            return Ok(Vec::new());
        }
        let num_ids = self.progress.processed_section.len();
        if sections.iter().any(|s| s.id >= num_ids) {
            return Err(FrameError::InvalidSection);
        }
        if self.layout.is_single_section() {
            if sections.len() != 1 || sections[0].id != 0 {
                return Err(FrameError::InvalidSection);
            }
            return self.process_single_section(&sections[0]);
        }

        let layout = self.layout;
        let max_passes = self.progress.max_passes;
        let mut status = vec![SectionStatus::Skipped; sections.len()];
        let mut dc_global_sec = None;
        let mut dc_group_sec = vec![None; layout.num_dc_groups];
        let mut ac_global_sec = None;
        let mut ac_group_sec = vec![vec![None; layout.num_passes]; layout.num_groups];

        for (i, section) in sections.iter().enumerate() {
            if self.progress.processed_section[section.id] {
                status[i] = SectionStatus::Duplicate;
                continue;
            }
            match layout.classify(section.id)? {
                SectionKind::DcGlobal => dc_global_sec = Some(i),
                SectionKind::DcGroup(g) => dc_group_sec[g] = Some(i),
                SectionKind::AcGlobal => ac_global_sec = Some(i),
                SectionKind::AcGroup { group, pass } => {
                    if pass >= max_passes {
                        continue;
                    }
                    ac_group_sec[group][pass] = Some(i);
                }
            }
            self.progress.processed_section[section.id] = true;
        }

        // New passes per group stop at the first pass that was not submitted.
        let desired_passes: Vec<usize> = ac_group_sec
            .iter()
            .zip(&self.progress.decoded_passes_per_ac_group)
            .map(|(secs, &decoded)| {
                (decoded..max_passes.min(layout.num_passes))
                    .take_while(|&pass| secs[pass].is_some())
                    .count()
            })
            .collect();

        if let Some(i) = dc_global_sec {
            let mut br = sections[i].br.clone();
            let result = self.process_dc_global(&mut br);
            status[i] = partial_on_truncation(result, self.dc_global_may_be_partial())?;
        }

        if self.progress.decoded_dc_global {
            let readers: Vec<Option<BitReader>> = dc_group_sec
                .iter()
                .map(|sec| sec.map(|i: usize| sections[i].br.clone()))
                .collect();
            let outcomes = self.process_dc_groups(&readers)?;
            for (sec, outcome) in dc_group_sec.iter().zip(&outcomes) {
                let Some(i) = *sec else { continue };
                match outcome {
                    TaskOutcome::Decoded(_) => status[i] = SectionStatus::Done,
                    TaskOutcome::Incomplete => status[i] = SectionStatus::Partial,
                    TaskOutcome::Idle => {}
                }
            }
        }

        if self.progress.decoded_dc_global
            && self.progress.all_dc_groups_decoded()
            && !self.progress.finalized_dc
        {
            self.finalize_dc();
            self.allocate_output();
            let num_extra = self.dec_state.metadata.num_extra_channels();
            if self.pause_at_progressive && num_extra == 0 && self.is_vardct() {
                debug!("pausing after DC");
                self.progress.mark_sections(sections, &status);
                return Ok(status);
            }
        }

        if self.progress.finalized_dc && !self.progress.decoded_ac_global {
            if let Some(i) = ac_global_sec {
                let mut br = sections[i].br.clone();
                let result = self.process_ac_global(&mut br);
                status[i] = partial_on_truncation(result, self.allow_partial_frames)?;
            }
        }

        if self.progress.decoded_ac_global {
            let full_image = self.modular.is_full_image();
            for (g, &num_new) in desired_passes.iter().enumerate() {
                if num_new > 0 || full_image {
                    self.pipeline.clear_done(g);
                }
            }
            let requests: Vec<Option<AcGroupRequest>> = desired_passes
                .iter()
                .enumerate()
                .map(|(g, &num_new)| {
                    if num_new == 0 {
                        return None;
                    }
                    let first = self.progress.decoded_passes_per_ac_group[g];
                    let readers = (first..first + num_new)
                        .filter_map(|pass| ac_group_sec[g][pass])
                        .map(|i| sections[i].br.clone())
                        .collect();
                    Some(AcGroupRequest {
                        readers,
                        ..Default::default()
                    })
                })
                .collect();
            let firsts = self.progress.decoded_passes_per_ac_group.clone();
            let outcomes =
                self.process_ac_groups(&requests, FrameError::AcGroupFailed, "DecodeACGroup")?;
            for (g, outcome) in outcomes.iter().enumerate() {
                let section_status = match outcome {
                    TaskOutcome::Decoded(()) => SectionStatus::Done,
                    TaskOutcome::Incomplete => SectionStatus::Partial,
                    TaskOutcome::Idle => continue,
                };
                for pass in firsts[g]..firsts[g] + desired_passes[g] {
                    if let Some(i) = ac_group_sec[g][pass] {
                        status[i] = section_status;
                    }
                }
            }
        }

        self.progress.mark_sections(sections, &status);
        Ok(status)
    }

    /// A truncated DC global may be reported as partial under either flag.
    fn dc_global_may_be_partial(&self) -> bool {
        self.allow_partial_frames || self.allow_partial_dc_global
    }

    /// A frame with one group and one pass stores every phase back to back
    /// in section 0. Each call resumes after the last completed phase.
    fn process_single_section(&mut self, section: &SectionInfo) -> Result<Vec<SectionStatus>> {
        if self.progress.processed_section[0] {
            return Ok(vec![SectionStatus::Duplicate]);
        }
        self.progress.processed_section[0] = true;
        let status = self.decode_single_section(&section.br)?;
        self.progress
            .mark_sections(std::slice::from_ref(section), &[status]);
        Ok(vec![status])
    }

    /// A reader over the single section positioned after the completed
    /// phases, or `None` if the section does not reach that far yet.
    fn resume_single<'r>(&self, base: &BitReader<'r>) -> Result<Option<BitReader<'r>>> {
        let mut br = base.clone();
        match br.skip_bits(self.progress.single_section_bits) {
            Ok(()) => Ok(Some(br)),
            Err(e) if self.allow_partial_frames && !e.is_fatal() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn decode_single_section(&mut self, base: &BitReader) -> Result<SectionStatus> {
        if !self.progress.decoded_dc_global {
            let Some(mut br) = self.resume_single(base)? else {
                return Ok(SectionStatus::Partial);
            };
            let result = self.process_dc_global(&mut br);
            let status = partial_on_truncation(result, self.dc_global_may_be_partial())?;
            if status != SectionStatus::Done {
                return Ok(status);
            }
            self.progress.single_section_bits = br.total_bits_consumed();
        }

        if !self.progress.decoded_dc_groups[0] {
            let Some(br) = self.resume_single(base)? else {
                return Ok(SectionStatus::Partial);
            };
            match self.process_dc_groups(&[Some(br)])?.first() {
                Some(TaskOutcome::Decoded(bits)) => self.progress.single_section_bits = *bits,
                Some(TaskOutcome::Incomplete) => return Ok(SectionStatus::Partial),
                _ => {}
            }
        }

        if !self.progress.finalized_dc {
            self.finalize_dc();
            self.allocate_output();
        }

        if !self.progress.decoded_ac_global {
            let Some(mut br) = self.resume_single(base)? else {
                return Ok(SectionStatus::Partial);
            };
            let result = self.process_ac_global(&mut br);
            let status = partial_on_truncation(result, self.allow_partial_frames)?;
            if status != SectionStatus::Done {
                return Ok(status);
            }
            self.progress.single_section_bits = br.total_bits_consumed();
        }

        if self.progress.decoded_passes_per_ac_group[0] >= self.progress.max_passes {
            return Ok(SectionStatus::Skipped);
        }
        let Some(br) = self.resume_single(base)? else {
            return Ok(SectionStatus::Partial);
        };
        self.pipeline.clear_done(0);
        let request = AcGroupRequest {
            readers: vec![br],
            ..Default::default()
        };
        let outcomes =
            self.process_ac_groups(&[Some(request)], FrameError::AcGroupFailed, "DecodeACGroup")?;
        Ok(match outcomes.first() {
            Some(TaskOutcome::Decoded(())) => SectionStatus::Done,
            Some(TaskOutcome::Incomplete) => SectionStatus::Partial,
            _ => SectionStatus::Skipped,
        })
    }
}
