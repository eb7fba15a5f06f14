//! Decode progress of one frame, owned and mutated only by the scheduler.

use super::section::{SectionInfo, SectionLayout, SectionStatus};

#[derive(Debug, Clone, Default)]
pub struct ProgressState {
    pub processed_section: Vec<bool>,
    pub num_sections_done: usize,
    pub decoded_dc_global: bool,
    pub decoded_ac_global: bool,
    pub decoded_dc_groups: Vec<bool>,
    pub decoded_passes_per_ac_group: Vec<usize>,
    pub finalized_dc: bool,
    pub is_finalized: bool,
    /// Passes per group after which the frame counts as complete.
    pub max_passes: usize,
    /// Bits of the implicit single section consumed by completed phases.
    pub single_section_bits: usize,
}

impl ProgressState {
    pub fn new(layout: &SectionLayout) -> Self {
        Self {
            processed_section: vec![false; layout.num_sections()],
            num_sections_done: 0,
            decoded_dc_global: false,
            decoded_ac_global: false,
            decoded_dc_groups: vec![false; layout.num_dc_groups],
            decoded_passes_per_ac_group: vec![0; layout.num_groups],
            finalized_dc: false,
            is_finalized: false,
            max_passes: layout.num_passes,
            single_section_bits: 0,
        }
    }

    /// A finished decoder, ready for the next `init_frame`.
    pub fn finalized() -> Self {
        Self {
            is_finalized: true,
            ..Self::default()
        }
    }

    pub fn all_dc_groups_decoded(&self) -> bool {
        self.decoded_dc_groups.iter().all(|&d| d)
    }

    /// Passes every group has decoded.
    pub fn completely_decoded_ac_pass(&self) -> usize {
        self.decoded_passes_per_ac_group
            .iter()
            .copied()
            .min()
            .unwrap_or(0)
    }

    pub fn has_everything(&self) -> bool {
        self.decoded_dc_global
            && self.decoded_ac_global
            && self.all_dc_groups_decoded()
            && self
                .decoded_passes_per_ac_group
                .iter()
                .all(|&p| p >= self.max_passes)
    }

    /// Rolls back sections that did not complete so they can be resubmitted.
    pub fn mark_sections(&mut self, sections: &[SectionInfo], status: &[SectionStatus]) {
        self.num_sections_done = sections.len();
        for (section, s) in sections.iter().zip(status) {
            if matches!(s, SectionStatus::Skipped | SectionStatus::Partial) {
                if let Some(p) = self.processed_section.get_mut(section.id) {
                    *p = false;
                }
                self.num_sections_done -= 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bit_reader::BitReader;

    #[test]
    fn test_rollback_of_incomplete_sections() {
        let layout = SectionLayout::new(2, 1, 1);
        let mut progress = ProgressState::new(&layout);
        let sections: Vec<SectionInfo> = (0..3)
            .map(|id| SectionInfo::new(id, BitReader::new(&[])))
            .collect();
        for s in &sections {
            progress.processed_section[s.id] = true;
        }
        let status = [SectionStatus::Done, SectionStatus::Partial, SectionStatus::Skipped];
        progress.mark_sections(&sections, &status);
        assert_eq!(progress.processed_section[..3], [true, false, false]);
        assert_eq!(progress.num_sections_done, 1);
    }

    #[test]
    fn test_has_everything_honours_max_passes() {
        let layout = SectionLayout::new(2, 1, 3);
        let mut progress = ProgressState::new(&layout);
        progress.decoded_dc_global = true;
        progress.decoded_ac_global = true;
        progress.decoded_dc_groups = vec![true];
        progress.decoded_passes_per_ac_group = vec![1, 2];
        assert!(!progress.has_everything());
        progress.max_passes = 1;
        assert!(progress.has_everything());
        assert_eq!(progress.completely_decoded_ac_pass(), 1);
    }
}
