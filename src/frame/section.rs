//! Section addressing: which part of the frame a TOC entry carries.

use crate::bit_reader::BitReader;
use crate::error::{FrameError, Result};
use crate::toc::num_toc_entries;

/// Outcome of one submitted section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SectionStatus {
    Done,
    /// Started but ran out of data; may be submitted again.
    Partial,
    /// Not processed in this call, usually because a dependency is missing.
    #[default]
    Skipped,
    /// Already processed by an earlier submission.
    Duplicate,
}

/// What a section id refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    DcGlobal,
    DcGroup(usize),
    AcGlobal,
    AcGroup { group: usize, pass: usize },
}

/// A section handed to the scheduler: its id and a reader over its bytes.
#[derive(Debug, Clone)]
pub struct SectionInfo<'a> {
    pub id: usize,
    pub br: BitReader<'a>,
}

impl<'a> SectionInfo<'a> {
    pub fn new(id: usize, br: BitReader<'a>) -> Self {
        Self { id, br }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SectionLayout {
    pub num_groups: usize,
    pub num_dc_groups: usize,
    pub num_passes: usize,
}

impl SectionLayout {
    pub fn new(num_groups: usize, num_dc_groups: usize, num_passes: usize) -> Self {
        Self {
            num_groups,
            num_dc_groups,
            num_passes,
        }
    }

    /// One group and one pass: the whole frame is a single section.
    pub fn is_single_section(&self) -> bool {
        self.num_groups == 1 && self.num_passes == 1
    }

    pub fn num_sections(&self) -> usize {
        num_toc_entries(self.num_groups, self.num_dc_groups, self.num_passes, true)
    }

    pub fn ac_global_id(&self) -> usize {
        self.num_dc_groups + 1
    }

    pub fn dc_group_id(&self, g: usize) -> usize {
        1 + g
    }

    pub fn ac_group_id(&self, group: usize, pass: usize) -> usize {
        self.ac_global_id() + 1 + pass * self.num_groups + group
    }

    /// Maps an id of the general layout to its kind. AC ids past the last
    /// pass are invalid.
    pub fn classify(&self, id: usize) -> Result<SectionKind> {
        let ac_global = self.ac_global_id();
        if id == 0 {
            Ok(SectionKind::DcGlobal)
        } else if id < ac_global {
            Ok(SectionKind::DcGroup(id - 1))
        } else if id == ac_global {
            Ok(SectionKind::AcGlobal)
        } else {
            let ac_idx = id - ac_global - 1;
            let group = ac_idx % self.num_groups;
            let pass = ac_idx / self.num_groups;
            if pass >= self.num_passes {
                return Err(FrameError::InvalidSection);
            }
            Ok(SectionKind::AcGroup { group, pass })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_section_layout() {
        let layout = SectionLayout::new(1, 1, 1);
        assert!(layout.is_single_section());
        assert_eq!(layout.num_sections(), 1);
        assert!(!SectionLayout::new(1, 1, 2).is_single_section());
        assert_eq!(SectionLayout::new(1, 1, 2).num_sections(), 5);
    }

    #[test]
    fn test_classify_round_trips_ids() {
        let layout = SectionLayout::new(6, 2, 3);
        assert_eq!(layout.num_sections(), 2 + 2 + 18);
        assert_eq!(layout.classify(0), Ok(SectionKind::DcGlobal));
        assert_eq!(layout.classify(2), Ok(SectionKind::DcGroup(1)));
        assert_eq!(layout.classify(3), Ok(SectionKind::AcGlobal));
        for pass in 0..3 {
            for group in 0..6 {
                let id = layout.ac_group_id(group, pass);
                assert_eq!(layout.classify(id), Ok(SectionKind::AcGroup { group, pass }));
            }
        }
        assert_eq!(layout.classify(layout.num_sections()), Err(FrameError::InvalidSection));
    }
}
