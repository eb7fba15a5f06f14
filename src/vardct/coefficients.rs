//! Per-group AC coefficient storage shared by the passes of a frame.
//!
//! Each group's buffer sits behind its own lock: a parallel AC run touches
//! every group from exactly one task, so the locks are never contended.

use std::fmt::Debug;
use std::sync::Mutex;

use crate::error::{FrameError, Result};

pub trait AcSample: Copy + Clone + Debug + Default + PartialEq + Send + Sync {
    const BITS: u32;

    fn to_i32(self) -> i32;

    /// Saturating narrowing conversion.
    fn from_i32(val: i32) -> Self;
}

impl AcSample for i16 {
    const BITS: u32 = 16;

    fn to_i32(self) -> i32 {
        self as i32
    }

    fn from_i32(val: i32) -> Self {
        val.clamp(i16::MIN as i32, i16::MAX as i32) as i16
    }
}

impl AcSample for i32 {
    const BITS: u32 = 32;

    fn to_i32(self) -> i32 {
        self
    }

    fn from_i32(val: i32) -> Self {
        val
    }
}

pub fn ceil_log2_nonzero(x: usize) -> u32 {
    debug_assert!(x > 0);
    let floor = usize::BITS - 1 - x.leading_zeros();
    if x.is_power_of_two() { floor } else { floor + 1 }
}

/// Narrow storage is used only when the accumulated coefficients provably fit
/// and the output is not a JPEG coefficient sink.
pub fn use_16_bit_coefficients(max_num_bits_ac: u32, num_passes: usize, is_jpeg: bool) -> bool {
    max_num_bits_ac + ceil_log2_nonzero(num_passes) < 16 && !is_jpeg
}

#[derive(Debug, Default)]
pub struct AcImage<T: AcSample> {
    groups: Vec<Mutex<Vec<T>>>,
}

impl<T: AcSample> AcImage<T> {
    fn new(num_groups: usize, group_len: usize) -> Self {
        Self {
            groups: (0..num_groups)
                .map(|_| Mutex::new(vec![T::default(); group_len]))
                .collect(),
        }
    }

    fn load(&self, g: usize, dst: &mut [i32]) -> Result<()> {
        let group = self.groups[g]
            .lock()
            .map_err(|_| FrameError::InvalidOperation)?;
        for (d, s) in dst.iter_mut().zip(group.iter()) {
            *d = s.to_i32();
        }
        Ok(())
    }

    fn store(&self, g: usize, src: &[i32]) -> Result<()> {
        let mut group = self.groups[g]
            .lock()
            .map_err(|_| FrameError::InvalidOperation)?;
        for (d, &s) in group.iter_mut().zip(src.iter()) {
            *d = T::from_i32(s);
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum CoefficientStorage {
    Narrow(AcImage<i16>),
    Wide(AcImage<i32>),
}

impl Default for CoefficientStorage {
    fn default() -> Self {
        Self::Wide(AcImage::default())
    }
}

impl CoefficientStorage {
    /// Zero-filled storage; empty unless `store` is set.
    pub fn new(use_16_bit: bool, store: bool, num_groups: usize, group_len: usize) -> Self {
        let (n, len) = if store { (num_groups, group_len) } else { (0, 0) };
        if use_16_bit {
            Self::Narrow(AcImage::new(n, len))
        } else {
            Self::Wide(AcImage::new(n, len))
        }
    }

    pub fn is_16_bit(&self) -> bool {
        matches!(self, Self::Narrow(_))
    }

    pub fn is_stored(&self) -> bool {
        match self {
            Self::Narrow(img) => !img.groups.is_empty(),
            Self::Wide(img) => !img.groups.is_empty(),
        }
    }

    pub fn load(&self, g: usize, dst: &mut [i32]) -> Result<()> {
        match self {
            Self::Narrow(img) => img.load(g, dst),
            Self::Wide(img) => img.load(g, dst),
        }
    }

    pub fn store(&self, g: usize, src: &[i32]) -> Result<()> {
        match self {
            Self::Narrow(img) => img.store(g, src),
            Self::Wide(img) => img.store(g, src),
        }
    }
}
