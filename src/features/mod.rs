//! Auxiliary image features decoded in the DC-global section and drawn by the
//! render pipeline.

pub mod noise;
pub mod patches;
pub mod splines;

use noise::NoiseParams;
use patches::PatchesDictionary;
use splines::Splines;

#[derive(Debug, Clone, Default)]
pub struct ImageFeatures {
    pub patches: PatchesDictionary,
    pub splines: Splines,
    pub noise: Option<NoiseParams>,
}

impl ImageFeatures {
    pub fn clear(&mut self) {
        self.patches.clear();
        self.splines.clear();
        self.noise = None;
    }
}
