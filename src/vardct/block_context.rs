//! Maps a block's channel to the AC context that selects its histogram.

use crate::bit_reader::BitReader;
use crate::error::{FrameError, Result};

pub const MAX_AC_CONTEXTS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockCtxMap {
    pub num_ac_contexts: usize,
    pub channel_ctx: [usize; 3],
}

impl Default for BlockCtxMap {
    fn default() -> Self {
        Self {
            num_ac_contexts: 3,
            channel_ctx: [0, 1, 2],
        }
    }
}

impl BlockCtxMap {
    pub fn decode(br: &mut BitReader) -> Result<Self> {
        if br.read_bool()? {
            return Ok(Self::default());
        }
        let num_ac_contexts = br.read_bits(4)? as usize + 1;
        let mut channel_ctx = [0usize; 3];
        for ctx in channel_ctx.iter_mut() {
            *ctx = br.read_bits(4)? as usize;
            if *ctx >= num_ac_contexts {
                return Err(FrameError::InvalidHeader);
            }
        }
        Ok(Self {
            num_ac_contexts,
            channel_ctx,
        })
    }

    pub fn context(&self, histogram: usize, c: usize) -> usize {
        histogram * self.num_ac_contexts + self.channel_ctx[c]
    }
}
