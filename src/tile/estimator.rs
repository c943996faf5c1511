//! Count estimators for the tile codec
//!
//! [`DensityWindow`] turns the last few values of a field into the noisy-bit
//! count for the next one, so encoder and decoder derive it independently.
//! [`Lookahead`] records per-pass values in pass 1 and replays them later,
//! which is how a restriction block's bit length is known before the block is
//! written.

use std::collections::VecDeque;

use crate::codec::{AdaptiveDiffCoder, MAX_NOISY_BITS};
use crate::error::{CodecError, Result};

#[derive(Debug, Clone)]
pub struct DensityWindow {
    values: VecDeque<u64>,
    depth: usize,
    sum: u128,
}

impl DensityWindow {
    pub fn new(depth: u32) -> Self {
        let depth = depth.max(1) as usize;
        Self {
            values: VecDeque::with_capacity(depth),
            depth,
            sum: 0,
        }
    }

    /// floor(log2) of the window average; 0 while the average is below 2
    pub fn noisy_bits(&self) -> u32 {
        if self.values.is_empty() {
            return 0;
        }
        let avg = self.sum / self.values.len() as u128;
        if avg < 2 {
            0
        } else {
            (127 - avg.leading_zeros()).min(MAX_NOISY_BITS)
        }
    }

    pub fn record(&mut self, value: u64) {
        if self.values.len() == self.depth {
            if let Some(old) = self.values.pop_front() {
                self.sum -= old as u128;
            }
        }
        self.values.push_back(value);
        self.sum += value as u128;
    }
}

/// Values recorded in pass 1, replayed in order on every later pass
#[derive(Debug, Clone, Default)]
pub struct Lookahead {
    name: &'static str,
    values: Vec<u64>,
    cursor: usize,
}

impl Lookahead {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            values: Vec::new(),
            cursor: 0,
        }
    }

    pub fn record(&mut self, value: u64) {
        self.values.push(value);
    }

    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    pub fn next(&mut self) -> Result<u64> {
        let value = self.values.get(self.cursor).copied().ok_or_else(|| {
            CodecError::contract(format!("{} lookahead exhausted", self.name))
        })?;
        self.cursor += 1;
        Ok(value)
    }

    /// Replay the next value and check it against the one seen now
    pub fn expect(&mut self, actual: u64) -> Result<u64> {
        let recorded = self.next()?;
        if recorded != actual {
            return Err(CodecError::contract(format!(
                "{} changed between passes: {recorded} then {actual}",
                self.name
            )));
        }
        Ok(recorded)
    }

    /// True once every recorded value has been replayed
    pub fn is_drained(&self) -> bool {
        self.cursor == self.values.len()
    }
}

/// Per-pass coder state, rebuilt identically by the encoder on every pass
/// and by the decoder
#[derive(Debug, Clone)]
pub(crate) struct FieldCoders {
    pub elevation: AdaptiveDiffCoder,
    pub target_delta: AdaptiveDiffCoder,
    pub restriction_lon: AdaptiveDiffCoder,
    pub restriction_lat: AdaptiveDiffCoder,
    pub shape_lon: AdaptiveDiffCoder,
    pub shape_lat: AdaptiveDiffCoder,
    pub shape_elevation: AdaptiveDiffCoder,
    pub link_counts: DensityWindow,
    pub point_counts: DensityWindow,
    pub restriction_bits: DensityWindow,
}

impl FieldCoders {
    pub fn new(window: u32) -> Self {
        Self {
            elevation: AdaptiveDiffCoder::new(),
            target_delta: AdaptiveDiffCoder::new(),
            restriction_lon: AdaptiveDiffCoder::new(),
            restriction_lat: AdaptiveDiffCoder::new(),
            shape_lon: AdaptiveDiffCoder::new(),
            shape_lat: AdaptiveDiffCoder::new(),
            shape_elevation: AdaptiveDiffCoder::new(),
            link_counts: DensityWindow::new(window),
            point_counts: DensityWindow::new(window),
            restriction_bits: DensityWindow::new(window),
        }
    }
}
