//! Streaming argmax over grid points.
//!
//! Each sample slot keeps the best log-likelihood seen so far and the grid
//! index that produced it. The update rule is a total order on
//! `(value, -grid_index)`, so the result does not depend on chunk boundaries
//! or on the order in which grid points arrive:
//!
//! - a strictly greater value wins
//! - on an exact tie the lower grid index wins
//! - NaN counts as negative infinity
//! - the first observation always fills an empty slot

use serde::Serialize;

use crate::dispatch::ChunkOutput;

/// Best grid point found for one sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Best {
    pub grid_index: usize,
    pub log_likelihood: f32,
}

impl Best {
    fn beats(&self, other: &Best) -> bool {
        self.log_likelihood > other.log_likelihood
            || (self.log_likelihood == other.log_likelihood && self.grid_index < other.grid_index)
    }
}

/// Running argmax for a fixed number of sample slots.
#[derive(Debug, Clone, PartialEq)]
pub struct Reducer {
    slots: Vec<Option<Best>>,
}

impl Reducer {
    pub fn new(n_samples: usize) -> Self {
        Self {
            slots: vec![None; n_samples],
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Record one (sample, grid point) evaluation.
    ///
    /// # Panics
    ///
    /// Panics if `sample` is not below [`len`](Reducer::len).
    pub fn observe(&mut self, sample: usize, grid_index: usize, log_likelihood: f32) {
        let candidate = Best {
            grid_index,
            log_likelihood: if log_likelihood.is_nan() {
                f32::NEG_INFINITY
            } else {
                log_likelihood
            },
        };
        let slot = &mut self.slots[sample];
        match slot {
            Some(best) if !candidate.beats(best) => {}
            _ => *slot = Some(candidate),
        }
    }

    /// Fold one grid-major chunk into the running state. Chunk column `n`
    /// belongs to slot `chunk.offset + n`.
    pub fn absorb(&mut self, chunk: &ChunkOutput<'_>) {
        for (g, row) in chunk.rows().enumerate() {
            for (n, &value) in row.iter().enumerate() {
                self.observe(chunk.offset + n, g, value);
            }
        }
    }

    /// Combine with a reducer that saw other grid points for the same slots.
    pub fn merge(&mut self, other: &Reducer) {
        for (sample, theirs) in other.slots.iter().enumerate() {
            if let Some(best) = theirs {
                self.observe(sample, best.grid_index, best.log_likelihood);
            }
        }
    }

    pub fn get(&self, sample: usize) -> Option<Best> {
        self.slots.get(sample).copied().flatten()
    }

    /// Final per-slot results. A slot is `None` only if it never saw a value.
    pub fn finish(self) -> Vec<Option<Best>> {
        self.slots
    }
}
