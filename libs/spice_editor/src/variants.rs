//! Parallel generation of independently seeded deck variants.
//!
//! Each variant starts from its own copy of a base [`Editor`], so variants
//! share no mutable state and may be produced on any thread.

use rayon::prelude::*;

use crate::document::EditResult;
use crate::editor::Editor;

/// Configuration for a batch of variants.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Variants {
    /// The number of variants to generate.
    pub runs: usize,
    /// The seed of the first variant; variant `i` uses `seed + i`.
    pub seed: u64,
}

/// A single generated variant.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Variant {
    /// The position of this variant in the batch.
    pub index: usize,
    /// The seed passed to the edit function.
    pub seed: u64,
    /// The rendered deck.
    pub deck: String,
}

impl Variants {
    /// Create a batch of `runs` variants seeded from zero.
    pub fn new(runs: usize) -> Self {
        Self { runs, seed: 0 }
    }

    /// Sets the seed of the first variant.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// The seed of variant `index`.
    #[inline]
    pub fn seed_for(&self, index: usize) -> u64 {
        self.seed.wrapping_add(index as u64)
    }

    /// Applies `edit` to a fresh copy of `base` for every variant and renders
    /// the results, in index order.
    ///
    /// Fails with the error of the lowest-indexed variant whose edit failed.
    pub fn generate<F>(&self, base: &Editor, edit: F) -> EditResult<Vec<Variant>>
    where
        F: Fn(&mut Editor, u64) -> EditResult<()> + Sync,
    {
        tracing::debug!(
            runs = self.runs,
            seed = self.seed,
            threads = rayon::current_num_threads(),
            "generating variants"
        );
        let results: Vec<EditResult<Variant>> = (0..self.runs)
            .into_par_iter()
            .map(|index| {
                let seed = self.seed_for(index);
                let mut editor = base.clone();
                edit(&mut editor, seed)?;
                Ok(Variant {
                    index,
                    seed,
                    deck: editor.render(),
                })
            })
            .collect();
        results.into_iter().collect()
    }
}
