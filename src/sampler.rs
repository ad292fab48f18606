//! Length-sorted batch sampler with per-epoch randomized tie-breaking.
//!
//! Examples are ordered by a two-level length key so that each batch holds
//! examples of similar length, minimizing padding waste. A random tertiary
//! key, redrawn every epoch, breaks ties differently across epochs while
//! staying reproducible within one. When shuffling is enabled, whole batches
//! are permuted; examples are never reordered within a batch, which
//! preserves the padding benefit while still randomizing gradient order.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Sort key for one example. Field order is the sort order: snapshot length
/// first, then title length, then the per-epoch random tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct SortKey {
    snapshot_title_len: usize,
    title_len: usize,
    tiebreak: u64,
}

/// Orders example indices into length-sorted batches.
///
/// The sampler is stateless across calls except for its base seed: the
/// random stream for an epoch is derived from `seed + epoch`, so repeated
/// calls for the same epoch yield the identical index stream, and
/// concurrent callers with distinct epochs get independent streams.
#[derive(Debug, Clone)]
pub struct LengthSortedBatchSampler {
    /// Per-example `(title_len, max_snapshot_title_len)` keys.
    lengths: Vec<(usize, usize)>,
    batch_size: usize,
    shuffle: bool,
    seed: u64,
}

impl LengthSortedBatchSampler {
    /// Create a sampler over the given per-example length keys.
    ///
    /// # Panics
    ///
    /// Panics if `batch_size` is zero.
    #[must_use]
    pub fn new(lengths: Vec<(usize, usize)>, batch_size: usize, shuffle: bool, seed: u64) -> Self {
        assert!(batch_size > 0, "batch size must be positive");
        Self {
            lengths,
            batch_size,
            shuffle,
            seed,
        }
    }

    /// Total example count (not batch count).
    #[must_use]
    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    #[must_use]
    pub fn num_batches(&self) -> usize {
        self.lengths.len().div_ceil(self.batch_size)
    }

    /// Produce the batches for one epoch: consecutive fixed-size groups of
    /// length-sorted indices (the final batch may be short), with batch
    /// order permuted when shuffling is enabled.
    #[must_use]
    pub fn epoch_batches(&self, epoch: u64) -> Vec<Vec<usize>> {
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(epoch));

        let mut keyed: Vec<(SortKey, usize)> = self
            .lengths
            .iter()
            .enumerate()
            .map(|(index, &(title_len, snapshot_title_len))| {
                (
                    SortKey {
                        snapshot_title_len,
                        title_len,
                        tiebreak: rng.gen(),
                    },
                    index,
                )
            })
            .collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));

        let mut batches: Vec<Vec<usize>> = keyed
            .chunks(self.batch_size)
            .map(|chunk| chunk.iter().map(|&(_, index)| index).collect())
            .collect();

        if self.shuffle {
            batches.shuffle(&mut rng);
        }
        batches
    }

    /// Flat index stream for one epoch, batch by batch.
    #[must_use]
    pub fn epoch_indices(&self, epoch: u64) -> Vec<usize> {
        self.epoch_batches(epoch).into_iter().flatten().collect()
    }
}
