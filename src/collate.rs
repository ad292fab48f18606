//! Batch assembly: merges a batch of examples into dense arrays.
//!
//! Scalar fields become dense `i64` arrays, occupancy grids become one
//! binary `f32` row per example, and the nested title/snapshot token
//! structures are passed through un-padded — padding to rectangular tensors
//! is the consumer's responsibility.

use crate::data::encoder::{Example, SnapshotEntry, TitleEncoding};
use ndarray::{Array1, Array2};
use rayon::prelude::*;

/// One collated batch.
#[derive(Debug, Clone)]
pub struct Batch {
    /// User indices, shape `[batch]`.
    pub users: Array1<i64>,
    /// Duration-bucket indices, shape `[batch]`.
    pub durations: Array1<i64>,
    /// Per-example title encodings, un-padded.
    pub titles: Vec<TitleEncoding>,
    /// Per-example snapshot histories, un-padded.
    pub snapshots: Vec<Vec<SnapshotEntry>>,
    /// Binary occupancy grids, shape `[batch, num_classes]`.
    pub grids: Array2<f32>,
    /// Target classes, shape `[batch]`.
    pub targets: Array1<i64>,
}

impl Batch {
    #[must_use]
    pub fn len(&self) -> usize {
        self.titles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }
}

/// Merge one batch of examples into dense arrays.
#[must_use]
pub fn collate(examples: &[&Example], num_classes: usize) -> Batch {
    let users = Array1::from_iter(examples.iter().map(|e| e.user as i64));
    let durations = Array1::from_iter(examples.iter().map(|e| e.duration_bucket as i64));
    let targets = Array1::from_iter(examples.iter().map(|e| e.target_slot as i64));

    let mut grids = Array2::zeros((examples.len(), num_classes));
    for (row, example) in examples.iter().enumerate() {
        for &slot in &example.grid {
            grids[[row, slot]] = 1.0;
        }
    }

    Batch {
        users,
        durations,
        titles: examples.iter().map(|e| e.title.clone()).collect(),
        snapshots: examples.iter().map(|e| e.snapshot.clone()).collect(),
        grids,
        targets,
    }
}

/// Assemble every batch of an epoch in parallel, preserving batch order.
///
/// Batch assembly has no cross-batch dependencies; the work runs on the
/// global rayon pool (size it with `worker_count` at startup).
#[must_use]
pub fn collate_epoch(
    examples: &[Example],
    batches: &[Vec<usize>],
    num_classes: usize,
) -> Vec<Batch> {
    batches
        .par_iter()
        .map(|batch| {
            let refs: Vec<&Example> = batch.iter().map(|&i| &examples[i]).collect();
            collate(&refs, num_classes)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example(user: usize, bucket: usize, grid: Vec<usize>, target: usize) -> Example {
        Example {
            user,
            title: TitleEncoding {
                chars: vec![vec![2, 3]],
                words: vec![2],
                len: 1,
            },
            duration_bucket: bucket,
            snapshot: Vec::new(),
            grid,
            target_slot: target,
        }
    }

    #[test]
    fn test_collate_shapes_and_values() {
        let a = example(0, 1, vec![0, 2], 3);
        let b = example(0, 2, vec![], 1);
        let batch = collate(&[&a, &b], 4);

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.users.len(), 2);
        assert_eq!(batch.targets.to_vec(), vec![3, 1]);
        assert_eq!(batch.grids.shape(), &[2, 4]);
        assert_eq!(batch.grids[[0, 0]], 1.0);
        assert_eq!(batch.grids[[0, 1]], 0.0);
        assert_eq!(batch.grids[[0, 2]], 1.0);
        // Second example booked nothing.
        assert_eq!(batch.grids.row(1).sum(), 0.0);
    }

    #[test]
    fn test_grid_never_marks_target() {
        let a = example(0, 1, vec![0, 2], 3);
        let batch = collate(&[&a], 4);
        assert_eq!(batch.grids[[0, 3]], 0.0);
    }

    #[test]
    fn test_collate_epoch_preserves_batch_order() {
        let examples: Vec<Example> = (0..6).map(|i| example(0, i, vec![], i % 4)).collect();
        let batches = vec![vec![4, 5], vec![0, 1], vec![2, 3]];
        let collated = collate_epoch(&examples, &batches, 4);
        assert_eq!(collated.len(), 3);
        assert_eq!(collated[0].durations.to_vec(), vec![4, 5]);
        assert_eq!(collated[1].durations.to_vec(), vec![0, 1]);
        assert_eq!(collated[2].durations.to_vec(), vec![2, 3]);
    }
}
