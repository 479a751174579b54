//! Deterministic partitioning of a corpus index range into disjoint blocks.
//!
//! The identity permutation `[0, N)` is shuffled with a seeded ChaCha8
//! stream and then sliced into consecutive runs whose lengths follow the
//! declared block sizes. ChaCha8 output is fixed across platforms and crate
//! versions, so the same `(N, seed, sizes)` yields the same blocks in every
//! process.

use crate::error::{TrainingError, TrainingResult};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};
use std::ops::Range;
use std::sync::Arc;

/// Seed shared by every corpus partition so role assignments never drift
/// between runs, roles or views.
pub const PARTITION_SEED: u64 = 1;

/// A shuffled index order split into contiguous blocks.
///
/// Blocks are ranges into one shared permutation, so handing a block to a
/// dataset view never copies indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    order: Arc<[usize]>,
    bounds: Vec<Range<usize>>,
}

impl Partition {
    /// Partitions `0..total` into blocks of the given sizes.
    ///
    /// # Errors
    /// Returns `TrainingError::SizeMismatch` when the sizes do not sum to
    /// `total`.
    pub fn new(total: usize, sizes: &[usize], seed: u64) -> TrainingResult<Self> {
        let sum = sizes
            .iter()
            .try_fold(0usize, |acc, &size| acc.checked_add(size))
            .ok_or_else(|| TrainingError::Configuration("partition sizes overflow".to_string()))?;
        if sum != total {
            return Err(TrainingError::SizeMismatch { expected: total, actual: sum });
        }

        let mut order: Vec<usize> = (0..total).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        order.shuffle(&mut rng);

        let mut bounds = Vec::with_capacity(sizes.len());
        let mut start = 0;
        for &size in sizes {
            bounds.push(start..start + size);
            start += size;
        }

        Ok(Self { order: order.into(), bounds })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[must_use]
    pub fn num_blocks(&self) -> usize {
        self.bounds.len()
    }

    /// Original indices assigned to block `i`, in shuffled order.
    #[must_use]
    pub fn block(&self, i: usize) -> Option<&[usize]> {
        self.bounds.get(i).map(|range| &self.order[range.clone()])
    }

    /// Position range of block `i` within `order()`.
    #[must_use]
    pub fn block_range(&self, i: usize) -> Option<Range<usize>> {
        self.bounds.get(i).cloned()
    }

    pub fn blocks(&self) -> impl Iterator<Item = &[usize]> + '_ {
        self.bounds.iter().map(|range| &self.order[range.clone()])
    }

    /// The full shuffled permutation.
    #[must_use]
    pub fn order(&self) -> &Arc<[usize]> {
        &self.order
    }

    /// SHA-256 over the permutation and block bounds, hex encoded.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for &index in self.order.iter() {
            hasher.update((index as u64).to_le_bytes());
        }
        for range in &self.bounds {
            hasher.update((range.start as u64).to_le_bytes());
            hasher.update((range.end as u64).to_le_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// Splits `0..total` into owned index blocks of the given sizes.
pub fn partition(total: usize, sizes: &[usize], seed: u64) -> TrainingResult<Vec<Vec<usize>>> {
    let partition = Partition::new(total, sizes, seed)?;
    Ok(partition.blocks().map(<[usize]>::to_vec).collect())
}
