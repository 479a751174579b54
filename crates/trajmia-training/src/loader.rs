//! Mini-batch loaders over role datasets.

use crate::error::{TrainingError, TrainingResult};
use crate::registry::{CorpusPartitions, RoleDataset};
use crate::role::{Role, Split, View};
use ndarray::Array2;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use trajmia_abstraction::{ModelError, SampleBatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderOptions {
    pub batch_size: usize,
    /// Seed for the per-epoch reshuffle of shuffled loaders.
    pub seed: u64,
    pub shuffle_train: bool,
    pub shuffle_test: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self { batch_size: 128, seed: 0, shuffle_train: true, shuffle_test: false }
    }
}

/// Batches a role dataset, reshuffling per epoch when `shuffle` is set.
///
/// The order for an epoch is a function of `(seed, epoch)`, so a resumed
/// run replays the same batch order.
#[derive(Debug, Clone)]
pub struct DataLoader {
    dataset: RoleDataset,
    batch_size: usize,
    shuffle: bool,
    seed: u64,
}

impl DataLoader {
    pub fn new(dataset: RoleDataset, batch_size: usize, shuffle: bool, seed: u64) -> TrainingResult<Self> {
        if batch_size == 0 {
            return Err(TrainingError::Configuration("batch_size must be >= 1".to_string()));
        }
        Ok(Self { dataset, batch_size, shuffle, seed })
    }

    #[must_use]
    pub fn dataset(&self) -> &RoleDataset {
        &self.dataset
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[must_use]
    pub fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    /// Block positions in the order they are served during `epoch`.
    #[must_use]
    pub fn epoch_order(&self, epoch: u32) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if self.shuffle {
            let stream = self.seed ^ u64::from(epoch).wrapping_mul(0x9E37_79B9_7F4A_7C15);
            order.shuffle(&mut ChaCha8Rng::seed_from_u64(stream));
        }
        order
    }

    pub fn batches(&self, epoch: u32) -> Batches<'_> {
        Batches { loader: self, order: self.epoch_order(epoch), cursor: 0 }
    }

    fn collate(&self, positions: &[usize]) -> TrainingResult<SampleBatch> {
        let mut flat = Vec::new();
        let mut labels = Vec::with_capacity(positions.len());
        let mut indices = Vec::with_capacity(positions.len());
        let mut width = None;

        for &position in positions {
            let (sample, index) = self.dataset.get(position)?;
            let expected = *width.get_or_insert(sample.features.len());
            if sample.features.len() != expected {
                return Err(self.shape_error(
                    index,
                    format!("{expected} features"),
                    format!("{} features", sample.features.len()),
                ));
            }
            flat.extend(sample.features);
            labels.push(sample.label);
            indices.push(index);
        }

        let rows = labels.len();
        let inputs = Array2::from_shape_vec((rows, width.unwrap_or(0)), flat).map_err(|e| {
            self.shape_error(indices.first().copied().unwrap_or_default(), format!("{rows} rows"), e.to_string())
        })?;
        Ok(SampleBatch { inputs, labels, indices })
    }

    fn shape_error(&self, index: usize, expected: String, actual: String) -> TrainingError {
        TrainingError::DataAccess {
            corpus: self.dataset.corpus().to_string(),
            index: Some(index),
            source: ModelError::ShapeMismatch { expected, actual },
        }
    }
}

/// Iterator over the batches of one epoch.
pub struct Batches<'a> {
    loader: &'a DataLoader,
    order: Vec<usize>,
    cursor: usize,
}

impl Iterator for Batches<'_> {
    type Item = TrainingResult<SampleBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.loader.batch_size).min(self.order.len());
        let batch = self.loader.collate(&self.order[self.cursor..end]);
        self.cursor = end;
        Some(batch)
    }
}

/// Train and test loaders of one role in one view.
#[derive(Debug, Clone)]
pub struct RoleLoaders {
    pub train: DataLoader,
    pub test: DataLoader,
}

/// Loader pairs of one role, one per view.
#[derive(Debug, Clone)]
pub struct LoaderSet {
    role: Role,
    pairs: [Option<RoleLoaders>; 2],
}

impl LoaderSet {
    #[must_use]
    pub fn new(role: Role) -> Self {
        Self { role, pairs: [None, None] }
    }

    /// Builds train/test loaders for both views of `role`.
    pub fn for_role(partitions: &CorpusPartitions, role: Role, options: &LoaderOptions) -> TrainingResult<Self> {
        let mut set = Self::new(role);
        for view in View::ALL {
            let train = DataLoader::new(
                partitions.resolve(role, Split::Train, view),
                options.batch_size,
                options.shuffle_train,
                options.seed,
            )?;
            let test = DataLoader::new(
                partitions.resolve(role, Split::Test, view),
                options.batch_size,
                options.shuffle_test,
                options.seed,
            )?;
            set.insert(view, RoleLoaders { train, test })?;
        }
        Ok(set)
    }

    /// Adds the pair for `view`; both loaders must belong to this set's role.
    pub fn insert(&mut self, view: View, loaders: RoleLoaders) -> TrainingResult<()> {
        for loader in [&loaders.train, &loaders.test] {
            let dataset = loader.dataset();
            if dataset.role() != self.role || dataset.view() != view {
                return Err(TrainingError::Configuration(format!(
                    "{}/{} loader cannot serve as {}/{}",
                    dataset.role(),
                    dataset.view(),
                    self.role,
                    view
                )));
            }
        }
        self.pairs[view.index()] = Some(loaders);
        Ok(())
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// The pair a model with the given augmentation requirement trains on.
    pub fn select(&self, augmented: bool) -> TrainingResult<&RoleLoaders> {
        let view = View::from_augmented(augmented);
        self.pairs[view.index()].as_ref().ok_or_else(|| {
            TrainingError::Configuration(format!("no {} loaders for role {}", view, self.role))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{CorpusDescriptor, DistillTestRule};
    use crate::partition::PARTITION_SEED;
    use std::sync::Arc;
    use trajmia_abstraction::{CorpusView, VecCorpus};

    fn partitions() -> CorpusPartitions {
        let features: Vec<Vec<f32>> = (0..20).map(|i| vec![i as f32, 1.0]).collect();
        let labels: Vec<usize> = (0..20).map(|i| i % 2).collect();
        let view: Arc<dyn CorpusView> = Arc::new(VecCorpus::from_parts(features, labels).unwrap());
        let descriptor =
            CorpusDescriptor::new("toy", &["all"], vec![7, 3, 2, 2, 6], DistillTestRule::ReuseShadowTest, 2);
        CorpusPartitions::from_views(descriptor, Arc::clone(&view), view, PARTITION_SEED).unwrap()
    }

    #[test]
    fn test_batches_cover_block_once() {
        let parts = partitions();
        let loader = DataLoader::new(parts.resolve(Role::Target, Split::Train, View::Canonical), 3, true, 9).unwrap();
        assert_eq!(loader.num_batches(), 3);

        let batches: Vec<SampleBatch> = loader.batches(1).collect::<TrainingResult<_>>().unwrap();
        let sizes: Vec<usize> = batches.iter().map(SampleBatch::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(batches[0].inputs.ncols(), 2);

        let mut seen: Vec<usize> = batches.iter().flat_map(|b| b.indices.clone()).collect();
        seen.sort_unstable();
        let mut expected = loader.dataset().indices().to_vec();
        expected.sort_unstable();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_shuffle_is_per_epoch_and_reproducible() {
        let parts = partitions();
        let dataset = parts.resolve(Role::Distill, Split::Train, View::Canonical);
        let loader = DataLoader::new(dataset.clone(), 2, true, 3).unwrap();
        assert_eq!(loader.epoch_order(4), loader.epoch_order(4));
        assert_ne!(
            (1..=5).map(|e| loader.epoch_order(e)).collect::<Vec<_>>(),
            vec![loader.epoch_order(1); 5]
        );

        let fixed = DataLoader::new(dataset, 2, false, 3).unwrap();
        assert_eq!(fixed.epoch_order(1), (0..6).collect::<Vec<_>>());
        assert_eq!(fixed.epoch_order(2), fixed.epoch_order(1));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let parts = partitions();
        let dataset = parts.resolve(Role::Target, Split::Test, View::Canonical);
        assert!(DataLoader::new(dataset, 0, false, 0).unwrap_err().is_configuration());
    }

    #[test]
    fn test_loader_set_selects_by_augmentation() {
        let parts = partitions();
        let set = LoaderSet::for_role(&parts, Role::Shadow, &LoaderOptions::default()).unwrap();
        assert_eq!(set.select(true).unwrap().train.dataset().view(), View::Augmented);
        assert_eq!(set.select(false).unwrap().test.dataset().view(), View::Canonical);
        assert_eq!(set.select(false).unwrap().test.dataset().role(), Role::Shadow);
    }

    #[test]
    fn test_loader_set_rejects_foreign_role() {
        let parts = partitions();
        let mut set = LoaderSet::new(Role::Target);
        assert!(set.select(true).is_err());
        let train = DataLoader::new(parts.resolve(Role::Shadow, Split::Train, View::Augmented), 2, true, 0).unwrap();
        let test = DataLoader::new(parts.resolve(Role::Shadow, Split::Test, View::Augmented), 2, false, 0).unwrap();
        assert!(set.insert(View::Augmented, RoleLoaders { train, test }).is_err());
    }
}
