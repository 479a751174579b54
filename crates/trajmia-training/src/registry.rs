use crate::corpus::{ConcatCorpus, CorpusDescriptor, SampleLoader};
use crate::error::{TrainingError, TrainingResult};
use crate::partition::Partition;
use crate::role::{Role, Split, View};
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;
use trajmia_abstraction::{CorpusView, LabeledSample};

/// One role's block of one view of a corpus.
///
/// Positions `0..len()` address the block; each item also carries its
/// stable index in the concatenated, pre-partition corpus.
#[derive(Clone)]
pub struct RoleDataset {
    corpus: Arc<str>,
    role: Role,
    split: Split,
    view: View,
    source: Arc<dyn CorpusView>,
    order: Arc<[usize]>,
    range: Range<usize>,
}

impl RoleDataset {
    #[must_use]
    pub fn corpus(&self) -> &str {
        &self.corpus
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn split(&self) -> Split {
        self.split
    }

    #[must_use]
    pub fn view(&self) -> View {
        self.view
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.range.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Stable original indices of the block, in block order.
    #[must_use]
    pub fn indices(&self) -> &[usize] {
        &self.order[self.range.clone()]
    }

    /// Reads the item at `position`, returning it with its stable index.
    pub fn get(&self, position: usize) -> TrainingResult<(LabeledSample, usize)> {
        let index = *self.indices().get(position).ok_or_else(|| {
            TrainingError::Configuration(format!(
                "position {position} out of range for {}/{}/{} block of {} items",
                self.role,
                self.split,
                self.view,
                self.len()
            ))
        })?;
        let sample = self.source.get(index).map_err(|source| TrainingError::DataAccess {
            corpus: self.corpus.to_string(),
            index: Some(index),
            source,
        })?;
        Ok((sample, index))
    }
}

impl std::fmt::Debug for RoleDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleDataset")
            .field("corpus", &self.corpus)
            .field("role", &self.role)
            .field("split", &self.split)
            .field("view", &self.view)
            .field("range", &self.range)
            .finish_non_exhaustive()
    }
}

/// Canonical and augmented views of one corpus, partitioned identically.
///
/// Read-only after construction, so one instance can back several trainers
/// running at once.
pub struct CorpusPartitions {
    descriptor: CorpusDescriptor,
    name: Arc<str>,
    views: [Arc<dyn CorpusView>; 2],
    partitions: [Partition; 2],
}

impl std::fmt::Debug for CorpusPartitions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorpusPartitions")
            .field("descriptor", &self.descriptor)
            .field("name", &self.name)
            .field("partitions", &self.partitions)
            .finish_non_exhaustive()
    }
}

impl CorpusPartitions {
    /// Loads every shard of both views and partitions them.
    pub fn build(descriptor: CorpusDescriptor, loader: &dyn SampleLoader, seed: u64) -> TrainingResult<Self> {
        descriptor.validate()?;
        let load_view = |view: View| -> TrainingResult<Arc<dyn CorpusView>> {
            let parts = descriptor
                .shards
                .iter()
                .map(|shard| {
                    loader.load_shard(&descriptor.name, shard, view).map_err(|source| {
                        TrainingError::DataAccess { corpus: descriptor.name.clone(), index: None, source }
                    })
                })
                .collect::<TrainingResult<Vec<_>>>()?;
            Ok(Arc::new(ConcatCorpus::new(parts)))
        };
        let canonical = load_view(View::Canonical)?;
        let augmented = load_view(View::Augmented)?;
        Self::from_views(descriptor, canonical, augmented, seed)
    }

    /// Partitions already-assembled full-corpus views.
    pub fn from_views(
        descriptor: CorpusDescriptor,
        canonical: Arc<dyn CorpusView>,
        augmented: Arc<dyn CorpusView>,
        seed: u64,
    ) -> TrainingResult<Self> {
        descriptor.validate()?;
        if canonical.len() != augmented.len() {
            return Err(TrainingError::Configuration(format!(
                "corpus '{}' views disagree in size: canonical {} vs augmented {}",
                descriptor.name,
                canonical.len(),
                augmented.len()
            )));
        }

        let canonical_blocks = Partition::new(canonical.len(), &descriptor.block_sizes, seed)?;
        let augmented_blocks = Partition::new(augmented.len(), &descriptor.block_sizes, seed)?;

        tracing::info!(
            corpus = %descriptor.name,
            samples = canonical.len(),
            blocks = ?descriptor.block_sizes,
            distill_test = ?descriptor.distill_test,
            fingerprint = %canonical_blocks.fingerprint(),
            "partitioned corpus"
        );

        Ok(Self {
            name: Arc::from(descriptor.name.as_str()),
            descriptor,
            views: [canonical, augmented],
            partitions: [canonical_blocks, augmented_blocks],
        })
    }

    #[must_use]
    pub fn descriptor(&self) -> &CorpusDescriptor {
        &self.descriptor
    }

    #[must_use]
    pub fn partition(&self, view: View) -> &Partition {
        &self.partitions[view.index()]
    }

    #[must_use]
    pub fn resolve(&self, role: Role, split: Split, view: View) -> RoleDataset {
        let partition = &self.partitions[view.index()];
        let block = self.descriptor.block_index(role, split);
        // validate() pinned the block count to the rule's table
        let range = partition.block_range(block).unwrap_or(0..0);
        RoleDataset {
            corpus: Arc::clone(&self.name),
            role,
            split,
            view,
            source: Arc::clone(&self.views[view.index()]),
            order: Arc::clone(partition.order()),
            range,
        }
    }
}

/// Partitioned corpora addressed by name.
#[derive(Default)]
pub struct DatasetRegistry {
    corpora: HashMap<String, CorpusPartitions>,
}

impl DatasetRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a corpus, replacing any previous one with the same name.
    pub fn register(&mut self, partitions: CorpusPartitions) {
        self.corpora.insert(partitions.descriptor.name.clone(), partitions);
    }

    #[must_use]
    pub fn get(&self, corpus: &str) -> Option<&CorpusPartitions> {
        self.corpora.get(corpus)
    }

    pub fn resolve(&self, corpus: &str, role: Role, split: Split, view: View) -> TrainingResult<RoleDataset> {
        self.get(corpus)
            .map(|partitions| partitions.resolve(role, split, view))
            .ok_or_else(|| TrainingError::Configuration(format!("corpus '{corpus}' is not registered")))
    }
}
