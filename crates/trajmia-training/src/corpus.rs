//! Corpus descriptors and the sample-loading seam.
//!
//! A `CorpusDescriptor` is the per-corpus configuration the registry is
//! parameterized by: which shards make up the logical corpus, the declared
//! block sizes, and whether the distillation test block is independent or
//! reuses the shadow test block.

use crate::error::{TrainingError, TrainingResult};
use crate::role::{Role, Split, View};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use trajmia_abstraction::{CorpusView, LabeledSample, ModelError};

/// How the distillation test block is obtained.
///
/// Some corpora allocate an independent sixth block, others evaluate the
/// distilled student on the shadow test block. Both layouts are kept as a
/// declared per-corpus rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistillTestRule {
    Independent,
    ReuseShadowTest,
}

// Block order in every list of block sizes: target train, target test, shadow
// train, shadow test, distill train, [distill test].
const INDEPENDENT_BLOCKS: [[usize; 2]; 3] = [[0, 1], [2, 3], [4, 5]];
const REUSE_SHADOW_TEST_BLOCKS: [[usize; 2]; 3] = [[0, 1], [2, 3], [4, 3]];

impl DistillTestRule {
    /// Number of block sizes a descriptor must declare under this rule.
    #[must_use]
    pub const fn expected_blocks(self) -> usize {
        match self {
            Self::Independent => 6,
            Self::ReuseShadowTest => 5,
        }
    }

    const fn table(self) -> &'static [[usize; 2]; 3] {
        match self {
            Self::Independent => &INDEPENDENT_BLOCKS,
            Self::ReuseShadowTest => &REUSE_SHADOW_TEST_BLOCKS,
        }
    }

    /// Index of the partition block serving `(role, split)`.
    #[must_use]
    pub const fn block_index(self, role: Role, split: Split) -> usize {
        self.table()[role.index()][split.index()]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusDescriptor {
    pub name: String,
    /// Sub-collections concatenated, in this order, into the logical corpus.
    pub shards: Vec<String>,
    /// Declared block sizes; must sum to the concatenated corpus size.
    pub block_sizes: Vec<usize>,
    pub distill_test: DistillTestRule,
    pub num_classes: usize,
}

impl CorpusDescriptor {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        shards: &[&str],
        block_sizes: Vec<usize>,
        distill_test: DistillTestRule,
        num_classes: usize,
    ) -> Self {
        Self {
            name: name.into(),
            shards: shards.iter().map(|s| (*s).to_string()).collect(),
            block_sizes,
            distill_test,
            num_classes,
        }
    }

    #[must_use]
    pub fn mnist() -> Self {
        Self::new(
            "mnist",
            &["train", "test"],
            vec![10_000, 10_000, 10_000, 10_000, 20_000, 10_000],
            DistillTestRule::Independent,
            10,
        )
    }

    #[must_use]
    pub fn cifar10() -> Self {
        Self::new(
            "cifar10",
            &["train", "test"],
            vec![10_000, 10_000, 10_000, 10_000, 20_000],
            DistillTestRule::ReuseShadowTest,
            10,
        )
    }

    #[must_use]
    pub fn cifar100() -> Self {
        Self::new(
            "cifar100",
            &["train", "test"],
            vec![10_000, 10_000, 10_000, 10_000, 20_000],
            DistillTestRule::ReuseShadowTest,
            100,
        )
    }

    #[must_use]
    pub fn cinic10() -> Self {
        Self::new(
            "cinic10",
            &["train", "test", "valid"],
            vec![10_000, 10_000, 10_000, 10_000, 220_000, 10_000],
            DistillTestRule::Independent,
            10,
        )
    }

    #[must_use]
    pub fn gtsrb() -> Self {
        Self::new(
            "gtsrb",
            &["train", "test"],
            vec![1_500, 1_500, 1_500, 1_500, 45_838],
            DistillTestRule::ReuseShadowTest,
            43,
        )
    }

    /// Looks up one of the built-in corpora by name.
    pub fn builtin(name: &str) -> TrainingResult<Self> {
        match name {
            "mnist" => Ok(Self::mnist()),
            "cifar10" => Ok(Self::cifar10()),
            "cifar100" => Ok(Self::cifar100()),
            "cinic10" => Ok(Self::cinic10()),
            "gtsrb" => Ok(Self::gtsrb()),
            other => Err(TrainingError::Configuration(format!("unknown corpus: {other}"))),
        }
    }

    #[must_use]
    pub fn total_size(&self) -> usize {
        self.block_sizes.iter().sum()
    }

    #[must_use]
    pub fn block_index(&self, role: Role, split: Split) -> usize {
        self.distill_test.block_index(role, split)
    }

    pub fn validate(&self) -> TrainingResult<()> {
        if self.name.trim().is_empty() {
            return Err(TrainingError::Configuration("corpus name is required".to_string()));
        }
        if self.shards.is_empty() {
            return Err(TrainingError::Configuration(format!("corpus '{}' declares no shards", self.name)));
        }
        if self.num_classes == 0 {
            return Err(TrainingError::Configuration(format!("corpus '{}' declares no classes", self.name)));
        }
        let expected = self.distill_test.expected_blocks();
        if self.block_sizes.len() != expected {
            return Err(TrainingError::Configuration(format!(
                "corpus '{}' declares {} blocks but its distill-test rule needs {}",
                self.name,
                self.block_sizes.len(),
                expected
            )));
        }
        Ok(())
    }
}

/// Source of decoded corpus shards.
///
/// Implementations own decoding and preprocessing; the canonical and
/// augmented views of a shard must enumerate the same items in the same
/// order.
pub trait SampleLoader: Send + Sync {
    fn load_shard(&self, corpus: &str, shard: &str, view: View) -> Result<Arc<dyn CorpusView>, ModelError>;
}

/// Several views addressed as one sequence, in concatenation order.
pub struct ConcatCorpus {
    parts: Vec<Arc<dyn CorpusView>>,
    ends: Vec<usize>,
}

impl ConcatCorpus {
    #[must_use]
    pub fn new(parts: Vec<Arc<dyn CorpusView>>) -> Self {
        let mut ends = Vec::with_capacity(parts.len());
        let mut total = 0;
        for part in &parts {
            total += part.len();
            ends.push(total);
        }
        Self { parts, ends }
    }

    #[must_use]
    pub fn num_parts(&self) -> usize {
        self.parts.len()
    }
}

impl std::fmt::Debug for ConcatCorpus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcatCorpus").field("ends", &self.ends).finish_non_exhaustive()
    }
}

impl CorpusView for ConcatCorpus {
    fn len(&self) -> usize {
        self.ends.last().copied().unwrap_or(0)
    }

    fn get(&self, index: usize) -> Result<LabeledSample, ModelError> {
        let part = self.ends.partition_point(|&end| end <= index);
        let Some(view) = self.parts.get(part) else {
            return Err(ModelError::SampleUnavailable(format!(
                "index {index} out of range for corpus of {} samples",
                self.len()
            )));
        };
        let start = if part == 0 { 0 } else { self.ends[part - 1] };
        view.get(index - start)
    }
}
