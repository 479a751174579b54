//! End-to-end tests for role-scoped dataset resolution.

mod common;

use common::{toy_partitions, toy_sample, ToyLoader, AUGMENT_SHIFT};
use std::collections::HashSet;
use trajmia_training::{
    CorpusDescriptor, CorpusPartitions, DatasetRegistry, DistillTestRule, LoaderOptions, LoaderSet, Role, Split,
    TrainingError, View, PARTITION_SEED,
};

#[test]
fn test_blocks_are_bit_identical_across_builds() {
    let first = toy_partitions();
    let second = toy_partitions();
    for view in View::ALL {
        assert_eq!(first.partition(view).order(), second.partition(view).order());
        assert_eq!(first.partition(view).fingerprint(), second.partition(view).fingerprint());
    }
}

#[test]
fn test_view_does_not_change_stable_indices() {
    let partitions = toy_partitions();
    for role in Role::ALL {
        for split in Split::ALL {
            let canonical = partitions.resolve(role, split, View::Canonical);
            let augmented = partitions.resolve(role, split, View::Augmented);
            assert_eq!(canonical.indices(), augmented.indices(), "{role}/{split}");
        }
    }
}

#[test]
fn test_role_blocks_are_disjoint_and_sized_by_descriptor() {
    let partitions = toy_partitions();
    let mut seen = HashSet::new();
    let expected = [(Role::Target, 4, 4), (Role::Shadow, 4, 4), (Role::Distill, 8, 4)];
    for (role, train_len, test_len) in expected {
        let train = partitions.resolve(role, Split::Train, View::Canonical);
        let test = partitions.resolve(role, Split::Test, View::Canonical);
        assert_eq!(train.len(), train_len);
        assert_eq!(test.len(), test_len);
        for &index in train.indices().iter().chain(test.indices()) {
            assert!(seen.insert(index), "index {index} appears in two blocks");
        }
    }
    assert_eq!(seen.len(), 28);
}

#[test]
fn test_items_carry_their_pre_partition_index() {
    let partitions = toy_partitions();
    let dataset = partitions.resolve(Role::Distill, Split::Train, View::Augmented);
    for position in 0..dataset.len() {
        let (sample, index) = dataset.get(position).unwrap();
        let (features, label) = toy_sample(index);
        assert_eq!(sample.label, label);
        assert_eq!(sample.features[0], features[0] + AUGMENT_SHIFT);
    }
}

#[test]
fn test_reused_shadow_test_block() {
    let descriptor =
        CorpusDescriptor::new("toy", &["train", "test"], vec![4, 4, 4, 8, 8], DistillTestRule::ReuseShadowTest, 3);
    let partitions = CorpusPartitions::build(descriptor, &ToyLoader, PARTITION_SEED).unwrap();
    let shadow_test = partitions.resolve(Role::Shadow, Split::Test, View::Canonical);
    let distill_test = partitions.resolve(Role::Distill, Split::Test, View::Canonical);
    assert_eq!(shadow_test.indices(), distill_test.indices());
}

#[test]
fn test_block_sizes_that_do_not_sum_to_corpus_size_are_rejected() {
    let descriptor =
        CorpusDescriptor::new("toy", &["train", "test"], vec![4, 4, 4, 4, 8, 5], DistillTestRule::Independent, 3);
    let err = CorpusPartitions::build(descriptor, &ToyLoader, PARTITION_SEED).err().unwrap();
    assert!(matches!(err, TrainingError::SizeMismatch { expected: 28, actual: 29 }));
}

#[test]
fn test_unknown_shard_is_data_access_error() {
    let descriptor =
        CorpusDescriptor::new("toy", &["train", "extra"], vec![4, 4, 4, 4, 8, 4], DistillTestRule::Independent, 3);
    let err = CorpusPartitions::build(descriptor, &ToyLoader, PARTITION_SEED).err().unwrap();
    assert!(matches!(err, TrainingError::DataAccess { index: None, .. }));
}

#[test]
fn test_registry_resolves_by_corpus_name() {
    let mut registry = DatasetRegistry::new();
    registry.register(toy_partitions());
    let dataset = registry.resolve("toy", Role::Shadow, Split::Train, View::Canonical).unwrap();
    assert_eq!(dataset.role(), Role::Shadow);
    assert!(registry.resolve("mnist", Role::Shadow, Split::Train, View::Canonical).unwrap_err().is_configuration());
}

#[test]
fn test_loader_set_uses_role_blocks() {
    let partitions = toy_partitions();
    let options = LoaderOptions { batch_size: 3, ..LoaderOptions::default() };
    let set = LoaderSet::for_role(&partitions, Role::Distill, &options).unwrap();
    let pair = set.select(false).unwrap();
    assert_eq!(pair.train.num_batches(), 3);
    assert_eq!(pair.test.num_batches(), 2);
    assert_eq!(pair.train.dataset().indices(), partitions.resolve(Role::Distill, Split::Train, View::Canonical).indices());
}
