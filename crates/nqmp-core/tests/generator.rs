use std::collections::{BTreeMap, BTreeSet};

use nqmp_core::domain::manifest_path;
use nqmp_core::{generate, Dataset, GenConfig, NqmpError, OperatorKind, GENERATOR_VERSION};

fn config(seed: u64, pair_count: usize) -> GenConfig {
    GenConfig {
        seed,
        pair_count,
        ..GenConfig::default()
    }
}

#[test]
fn same_seed_writes_byte_identical_files() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();

    let path_a = generate(&config(7, 40))
        .unwrap()
        .write_to_dir(dir_a.path(), GENERATOR_VERSION)
        .unwrap();
    let path_b = generate(&config(7, 40))
        .unwrap()
        .write_to_dir(dir_b.path(), GENERATOR_VERSION)
        .unwrap();

    assert_eq!(std::fs::read(&path_a).unwrap(), std::fs::read(&path_b).unwrap());
    assert_eq!(
        std::fs::read(manifest_path(&path_a)).unwrap(),
        std::fs::read(manifest_path(&path_b)).unwrap()
    );
}

#[test]
fn different_seeds_differ() {
    let a = generate(&config(1, 20)).unwrap();
    let b = generate(&config(2, 20)).unwrap();
    assert_ne!(a.digest().unwrap(), b.digest().unwrap());
}

#[test]
fn pairs_share_context_operator_and_params() {
    let dataset = generate(&config(42, 100)).unwrap();
    assert_eq!(dataset.items.len(), 200);
    assert_eq!(dataset.pair_count(), 100);
    dataset.validate().unwrap();

    let mut ids = BTreeSet::new();
    for (a, b) in dataset.pairs() {
        assert_eq!(a.pair_id, b.pair_id);
        assert_eq!(a.operator, b.operator);
        assert_eq!(a.params, b.params);
        assert_eq!(a.context, b.context);
        assert_eq!(a.topic, b.topic);
        assert_ne!(a.question, b.question);
        assert_ne!(a.phrase, b.phrase);
        assert!(ids.insert(a.item_id.clone()));
        assert!(ids.insert(b.item_id.clone()));
    }
}

#[test]
fn flip_sensitive_operators_always_flip() {
    let dataset = generate(&config(42, 100)).unwrap();
    let mut seen: BTreeMap<OperatorKind, usize> = BTreeMap::new();
    for (a, b) in dataset.pairs() {
        if a.operator.spec().flips {
            assert_ne!(a.answer, b.answer, "{} did not flip", a.pair_id);
            *seen.entry(a.operator).or_default() += 1;
        }
    }
    let expected = OperatorKind::ALL.iter().filter(|k| k.spec().flips).count();
    assert_eq!(seen.len(), expected);
}

#[test]
fn every_operator_scheduled_in_a_full_cycle() {
    let dataset = generate(&config(3, OperatorKind::ALL.len())).unwrap();
    let kinds: BTreeSet<OperatorKind> = dataset.pairs().map(|(a, _)| a.operator).collect();
    assert_eq!(kinds.len(), OperatorKind::ALL.len());
}

#[test]
fn written_dataset_reads_back_with_seed() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = generate(&config(9, 12)).unwrap();
    let path = dataset.write_to_dir(dir.path(), GENERATOR_VERSION).unwrap();

    let back = Dataset::read(&path).unwrap();
    assert_eq!(back, dataset);
    assert_eq!(back.seed, Some(9));
}

#[test]
fn tampered_dataset_fails_digest_check() {
    let dir = tempfile::tempdir().unwrap();
    let path = generate(&config(9, 4))
        .unwrap()
        .write_to_dir(dir.path(), GENERATOR_VERSION)
        .unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    let mut lines: Vec<&str> = raw.lines().collect();
    lines.truncate(6);
    std::fs::write(&path, lines.join("\n") + "\n").unwrap();

    assert!(matches!(
        Dataset::read(&path),
        Err(NqmpError::InvalidDataset(_))
    ));
}

#[test]
fn invalid_config_rejected_before_generation() {
    let cfg = GenConfig {
        min_items: 10,
        max_items: 5,
        ..GenConfig::default()
    };
    assert!(matches!(
        generate(&cfg),
        Err(NqmpError::InvalidConfiguration(_))
    ));
}

#[test]
fn any_valid_size_range_generates() {
    for size in [1, 2, 3] {
        let cfg = GenConfig {
            seed: 42,
            pair_count: 60,
            min_items: size,
            max_items: size,
            ..GenConfig::default()
        };
        assert!(cfg.validate().is_ok());
        let dataset = generate(&cfg).unwrap_or_else(|e| panic!("size {size}: {e}"));
        assert_eq!(dataset.pair_count(), 60);
        for (a, _) in dataset.pairs() {
            assert!(a.context.len() >= size.max(a.operator.spec().min_size));
        }
    }
}
