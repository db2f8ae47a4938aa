//! Dataset items, answers and the JSONL dataset file.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::context::Context;
use super::digest::{sha256_hex, stable_item_id};
use super::error::{NqmpError, Result};
use super::operator::{OperatorKind, Params};

/// File name of a generated dataset inside its output directory.
pub const DATASET_FILE: &str = "dataset.jsonl";

/// The answer domain of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerDomain {
    Boolean,
    IdList,
}

impl AnswerDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerDomain::Boolean => "boolean",
            AnswerDomain::IdList => "id_list",
        }
    }
}

/// A ground-truth answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    Boolean(bool),
    Ids(Vec<String>),
}

impl Answer {
    pub fn domain(&self) -> AnswerDomain {
        match self {
            Answer::Boolean(_) => AnswerDomain::Boolean,
            Answer::Ids(_) => AnswerDomain::IdList,
        }
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Answer::Boolean(true) => f.write_str("Yes"),
            Answer::Boolean(false) => f.write_str("No"),
            Answer::Ids(ids) if ids.is_empty() => f.write_str("none"),
            Answer::Ids(ids) => f.write_str(&ids.join(",")),
        }
    }
}

/// Which side of a minimal pair an item is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    A,
    B,
}

impl Variant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::A => "a",
            Variant::B => "b",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One question of a minimal pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetItem {
    pub item_id: String,
    pub pair_id: String,
    pub operator: OperatorKind,
    pub variant: Variant,
    pub phrase: String,
    pub topic: String,
    pub question: String,
    pub params: Params,
    pub context: Context,
    pub answer: Answer,
    pub answer_type: AnswerDomain,
}

/// Sidecar metadata written next to a dataset file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetManifest {
    /// Generation seed; absent when the dataset was not generated from one.
    #[serde(default)]
    pub seed: Option<u64>,
    pub pair_count: usize,
    pub item_count: usize,
    pub digest: String,
    pub generator_version: String,
}

/// An ordered sequence of minimal-pair items, variant `a` then `b` per pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    /// Generation seed, when known.
    pub seed: Option<u64>,
    pub items: Vec<DatasetItem>,
}

/// Path of the manifest belonging to `dataset_path`.
pub fn manifest_path(dataset_path: &Path) -> PathBuf {
    dataset_path.with_extension("manifest.json")
}

impl Dataset {
    pub fn pair_count(&self) -> usize {
        self.items.len() / 2
    }

    /// Items grouped into `(a, b)` pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (&DatasetItem, &DatasetItem)> {
        self.items.chunks_exact(2).map(|pair| (&pair[0], &pair[1]))
    }

    /// One JSON object per line, newline-terminated.
    pub fn to_jsonl(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for item in &self.items {
            serde_json::to_writer(&mut out, item)?;
            out.push(b'\n');
        }
        Ok(out)
    }

    /// SHA-256 of the JSONL encoding.
    pub fn digest(&self) -> Result<String> {
        Ok(sha256_hex(&self.to_jsonl()?))
    }

    /// Check pairing and id invariants, and recompute every ground truth from
    /// the item's context and params.
    pub fn validate(&self) -> Result<()> {
        if self.items.is_empty() || self.items.len() % 2 != 0 {
            return Err(NqmpError::InvalidDataset(format!(
                "expected a positive even number of items, found {}",
                self.items.len()
            )));
        }

        let mut seen = HashSet::new();
        for (a, b) in self.pairs() {
            if a.variant != Variant::A || b.variant != Variant::B {
                return Err(NqmpError::InvalidDataset(format!(
                    "{}: expected variants a then b",
                    a.pair_id
                )));
            }
            if a.pair_id != b.pair_id
                || a.operator != b.operator
                || a.params != b.params
                || a.context != b.context
            {
                return Err(NqmpError::InvalidDataset(format!(
                    "{}: pair items disagree on operator, params or context",
                    a.pair_id
                )));
            }
            if a.question == b.question {
                return Err(NqmpError::InvalidDataset(format!(
                    "{}: pair questions are identical",
                    a.pair_id
                )));
            }
            let spec = a.operator.spec();
            for (item, rule) in [(a, &spec.a), (b, &spec.b)] {
                if item.answer.domain() != item.answer_type {
                    return Err(NqmpError::InvalidDataset(format!(
                        "{}: answer does not match answer_type {}",
                        item.item_id,
                        item.answer_type.as_str()
                    )));
                }
                if (rule.render)(&item.params) != item.question {
                    return Err(NqmpError::InvalidDataset(format!(
                        "{}: question does not match operator {}",
                        item.item_id, item.operator
                    )));
                }
                if (rule.evaluate)(&item.context, &item.params) != item.answer {
                    return Err(NqmpError::InvalidDataset(format!(
                        "{}: stored answer {} is not the ground truth",
                        item.item_id, item.answer
                    )));
                }
                let expected =
                    stable_item_id(&item.pair_id, item.variant.as_str(), &item.question);
                if item.item_id != expected {
                    return Err(NqmpError::InvalidDataset(format!(
                        "{}: item id does not match its content",
                        item.item_id
                    )));
                }
                if !seen.insert(item.item_id.as_str()) {
                    return Err(NqmpError::InvalidDataset(format!(
                        "duplicate item id {}",
                        item.item_id
                    )));
                }
            }
            a.context.validate()?;
        }
        Ok(())
    }

    /// Manifest describing this dataset.
    pub fn manifest(&self, generator_version: &str) -> Result<DatasetManifest> {
        Ok(DatasetManifest {
            seed: self.seed,
            pair_count: self.pair_count(),
            item_count: self.items.len(),
            digest: self.digest()?,
            generator_version: generator_version.to_string(),
        })
    }

    /// Write `dataset.jsonl` and its manifest into `dir`. Returns the dataset path.
    pub fn write_to_dir(&self, dir: &Path, generator_version: &str) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(DATASET_FILE);
        let bytes = self.to_jsonl()?;
        write_atomic(dir, &path, &bytes)?;

        let manifest = self.manifest(generator_version)?;
        let mut manifest_bytes = serde_json::to_vec_pretty(&manifest)?;
        manifest_bytes.push(b'\n');
        write_atomic(dir, &manifest_path(&path), &manifest_bytes)?;
        Ok(path)
    }

    /// Read a JSONL dataset, taking the seed from its manifest when present.
    pub fn read(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let mut items = Vec::new();
        for (idx, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let item: DatasetItem = serde_json::from_str(line).map_err(|e| {
                NqmpError::InvalidDataset(format!("line {}: {e}", idx + 1))
            })?;
            items.push(item);
        }

        let mut dataset = Self { seed: None, items };
        dataset.validate()?;

        let sidecar = manifest_path(path);
        if sidecar.exists() {
            let manifest: DatasetManifest = serde_json::from_slice(&fs::read(&sidecar)?)?;
            let digest = dataset.digest()?;
            if manifest.digest != digest {
                return Err(NqmpError::InvalidDataset(format!(
                    "manifest digest {} does not match dataset digest {digest}",
                    manifest.digest
                )));
            }
            dataset.seed = manifest.seed;
        }
        Ok(dataset)
    }
}

fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{generate, GenConfig};

    #[test]
    fn test_answer_serde_untagged() {
        assert_eq!(serde_json::to_string(&Answer::Boolean(true)).unwrap(), "true");
        assert_eq!(
            serde_json::to_string(&Answer::Ids(vec!["A1".into(), "A3".into()])).unwrap(),
            r#"["A1","A3"]"#
        );
        let back: Answer = serde_json::from_str("[]").unwrap();
        assert_eq!(back, Answer::Ids(vec![]));
    }

    #[test]
    fn test_answer_display() {
        assert_eq!(Answer::Boolean(false).to_string(), "No");
        assert_eq!(Answer::Ids(vec![]).to_string(), "none");
        assert_eq!(Answer::Ids(vec!["X1".into(), "X2".into()]).to_string(), "X1,X2");
    }

    #[test]
    fn test_manifest_path() {
        assert_eq!(
            manifest_path(Path::new("out/dataset.jsonl")),
            PathBuf::from("out/dataset.manifest.json")
        );
    }

    fn flipped(answer: &Answer) -> Answer {
        match answer {
            Answer::Boolean(b) => Answer::Boolean(!b),
            Answer::Ids(ids) if ids.is_empty() => Answer::Ids(vec!["Z9".to_string()]),
            Answer::Ids(_) => Answer::Ids(vec![]),
        }
    }

    #[test]
    fn test_validate_rejects_edited_answer() {
        let mut dataset = generate(&GenConfig {
            pair_count: 15,
            ..GenConfig::default()
        })
        .unwrap();
        dataset.validate().unwrap();

        dataset.items[5].answer = flipped(&dataset.items[5].answer);
        match dataset.validate() {
            Err(NqmpError::InvalidDataset(msg)) => assert!(msg.contains("ground truth"), "{msg}"),
            other => panic!("expected InvalidDataset, got {other:?}"),
        }
    }

    #[test]
    fn test_read_without_manifest_recomputes_answers() {
        let dir = tempfile::tempdir().unwrap();
        let mut dataset = generate(&GenConfig {
            pair_count: 3,
            ..GenConfig::default()
        })
        .unwrap();
        dataset.items[0].answer = flipped(&dataset.items[0].answer);
        let path = dir.path().join(DATASET_FILE);
        fs::write(&path, dataset.to_jsonl().unwrap()).unwrap();

        assert!(matches!(
            Dataset::read(&path),
            Err(NqmpError::InvalidDataset(_))
        ));
    }

    #[test]
    fn test_unknown_seed_stays_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let mut dataset = generate(&GenConfig {
            pair_count: 2,
            ..GenConfig::default()
        })
        .unwrap();
        dataset.seed = None;
        let path = dataset.write_to_dir(dir.path(), "test").unwrap();

        let manifest: DatasetManifest =
            serde_json::from_slice(&fs::read(manifest_path(&path)).unwrap()).unwrap();
        assert_eq!(manifest.seed, None);
        assert_eq!(Dataset::read(&path).unwrap().seed, None);
    }

    #[test]
    fn test_validate_rejects_odd_item_count() {
        let dataset = Dataset {
            seed: None,
            items: vec![],
        };
        assert!(matches!(dataset.validate(), Err(NqmpError::InvalidDataset(_))));
    }
}
