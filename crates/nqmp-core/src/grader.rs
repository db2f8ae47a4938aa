//! Response normalization, grading and run-level aggregation.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::dataset::{Answer, AnswerDomain, DatasetItem, Variant};
use crate::ledger::LedgerRecord;

const YES: &[&str] = &["yes", "y", "true", "1"];
const NO: &[&str] = &["no", "n", "false", "0"];
const YES_WORDS: &[&str] = &["yes", "true"];
const NO_WORDS: &[&str] = &["no", "false"];
const EMPTY_LIST: &[&str] = &["", "none", "empty", "-", "[]"];

static ENTITY_ID: OnceLock<Regex> = OnceLock::new();

fn entity_id() -> &'static Regex {
    ENTITY_ID.get_or_init(|| {
        Regex::new(r"^[A-Za-z]+[0-9]+$").expect("entity id pattern is valid")
    })
}

/// A raw response mapped into the answer domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum NormalizedAnswer {
    Boolean(bool),
    Ids(Vec<String>),
    Unparseable,
}

impl NormalizedAnswer {
    pub fn is_unparseable(&self) -> bool {
        matches!(self, NormalizedAnswer::Unparseable)
    }
}

/// Normalize a raw response for the given domain. Never fails.
pub fn normalize(raw: &str, domain: AnswerDomain) -> NormalizedAnswer {
    match domain {
        AnswerDomain::Boolean => normalize_boolean(raw),
        AnswerDomain::IdList => normalize_id_list(raw),
    }
}

fn normalize_boolean(raw: &str) -> NormalizedAnswer {
    let lowered = raw.trim().to_lowercase();
    let token = lowered.trim_matches(|c: char| !c.is_alphanumeric());
    if YES.contains(&token) {
        return NormalizedAnswer::Boolean(true);
    }
    if NO.contains(&token) {
        return NormalizedAnswer::Boolean(false);
    }

    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let has_yes = words.iter().any(|w| YES_WORDS.contains(w));
    let has_no = words.iter().any(|w| NO_WORDS.contains(w));
    match (has_yes, has_no) {
        (true, false) => NormalizedAnswer::Boolean(true),
        (false, true) => NormalizedAnswer::Boolean(false),
        _ => NormalizedAnswer::Unparseable,
    }
}

fn normalize_id_list(raw: &str) -> NormalizedAnswer {
    let trimmed = raw.trim().trim_end_matches('.');
    if EMPTY_LIST.contains(&trimmed.to_lowercase().as_str()) {
        return NormalizedAnswer::Ids(Vec::new());
    }

    let mut ids = BTreeSet::new();
    for token in trimmed.split(|c: char| c == ',' || c == ';' || c.is_whitespace()) {
        let token = token
            .trim_matches(|c: char| matches!(c, '[' | ']' | '(' | ')' | '"' | '\'' | '.' | '`'));
        if token.is_empty() {
            continue;
        }
        if !entity_id().is_match(token) {
            return NormalizedAnswer::Unparseable;
        }
        ids.insert(token.to_ascii_uppercase());
    }
    NormalizedAnswer::Ids(ids.into_iter().collect())
}

/// Whether `normalized` matches the item's ground truth.
///
/// Id lists compare as sets. Unparseable answers and domain mismatches are
/// incorrect.
pub fn grade(item: &DatasetItem, normalized: &NormalizedAnswer) -> bool {
    match (&item.answer, normalized) {
        (Answer::Boolean(gold), NormalizedAnswer::Boolean(got)) => gold == got,
        (Answer::Ids(gold), NormalizedAnswer::Ids(got)) => {
            let gold: BTreeSet<String> = gold.iter().map(|id| id.to_ascii_uppercase()).collect();
            let got: BTreeSet<String> = got.iter().cloned().collect();
            gold == got
        }
        _ => false,
    }
}

/// Joint correctness of a pair.
pub fn aggregate_pair(a: bool, b: bool) -> bool {
    a && b
}

/// Per-operator accuracy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperatorMetrics {
    pub items: usize,
    pub correct_items: usize,
    pub item_accuracy: f64,
    pub pairs: usize,
    pub correct_pairs: usize,
    pub pair_joint_accuracy: f64,
}

/// Run-level accuracy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub items: usize,
    pub correct_items: usize,
    pub errored_items: usize,
    pub unparseable_items: usize,
    pub item_accuracy: f64,
    pub pairs: usize,
    pub correct_pairs: usize,
    pub pair_joint_accuracy: f64,
    pub by_operator: BTreeMap<String, OperatorMetrics>,
}

#[derive(Default)]
struct PairTally {
    operator: String,
    a: Option<bool>,
    b: Option<bool>,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Aggregate ledger records into run metrics.
///
/// Errors count as incorrect; a pair is correct only when both of its items
/// are present and correct.
pub fn aggregate(records: &[LedgerRecord]) -> RunMetrics {
    let mut metrics = RunMetrics::default();
    let mut pairs: BTreeMap<&str, PairTally> = BTreeMap::new();

    for record in records {
        let correct = record.is_correct();
        let operator = record.operator().name().to_string();

        metrics.items += 1;
        metrics.correct_items += usize::from(correct);
        match record {
            LedgerRecord::LlmError(_) => metrics.errored_items += 1,
            LedgerRecord::Graded(r) if r.normalized.is_unparseable() => {
                metrics.unparseable_items += 1
            }
            LedgerRecord::Graded(_) => {}
        }

        let op = metrics.by_operator.entry(operator.clone()).or_default();
        op.items += 1;
        op.correct_items += usize::from(correct);

        let tally = pairs.entry(record.pair_id()).or_default();
        tally.operator = operator;
        match record.variant() {
            Variant::A => tally.a = Some(correct),
            Variant::B => tally.b = Some(correct),
        }
    }

    for tally in pairs.values() {
        let joint = match (tally.a, tally.b) {
            (Some(a), Some(b)) => aggregate_pair(a, b),
            _ => false,
        };
        metrics.pairs += 1;
        metrics.correct_pairs += usize::from(joint);
        let op = metrics.by_operator.entry(tally.operator.clone()).or_default();
        op.pairs += 1;
        op.correct_pairs += usize::from(joint);
    }

    metrics.item_accuracy = ratio(metrics.correct_items, metrics.items);
    metrics.pair_joint_accuracy = ratio(metrics.correct_pairs, metrics.pairs);
    for op in metrics.by_operator.values_mut() {
        op.item_accuracy = ratio(op.correct_items, op.items);
        op.pair_joint_accuracy = ratio(op.correct_pairs, op.pairs);
    }
    metrics
}
