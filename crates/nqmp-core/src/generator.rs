//! Minimal-pair dataset generation.
//!
//! Every pair is built from one synthesized context and one parameter draw;
//! the two variants differ only in the operator phrase. Flip-sensitive
//! operators whose two ground truths coincide, and contexts the operator does
//! not admit, are resampled with the attempt number folded into the seeds.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::context::Context;
use crate::domain::dataset::{Answer, Dataset, DatasetItem, Variant};
use crate::domain::digest::stable_item_id;
use crate::domain::error::{NqmpError, Result};
use crate::domain::operator::{OperatorKind, OperatorSpec, Params, VariantRule};
use crate::obs;
use crate::synth::{derive_seed, synthesize};

/// Resamples allowed per pair after the first attempt.
pub const MAX_RESAMPLES: u32 = 32;

/// Largest context size accepted by [`GenConfig::validate`].
pub const MAX_CONTEXT_ITEMS: usize = 64;

/// Version tag recorded in dataset manifests.
pub const GENERATOR_VERSION: &str = concat!("nqmp-gen/", env!("CARGO_PKG_VERSION"));

const SCHEDULE_STREAM: u64 = 1;
const PARAM_STREAM: u64 = 2;
const CONTEXT_STREAM: u64 = 3;

/// Generator settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenConfig {
    pub seed: u64,
    pub pair_count: usize,
    /// Inclusive lower bound on context size.
    pub min_items: usize,
    /// Inclusive upper bound on context size.
    pub max_items: usize,
    /// Probability of snapping a threshold onto the observed count.
    pub boundary_bias: f64,
}

impl Default for GenConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            pair_count: 100,
            min_items: 6,
            max_items: 14,
            boundary_bias: 0.45,
        }
    }
}

impl GenConfig {
    pub fn validate(&self) -> Result<()> {
        if self.pair_count == 0 {
            return Err(NqmpError::InvalidConfiguration(
                "pair_count must be at least 1".to_string(),
            ));
        }
        if self.pair_count.checked_mul(2).is_none() {
            return Err(NqmpError::InvalidConfiguration(format!(
                "pair_count {} is too large",
                self.pair_count
            )));
        }
        if self.min_items == 0
            || self.min_items > self.max_items
            || self.max_items > MAX_CONTEXT_ITEMS
        {
            return Err(NqmpError::InvalidConfiguration(format!(
                "item range must satisfy 1 <= min_items <= max_items <= {MAX_CONTEXT_ITEMS}, got {}..={}",
                self.min_items, self.max_items
            )));
        }
        if !(0.0..=1.0).contains(&self.boundary_bias) {
            return Err(NqmpError::InvalidConfiguration(format!(
                "boundary_bias must be within [0, 1], got {}",
                self.boundary_bias
            )));
        }
        Ok(())
    }
}

/// Operator for each pair: round-robin over a seed-shuffled catalog.
pub fn operator_schedule(seed: u64, pair_count: usize) -> Vec<OperatorKind> {
    let mut order = OperatorKind::ALL.to_vec();
    let mut rng = ChaCha8Rng::seed_from_u64(derive_seed(&[seed, SCHEDULE_STREAM]));
    order.shuffle(&mut rng);
    order.iter().copied().cycle().take(pair_count).collect()
}

/// Generate `cfg.pair_count` minimal pairs.
pub fn generate(cfg: &GenConfig) -> Result<Dataset> {
    cfg.validate()?;

    let schedule = operator_schedule(cfg.seed, cfg.pair_count);
    let mut items = Vec::with_capacity(cfg.pair_count.saturating_mul(2));
    let mut resamples = 0u64;
    for (index, kind) in schedule.into_iter().enumerate() {
        let (pair, attempts) = generate_pair(cfg, index, kind)?;
        resamples += u64::from(attempts - 1);
        items.extend(pair);
    }

    let dataset = Dataset {
        seed: Some(cfg.seed),
        items,
    };
    obs::emit_dataset_generated(cfg.seed, cfg.pair_count, dataset.items.len(), resamples);
    Ok(dataset)
}

/// Build the pair at `index` for operator `kind`.
///
/// Returns both items and the number of attempts used.
pub fn generate_pair(
    cfg: &GenConfig,
    index: usize,
    kind: OperatorKind,
) -> Result<([DatasetItem; 2], u32)> {
    build_pair(cfg, index, &kind.spec())
}

fn build_pair(
    cfg: &GenConfig,
    index: usize,
    spec: &OperatorSpec,
) -> Result<([DatasetItem; 2], u32)> {
    let kind = spec.kind;
    let pair_id = format!("pair_{index:04}");
    let lo = cfg.min_items.max(spec.min_size);
    let hi = cfg.max_items.max(lo);

    for attempt in 0..=MAX_RESAMPLES {
        let mut rng = ChaCha8Rng::seed_from_u64(derive_seed(&[
            cfg.seed,
            PARAM_STREAM,
            index as u64,
            u64::from(attempt),
        ]));
        let size = rng.gen_range(lo..=hi);
        let context_seed = derive_seed(&[cfg.seed, CONTEXT_STREAM, u64::from(attempt)]);
        let context = synthesize(
            spec.world,
            spec.id_prefix,
            context_seed,
            index as u64,
            size,
        )?;

        if !spec.admits(&context) {
            debug!(
                event = "generate.resample",
                pair_id = %pair_id,
                operator = %kind,
                attempt,
                reason = "inadmissible",
            );
            continue;
        }

        let params = (spec.draw)(&mut rng, &context, cfg.boundary_bias);
        let answer_a = (spec.a.evaluate)(&context, &params);
        let answer_b = (spec.b.evaluate)(&context, &params);
        if spec.flips && answer_a == answer_b {
            debug!(
                event = "generate.resample",
                pair_id = %pair_id,
                operator = %kind,
                attempt,
                reason = "no_flip",
            );
            continue;
        }

        let a = build_item(
            spec,
            &spec.a,
            Variant::A,
            &pair_id,
            params,
            context.clone(),
            answer_a,
        );
        let b = build_item(spec, &spec.b, Variant::B, &pair_id, params, context, answer_b);
        return Ok(([a, b], attempt + 1));
    }

    Err(NqmpError::DegenerateContext {
        pair_id,
        operator: kind.name().to_string(),
        attempts: MAX_RESAMPLES + 1,
    })
}

fn build_item(
    spec: &OperatorSpec,
    rule: &VariantRule,
    variant: Variant,
    pair_id: &str,
    params: Params,
    context: Context,
    answer: Answer,
) -> DatasetItem {
    let question = (rule.render)(&params);
    DatasetItem {
        item_id: stable_item_id(pair_id, variant.as_str(), &question),
        pair_id: pair_id.to_string(),
        operator: spec.kind,
        variant,
        phrase: rule.phrase.to_string(),
        topic: spec.topic.to_string(),
        question,
        params,
        context,
        answer,
        answer_type: spec.domain,
    }
}
