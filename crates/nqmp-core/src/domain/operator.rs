//! The operator catalog: fixed pairs of logical operators with their
//! parameter draws, question renderings and ground-truth rules.
//!
//! Each [`OperatorKind`] maps to an [`OperatorSpec`] of plain function
//! pointers. The two [`VariantRule::evaluate`] functions of a spec never call
//! each other, so each ground truth is computed from the context alone.

use std::fmt;

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::context::{Context, Entity, World};
use super::dataset::{Answer, AnswerDomain};

/// Numeric knobs drawn per pair. Unused fields stay `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lo: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hi: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<i64>,
}

impl Params {
    fn k(&self) -> i64 {
        self.k.unwrap_or(0)
    }

    fn lo(&self) -> i64 {
        self.lo.unwrap_or(0)
    }

    fn hi(&self) -> i64 {
        self.hi.unwrap_or(0)
    }

    fn threshold(&self) -> i64 {
        self.threshold.unwrap_or(0)
    }
}

pub type DrawParams = fn(&mut ChaCha8Rng, &Context, f64) -> Params;
pub type RenderQuestion = fn(&Params) -> String;
pub type Evaluate = fn(&Context, &Params) -> Answer;
pub type Admits = fn(&Context) -> bool;

/// Rendering and evaluation for one side of a pair.
#[derive(Debug, Clone, Copy)]
pub struct VariantRule {
    /// The operator phrase that distinguishes this variant.
    pub phrase: &'static str,
    pub render: RenderQuestion,
    pub evaluate: Evaluate,
}

/// Declarative description of one catalog entry.
#[derive(Debug, Clone, Copy)]
pub struct OperatorSpec {
    pub kind: OperatorKind,
    pub world: World,
    pub topic: &'static str,
    pub id_prefix: &'static str,
    pub domain: AnswerDomain,
    /// Whether the two ground truths must differ on every emitted pair.
    pub flips: bool,
    /// Smallest context size for this operator; flip-sensitive entries set it
    /// high enough that a flip is all but certain within the resample budget.
    pub min_size: usize,
    pub draw: DrawParams,
    pub admits: Option<Admits>,
    pub a: VariantRule,
    pub b: VariantRule,
}

impl OperatorSpec {
    /// Whether a context may be used for this operator at all.
    pub fn admits(&self, context: &Context) -> bool {
        self.admits.map_or(true, |admits| admits(context))
    }
}

/// Closed set of operator pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OperatorKind {
    #[serde(rename = "majority/half")]
    MajorityHalf,
    #[serde(rename = "more/atleast_as_many")]
    MoreAtLeastAsMany,
    #[serde(rename = "even/odd")]
    EvenOdd,
    #[serde(rename = "none/notall")]
    NoneNotAll,
    #[serde(rename = "range_inclusive/exclusive")]
    RangeInclusiveExclusive,
    #[serde(rename = "exactly1/atleast1")]
    ExactlyOneAtLeastOne,
    #[serde(rename = "any/all_subset")]
    AnyAllSubset,
    #[serde(rename = "and/or")]
    AndOr,
    #[serde(rename = "unless/or")]
    UnlessOr,
    #[serde(rename = "demorgan_and/or")]
    DeMorganAndOr,
    #[serde(rename = "xor/or")]
    XorOr,
    #[serde(rename = "atleast/atmost")]
    AtLeastAtMost,
    #[serde(rename = "negation")]
    Negation,
    #[serde(rename = "any/all")]
    AnyAll,
    #[serde(rename = "exactly/atleast")]
    ExactlyAtLeast,
}

impl OperatorKind {
    pub const ALL: [OperatorKind; 15] = [
        OperatorKind::MajorityHalf,
        OperatorKind::MoreAtLeastAsMany,
        OperatorKind::EvenOdd,
        OperatorKind::NoneNotAll,
        OperatorKind::RangeInclusiveExclusive,
        OperatorKind::ExactlyOneAtLeastOne,
        OperatorKind::AnyAllSubset,
        OperatorKind::AndOr,
        OperatorKind::UnlessOr,
        OperatorKind::DeMorganAndOr,
        OperatorKind::XorOr,
        OperatorKind::AtLeastAtMost,
        OperatorKind::Negation,
        OperatorKind::AnyAll,
        OperatorKind::ExactlyAtLeast,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            OperatorKind::MajorityHalf => "majority/half",
            OperatorKind::MoreAtLeastAsMany => "more/atleast_as_many",
            OperatorKind::EvenOdd => "even/odd",
            OperatorKind::NoneNotAll => "none/notall",
            OperatorKind::RangeInclusiveExclusive => "range_inclusive/exclusive",
            OperatorKind::ExactlyOneAtLeastOne => "exactly1/atleast1",
            OperatorKind::AnyAllSubset => "any/all_subset",
            OperatorKind::AndOr => "and/or",
            OperatorKind::UnlessOr => "unless/or",
            OperatorKind::DeMorganAndOr => "demorgan_and/or",
            OperatorKind::XorOr => "xor/or",
            OperatorKind::AtLeastAtMost => "atleast/atmost",
            OperatorKind::Negation => "negation",
            OperatorKind::AnyAll => "any/all",
            OperatorKind::ExactlyAtLeast => "exactly/atleast",
        }
    }

    /// Full catalog entry for this operator.
    pub fn spec(self) -> OperatorSpec {
        match self {
            OperatorKind::MajorityHalf => OperatorSpec {
                kind: self,
                world: World::Inventory,
                topic: "inventory",
                id_prefix: "M",
                domain: AnswerDomain::Boolean,
                flips: false,
                min_size: 1,
                draw: no_params,
                admits: None,
                a: VariantRule {
                    phrase: "more than half",
                    render: |_| "Are more than half of the items red?".to_string(),
                    evaluate: |ctx, _| Answer::Boolean(ctx.count(red) * 2 > ctx.len()),
                },
                b: VariantRule {
                    phrase: "at least half",
                    render: |_| "Are at least half of the items red?".to_string(),
                    evaluate: |ctx, _| Answer::Boolean(ctx.count(red) * 2 >= ctx.len()),
                },
            },
            OperatorKind::MoreAtLeastAsMany => OperatorSpec {
                kind: self,
                world: World::Inventory,
                topic: "inventory",
                id_prefix: "C",
                domain: AnswerDomain::Boolean,
                flips: false,
                min_size: 1,
                draw: no_params,
                admits: None,
                a: VariantRule {
                    phrase: "more",
                    render: |_| "Are there more red than green items?".to_string(),
                    evaluate: |ctx, _| Answer::Boolean(ctx.count(red) > ctx.count(green)),
                },
                b: VariantRule {
                    phrase: "at least as many",
                    render: |_| "Are there at least as many red as green items?".to_string(),
                    evaluate: |ctx, _| Answer::Boolean(ctx.count(red) >= ctx.count(green)),
                },
            },
            OperatorKind::EvenOdd => OperatorSpec {
                kind: self,
                world: World::Inventory,
                topic: "inventory",
                id_prefix: "P",
                domain: AnswerDomain::Boolean,
                flips: true,
                min_size: 1,
                draw: no_params,
                admits: None,
                a: VariantRule {
                    phrase: "even",
                    render: |_| "Is the number of red items even?".to_string(),
                    evaluate: |ctx, _| Answer::Boolean(ctx.count(red) % 2 == 0),
                },
                b: VariantRule {
                    phrase: "odd",
                    render: |_| "Is the number of red items odd?".to_string(),
                    evaluate: |ctx, _| Answer::Boolean(ctx.count(red) % 2 == 1),
                },
            },
            OperatorKind::NoneNotAll => OperatorSpec {
                kind: self,
                world: World::Inventory,
                topic: "inventory",
                id_prefix: "N",
                domain: AnswerDomain::Boolean,
                flips: true,
                min_size: 2,
                draw: no_params,
                admits: None,
                a: VariantRule {
                    phrase: "none",
                    render: |_| "Are none of the items red?".to_string(),
                    evaluate: |ctx, _| Answer::Boolean(ctx.count(red) == 0),
                },
                b: VariantRule {
                    phrase: "not all",
                    render: |_| "Are not all of the items red?".to_string(),
                    evaluate: |ctx, _| Answer::Boolean(ctx.count(red) < ctx.len()),
                },
            },
            OperatorKind::RangeInclusiveExclusive => OperatorSpec {
                kind: self,
                world: World::Inventory,
                topic: "inventory",
                id_prefix: "B",
                domain: AnswerDomain::Boolean,
                flips: false,
                min_size: 1,
                draw: draw_range,
                admits: None,
                a: VariantRule {
                    phrase: "inclusive",
                    render: |p| {
                        format!(
                            "Are there between {} and {} red items (inclusive)?",
                            p.lo(),
                            p.hi()
                        )
                    },
                    evaluate: |ctx, p| {
                        let n = ctx.count(red) as i64;
                        Answer::Boolean(p.lo() <= n && n <= p.hi())
                    },
                },
                b: VariantRule {
                    phrase: "exclusive",
                    render: |p| {
                        format!(
                            "Are there between {} and {} red items (exclusive)?",
                            p.lo(),
                            p.hi()
                        )
                    },
                    evaluate: |ctx, p| {
                        let n = ctx.count(red) as i64;
                        Answer::Boolean(p.lo() < n && n < p.hi())
                    },
                },
            },
            OperatorKind::ExactlyOneAtLeastOne => OperatorSpec {
                kind: self,
                world: World::Inventory,
                topic: "inventory",
                id_prefix: "J",
                domain: AnswerDomain::Boolean,
                flips: false,
                min_size: 1,
                draw: no_params,
                admits: None,
                a: VariantRule {
                    phrase: "exactly one",
                    render: |_| "Is exactly one item both red and large?".to_string(),
                    evaluate: |ctx, _| Answer::Boolean(ctx.count(|e| red(e) && large(e)) == 1),
                },
                b: VariantRule {
                    phrase: "at least one",
                    render: |_| "Is at least one item both red and large?".to_string(),
                    evaluate: |ctx, _| Answer::Boolean(ctx.count(|e| red(e) && large(e)) >= 1),
                },
            },
            OperatorKind::AnyAllSubset => OperatorSpec {
                kind: self,
                world: World::Inventory,
                topic: "people",
                id_prefix: "H",
                domain: AnswerDomain::Boolean,
                flips: true,
                min_size: 4,
                draw: no_params,
                admits: Some(has_hatless),
                a: VariantRule {
                    phrase: "any",
                    render: |_| "Is any person without a hat at least 180cm?".to_string(),
                    evaluate: |ctx, _| {
                        Answer::Boolean(
                            ctx.entities
                                .iter()
                                .filter(|e| hatless(e))
                                .any(|e| height(e) >= 180),
                        )
                    },
                },
                b: VariantRule {
                    phrase: "every",
                    render: |_| "Is every person without a hat at least 180cm?".to_string(),
                    evaluate: |ctx, _| {
                        Answer::Boolean(
                            ctx.entities
                                .iter()
                                .filter(|e| hatless(e))
                                .all(|e| height(e) >= 180),
                        )
                    },
                },
            },
            OperatorKind::AndOr => OperatorSpec {
                kind: self,
                world: World::Inventory,
                topic: "inventory",
                id_prefix: "A",
                domain: AnswerDomain::IdList,
                flips: true,
                min_size: 1,
                draw: no_params,
                admits: None,
                a: VariantRule {
                    phrase: "and",
                    render: |_| "List ids that are red and large.".to_string(),
                    evaluate: |ctx, _| Answer::Ids(ctx.ids_where(|e| red(e) && large(e))),
                },
                b: VariantRule {
                    phrase: "or",
                    render: |_| "List ids that are red or large.".to_string(),
                    evaluate: |ctx, _| Answer::Ids(ctx.ids_where(|e| red(e) || large(e))),
                },
            },
            OperatorKind::UnlessOr => OperatorSpec {
                kind: self,
                world: World::Inventory,
                topic: "inventory",
                id_prefix: "U",
                domain: AnswerDomain::IdList,
                flips: true,
                min_size: 1,
                draw: no_params,
                admits: None,
                a: VariantRule {
                    phrase: "unless they are",
                    render: |_| "List ids that are red unless they are round.".to_string(),
                    evaluate: |ctx, _| Answer::Ids(ctx.ids_where(|e| red(e) && !round(e))),
                },
                b: VariantRule {
                    phrase: "or",
                    render: |_| "List ids that are red or round.".to_string(),
                    evaluate: |ctx, _| Answer::Ids(ctx.ids_where(|e| red(e) || round(e))),
                },
            },
            OperatorKind::DeMorganAndOr => OperatorSpec {
                kind: self,
                world: World::Inventory,
                topic: "inventory",
                id_prefix: "D",
                domain: AnswerDomain::IdList,
                flips: true,
                min_size: 1,
                draw: no_params,
                admits: None,
                a: VariantRule {
                    phrase: "and not",
                    render: |_| "List ids that are not red and not large.".to_string(),
                    evaluate: |ctx, _| Answer::Ids(ctx.ids_where(|e| !red(e) && !large(e))),
                },
                b: VariantRule {
                    phrase: "or not",
                    render: |_| "List ids that are not red or not large.".to_string(),
                    evaluate: |ctx, _| Answer::Ids(ctx.ids_where(|e| !red(e) || !large(e))),
                },
            },
            OperatorKind::XorOr => OperatorSpec {
                kind: self,
                world: World::Inventory,
                topic: "inventory",
                id_prefix: "X",
                domain: AnswerDomain::IdList,
                flips: true,
                min_size: 4,
                draw: no_params,
                admits: None,
                a: VariantRule {
                    phrase: "or large but not both",
                    render: |_| "List ids that are red or large but not both.".to_string(),
                    evaluate: |ctx, _| Answer::Ids(ctx.ids_where(|e| red(e) ^ large(e))),
                },
                b: VariantRule {
                    phrase: "or large",
                    render: |_| "List ids that are red or large.".to_string(),
                    evaluate: |ctx, _| Answer::Ids(ctx.ids_where(|e| red(e) || large(e))),
                },
            },
            OperatorKind::AtLeastAtMost => OperatorSpec {
                kind: self,
                world: World::Fruits,
                topic: "fruits",
                id_prefix: "F",
                domain: AnswerDomain::Boolean,
                flips: false,
                min_size: 1,
                draw: |rng, ctx, bias| Params {
                    k: Some(snap_to_count(rng, bias, 2, ctx.count(red))),
                    ..Params::default()
                },
                admits: None,
                a: VariantRule {
                    phrase: "at least",
                    render: |p| format!("Are there at least {} red fruits?", p.k()),
                    evaluate: |ctx, p| Answer::Boolean(ctx.count(red) as i64 >= p.k()),
                },
                b: VariantRule {
                    phrase: "at most",
                    render: |p| format!("Are there at most {} red fruits?", p.k()),
                    evaluate: |ctx, p| Answer::Boolean(ctx.count(red) as i64 <= p.k()),
                },
            },
            OperatorKind::Negation => OperatorSpec {
                kind: self,
                world: World::Flags,
                topic: "flags",
                id_prefix: "I",
                domain: AnswerDomain::IdList,
                flips: true,
                min_size: 1,
                draw: no_params,
                admits: None,
                a: VariantRule {
                    phrase: "with value ok",
                    render: |_| "List ids with value ok.".to_string(),
                    evaluate: |ctx, _| Answer::Ids(ctx.ids_where(|e| e.is("value", "ok"))),
                },
                b: VariantRule {
                    phrase: "that are not ok",
                    render: |_| "List ids that are not ok.".to_string(),
                    evaluate: |ctx, _| Answer::Ids(ctx.ids_where(|e| !e.is("value", "ok"))),
                },
            },
            OperatorKind::AnyAll => OperatorSpec {
                kind: self,
                world: World::Heights,
                topic: "heights",
                id_prefix: "H",
                domain: AnswerDomain::Boolean,
                flips: true,
                min_size: 4,
                draw: draw_height_threshold,
                admits: None,
                a: VariantRule {
                    phrase: "any person",
                    render: |p| format!("Is any person at least {}cm?", p.threshold()),
                    evaluate: |ctx, p| {
                        Answer::Boolean(ctx.entities.iter().any(|e| height(e) >= p.threshold()))
                    },
                },
                b: VariantRule {
                    phrase: "everyone",
                    render: |p| format!("Is everyone at least {}cm?", p.threshold()),
                    evaluate: |ctx, p| {
                        Answer::Boolean(ctx.entities.iter().all(|e| height(e) >= p.threshold()))
                    },
                },
            },
            OperatorKind::ExactlyAtLeast => OperatorSpec {
                kind: self,
                world: World::Colors,
                topic: "colors",
                id_prefix: "R",
                domain: AnswerDomain::Boolean,
                flips: false,
                min_size: 1,
                draw: |rng, ctx, bias| Params {
                    k: Some(snap_to_count(rng, bias, 3, ctx.count(red))),
                    ..Params::default()
                },
                admits: None,
                a: VariantRule {
                    phrase: "exactly",
                    render: |p| format!("Are there exactly {} red items?", p.k()),
                    evaluate: |ctx, p| Answer::Boolean(ctx.count(red) as i64 == p.k()),
                },
                b: VariantRule {
                    phrase: "at least",
                    render: |p| format!("Are there at least {} red items?", p.k()),
                    evaluate: |ctx, p| Answer::Boolean(ctx.count(red) as i64 >= p.k()),
                },
            },
        }
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn red(e: &Entity) -> bool {
    e.is("color", "red")
}

fn green(e: &Entity) -> bool {
    e.is("color", "green")
}

fn large(e: &Entity) -> bool {
    e.is("size", "large")
}

fn round(e: &Entity) -> bool {
    e.is("shape", "round")
}

fn hatless(e: &Entity) -> bool {
    e.flag("hat") == Some(false)
}

fn has_hatless(ctx: &Context) -> bool {
    ctx.count(hatless) > 0
}

fn height(e: &Entity) -> i64 {
    e.int("height").unwrap_or(0)
}

fn no_params(_: &mut ChaCha8Rng, _: &Context, _: f64) -> Params {
    Params::default()
}

/// `default`, or with probability `bias` the observed count itself.
fn snap_to_count(rng: &mut ChaCha8Rng, bias: f64, default: i64, count: usize) -> i64 {
    if rng.gen_bool(bias) {
        count as i64
    } else {
        default
    }
}

fn draw_range(rng: &mut ChaCha8Rng, ctx: &Context, bias: f64) -> Params {
    let n = ctx.len() as i64;
    let mut lo = rng.gen_range(0..=n / 2);
    let mut hi = rng.gen_range(lo.max(1)..=n.max(1));
    if rng.gen_bool(bias) {
        let observed = ctx.count(red) as i64;
        if rng.gen_bool(0.5) {
            lo = observed;
        } else {
            hi = observed;
        }
    }
    Params {
        lo: Some(lo),
        hi: Some(hi),
        ..Params::default()
    }
}

fn draw_height_threshold(rng: &mut ChaCha8Rng, ctx: &Context, bias: f64) -> Params {
    let mut threshold = 180;
    if rng.gen_bool(bias) {
        let heights = ctx.entities.iter().map(height);
        let bound = if rng.gen_bool(0.5) {
            heights.min()
        } else {
            heights.max()
        };
        threshold = bound.unwrap_or(threshold);
    }
    Params {
        threshold: Some(threshold),
        ..Params::default()
    }
}
