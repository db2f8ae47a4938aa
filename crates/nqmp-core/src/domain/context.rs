//! Synthetic micro-contexts: small labeled worlds that questions are posed over.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use super::error::{NqmpError, Result};

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Category(String),
}

impl AttrValue {
    pub fn kind(&self) -> AttrKind {
        match self {
            AttrValue::Bool(_) => AttrKind::Boolean,
            AttrValue::Int(_) => AttrKind::Integer,
            AttrValue::Category(_) => AttrKind::Categorical,
        }
    }

    /// Table cell text. Booleans render as `yes`/`no`.
    pub fn render(&self) -> String {
        match self {
            AttrValue::Bool(true) => "yes".to_string(),
            AttrValue::Bool(false) => "no".to_string(),
            AttrValue::Int(n) => n.to_string(),
            AttrValue::Category(s) => s.clone(),
        }
    }
}

/// Declared type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrKind {
    Boolean,
    Integer,
    Categorical,
}

/// One column of a context schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDecl {
    pub name: String,
    pub kind: AttrKind,
}

/// How values of one attribute are drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sampler {
    /// Uniform choice from a fixed category list.
    Choice(&'static [&'static str]),
    /// Bernoulli draw with the given probability of `true`.
    Coin(f64),
    /// Uniform integer in the inclusive range.
    Range(i64, i64),
}

impl Sampler {
    pub fn kind(&self) -> AttrKind {
        match self {
            Sampler::Choice(_) => AttrKind::Categorical,
            Sampler::Coin(_) => AttrKind::Boolean,
            Sampler::Range(..) => AttrKind::Integer,
        }
    }
}

/// Attribute name plus its sampling rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttributeSpec {
    pub name: &'static str,
    pub sampler: Sampler,
}

const COLORS: &[&str] = &["red", "green", "blue", "yellow"];
const SHAPES: &[&str] = &["round", "square", "triangle"];
const SIZES: &[&str] = &["small", "medium", "large"];
const FRUIT_COLORS: &[&str] = &["red", "green", "yellow"];
const FLAG_VALUES: &[&str] = &["ok", "bad"];
const BINARY_COLORS: &[&str] = &["blue", "red"];

const INVENTORY: &[AttributeSpec] = &[
    AttributeSpec {
        name: "color",
        sampler: Sampler::Choice(COLORS),
    },
    AttributeSpec {
        name: "shape",
        sampler: Sampler::Choice(SHAPES),
    },
    AttributeSpec {
        name: "size",
        sampler: Sampler::Choice(SIZES),
    },
    AttributeSpec {
        name: "hat",
        sampler: Sampler::Coin(0.5),
    },
    AttributeSpec {
        name: "height",
        sampler: Sampler::Range(160, 195),
    },
];
const FRUITS: &[AttributeSpec] = &[AttributeSpec {
    name: "color",
    sampler: Sampler::Choice(FRUIT_COLORS),
}];
const FLAGS: &[AttributeSpec] = &[AttributeSpec {
    name: "value",
    sampler: Sampler::Choice(FLAG_VALUES),
}];
const HEIGHTS: &[AttributeSpec] = &[AttributeSpec {
    name: "height",
    sampler: Sampler::Range(160, 185),
}];
const COLOR_PAIRS: &[AttributeSpec] = &[AttributeSpec {
    name: "color",
    sampler: Sampler::Choice(BINARY_COLORS),
}];

/// The kind of world a context describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum World {
    /// Multi-attribute items: color, shape, size, hat, height.
    Inventory,
    /// Fruits with a color.
    Fruits,
    /// Records flagged ok/bad.
    Flags,
    /// People with a height in cm.
    Heights,
    /// Items that are blue or red.
    Colors,
}

impl World {
    /// Attributes, in column order, with their sampling rules.
    pub fn attributes(self) -> &'static [AttributeSpec] {
        match self {
            World::Inventory => INVENTORY,
            World::Fruits => FRUITS,
            World::Flags => FLAGS,
            World::Heights => HEIGHTS,
            World::Colors => COLOR_PAIRS,
        }
    }

    /// Declared schema for contexts of this world.
    pub fn schema(self) -> Vec<AttributeDecl> {
        self.attributes()
            .iter()
            .map(|spec| AttributeDecl {
                name: spec.name.to_string(),
                kind: spec.sampler.kind(),
            })
            .collect()
    }
}

/// A labeled entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub attributes: BTreeMap<String, AttrValue>,
}

impl Entity {
    /// Categorical value of `name`, if present and categorical.
    pub fn category(&self, name: &str) -> Option<&str> {
        match self.attributes.get(name) {
            Some(AttrValue::Category(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Boolean value of `name`, if present and boolean.
    pub fn flag(&self, name: &str) -> Option<bool> {
        match self.attributes.get(name) {
            Some(AttrValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Integer value of `name`, if present and integer.
    pub fn int(&self, name: &str) -> Option<i64> {
        match self.attributes.get(name) {
            Some(AttrValue::Int(n)) => Some(*n),
            _ => None,
        }
    }

    /// True when categorical attribute `name` equals `value`.
    pub fn is(&self, name: &str, value: &str) -> bool {
        self.category(name) == Some(value)
    }
}

/// An ordered, immutable set of entities with a consistent schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    pub world: World,
    pub schema: Vec<AttributeDecl>,
    pub entities: Vec<Entity>,
}

impl Context {
    /// Build a context, enforcing id uniqueness and schema consistency.
    pub fn new(world: World, schema: Vec<AttributeDecl>, entities: Vec<Entity>) -> Result<Self> {
        let context = Self {
            world,
            schema,
            entities,
        };
        context.validate()?;
        Ok(context)
    }

    /// Check the context invariants.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for entity in &self.entities {
            if !seen.insert(entity.id.as_str()) {
                return Err(NqmpError::InvalidDataset(format!(
                    "duplicate entity id {}",
                    entity.id
                )));
            }
            if entity.attributes.len() != self.schema.len() {
                return Err(NqmpError::InvalidDataset(format!(
                    "entity {} has {} attributes, schema declares {}",
                    entity.id,
                    entity.attributes.len(),
                    self.schema.len()
                )));
            }
            for decl in &self.schema {
                match entity.attributes.get(&decl.name) {
                    Some(value) if value.kind() == decl.kind => {}
                    Some(value) => {
                        return Err(NqmpError::InvalidDataset(format!(
                            "entity {} attribute {} is {:?}, expected {:?}",
                            entity.id,
                            decl.name,
                            value.kind(),
                            decl.kind
                        )))
                    }
                    None => {
                        return Err(NqmpError::InvalidDataset(format!(
                            "entity {} missing attribute {}",
                            entity.id, decl.name
                        )))
                    }
                }
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Number of entities satisfying `pred`.
    pub fn count(&self, pred: impl Fn(&Entity) -> bool) -> usize {
        self.entities.iter().filter(|e| pred(e)).count()
    }

    /// Ids of entities satisfying `pred`, in context order.
    pub fn ids_where(&self, pred: impl Fn(&Entity) -> bool) -> Vec<String> {
        self.entities
            .iter()
            .filter(|e| pred(e))
            .map(|e| e.id.clone())
            .collect()
    }

    /// Fixed-order text table used in prompts.
    pub fn render_table(&self) -> String {
        let mut lines = Vec::with_capacity(self.entities.len() + 1);
        let header: Vec<&str> = std::iter::once("ID")
            .chain(self.schema.iter().map(|d| d.name.as_str()))
            .collect();
        lines.push(header.join("  "));
        for entity in &self.entities {
            let mut cells = vec![entity.id.clone()];
            for decl in &self.schema {
                cells.push(
                    entity
                        .attributes
                        .get(&decl.name)
                        .map(AttrValue::render)
                        .unwrap_or_default(),
                );
            }
            lines.push(cells.join("  "));
        }
        lines.join("\n")
    }
}
