//! Domain models for NQMP.
//!
//! Canonical definitions for the core entities:
//! - `Context`: a synthetic world of labeled entities
//! - `OperatorKind` / `OperatorSpec`: the operator-pair catalog
//! - `DatasetItem` / `Dataset`: generated minimal pairs and their file format

pub mod context;
pub mod dataset;
pub mod digest;
pub mod error;
pub mod operator;

// Re-export main types and errors
pub use context::{AttrKind, AttrValue, AttributeDecl, Context, Entity, World};
pub use dataset::{
    manifest_path, Answer, AnswerDomain, Dataset, DatasetItem, DatasetManifest, Variant,
    DATASET_FILE,
};
pub use digest::{sha256_hex, stable_item_id};
pub use error::{NqmpError, Result};
pub use operator::{OperatorKind, OperatorSpec, Params, VariantRule};
