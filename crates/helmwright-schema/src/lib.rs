//! Desired-state model, attribute access, output normalization and hashing for helmwright.
//!
//! This crate defines the schema layer: the `ReleaseSet` description rebuilt from a
//! resource's attribute bag on every lifecycle operation, the single-`Release`
//! shorthand that expands into a release set, the `ReadableFields`/`WritableFields`
//! capability traits, the pure output normalizer that strips non-deterministic
//! tool output, SHA-256 content hashing (`Fingerprint`, `ContentHash`), and the
//! engine configuration file.

pub mod config;
pub mod fields;
pub mod identity;
pub mod keys;
pub mod normalize;
pub mod release;
pub mod release_set;
pub mod types;

pub use config::{CompatConfig, EngineConfig};
pub use fields::{FieldsExt, MemoryFields, ReadableFields, WritableFields};
pub use identity::{compute_fingerprint, sha256_hex};
pub use normalize::{normalize_output, OutputKind};
pub use release::Release;
pub use release_set::ReleaseSet;
pub use types::{ContentHash, Fingerprint, ResourceId};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("attribute '{key}' must be {expected}")]
    InvalidAttribute { key: String, expected: &'static str },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),
}
