//! Lifecycle orchestration for helmwright release sets.
//!
//! This crate ties together the schema, store and runtime layers into the
//! `Engine`: the plan/create/read/update/delete/import entry points with their
//! idempotency guarantees. It also provides the keyed working-directory lock
//! manager, the version-gated feature table, the panic-to-error fault barrier,
//! and processing of release sets embedded in a parent resource.

pub mod concurrency;
pub mod embedded;
pub mod engine;
pub mod fault;
pub mod gates;

pub use concurrency::{KeyGuard, KeyedLocks};
pub use embedded::{EmbeddedSets, EMBEDDED_KEY};
pub use engine::{
    new_resource_id, truncate_diff, DiffOptions, Engine, ResourceKind,
    SHORT_TRUNCATION_NOTICE, TRUNCATION_NOTICE,
};
pub use fault::barrier;
pub use gates::{Feature, FeatureGates};

use helmwright_runtime::RuntimeError;
use helmwright_schema::SchemaError;
use helmwright_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("verifying path {path:?}: {source}")]
    MissingPath {
        path: String,
        source: std::io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unhandled error in {operation}: {message}\n{backtrace}")]
    Internal {
        operation: String,
        message: String,
        backtrace: String,
    },
}

impl CoreError {
    /// The external tool ran and exited with a failure status.
    pub fn is_tool_failure(&self) -> bool {
        matches!(self, Self::Runtime(RuntimeError::ToolFailed { .. }))
    }

    pub fn is_invalid_config(&self) -> bool {
        matches!(
            self,
            Self::Schema(SchemaError::InvalidConfig(_) | SchemaError::InvalidAttribute { .. })
                | Self::Runtime(RuntimeError::InvalidConfig(_))
        )
    }
}
