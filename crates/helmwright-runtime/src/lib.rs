//! Execution layer for helmwright: everything that touches the external tool.
//!
//! This crate turns a `ReleaseSet` into a runnable `Invocation` (`CommandBuilder`),
//! runs it through the pluggable `ToolRunner` trait (`ProcessRunner` spawns real
//! processes, `MockRunner` replays scripted output for tests), interprets exit
//! codes, resolves the tool's semantic version, and materializes pinned binaries
//! through a `BinaryInstaller` bounded by a timeout.

pub mod install;
pub mod invocation;
pub mod mock;
pub mod runner;
pub mod version;

pub use install::{prepare_binaries, BinaryInstaller, CacheInstaller, InstalledBinaries, Tool};
pub use invocation::{CommandBuilder, Invocation};
pub use mock::{MockRunner, RecordedCall};
pub use runner::{run_tool, ProcessRunner, RunMode, ToolOutput, ToolRunner};
pub use version::{parse_version_output, resolve_version, ToolVersion};

use helmwright_schema::SchemaError;
use helmwright_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("resource unavailable: {0}")]
    Unavailable(#[from] StoreError),
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("{program}: {status}\n{output}")]
    ToolFailed {
        program: String,
        status: String,
        output: String,
    },
    #[error("timeout exceeded after {secs}s while waiting for {what}")]
    Timeout { what: String, secs: u64 },
    #[error("worker for {what} exited without a result")]
    WorkerLost { what: String },
    #[error("binary installation failed: {0}")]
    Install(String),
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SchemaError> for RuntimeError {
    fn from(e: SchemaError) -> Self {
        match e {
            SchemaError::InvalidConfig(msg) => Self::InvalidConfig(msg),
            other => Self::InvalidConfig(other.to_string()),
        }
    }
}
