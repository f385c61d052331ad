//! On-disk state for helmwright.
//!
//! This crate provides the storage layer: `StateLayout` for the directory
//! structure under the state root, content-addressed materialization of inline
//! manifests and value overlays (`materialize`), the `DiffCache` holding
//! computed plans keyed by fingerprint, and `ScratchDir` for per-diff temp
//! data. All writes go through a temp file and an atomic rename.

pub mod diff_cache;
pub mod layout;
pub mod materialize;
pub mod scratch;

pub use diff_cache::DiffCache;
pub use layout::StateLayout;
pub use materialize::{materialize_manifest, materialize_values, MANIFEST_PREFIX, VALUES_PREFIX};
pub use scratch::ScratchDir;

use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("refusing to cache an empty diff")]
    EmptyDiff,
    #[error("{} is unavailable: {source}", path.display())]
    Unavailable {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn unavailable(path: &Path, source: std::io::Error) -> Self {
        Self::Unavailable {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Write `data` to `dest` through a temp file in the same directory, then
/// rename. Concurrent writers of identical content race harmlessly.
pub(crate) fn write_atomic(dest: &Path, data: &[u8]) -> Result<(), StoreError> {
    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| StoreError::unavailable(dir, e))?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}
