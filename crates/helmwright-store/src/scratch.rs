use crate::layout::StateLayout;
use crate::StoreError;
use helmwright_schema::ContentHash;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Temp directory of a single diff invocation, removed on drop.
///
/// The path is absolute because the tool runs in the release set's working
/// directory, not the state root.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub fn create(layout: &StateLayout, hash: &ContentHash) -> Result<Self, StoreError> {
        let path = layout.scratch_path(hash);
        std::fs::create_dir_all(&path).map_err(|e| StoreError::unavailable(&path, e))?;
        let path = std::path::absolute(&path).map_err(|e| StoreError::unavailable(&path, e))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), "failed to remove scratch dir: {e}");
            }
        }
    }
}
