use crate::layout::StateLayout;
use crate::{write_atomic, StoreError};
use helmwright_schema::Fingerprint;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Computed plans keyed by fingerprint.
///
/// An entry exists only for a non-empty diff: absence of changes is a miss,
/// never an empty-file hit.
#[derive(Debug, Clone)]
pub struct DiffCache {
    layout: StateLayout,
}

impl DiffCache {
    pub fn new(layout: StateLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    pub fn path_for(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.layout.diff_path(fingerprint)
    }

    /// Cached diff text, or `None` when the entry is absent or empty.
    pub fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<String>, StoreError> {
        let path = self.path_for(fingerprint);
        match fs::read_to_string(&path) {
            Ok(text) if text.is_empty() => Ok(None),
            Ok(text) => {
                debug!(path = %path.display(), "diff cache hit");
                Ok(Some(text))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::unavailable(&path, e)),
        }
    }

    pub fn store(&self, fingerprint: &Fingerprint, text: &str) -> Result<PathBuf, StoreError> {
        if text.is_empty() {
            return Err(StoreError::EmptyDiff);
        }
        let path = self.path_for(fingerprint);
        debug!(path = %path.display(), "writing diff file");
        write_atomic(&path, text.as_bytes())?;
        Ok(path)
    }

    /// Best-effort removal. Failures are logged only.
    pub fn invalidate(&self, fingerprint: &Fingerprint) {
        let path = self.path_for(fingerprint);
        match fs::remove_file(&path) {
            Ok(()) => debug!(path = %path.display(), "removed diff file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), "failed to remove diff file: {e}"),
        }
    }
}
