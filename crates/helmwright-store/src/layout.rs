use helmwright_schema::{ContentHash, Fingerprint};
use std::path::{Path, PathBuf};

const CACHE_DIR: [&str; 2] = [".terraform", "helmfile"];

/// Directory layout under the state root.
///
/// ```text
/// <root>/.terraform/helmfile/diff-<fingerprint>   cached plan text
/// <root>/.terraform/helmfile/temp-<content hash>  scratch dir of one diff
/// ```
#[derive(Debug, Clone)]
pub struct StateLayout {
    root: PathBuf,
}

impl StateLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn cache_dir(&self) -> PathBuf {
        CACHE_DIR.iter().fold(self.root.clone(), |p, c| p.join(c))
    }

    #[inline]
    pub fn diff_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.cache_dir().join(format!("diff-{fingerprint}"))
    }

    #[inline]
    pub fn scratch_path(&self, hash: &ContentHash) -> PathBuf {
        self.cache_dir().join(format!("temp-{hash}"))
    }
}
