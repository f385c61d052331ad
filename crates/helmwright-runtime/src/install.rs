//! Pinned binary installation.
//!
//! When a release set pins `version`, `helm_version` or `helm_diff_version`,
//! the matching binaries are materialized through a [`BinaryInstaller`] before
//! any command runs. The whole installation is bounded by a timeout.

use crate::RuntimeError;
use fs2::FileExt;
use helmwright_schema::ReleaseSet;
use std::fmt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Diff plugin version installed alongside a pinned helm when none is given.
pub const DEFAULT_HELM_DIFF_VERSION: &str = "master";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Helmfile,
    Helm,
    HelmDiff,
}

impl Tool {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Helmfile => "helmfile",
            Self::Helm => "helm",
            Self::HelmDiff => "helm-diff",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Given a tool and a version constraint, return the path of a usable binary
/// (or plugin directory for [`Tool::HelmDiff`]).
pub trait BinaryInstaller: Send + Sync {
    fn install(&self, tool: Tool, version: &str) -> Result<PathBuf, RuntimeError>;
}

/// Paths that replace the configured binaries. `None` keeps the configured one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstalledBinaries {
    pub bin: Option<String>,
    pub helm_bin: Option<String>,
    /// Value for `HELM_PLUGINS` when the diff plugin was installed.
    pub helm_plugins: Option<PathBuf>,
}

/// Installs from a prefetched cache laid out as `<root>/<tool>/<version>/<tool>`.
///
/// Installs are serialized within the process by a mutex and across processes
/// by an exclusive lock on `<root>/.lock`.
pub struct CacheInstaller {
    root: PathBuf,
    guard: Mutex<()>,
}

impl CacheInstaller {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, tool: Tool, version: &str) -> PathBuf {
        self.root
            .join(tool.as_str())
            .join(version)
            .join(tool.as_str())
    }
}

impl BinaryInstaller for CacheInstaller {
    fn install(&self, tool: Tool, version: &str) -> Result<PathBuf, RuntimeError> {
        let _in_process = self.guard.lock().unwrap_or_else(PoisonError::into_inner);

        std::fs::create_dir_all(&self.root)?;
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(self.root.join(".lock"))?;
        lock_file
            .lock_exclusive()
            .map_err(|e| RuntimeError::Install(format!("locking install cache: {e}")))?;

        let path = self.path_for(tool, version);
        let found = path.exists();
        if let Err(e) = lock_file.unlock() {
            warn!(path = %self.root.display(), "failed to unlock install cache: {e}");
        }

        if found {
            debug!(%tool, version, path = %path.display(), "using cached binary");
            Ok(path)
        } else {
            Err(RuntimeError::Install(format!(
                "{tool} {version} is not present in the install cache (expected {})",
                path.display()
            )))
        }
    }
}

/// Materialize every pinned binary of `release_set`, failing with
/// [`RuntimeError::Timeout`] if the installer does not finish in time.
pub fn prepare_binaries(
    installer: &Arc<dyn BinaryInstaller>,
    release_set: &ReleaseSet,
    timeout: Duration,
) -> Result<InstalledBinaries, RuntimeError> {
    let mut wanted = Vec::new();
    if !release_set.helm_version.is_empty() {
        wanted.push((Tool::Helm, release_set.helm_version.clone()));
        let diff_version = if release_set.helm_diff_version.is_empty() {
            DEFAULT_HELM_DIFF_VERSION.to_owned()
        } else {
            release_set.helm_diff_version.clone()
        };
        wanted.push((Tool::HelmDiff, diff_version));
    }
    if !release_set.version.is_empty() {
        wanted.push((Tool::Helmfile, release_set.version.clone()));
    }
    if wanted.is_empty() {
        return Ok(InstalledBinaries::default());
    }

    info!(
        tools = ?wanted.iter().map(|(t, v)| format!("{t}@{v}")).collect::<Vec<_>>(),
        "installing pinned binaries"
    );

    let (tx, rx) = mpsc::channel();
    let installer = Arc::clone(installer);
    std::thread::spawn(move || {
        let result = wanted
            .into_iter()
            .map(|(tool, version)| installer.install(tool, &version).map(|p| (tool, p)))
            .collect::<Result<Vec<_>, _>>();
        let _ = tx.send(result);
    });

    let installed = rx.recv_timeout(timeout).map_err(|e| match e {
        RecvTimeoutError::Timeout => RuntimeError::Timeout {
            what: "binary installation".to_owned(),
            secs: timeout.as_secs(),
        },
        RecvTimeoutError::Disconnected => RuntimeError::WorkerLost {
            what: "binary installation".to_owned(),
        },
    })??;

    let mut out = InstalledBinaries::default();
    for (tool, path) in installed {
        match tool {
            Tool::Helmfile => out.bin = Some(path.to_string_lossy().into_owned()),
            Tool::Helm => out.helm_bin = Some(path.to_string_lossy().into_owned()),
            Tool::HelmDiff => out.helm_plugins = path.parent().map(Path::to_path_buf),
        }
    }
    Ok(out)
}
