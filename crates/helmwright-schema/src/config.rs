use crate::SchemaError;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Engine settings, read from `helmwright.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Upper bound on the diff text returned by a plan. 0 disables truncation.
    pub max_diff_output_len: usize,
    /// Directory under which `.terraform/helmfile/` cache entries live.
    pub state_root: PathBuf,
    pub install_timeout_secs: u64,
    /// Prefetched binaries, laid out as `<tool>/<version>/<tool>`. Defaults to
    /// `<state_root>/.helmwright/bin`.
    pub install_cache: Option<PathBuf>,
    pub compat: CompatConfig,
}

/// Tool versions from which optional behavior is switched on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompatConfig {
    /// First version whose `build --embed-values` output is used for fingerprints.
    pub embed_values_since: Version,
    /// First version accepting `apply --skip-diff-on-install`.
    pub skip_diff_on_install_since: Version,
}

impl Default for CompatConfig {
    fn default() -> Self {
        Self {
            embed_values_since: Version::new(0, 126, 0),
            skip_diff_on_install_since: Version::new(0, 128, 1),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_diff_output_len: 4096,
            state_root: PathBuf::from("."),
            install_timeout_secs: 60,
            install_cache: None,
            compat: CompatConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, SchemaError> {
        Ok(toml::from_str(content)?)
    }

    /// Load `path` when it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self, SchemaError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_secs)
    }

    pub fn install_cache_dir(&self) -> PathBuf {
        self.install_cache
            .clone()
            .unwrap_or_else(|| self.state_root.join(".helmwright").join("bin"))
    }
}
