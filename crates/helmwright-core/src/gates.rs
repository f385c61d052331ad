use helmwright_runtime::ToolVersion;
use helmwright_schema::{CompatConfig, OutputKind};
use semver::Version;

/// Optional tool behavior switched on from a minimum version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    /// Fingerprint from `build --embed-values` instead of `template`.
    EmbedValues,
    /// Pass `--skip-diff-on-install` to `apply`.
    SkipDiffOnInstall,
}

/// Ordered table of (minimum version, feature) pairs.
#[derive(Debug, Clone)]
pub struct FeatureGates {
    table: Vec<(Version, Feature)>,
}

impl FeatureGates {
    pub fn from_config(compat: &CompatConfig) -> Self {
        let mut table = vec![
            (compat.embed_values_since.clone(), Feature::EmbedValues),
            (compat.skip_diff_on_install_since.clone(), Feature::SkipDiffOnInstall),
        ];
        table.sort_by(|a, b| a.0.cmp(&b.0));
        Self { table }
    }

    /// Features available at `version`. Empty for an unknown version.
    pub fn enabled(&self, version: &ToolVersion) -> Vec<Feature> {
        self.table
            .iter()
            .filter(|(min, _)| version.at_least(min))
            .map(|(_, f)| *f)
            .collect()
    }

    pub fn is_enabled(&self, feature: Feature, version: &ToolVersion) -> bool {
        self.enabled(version).contains(&feature)
    }

    /// Extra `apply` flags for `version`.
    pub fn apply_flags(&self, version: &ToolVersion) -> Vec<&'static str> {
        let mut flags = Vec::new();
        if self.is_enabled(Feature::SkipDiffOnInstall, version) {
            flags.push("--skip-diff-on-install");
        }
        flags
    }

    /// Read-only sub-command whose output feeds the fingerprint.
    pub fn fingerprint_command(&self, version: &ToolVersion) -> (&'static [&'static str], OutputKind) {
        if self.is_enabled(Feature::EmbedValues, version) {
            (&["build", "--embed-values"], OutputKind::EmbeddedBuild)
        } else {
            (&["template"], OutputKind::Template)
        }
    }
}

impl Default for FeatureGates {
    fn default() -> Self {
        Self::from_config(&CompatConfig::default())
    }
}
