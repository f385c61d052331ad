//! Attribute names of the release set and release resources.

pub const VALUES_FILES: &str = "values_files";
pub const VALUES: &str = "values";
pub const SELECTOR: &str = "selector";
pub const SELECTORS: &str = "selectors";
pub const ENVIRONMENT_VARIABLES: &str = "environment_variables";
pub const WORKING_DIRECTORY: &str = "working_directory";
pub const PATH: &str = "path";
pub const CONTENT: &str = "content";
pub const ENVIRONMENT: &str = "environment";
pub const BIN: &str = "binary";
pub const HELM_BIN: &str = "helm_binary";
pub const DIFF_OUTPUT: &str = "diff_output";
pub const ERROR: &str = "error";
pub const APPLY_OUTPUT: &str = "apply_output";
pub const DIRTY: &str = "dirty";
pub const CONCURRENCY: &str = "concurrency";
pub const RELEASES_VALUES: &str = "releases_values";
pub const SKIP_DIFF_ON_MISSING_FILES: &str = "skip_diff_on_missing_files";
pub const KUBECONFIG: &str = "kubeconfig";
pub const VERSION: &str = "version";
pub const HELM_VERSION: &str = "helm_version";
pub const HELM_DIFF_VERSION: &str = "helm_diff_version";

// Single-release resource.
pub const NAMESPACE: &str = "namespace";
pub const NAME: &str = "name";
pub const CHART: &str = "chart";
pub const VERIFY: &str = "verify";
pub const WAIT: &str = "wait";
pub const FORCE: &str = "force";
pub const ATOMIC: &str = "atomic";
pub const CLEANUP_ON_FAIL: &str = "cleanup_on_fail";
pub const TIMEOUT: &str = "timeout";
pub const KUBECONTEXT: &str = "kubecontext";

/// Manifest file name the tool looks for when no path is given.
pub const DEFAULT_MANIFEST_PATH: &str = "helmfile.yaml";
pub const DEFAULT_BIN: &str = "helmfile";
pub const DEFAULT_HELM_BIN: &str = "helm";

/// Environment variable carrying the cluster credentials file.
pub const KUBECONFIG_ENV: &str = "KUBECONFIG";
