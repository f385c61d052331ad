use crate::fields::{FieldsExt, ReadableFields};
use crate::identity::sha256_hex;
use crate::keys;
use crate::types::ContentHash;
use crate::SchemaError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Desired state of one helmfile release set.
///
/// Rebuilt from the resource's attributes at the start of every lifecycle
/// operation and never persisted on its own. The serialized form (see
/// [`ReleaseSet::canonical_json`]) holds only desired-state inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseSet {
    pub bin: String,
    pub helm_bin: String,
    pub content: String,
    pub path: String,
    pub values: Vec<String>,
    pub values_files: Vec<String>,
    pub selector: BTreeMap<String, String>,
    pub selectors: Vec<String>,
    pub environment: String,
    pub kubeconfig: String,
    pub environment_variables: BTreeMap<String, String>,
    pub concurrency: u32,
    pub releases_values: BTreeMap<String, String>,
    pub skip_diff_on_missing_files: Vec<String>,
    pub version: String,
    pub helm_version: String,
    pub helm_diff_version: String,
    pub working_directory: String,
}

impl Default for ReleaseSet {
    fn default() -> Self {
        Self {
            bin: keys::DEFAULT_BIN.to_owned(),
            helm_bin: keys::DEFAULT_HELM_BIN.to_owned(),
            content: String::new(),
            path: String::new(),
            values: Vec::new(),
            values_files: Vec::new(),
            selector: BTreeMap::new(),
            selectors: Vec::new(),
            environment: String::new(),
            kubeconfig: String::new(),
            environment_variables: BTreeMap::new(),
            concurrency: 0,
            releases_values: BTreeMap::new(),
            skip_diff_on_missing_files: Vec::new(),
            version: String::new(),
            helm_version: String::new(),
            helm_diff_version: String::new(),
            working_directory: String::new(),
        }
    }
}

impl ReleaseSet {
    /// Rebuild a release set from a resource's attributes.
    ///
    /// When `path` names an existing directory it becomes the working
    /// directory; when it names an existing file its parent does.
    pub fn from_fields<F: ReadableFields + ?Sized>(fields: &F) -> Result<Self, SchemaError> {
        let mut rs = Self {
            bin: non_empty_or(fields.get_str(keys::BIN)?, keys::DEFAULT_BIN),
            helm_bin: non_empty_or(fields.get_str(keys::HELM_BIN)?, keys::DEFAULT_HELM_BIN),
            content: fields.get_str(keys::CONTENT)?.unwrap_or_default(),
            path: fields.get_str(keys::PATH)?.unwrap_or_default(),
            values: read_values(fields)?,
            values_files: fields.get_string_list(keys::VALUES_FILES)?,
            selector: fields.get_string_map(keys::SELECTOR)?,
            selectors: fields.get_string_list(keys::SELECTORS)?,
            environment: fields.get_str(keys::ENVIRONMENT)?.unwrap_or_default(),
            kubeconfig: fields.get_str(keys::KUBECONFIG)?.unwrap_or_default(),
            environment_variables: fields.get_string_map(keys::ENVIRONMENT_VARIABLES)?,
            concurrency: fields.get_u32(keys::CONCURRENCY)?.unwrap_or(0),
            releases_values: fields.get_string_map(keys::RELEASES_VALUES)?,
            skip_diff_on_missing_files: fields.get_string_list(keys::SKIP_DIFF_ON_MISSING_FILES)?,
            version: fields.get_str(keys::VERSION)?.unwrap_or_default(),
            helm_version: fields.get_str(keys::HELM_VERSION)?.unwrap_or_default(),
            helm_diff_version: fields.get_str(keys::HELM_DIFF_VERSION)?.unwrap_or_default(),
            working_directory: fields.get_str(keys::WORKING_DIRECTORY)?.unwrap_or_default(),
        };

        debug!(
            id = fields.id(),
            working_directory = %rs.working_directory,
            "raw working directory"
        );

        if !rs.path.is_empty() {
            match std::fs::metadata(&rs.path) {
                Ok(meta) if meta.is_dir() => rs.working_directory.clone_from(&rs.path),
                Ok(_) => {
                    rs.working_directory = Path::new(&rs.path)
                        .parent()
                        .map(|p| p.to_string_lossy().into_owned())
                        .unwrap_or_default();
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(SchemaError::Io(e)),
            }
        }

        debug!(
            id = fields.id(),
            working_directory = %rs.working_directory,
            "computed working directory"
        );

        Ok(rs)
    }

    /// Reject combinations the tool cannot honor.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if !self.content.is_empty() && self.has_explicit_path() {
            return Err(SchemaError::InvalidConfig(format!(
                "content and path can't be specified together: path={:?}",
                self.path
            )));
        }
        if !self.kubeconfig.is_empty()
            && self.environment_variables.contains_key(keys::KUBECONFIG_ENV)
        {
            return Err(SchemaError::InvalidConfig(format!(
                "'{}' and '{}.{}' can't be specified together",
                keys::KUBECONFIG,
                keys::ENVIRONMENT_VARIABLES,
                keys::KUBECONFIG_ENV
            )));
        }
        Ok(())
    }

    /// True when `path` is set to something other than the conventional default.
    pub fn has_explicit_path(&self) -> bool {
        !self.path.is_empty() && self.path != keys::DEFAULT_MANIFEST_PATH
    }

    /// Manifest path handed to the tool when no inline content is set.
    pub fn manifest_path(&self) -> &str {
        if self.path.is_empty() {
            keys::DEFAULT_MANIFEST_PATH
        } else {
            &self.path
        }
    }

    /// Directory every command runs in. Empty means the process working
    /// directory.
    pub fn working_dir(&self) -> PathBuf {
        if self.working_directory.is_empty() {
            PathBuf::from(".")
        } else {
            PathBuf::from(&self.working_directory)
        }
    }

    /// Credentials file, from the `kubeconfig` attribute or the declared
    /// `KUBECONFIG` environment variable. Empty when neither is set.
    pub fn credentials(&self) -> &str {
        if self.kubeconfig.is_empty() {
            self.environment_variables
                .get(keys::KUBECONFIG_ENV)
                .map_or("", String::as_str)
        } else {
            &self.kubeconfig
        }
    }

    /// Deterministic JSON of the desired-state fields. Struct fields are
    /// emitted in declaration order and maps are sorted.
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn content_hash(&self) -> ContentHash {
        ContentHash::new(sha256_hex(self.canonical_json()))
    }
}

fn non_empty_or(value: Option<String>, default: &str) -> String {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => default.to_owned(),
    }
}

/// Inline overlays are YAML documents. Structured JSON entries are accepted
/// too and rendered as JSON, which the tool reads as YAML.
fn read_values<F: ReadableFields + ?Sized>(fields: &F) -> Result<Vec<String>, SchemaError> {
    match fields.get(keys::VALUES) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                other => Ok(serde_json::to_string(other)?),
            })
            .collect(),
        Some(_) => Err(SchemaError::InvalidAttribute {
            key: keys::VALUES.to_owned(),
            expected: "a list of documents",
        }),
    }
}
