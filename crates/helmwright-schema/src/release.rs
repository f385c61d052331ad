use crate::fields::{FieldsExt, ReadableFields};
use crate::keys;
use crate::release_set::ReleaseSet;
use crate::SchemaError;
use serde::Serialize;
use serde_json::{json, Value};

/// A single Helm release, the shorthand form of a one-entry release set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub name: String,
    pub namespace: String,
    pub chart: String,
    pub version: String,
    /// JSON documents, one per values layer.
    pub values: Vec<String>,
    pub verify: bool,
    pub wait: bool,
    pub force: bool,
    pub atomic: bool,
    pub cleanup_on_fail: bool,
    pub timeout: u32,
    pub kubeconfig: String,
    pub kubecontext: String,
    pub bin: String,
    pub helm_bin: String,
    pub helm_version: String,
    pub working_directory: String,
}

/// One entry of the generated `releases:` list.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReleaseEntry<'a> {
    name: &'a str,
    namespace: &'a str,
    chart: &'a str,
    version: &'a str,
    values: Vec<Value>,
    verify: bool,
    wait: bool,
    force: bool,
    atomic: bool,
    cleanup_on_fail: bool,
    timeout: u32,
    kube_context: &'a str,
}

impl Release {
    /// Read a release from attributes. `name` defaults to the resource id and
    /// `namespace` to `default`.
    pub fn from_fields<F: ReadableFields + ?Sized>(fields: &F) -> Result<Self, SchemaError> {
        let name = match fields.get_str(keys::NAME)? {
            Some(n) if !n.is_empty() => n,
            _ => fields.id().to_owned(),
        };
        let namespace = match fields.get_str(keys::NAMESPACE)? {
            Some(ns) if !ns.is_empty() => ns,
            _ => "default".to_owned(),
        };
        Ok(Self {
            name,
            namespace,
            chart: fields.get_str(keys::CHART)?.unwrap_or_default(),
            version: fields.get_str(keys::VERSION)?.unwrap_or_default(),
            values: fields.get_string_list(keys::VALUES)?,
            verify: fields.get_bool(keys::VERIFY)?.unwrap_or(false),
            wait: fields.get_bool(keys::WAIT)?.unwrap_or(false),
            force: fields.get_bool(keys::FORCE)?.unwrap_or(false),
            atomic: fields.get_bool(keys::ATOMIC)?.unwrap_or(false),
            cleanup_on_fail: fields.get_bool(keys::CLEANUP_ON_FAIL)?.unwrap_or(false),
            timeout: fields.get_u32(keys::TIMEOUT)?.unwrap_or(0),
            kubeconfig: fields.get_str(keys::KUBECONFIG)?.unwrap_or_default(),
            kubecontext: fields.get_str(keys::KUBECONTEXT)?.unwrap_or_default(),
            bin: fields.get_str_or(keys::BIN, keys::DEFAULT_BIN)?,
            helm_bin: fields.get_str_or(keys::HELM_BIN, keys::DEFAULT_HELM_BIN)?,
            helm_version: fields.get_str(keys::HELM_VERSION)?.unwrap_or_default(),
            working_directory: fields.get_str(keys::WORKING_DIRECTORY)?.unwrap_or_default(),
        })
    }

    /// Render the one-release manifest. JSON is valid YAML, so the tool reads
    /// it unchanged.
    pub fn manifest(&self) -> Result<String, SchemaError> {
        let values = self
            .values
            .iter()
            .map(|v| serde_json::from_str::<Value>(v))
            .collect::<Result<Vec<_>, _>>()?;
        let entry = ReleaseEntry {
            name: &self.name,
            namespace: &self.namespace,
            chart: &self.chart,
            version: &self.version,
            values,
            verify: self.verify,
            wait: self.wait,
            force: self.force,
            atomic: self.atomic,
            cleanup_on_fail: self.cleanup_on_fail,
            timeout: self.timeout,
            kube_context: &self.kubecontext,
        };
        Ok(serde_json::to_string(&json!({ "releases": [entry] }))?)
    }

    pub fn to_release_set(&self) -> Result<ReleaseSet, SchemaError> {
        Ok(ReleaseSet {
            bin: self.bin.clone(),
            helm_bin: self.helm_bin.clone(),
            content: self.manifest()?,
            environment: "default".to_owned(),
            kubeconfig: self.kubeconfig.clone(),
            helm_version: self.helm_version.clone(),
            working_directory: self.working_directory.clone(),
            ..ReleaseSet::default()
        })
    }
}
