//! The state file: the CLI's host-side attribute bag for one resource.

use helmwright_core::ResourceKind;
use helmwright_schema::{keys, ReadableFields, WritableFields};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Attributes computed by the engine. Kept when a resource file replaces the
/// desired-state inputs.
const COMPUTED: &[&str] = &[keys::DIFF_OUTPUT, keys::APPLY_OUTPUT, keys::ERROR, keys::DIRTY];

const KIND_KEY: &str = "kind";

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StateFile {
    #[serde(skip)]
    path: PathBuf,
    #[serde(default)]
    pub kind: ResourceKind,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

/// Desired state read from a user-written JSON resource file.
#[derive(Debug)]
pub struct ResourceFile {
    pub kind: ResourceKind,
    pub attributes: Map<String, Value>,
}

impl StateFile {
    /// Load `path`, or start empty when it does not exist yet.
    pub fn load(path: &Path) -> Result<Self, String> {
        let mut state = match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str::<Self>(&content)
                .map_err(|e| format!("failed to parse state file {}: {e}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no state file yet; starting empty");
                Self::default()
            }
            Err(e) => return Err(format!("failed to read state file {}: {e}", path.display())),
        };
        path.clone_into(&mut state.path);
        Ok(state)
    }

    /// Write atomically next to the target.
    pub fn save(&self) -> Result<(), String> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("JSON serialization failed: {e}"))?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| format!("failed to write state file: {e}"))?;
        tmp.write_all(content.as_bytes())
            .map_err(|e| format!("failed to write state file: {e}"))?;
        tmp.persist(&self.path)
            .map_err(|e| format!("failed to write state file: {}", e.error))?;
        debug!(path = %self.path.display(), id = %self.id, "saved state");
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_empty() && self.attributes.is_empty()
    }

    /// Replace the desired-state inputs with `resource`, keeping the id and
    /// computed outputs.
    pub fn adopt(&mut self, resource: ResourceFile) {
        let mut attributes = resource.attributes;
        for key in COMPUTED {
            if let Some(v) = self.attributes.remove(*key) {
                attributes.entry((*key).to_owned()).or_insert(v);
            }
        }
        self.kind = resource.kind;
        self.attributes = attributes;
    }
}

impl ReadableFields for StateFile {
    fn id(&self) -> &str {
        &self.id
    }

    fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}

impl WritableFields for StateFile {
    fn set(&mut self, key: &str, value: Value) {
        self.attributes.insert(key.to_owned(), value);
    }

    fn set_id(&mut self, id: &str) {
        id.clone_into(&mut self.id);
    }
}

impl ResourceFile {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read resource {}: {e}", path.display()))?;
        Self::parse(&content)
            .map_err(|e| format!("failed to parse resource {}: {e}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        let mut attributes = match serde_json::from_str::<Value>(content) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Err("expected a JSON object".to_owned()),
            Err(e) => return Err(e.to_string()),
        };
        let kind = match attributes.remove(KIND_KEY) {
            None | Some(Value::Null) => ResourceKind::default(),
            Some(v) => serde_json::from_value(v).map_err(|e| format!("invalid kind: {e}"))?,
        };
        Ok(Self { kind, attributes })
    }
}
