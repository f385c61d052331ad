//! Release sets nested inside a parent resource.
//!
//! The parent carries a list of release-set attribute maps under one key.
//! Each entry is lifted into a [`MemoryFields`], driven through the regular
//! engine operation, and written back in place.

use crate::engine::{new_resource_id, DiffOptions, Engine, ResourceKind};
use crate::fault::barrier;
use crate::CoreError;
use helmwright_schema::{MemoryFields, SchemaError, WritableFields};
use serde_json::{Map, Value};
use tracing::debug;

/// Default parent attribute holding the nested release sets.
pub const EMBEDDED_KEY: &str = "embedded";

/// Lifecycle over the nested release sets stored under one parent attribute.
pub struct EmbeddedSets<'e> {
    engine: &'e Engine,
    attr: String,
}

impl Engine {
    pub fn embedded(&self, attr: &str) -> EmbeddedSets<'_> {
        EmbeddedSets {
            engine: self,
            attr: attr.to_owned(),
        }
    }
}

impl EmbeddedSets<'_> {
    pub fn attr(&self) -> &str {
        &self.attr
    }

    /// Returns true when any entry has a non-empty diff.
    pub fn plan_diff<F: WritableFields + ?Sized>(
        &self,
        parent: &mut F,
        opts: &DiffOptions,
    ) -> Result<bool, CoreError> {
        barrier("plan embedded", || {
            let mut changed = false;
            self.for_each(parent, |engine, entry| {
                let diff = engine.plan_diff(ResourceKind::ReleaseSet, entry, opts)?;
                changed |= !diff.is_empty();
                Ok(())
            })?;
            Ok(changed)
        })
    }

    pub fn create<F: WritableFields + ?Sized>(&self, parent: &mut F) -> Result<(), CoreError> {
        barrier("create embedded", || {
            self.for_each(parent, |engine, entry| {
                engine.create(ResourceKind::ReleaseSet, entry)
            })?;
            parent.set_id(&new_resource_id());
            Ok(())
        })
    }

    pub fn read<F: WritableFields + ?Sized>(&self, parent: &mut F) -> Result<(), CoreError> {
        barrier("read embedded", || {
            self.for_each(parent, |engine, entry| engine.read(ResourceKind::ReleaseSet, entry))
        })
    }

    pub fn update<F: WritableFields + ?Sized>(&self, parent: &mut F) -> Result<(), CoreError> {
        barrier("update embedded", || {
            self.for_each(parent, |engine, entry| {
                engine.update(ResourceKind::ReleaseSet, entry)
            })
        })
    }

    pub fn delete<F: WritableFields + ?Sized>(&self, parent: &mut F) -> Result<(), CoreError> {
        barrier("delete embedded", || {
            self.for_each(parent, |engine, entry| {
                engine.delete(ResourceKind::ReleaseSet, entry)
            })?;
            parent.set_id("");
            Ok(())
        })
    }

    /// Run `op` on every entry, then store the entries back on the parent.
    /// Entries processed before a failure keep their updated attributes.
    fn for_each<F, Op>(&self, parent: &mut F, mut op: Op) -> Result<(), CoreError>
    where
        F: WritableFields + ?Sized,
        Op: FnMut(&Engine, &mut MemoryFields) -> Result<(), CoreError>,
    {
        let mut entries = self.entries(&*parent)?;
        debug!(attr = %self.attr, "processing {} embedded release sets", entries.len());

        let mut result = Ok(());
        for entry in &mut entries {
            if let Err(e) = op(self.engine, entry) {
                result = Err(e);
                break;
            }
        }

        let list = entries.into_iter().map(entry_value).collect();
        parent.set(&self.attr, Value::Array(list));
        result
    }

    fn entries<F: WritableFields + ?Sized>(&self, parent: &F) -> Result<Vec<MemoryFields>, CoreError> {
        let invalid = || SchemaError::InvalidAttribute {
            key: self.attr.clone(),
            expected: "a list of release set objects",
        };
        let Some(Value::Array(items)) = parent.get(&self.attr) else {
            return Err(CoreError::from(invalid()));
        };
        items
            .iter()
            .map(|item| match item {
                Value::Object(map) => Ok(entry_fields(map)),
                _ => Err(CoreError::from(invalid())),
            })
            .collect()
    }
}

const ENTRY_ID: &str = "id";

fn entry_fields(map: &Map<String, Value>) -> MemoryFields {
    let mut attributes = map.clone();
    let id = match attributes.remove(ENTRY_ID) {
        Some(Value::String(s)) => s,
        _ => String::new(),
    };
    MemoryFields { id, attributes }
}

fn entry_value(entry: MemoryFields) -> Value {
    let MemoryFields { id, mut attributes } = entry;
    if !id.is_empty() {
        attributes.insert(ENTRY_ID.to_owned(), Value::String(id));
    }
    Value::Object(attributes)
}
