//! Content-addressed files handed to the tool as `--file` and
//! `--state-values-file` arguments.
//!
//! Names derive from the SHA-256 of the bytes, so identical content always
//! lands in the same file and repeated invocations never bust the diff cache
//! with fresh temp names. Files are never deleted here.

use crate::{write_atomic, StoreError};
use helmwright_schema::sha256_hex;
use std::path::Path;
use tracing::debug;

pub const MANIFEST_PREFIX: &str = "helmfile-";
pub const VALUES_PREFIX: &str = "temp.values-";

/// Write inline manifest content into `dir` and return the file name.
pub fn materialize_manifest(dir: &Path, content: &str) -> Result<String, StoreError> {
    materialize(dir, MANIFEST_PREFIX, content)
}

/// Write one inline value overlay into `dir` and return the file name.
pub fn materialize_values(dir: &Path, document: &str) -> Result<String, StoreError> {
    materialize(dir, VALUES_PREFIX, document)
}

fn materialize(dir: &Path, prefix: &str, data: &str) -> Result<String, StoreError> {
    let name = format!("{prefix}{}.yaml", sha256_hex(data));
    let dest = dir.join(&name);
    match std::fs::read(&dest) {
        Ok(existing) if existing == data.as_bytes() => {
            debug!(path = %dest.display(), "already materialized");
        }
        _ => {
            write_atomic(&dest, data.as_bytes())
                .map_err(|e| match e {
                    StoreError::Io(source) => StoreError::unavailable(&dest, source),
                    other => other,
                })?;
            debug!(path = %dest.display(), "materialized");
        }
    }
    Ok(name)
}
