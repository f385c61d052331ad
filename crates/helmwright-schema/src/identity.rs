use crate::release_set::ReleaseSet;
use crate::types::Fingerprint;
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(data.as_ref()))
}

/// Compute the diff cache key for a release set.
///
/// The digest covers the normalized read-only tool output followed by the
/// canonical JSON of the release set's desired-state fields. Output
/// attributes (`diff_output`, `apply_output`, `error`, `dirty`) never enter
/// the hash, so recording a plan does not change the key it was stored under.
pub fn compute_fingerprint(normalized_output: &str, release_set: &ReleaseSet) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(normalized_output.as_bytes());
    hasher.update(release_set.canonical_json().as_bytes());
    Fingerprint::new(hex::encode(hasher.finalize()))
}
