//! Environment fingerprint.
//!
//! The fingerprint changes when a store directory is copied to another
//! path or another machine class, which is how a cloned store notices it
//! needs an instance id of its own. Only inputs that are fixed for a given
//! directory on a given machine are hashed; CPU affinity, quotas and the
//! like must never mint a new instance.

use crate::error::CoreResult;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Number of hash bytes kept in the fingerprint.
const FINGERPRINT_BYTES: usize = 8;

/// Computes the fingerprint of a store root as 16 lowercase hex digits.
///
/// # Errors
///
/// Returns an error if the root cannot be canonicalized.
pub fn environment_fingerprint(root: &Path) -> CoreResult<String> {
    let root = root.canonicalize()?;
    Ok(fingerprint_of(
        &root.to_string_lossy(),
        std::env::consts::ARCH,
        std::env::consts::OS,
    ))
}

fn fingerprint_of(root: &str, arch: &str, os: &str) -> String {
    let mut hasher = Sha256::new();
    for part in [root, arch, os] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();

    digest[..FINGERPRINT_BYTES]
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}
