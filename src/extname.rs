//! Synthetic naming for files resolved from outside the project boundary.
//!
//! Out-of-tree files have no library-relative name, so they are keyed by a
//! truncated SHA-256 of their absolute path: `{hash}:{stem}`. The mapping is
//! a pure function of the path and therefore stable across runs.

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::consts::EXT_HASH_LEN;

/// Compute the synthetic module key for an out-of-tree file.
pub fn synthetic_key(path: &Path) -> String {
  let mut hasher = Sha256::new();
  hasher.update(path.to_string_lossy().as_bytes());
  let digest = hex::encode(hasher.finalize());

  let stem = path
    .file_stem()
    .map(|s| s.to_string_lossy().into_owned())
    .unwrap_or_default();

  format!("{}:{}", &digest[..EXT_HASH_LEN], stem)
}
