//! Sharding for the object directory.
//!
//! Objects land in subdirectories named by the first 2 hex characters of
//! the digest, keeping per-directory entry counts manageable.

use relvc_core_types::Digest;
use std::path::{Path, PathBuf};

/// Path for an object: `<root>/<first-2-hex>/<full-hex>.obj`.
pub fn shard_path(root: &Path, digest: &Digest) -> PathBuf {
    let hex = digest.to_hex();
    root.join(&hex[..2]).join(format!("{}.obj", hex))
}
