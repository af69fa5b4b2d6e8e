//! Filesystem-backed content-addressed object store.
//!
//! Writes are atomic (temp→rename) and idempotent; reads verify the
//! bytes against their digest so on-disk corruption surfaces as
//! `Integrity` rather than bad data flowing into replay.

use std::fs;
use std::path::PathBuf;

use crate::cas::atomic::atomic_write;
use crate::cas::sharding::shard_path;
use crate::errors::{io_error, Result};
use relvc_core::config::Settings;
use relvc_core::errors::VcError;
use relvc_core::hasher::digest_bytes;
use relvc_core::objects::ObjectStore;
use relvc_core_types::Digest;

/// Durable object store rooted at a directory.
#[derive(Debug)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Open the store at the root named in the engine settings.
    ///
    /// # Errors
    ///
    /// `Io` if the settings carry no `storage_root`.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let root = settings.storage_root.as_ref().ok_or_else(|| VcError::Io {
            op: "open_object_store".to_string(),
            message: "settings carry no storage_root".to_string(),
        })?;
        Ok(Self::new(root.clone()))
    }

    /// Number of stored objects. Walks the shard directories; intended
    /// for tests and diagnostics, not hot paths.
    pub fn object_count(&self) -> Result<usize> {
        if !self.root.exists() {
            return Ok(0);
        }
        let mut count = 0;
        for shard in fs::read_dir(&self.root).map_err(|e| io_error("read_object_root", e))? {
            let shard = shard.map_err(|e| io_error("read_object_root", e))?;
            if !shard.path().is_dir() {
                continue;
            }
            count += fs::read_dir(shard.path())
                .map_err(|e| io_error("read_object_shard", e))?
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "obj"))
                .count();
        }
        Ok(count)
    }
}

impl ObjectStore for FsObjectStore {
    fn put(&self, bytes: &[u8]) -> Result<Digest> {
        let digest = digest_bytes(bytes);
        let target = shard_path(&self.root, &digest);

        if target.exists() {
            // Idempotency check doubles as collision detection.
            let existing = fs::read(&target).map_err(|e| io_error("read_object", e))?;
            if existing == bytes {
                return Ok(digest);
            }
            return Err(VcError::Integrity {
                digest,
                actual: digest_bytes(&existing),
            });
        }

        atomic_write(&target, bytes)?;
        Ok(digest)
    }

    fn get(&self, digest: &Digest) -> Result<Vec<u8>> {
        let path = shard_path(&self.root, digest);
        if !path.exists() {
            return Err(VcError::NotFound { digest: *digest });
        }
        let bytes = fs::read(&path).map_err(|e| io_error("read_object", e))?;
        let actual = digest_bytes(&bytes);
        if actual != *digest {
            return Err(VcError::Integrity {
                digest: *digest,
                actual,
            });
        }
        Ok(bytes)
    }

    fn has(&self, digest: &Digest) -> Result<bool> {
        Ok(shard_path(&self.root, digest).exists())
    }
}
