//! Object store interface and payload envelope.
//!
//! The object store is append-only and content-addressed: `put` keys
//! bytes by their SHA256 digest and re-storing identical bytes is a
//! no-op. Payloads are self-describing envelopes tagged with their kind
//! (snapshot or delta) so a reader never has to guess from context.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::diff::ChangeSet;
use crate::errors::{Result, VcError};
use crate::hasher::digest_bytes;
use crate::model::{Row, TableSchema, TableState};
use relvc_core_types::Digest;

/// Durable content-addressed key-value store for serialized objects.
///
/// Writes are safe to run concurrently from many writers: keys are
/// content digests and `put` is idempotent, so no coordination is needed
/// beyond atomic put semantics per key.
pub trait ObjectStore {
    /// Store bytes, returning their content digest. Idempotent.
    fn put(&self, bytes: &[u8]) -> Result<Digest>;

    /// Fetch bytes by digest.
    ///
    /// # Errors
    ///
    /// - `NotFound` — no object under this digest (caller decides fallback)
    /// - `Integrity` — stored bytes rehash to a different digest (fatal)
    /// - `Io` — transient read failure (retryable)
    fn get(&self, digest: &Digest) -> Result<Vec<u8>>;

    /// Whether an object exists under this digest.
    fn has(&self, digest: &Digest) -> Result<bool>;
}

/// Full serialized table state, used as a replay floor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotPayload {
    /// Schema of the serialized table
    pub schema: TableSchema,
    /// Rows in primary-key order
    pub rows: Vec<Row>,
}

impl SnapshotPayload {
    pub fn from_state(state: &TableState) -> Self {
        Self {
            schema: state.schema().clone(),
            rows: state.rows(),
        }
    }

    pub fn into_state(self) -> Result<TableState> {
        TableState::from_rows(self.schema, self.rows)
    }
}

/// Self-describing stored object: a full snapshot or a change-set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObjectPayload {
    Snapshot(SnapshotPayload),
    Delta(ChangeSet),
}

/// Serialize and store a payload, returning its object digest.
pub fn put_payload(store: &impl ObjectStore, payload: &ObjectPayload) -> Result<Digest> {
    let bytes = serde_json::to_vec(payload)?;
    store.put(&bytes)
}

/// Fetch and decode a payload by object digest.
pub fn get_payload(store: &impl ObjectStore, digest: &Digest) -> Result<ObjectPayload> {
    let bytes = store.get(digest)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Fetch a payload that must be a snapshot.
///
/// # Errors
///
/// `Serialization` if the object decodes to a delta instead.
pub fn get_snapshot(store: &impl ObjectStore, digest: &Digest) -> Result<SnapshotPayload> {
    match get_payload(store, digest)? {
        ObjectPayload::Snapshot(snapshot) => Ok(snapshot),
        ObjectPayload::Delta(_) => Err(VcError::Serialization {
            message: format!("object {} is a delta, expected a snapshot", digest),
        }),
    }
}

/// Fetch a payload that must be a change-set.
///
/// # Errors
///
/// `Serialization` if the object decodes to a snapshot instead.
pub fn get_delta(store: &impl ObjectStore, digest: &Digest) -> Result<ChangeSet> {
    match get_payload(store, digest)? {
        ObjectPayload::Delta(changeset) => Ok(changeset),
        ObjectPayload::Snapshot(_) => Err(VcError::Serialization {
            message: format!("object {} is a snapshot, expected a delta", digest),
        }),
    }
}

/// In-memory object store.
///
/// Reference implementation and staging/test backend; the filesystem CAS
/// in `relvc-store` is the durable one.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<Digest, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.read().expect("object store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjectStore for MemoryObjectStore {
    fn put(&self, bytes: &[u8]) -> Result<Digest> {
        let digest = digest_bytes(bytes);
        let mut objects = self.objects.write().expect("object store lock poisoned");
        objects.entry(digest).or_insert_with(|| bytes.to_vec());
        Ok(digest)
    }

    fn get(&self, digest: &Digest) -> Result<Vec<u8>> {
        let objects = self.objects.read().expect("object store lock poisoned");
        let bytes = objects
            .get(digest)
            .cloned()
            .ok_or(VcError::NotFound { digest: *digest })?;
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
        Ok(self
            .objects
            .read()
            .expect("object store lock poisoned")
            .contains_key(digest))
    }
}
