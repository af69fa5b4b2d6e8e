//! Content hashing for images and raw objects.
//!
//! Image identity is a pure function of (schema, payload reference,
//! parent edges). Parent edges are sorted before hashing so multi-parent
//! commits hash the same regardless of the order the caller lists them.
//! The encoding is canonical JSON (struct fields serialize in declaration
//! order), matching the digest discipline used for table states.

use sha2::{Digest as _, Sha256};

use crate::errors::Result;
use crate::model::{ParentEdge, PayloadRef, TableSchema};
use relvc_core_types::Digest;

/// SHA256 of raw object bytes; the object-store key function.
pub fn digest_bytes(bytes: &[u8]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Digest::from_bytes(hasher.finalize().into())
}

/// Compute the content digest of an image.
///
/// Deterministic across processes and implementations: same schema,
/// payload reference and parent set always produce the same digest.
/// Creation time and message are deliberately excluded.
///
/// # Errors
///
/// Returns `Serialization` if canonical JSON encoding fails.
pub fn image_digest(
    schema: &TableSchema,
    payload: &PayloadRef,
    parents: &[ParentEdge],
) -> Result<Digest> {
    let mut canonical_parents: Vec<ParentEdge> = parents.to_vec();
    canonical_parents.sort();

    let canonical = serde_json::to_vec(&serde_json::json!({
        "schema": schema,
        "payload": payload,
        "parents": canonical_parents,
    }))?;
    Ok(digest_bytes(&canonical))
}
