//! Image records — the nodes of the commit tree.
//!
//! An image is a content-addressed snapshot of one table's logical state.
//! Its digest is a pure function of (schema, payload reference, canonical
//! parent set); creation time and message are provenance metadata and do
//! not participate in the hash.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::table::TableSchema;
use relvc_core_types::Digest;

/// The relation an image has to one of its parents.
///
/// Only `Derivation` edges form the replay lineage (diff payloads apply
/// against the derivation parent); the other kinds record provenance
/// without affecting checkout.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ParentKind {
    /// The image this one's diff payload was computed against
    Derivation,
    /// Script/sgfile provenance: the image a transformation was declared from
    Lineage,
    /// A source image materialized into this one (multi-source imports)
    Source,
}

/// A typed edge from an image to one of its parents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParentEdge {
    pub kind: ParentKind,
    pub target: Digest,
}

impl ParentEdge {
    pub fn derivation(target: Digest) -> Self {
        Self {
            kind: ParentKind::Derivation,
            target,
        }
    }

    pub fn lineage(target: Digest) -> Self {
        Self {
            kind: ParentKind::Lineage,
            target,
        }
    }

    pub fn source(target: Digest) -> Self {
        Self {
            kind: ParentKind::Source,
            target,
        }
    }
}

/// Reference to an image's payload object in the object store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PayloadRef {
    /// Full serialized table state (replay floor)
    Snapshot { object: Digest },
    /// Row-level change-set against the derivation parent
    Delta { object: Digest },
}

impl PayloadRef {
    /// Digest of the referenced payload object.
    pub fn object(&self) -> Digest {
        match self {
            PayloadRef::Snapshot { object } | PayloadRef::Delta { object } => *object,
        }
    }

    pub fn is_snapshot(&self) -> bool {
        matches!(self, PayloadRef::Snapshot { .. })
    }
}

/// A content-addressed snapshot node in the commit tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    /// Content hash of (schema, payload, canonicalized parents)
    pub digest: Digest,

    /// Typed parent edges; empty for a root image
    pub parents: Vec<ParentEdge>,

    /// Schema of the table this image versions
    pub schema: TableSchema,

    /// Payload object reference (snapshot or delta)
    pub payload: PayloadRef,

    /// Timestamp when this image was committed
    pub created_at: DateTime<Utc>,

    /// Optional free-form commit message
    pub message: Option<String>,
}

impl Image {
    /// The primary derivation parent, if any.
    ///
    /// A delta payload applies against this parent's state. Additional
    /// derivation edges (merges) are provenance only.
    pub fn derivation_parent(&self) -> Option<Digest> {
        self.parents
            .iter()
            .find(|e| e.kind == ParentKind::Derivation)
            .map(|e| e.target)
    }

    /// Whether this image has no parents at all.
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }
}
