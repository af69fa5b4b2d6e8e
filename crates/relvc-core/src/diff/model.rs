//! Change-set output types.
//!
//! All types implement `Debug, Clone, Serialize, Deserialize, PartialEq`.
//! Ops are kept sorted by primary key so serializing the same logical
//! transition always yields the same bytes (and therefore the same
//! object digest).

use serde::{Deserialize, Serialize};

use crate::model::{Datum, Key, Row};
use relvc_core_types::Digest;

/// An old/new pair for a single changed column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnChange {
    /// Column name
    pub column: String,
    /// Value in the base state
    pub old: Datum,
    /// Value in the target state
    pub new: Datum,
}

/// A single row operation, keyed by primary key.
///
/// Delete and update carry the prior values so a change-set can be
/// inverted without access to the base state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RowOp {
    /// Row absent in base, present in target
    Insert { key: Key, row: Row },
    /// Row present in base, absent in target (carries the removed row)
    Delete { key: Key, row: Row },
    /// Same key in both, one or more columns changed
    Update { key: Key, changes: Vec<ColumnChange> },
}

impl RowOp {
    /// Primary key this op addresses.
    pub fn key(&self) -> &Key {
        match self {
            RowOp::Insert { key, .. } | RowOp::Delete { key, .. } | RowOp::Update { key, .. } => {
                key
            }
        }
    }
}

/// An ordered-by-primary-key row-level diff between two table states.
///
/// `changeset_schema_version` is always 1 for this implementation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeSet {
    /// Schema version of this change-set structure (always 1)
    pub changeset_schema_version: u32,
    /// Content digest of the base state this diff was computed against
    pub base: Digest,
    /// Content digest of the state produced by applying this diff
    pub target: Digest,
    /// Row operations sorted by primary key
    pub ops: Vec<RowOp>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }
}
