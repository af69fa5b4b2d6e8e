//! Change-set computation, application, and inversion.
//!
//! The three operations obey two laws that the property tests pin down:
//! `apply(a, diff(a, b)) == b` and `apply(apply(a, d), invert(d)) == a`.
//! `apply` refuses to touch any state whose content digest differs from
//! the digest the change-set was computed against.

use tracing::debug;

use crate::diff::model::{ChangeSet, ColumnChange, RowOp};
use crate::errors::{Result, VcError};
use crate::model::TableState;
use relvc_core_types::schema::EVENT_DIFF_COMPUTED;

/// Current change-set structure version.
pub const CHANGESET_SCHEMA_VERSION: u32 = 1;

/// Compute the minimal row-level edit script converting `base` into `target`.
///
/// Ops come out sorted by primary key. A row whose key survives but whose
/// columns changed emits a single `update` listing only the changed
/// columns, never a delete+insert pair.
///
/// # Errors
///
/// - `SchemaMismatch` — the two states have different table schemas
/// - `Serialization` — canonical digest encoding failed
pub fn diff(base: &TableState, target: &TableState) -> Result<ChangeSet> {
    if base.schema() != target.schema() {
        return Err(VcError::SchemaMismatch {
            reason: format!(
                "cannot diff {} against {}: schemas differ",
                base.schema().table_name,
                target.schema().table_name
            ),
        });
    }
    let schema = base.schema();

    let mut ops = Vec::new();
    let mut base_iter = base.iter().peekable();
    let mut target_iter = target.iter().peekable();

    // Merge-walk both states in primary-key order.
    loop {
        match (base_iter.peek(), target_iter.peek()) {
            (Some((bk, brow)), Some((tk, trow))) => {
                if bk < tk {
                    ops.push(RowOp::Delete {
                        key: (*bk).clone(),
                        row: (*brow).clone(),
                    });
                    base_iter.next();
                } else if bk > tk {
                    ops.push(RowOp::Insert {
                        key: (*tk).clone(),
                        row: (*trow).clone(),
                    });
                    target_iter.next();
                } else {
                    if brow != trow {
                        let changes: Vec<ColumnChange> = schema
                            .columns
                            .iter()
                            .zip(brow.iter().zip(trow.iter()))
                            .filter(|(_, (old, new))| old != new)
                            .map(|(col, (old, new))| ColumnChange {
                                column: col.name.clone(),
                                old: old.clone(),
                                new: new.clone(),
                            })
                            .collect();
                        ops.push(RowOp::Update {
                            key: (*bk).clone(),
                            changes,
                        });
                    }
                    base_iter.next();
                    target_iter.next();
                }
            }
            (Some((bk, brow)), None) => {
                ops.push(RowOp::Delete {
                    key: (*bk).clone(),
                    row: (*brow).clone(),
                });
                base_iter.next();
            }
            (None, Some((tk, trow))) => {
                ops.push(RowOp::Insert {
                    key: (*tk).clone(),
                    row: (*trow).clone(),
                });
                target_iter.next();
            }
            (None, None) => break,
        }
    }

    debug!(event = EVENT_DIFF_COMPUTED, op_count = ops.len());

    Ok(ChangeSet {
        changeset_schema_version: CHANGESET_SCHEMA_VERSION,
        base: base.content_digest()?,
        target: target.content_digest()?,
        ops,
    })
}

/// Apply a change-set to the exact base state it was computed against.
///
/// # Errors
///
/// - `BaseMismatch` — the state's content digest is not the change-set's
///   recorded base; applying would silently corrupt, so this check is
///   mandatory before every apply
/// - `Integrity` — the result digest disagrees with the change-set's
///   recorded target (corrupt change-set bytes)
pub fn apply(base: &TableState, changeset: &ChangeSet) -> Result<TableState> {
    let actual = base.content_digest()?;
    if actual != changeset.base {
        return Err(VcError::BaseMismatch {
            expected: changeset.base,
            actual,
        });
    }

    let schema = base.schema().clone();
    let mut next = base.clone();
    for op in &changeset.ops {
        match op {
            RowOp::Insert { row, .. } => {
                next.upsert(row.clone())?;
            }
            RowOp::Delete { key, .. } => {
                next.delete(key);
            }
            RowOp::Update { key, changes } => {
                let mut row = next
                    .get(key)
                    .cloned()
                    .ok_or(VcError::BaseMismatch {
                        expected: changeset.base,
                        actual,
                    })?;
                for change in changes {
                    let idx = schema.column_index(&change.column).ok_or_else(|| {
                        VcError::SchemaMismatch {
                            reason: format!(
                                "change-set references unknown column {}",
                                change.column
                            ),
                        }
                    })?;
                    row[idx] = change.new.clone();
                }
                next.upsert(row)?;
            }
        }
    }

    let produced = next.content_digest()?;
    if produced != changeset.target {
        return Err(VcError::Integrity {
            digest: changeset.target,
            actual: produced,
        });
    }
    Ok(next)
}

/// Produce the reverse edit script.
///
/// Inserts become deletes, deletes become inserts, updates swap old/new
/// per column; base and target digests swap. Key order is unchanged, so
/// the result stays sorted.
pub fn invert(changeset: &ChangeSet) -> ChangeSet {
    let ops = changeset
        .ops
        .iter()
        .map(|op| match op {
            RowOp::Insert { key, row } => RowOp::Delete {
                key: key.clone(),
                row: row.clone(),
            },
            RowOp::Delete { key, row } => RowOp::Insert {
                key: key.clone(),
                row: row.clone(),
            },
            RowOp::Update { key, changes } => RowOp::Update {
                key: key.clone(),
                changes: changes
                    .iter()
                    .map(|c| ColumnChange {
                        column: c.column.clone(),
                        old: c.new.clone(),
                        new: c.old.clone(),
                    })
                    .collect(),
            },
        })
        .collect();

    ChangeSet {
        changeset_schema_version: changeset.changeset_schema_version,
        base: changeset.target,
        target: changeset.base,
        ops,
    }
}
