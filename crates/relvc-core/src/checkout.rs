//! Checkout planning and materialization.
//!
//! Checkout never replays history from the root: it moves along the
//! lowest-common-ancestor path between the current image and the target
//! (inverting deltas backward, applying them forward), or starts from the
//! target's nearest snapshot floor when that is cheaper or when the two
//! images share no history. The caller materializes into a staging state
//! and swaps only on success, so a failed checkout has no observable
//! effect.

use crate::diff::{apply, invert};
use crate::errors::{Result, VcError};
use crate::model::TableState;
use crate::objects::{get_delta, get_snapshot, ObjectStore};
use crate::tree::CommitTree;
use relvc_core_types::Digest;

/// Where replay begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanStart {
    /// Start from the mountpoint's current materialized state
    Current,
    /// Load the full snapshot carried by this image
    Snapshot(Digest),
}

/// A materialization path chosen by [`plan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutPlan {
    pub start: PlanStart,
    /// Images whose deltas are applied inverted, newest first
    pub undo: Vec<Digest>,
    /// Images whose deltas are applied forward, in commit order
    pub redo: Vec<Digest>,
}

impl CheckoutPlan {
    pub fn is_noop(&self) -> bool {
        self.start == PlanStart::Current && self.undo.is_empty() && self.redo.is_empty()
    }

    /// Number of payload objects the plan touches; the unit the planner
    /// minimizes (a snapshot load counts as one).
    pub fn cost(&self) -> usize {
        let start_cost = match self.start {
            PlanStart::Current => 0,
            PlanStart::Snapshot(_) => 1,
        };
        start_cost + self.undo.len() + self.redo.len()
    }
}

/// Derivation-chain segment from `from` (inclusive) down to `stop`
/// (exclusive), newest first.
fn chain_above(tree: &CommitTree, from: Digest, stop: Digest) -> Result<Vec<Digest>> {
    let mut segment = Vec::new();
    let mut cursor = from;
    while cursor != stop {
        let node = tree.get(&cursor)?;
        segment.push(cursor);
        cursor = node.image.derivation_parent().ok_or(VcError::NotFound {
            digest: stop,
        })?;
    }
    Ok(segment)
}

/// Whether every image in the segment carries an invertible/replayable
/// delta payload.
fn all_deltas(tree: &CommitTree, segment: &[Digest]) -> Result<bool> {
    for digest in segment {
        if tree.get(digest)?.image.payload.is_snapshot() {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Select the cheapest materialization path from `current` to `target`.
///
/// Candidates:
/// 1. the LCA path (undo back to the common ancestor, redo forward),
///    valid only when every step carries a delta payload;
/// 2. the snapshot-floor path (load `nearest_snapshot_ancestor(target)`,
///    redo forward) — always valid, and the fallback when the images
///    share no history.
///
/// Cost is bounded by `distance(current, L) + distance(L, target)`
/// rather than full-history replay.
///
/// # Errors
///
/// `NotFound` if `target` (or `current`) is not in the tree.
pub fn plan(
    tree: &CommitTree,
    current: Option<Digest>,
    target: Digest,
) -> Result<CheckoutPlan> {
    tree.get(&target)?;

    if current == Some(target) {
        return Ok(CheckoutPlan {
            start: PlanStart::Current,
            undo: Vec::new(),
            redo: Vec::new(),
        });
    }

    // Snapshot-floor candidate, always valid.
    let floor = tree.nearest_snapshot_ancestor(target)?;
    let floor_plan = CheckoutPlan {
        start: PlanStart::Snapshot(floor),
        undo: Vec::new(),
        redo: {
            let mut redo = chain_above(tree, target, floor)?;
            redo.reverse();
            redo
        },
    };

    let Some(current) = current else {
        return Ok(floor_plan);
    };
    let Some(lca) = tree.lowest_common_ancestor(current, target)? else {
        return Ok(floor_plan);
    };

    let undo = chain_above(tree, current, lca)?;
    let mut redo = chain_above(tree, target, lca)?;
    redo.reverse();

    // A snapshot payload anywhere on the LCA path cannot be inverted or
    // replayed as a delta; the floor plan already covers that shape.
    if !all_deltas(tree, &undo)? || !all_deltas(tree, &redo)? {
        return Ok(floor_plan);
    }

    let lca_plan = CheckoutPlan {
        start: PlanStart::Current,
        undo,
        redo,
    };
    if lca_plan.cost() <= floor_plan.cost() {
        Ok(lca_plan)
    } else {
        Ok(floor_plan)
    }
}

/// Execute a checkout into a fresh staging state.
///
/// Returns the fully materialized target state; the caller performs the
/// atomic swap (live state + ref repoint) under its namespace lock. Any
/// failure surfaces as `CheckoutFailed{step}` and the inputs are left
/// untouched.
pub fn execute<S: ObjectStore>(
    store: &S,
    tree: &CommitTree,
    current_state: Option<&TableState>,
    current: Option<Digest>,
    target: Digest,
) -> Result<TableState> {
    let plan = plan(tree, current, target).map_err(|e| VcError::checkout_failed("plan", e))?;

    let mut staging = match &plan.start {
        PlanStart::Current => current_state
            .cloned()
            .ok_or_else(|| {
                VcError::checkout_failed(
                    "plan",
                    VcError::InvalidCommit {
                        reason: "mountpoint has no materialized state to start from".to_string(),
                    },
                )
            })?,
        PlanStart::Snapshot(floor) => {
            let node = tree
                .get(floor)
                .map_err(|e| VcError::checkout_failed("load_snapshot", e))?;
            get_snapshot(store, &node.image.payload.object())
                .and_then(|snapshot| snapshot.into_state())
                .map_err(|e| VcError::checkout_failed("load_snapshot", e))?
        }
    };

    // Expected content digest of the final state, tracked along the
    // delta chain for the closing verification.
    let mut expected: Option<Digest> = None;

    for digest in &plan.undo {
        let node = tree
            .get(digest)
            .map_err(|e| VcError::checkout_failed("invert_delta", e))?;
        let delta = get_delta(store, &node.image.payload.object())
            .map_err(|e| VcError::checkout_failed("invert_delta", e))?;
        let inverse = invert(&delta);
        staging =
            apply(&staging, &inverse).map_err(|e| VcError::checkout_failed("invert_delta", e))?;
        expected = Some(inverse.target);
    }

    for digest in &plan.redo {
        let node = tree
            .get(digest)
            .map_err(|e| VcError::checkout_failed("apply_delta", e))?;
        let delta = get_delta(store, &node.image.payload.object())
            .map_err(|e| VcError::checkout_failed("apply_delta", e))?;
        staging =
            apply(&staging, &delta).map_err(|e| VcError::checkout_failed("apply_delta", e))?;
        expected = Some(delta.target);
    }

    if let Some(expected) = expected {
        let actual = staging
            .content_digest()
            .map_err(|e| VcError::checkout_failed("verify", e))?;
        if actual != expected {
            return Err(VcError::checkout_failed(
                "verify",
                VcError::Integrity {
                    digest: expected,
                    actual,
                },
            ));
        }
    }

    Ok(staging)
}

/// Reconstruct the logical state of any reachable image from its
/// snapshot floor. Used by pull-side materialization and history
/// inspection; never touches a live mountpoint.
pub fn reconstruct<S: ObjectStore>(
    store: &S,
    tree: &CommitTree,
    target: Digest,
) -> Result<TableState> {
    execute(store, tree, None, None, target)
}
