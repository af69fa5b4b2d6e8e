//! The commit tree: an append-only DAG of images plus mutable refs.
//!
//! Nodes are created once and never rewritten; refs (`HEAD`, tags) are
//! the only mutable entities and are repointed atomically by the caller
//! holding the namespace lock. Depth and the nearest-snapshot-ancestor
//! pointer are computed at commit time so checkout planning never walks
//! further than it has to.

use chrono::Utc;
use std::collections::{BinaryHeap, HashMap, HashSet};
use tracing::info;

use crate::errors::{Result, VcError};
use crate::hasher::image_digest;
use crate::model::{Image, ParentEdge, PayloadRef, TableSchema};
use relvc_core_types::schema::EVENT_COMMIT;
use relvc_core_types::Digest;

/// An image plus tree-navigation data, immutable once committed.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitNode {
    pub image: Image,
    /// Length of the derivation chain from the root (root = 0)
    pub depth: u64,
    /// Closest ancestor (inclusive) whose payload is a full snapshot
    pub snapshot_floor: Digest,
}

/// Append-only commit DAG and refs for one mountpoint namespace.
#[derive(Debug, Clone, Default)]
pub struct CommitTree {
    nodes: HashMap<Digest, CommitNode>,
    refs: HashMap<String, Digest>,
}

impl CommitTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, digest: &Digest) -> bool {
        self.nodes.contains_key(digest)
    }

    /// Look up a committed node.
    pub fn get(&self, digest: &Digest) -> Result<&CommitNode> {
        self.nodes
            .get(digest)
            .ok_or(VcError::NotFound { digest: *digest })
    }

    /// Iterate all nodes (no particular order); used by persistence.
    pub fn nodes(&self) -> impl Iterator<Item = &CommitNode> {
        self.nodes.values()
    }

    /// All refs, sorted by name.
    pub fn list_refs(&self) -> Vec<(String, Digest)> {
        let mut refs: Vec<_> = self
            .refs
            .iter()
            .map(|(name, digest)| (name.clone(), *digest))
            .collect();
        refs.sort();
        refs
    }

    /// Commit a new image.
    ///
    /// Computes the content digest, verifies every parent is present
    /// (pure append keeps the DAG acyclic), and inserts the node with its
    /// cached depth and snapshot floor. Committing identical content is
    /// idempotent and returns the existing image.
    ///
    /// # Errors
    ///
    /// - `Cycle` — a parent digest is not present in the tree
    /// - `InvalidCommit` — a delta payload with no derivation parent
    pub fn commit(
        &mut self,
        parents: Vec<ParentEdge>,
        schema: TableSchema,
        payload: PayloadRef,
        message: Option<String>,
    ) -> Result<Image> {
        let digest = image_digest(&schema, &payload, &parents)?;
        if let Some(node) = self.nodes.get(&digest) {
            return Ok(node.image.clone());
        }

        let image = Image {
            digest,
            parents,
            schema,
            payload,
            created_at: Utc::now(),
            message,
        };
        self.adopt(image.clone())?;
        Ok(image)
    }

    /// Insert an already-built image (a local commit or one fetched
    /// during pull), verifying its digest and parents.
    ///
    /// # Errors
    ///
    /// - `Integrity` — the image's recorded digest does not match its content
    /// - `Cycle` — a parent digest is not present in the tree
    /// - `InvalidCommit` — a delta payload with no derivation parent
    pub fn adopt(&mut self, image: Image) -> Result<()> {
        let recomputed = image_digest(&image.schema, &image.payload, &image.parents)?;
        if recomputed != image.digest {
            return Err(VcError::Integrity {
                digest: image.digest,
                actual: recomputed,
            });
        }
        if self.nodes.contains_key(&image.digest) {
            return Ok(());
        }
        for edge in &image.parents {
            if !self.nodes.contains_key(&edge.target) {
                return Err(VcError::Cycle {
                    parent: edge.target,
                });
            }
        }

        let (depth, snapshot_floor) = match image.derivation_parent() {
            None => {
                if !image.payload.is_snapshot() {
                    return Err(VcError::InvalidCommit {
                        reason: "delta payload with no derivation parent has no replay floor"
                            .to_string(),
                    });
                }
                (0, image.digest)
            }
            Some(parent) => {
                let parent_node = self.get(&parent)?;
                let floor = if image.payload.is_snapshot() {
                    image.digest
                } else {
                    parent_node.snapshot_floor
                };
                (parent_node.depth + 1, floor)
            }
        };

        info!(
            event = EVENT_COMMIT,
            image = %image.digest.short(),
            depth,
            snapshot = image.payload.is_snapshot(),
        );
        self.nodes.insert(
            image.digest,
            CommitNode {
                image,
                depth,
                snapshot_floor,
            },
        );
        Ok(())
    }

    /// Resolve a ref name to the image it points at.
    pub fn resolve(&self, name: &str) -> Result<Digest> {
        self.refs
            .get(name)
            .copied()
            .ok_or_else(|| VcError::UnknownRef {
                name: name.to_string(),
            })
    }

    /// Whether a ref exists.
    pub fn has_ref(&self, name: &str) -> bool {
        self.refs.contains_key(name)
    }

    /// Point a ref at a committed image.
    ///
    /// # Errors
    ///
    /// `NotFound` if the target image is not in the tree.
    pub fn set_ref(&mut self, name: &str, digest: Digest) -> Result<()> {
        if !self.nodes.contains_key(&digest) {
            return Err(VcError::NotFound { digest });
        }
        self.refs.insert(name.to_string(), digest);
        Ok(())
    }

    /// Compare-and-swap ref repoint: succeeds only when the ref currently
    /// matches `expected` (`None` = ref unset). Detects lost updates when
    /// two writers race on the same ref.
    ///
    /// # Errors
    ///
    /// - `RefConflict` — the ref moved since `expected` was read
    /// - `NotFound` — the new target is not in the tree
    pub fn set_ref_guarded(
        &mut self,
        name: &str,
        expected: Option<Digest>,
        new: Digest,
    ) -> Result<()> {
        let current = self.refs.get(name).copied();
        if current != expected {
            return Err(VcError::RefConflict {
                name: name.to_string(),
                expected,
            });
        }
        self.set_ref(name, new)
    }

    /// Remove a ref (e.g. deleting a tag). Returns whether it existed.
    pub fn delete_ref(&mut self, name: &str) -> bool {
        self.refs.remove(name).is_some()
    }

    /// Lazy walk over all ancestors of `from` (inclusive), child-to-root.
    ///
    /// Follows every parent edge kind; ordering is reverse-chronological
    /// by derivation depth. The iterator is stateless with respect to the
    /// tree and can be restarted by calling `ancestors` again.
    ///
    /// # Errors
    ///
    /// `NotFound` if `from` is not in the tree.
    pub fn ancestors(&self, from: Digest) -> Result<Ancestors<'_>> {
        self.get(&from)?;
        let mut frontier = BinaryHeap::new();
        frontier.push((self.get(&from)?.depth, from));
        Ok(Ancestors {
            tree: self,
            frontier,
            seen: HashSet::from([from]),
        })
    }

    /// The derivation chain from `from` (inclusive) down to the root.
    pub fn derivation_chain(&self, from: Digest) -> Result<Vec<Digest>> {
        let mut chain = Vec::new();
        let mut cursor = Some(from);
        while let Some(digest) = cursor {
            let node = self.get(&digest)?;
            chain.push(digest);
            cursor = node.image.derivation_parent();
        }
        Ok(chain)
    }

    /// Closest ancestor (inclusive) holding a full snapshot, cached at
    /// commit time; bounds diff-replay length during checkout.
    pub fn nearest_snapshot_ancestor(&self, digest: Digest) -> Result<Digest> {
        Ok(self.get(&digest)?.snapshot_floor)
    }

    /// Lowest common ancestor of two images along their derivation
    /// chains, or `None` when they share no history.
    pub fn lowest_common_ancestor(&self, a: Digest, b: Digest) -> Result<Option<Digest>> {
        let a_chain: HashSet<Digest> = self.derivation_chain(a)?.into_iter().collect();
        for digest in self.derivation_chain(b)? {
            if a_chain.contains(&digest) {
                return Ok(Some(digest));
            }
        }
        Ok(None)
    }
}

/// Child-to-root iterator over a node's ancestors. See
/// [`CommitTree::ancestors`].
pub struct Ancestors<'a> {
    tree: &'a CommitTree,
    frontier: BinaryHeap<(u64, Digest)>,
    seen: HashSet<Digest>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a Image;

    fn next(&mut self) -> Option<Self::Item> {
        let (_, digest) = self.frontier.pop()?;
        // Parents were verified present at commit time.
        let node = self.tree.nodes.get(&digest)?;
        for edge in &node.image.parents {
            if self.seen.insert(edge.target) {
                if let Some(parent) = self.tree.nodes.get(&edge.target) {
                    self.frontier.push((parent.depth, edge.target));
                }
            }
        }
        Some(&node.image)
    }
}
