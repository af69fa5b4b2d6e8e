//! Repository facade: mountpoints, commits, checkout, sync.
//!
//! A repository owns one object store and any number of mountpoint
//! namespaces. Each namespace carries its own commit tree, refs, and a
//! live table state, and is guarded by its own mutex so commits and
//! checkouts to the same namespace serialize while different namespaces
//! proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tracing::info;

use crate::checkout;
use crate::config::Settings;
use crate::diff::{diff, ChangeSet};
use crate::errors::{Result, VcError};
use crate::model::{Image, Key, ParentEdge, PayloadRef, Row, TableSchema, TableState};
use crate::objects::{put_payload, ObjectPayload, ObjectStore, SnapshotPayload};
use crate::sync::{self, LocationRegistry, RemoteSite, SyncReport, TransferStrategy};
use crate::tree::CommitTree;
use relvc_core_types::schema::{EVENT_CHECKOUT_END, EVENT_CHECKOUT_START};
use relvc_core_types::Digest;

/// The mutable HEAD ref of every mountpoint.
pub const HEAD_REF: &str = "HEAD";

struct MountpointInner {
    tree: CommitTree,
    /// Working state accepting writes since the last commit.
    live: TableState,
    /// State at HEAD, the diff base for the next commit.
    committed: Option<TableState>,
}

/// One mountpoint namespace. All access goes through the mutex, which is
/// what serializes same-namespace commits and checkouts.
struct Mountpoint {
    inner: Mutex<MountpointInner>,
}

/// Version-control engine over a single object store.
pub struct Repository<S: ObjectStore> {
    objects: S,
    settings: Settings,
    mountpoints: RwLock<HashMap<String, Arc<Mountpoint>>>,
}

impl<S: ObjectStore> Repository<S> {
    pub fn new(objects: S, settings: Settings) -> Self {
        Self {
            objects,
            settings,
            mountpoints: RwLock::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn objects(&self) -> &S {
        &self.objects
    }

    /// Create an empty mountpoint for the given table schema.
    ///
    /// # Errors
    ///
    /// `MountpointExists` if the namespace is already initialized.
    pub fn init_mountpoint(&self, namespace: &str, schema: TableSchema) -> Result<()> {
        let mut mountpoints = self
            .mountpoints
            .write()
            .expect("mountpoint table lock poisoned");
        if mountpoints.contains_key(namespace) {
            return Err(VcError::MountpointExists {
                namespace: namespace.to_string(),
            });
        }
        mountpoints.insert(
            namespace.to_string(),
            Arc::new(Mountpoint {
                inner: Mutex::new(MountpointInner {
                    tree: CommitTree::new(),
                    live: TableState::new(schema),
                    committed: None,
                }),
            }),
        );
        Ok(())
    }

    pub fn has_mountpoint(&self, namespace: &str) -> bool {
        self.mountpoints
            .read()
            .expect("mountpoint table lock poisoned")
            .contains_key(namespace)
    }

    /// Mountpoint namespaces, sorted.
    pub fn list_mountpoints(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .mountpoints
            .read()
            .expect("mountpoint table lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort_unstable();
        names
    }

    fn mountpoint(&self, namespace: &str) -> Result<Arc<Mountpoint>> {
        self.mountpoints
            .read()
            .expect("mountpoint table lock poisoned")
            .get(namespace)
            .cloned()
            .ok_or_else(|| VcError::UnknownMountpoint {
                namespace: namespace.to_string(),
            })
    }

    /// Insert or replace a row in the live mountpoint state.
    pub fn upsert_row(&self, namespace: &str, row: Row) -> Result<()> {
        let mountpoint = self.mountpoint(namespace)?;
        let mut inner = mountpoint.inner.lock().expect("mountpoint lock poisoned");
        inner.live.upsert(row)
    }

    /// Delete a row from the live mountpoint state. Returns whether a
    /// row with that key existed.
    pub fn delete_row(&self, namespace: &str, key: &Key) -> Result<bool> {
        let mountpoint = self.mountpoint(namespace)?;
        let mut inner = mountpoint.inner.lock().expect("mountpoint lock poisoned");
        Ok(inner.live.delete(key).is_some())
    }

    /// Snapshot of the live (uncommitted) state.
    pub fn live_state(&self, namespace: &str) -> Result<TableState> {
        let mountpoint = self.mountpoint(namespace)?;
        let inner = mountpoint.inner.lock().expect("mountpoint lock poisoned");
        Ok(inner.live.clone())
    }

    /// Commit the live state as a new image and repoint HEAD.
    ///
    /// The first commit on a namespace stores a full snapshot; later
    /// commits store row-level deltas, except every
    /// `checkpoint_interval`-th commit along a lineage, which stores a
    /// snapshot again to bound later checkout replay. An empty diff is a
    /// no-op returning the HEAD image unchanged.
    pub fn commit(&self, namespace: &str, message: Option<String>) -> Result<Image> {
        let mountpoint = self.mountpoint(namespace)?;
        let mut inner = mountpoint.inner.lock().expect("mountpoint lock poisoned");
        let inner = &mut *inner;

        let head = if inner.tree.has_ref(HEAD_REF) {
            Some(inner.tree.resolve(HEAD_REF)?)
        } else {
            None
        };

        let (parents, payload) = match head {
            None => {
                let object = put_payload(
                    &self.objects,
                    &ObjectPayload::Snapshot(SnapshotPayload::from_state(&inner.live)),
                )?;
                (Vec::new(), PayloadRef::Snapshot { object })
            }
            Some(head) => {
                // HEAD can be ahead of the materialized state (e.g. a
                // pull repointed it without a checkout); the diff base
                // is always HEAD's state, reconstructed if need be.
                let reconstructed;
                let committed = match inner.committed.as_ref() {
                    Some(state) => state,
                    None => {
                        reconstructed =
                            checkout::reconstruct(&self.objects, &inner.tree, head)?;
                        &reconstructed
                    }
                };
                let changeset = diff(committed, &inner.live)?;
                if changeset.is_empty() {
                    return Ok(inner.tree.get(&head)?.image.clone());
                }
                let head_node = inner.tree.get(&head)?;
                let floor_depth = inner.tree.get(&head_node.snapshot_floor)?.depth;
                let parents = vec![ParentEdge::derivation(head)];
                // Checkpoint: the Nth commit past the last snapshot
                // stores full content instead of a delta.
                if head_node.depth + 1 - floor_depth >= self.settings.checkpoint_interval {
                    let object = put_payload(
                        &self.objects,
                        &ObjectPayload::Snapshot(SnapshotPayload::from_state(&inner.live)),
                    )?;
                    (parents, PayloadRef::Snapshot { object })
                } else {
                    let object = put_payload(&self.objects, &ObjectPayload::Delta(changeset))?;
                    (parents, PayloadRef::Delta { object })
                }
            }
        };

        let schema = inner.live.schema().clone();
        let image = inner.tree.commit(parents, schema, payload, message)?;
        inner.tree.set_ref_guarded(HEAD_REF, head, image.digest)?;
        inner.committed = Some(inner.live.clone());
        Ok(image)
    }

    /// Current HEAD image digest, if any commit exists.
    pub fn head(&self, namespace: &str) -> Result<Option<Digest>> {
        let mountpoint = self.mountpoint(namespace)?;
        let inner = mountpoint.inner.lock().expect("mountpoint lock poisoned");
        if inner.tree.has_ref(HEAD_REF) {
            Ok(Some(inner.tree.resolve(HEAD_REF)?))
        } else {
            Ok(None)
        }
    }

    /// Resolve a ref name or full hex digest to a committed image.
    pub fn resolve(&self, namespace: &str, reference: &str) -> Result<Digest> {
        let mountpoint = self.mountpoint(namespace)?;
        let inner = mountpoint.inner.lock().expect("mountpoint lock poisoned");
        resolve_in(&inner.tree, reference)
    }

    /// Point a tag at an existing image (by ref name or hex digest).
    pub fn tag(&self, namespace: &str, name: &str, reference: &str) -> Result<Digest> {
        let mountpoint = self.mountpoint(namespace)?;
        let mut inner = mountpoint.inner.lock().expect("mountpoint lock poisoned");
        let digest = resolve_in(&inner.tree, reference)?;
        inner.tree.set_ref(name, digest)?;
        Ok(digest)
    }

    /// Look up a committed image.
    pub fn image(&self, namespace: &str, digest: &Digest) -> Result<Image> {
        let mountpoint = self.mountpoint(namespace)?;
        let inner = mountpoint.inner.lock().expect("mountpoint lock poisoned");
        Ok(inner.tree.get(digest)?.image.clone())
    }

    /// Commit history of a ref or digest, child to root.
    pub fn log(&self, namespace: &str, reference: &str) -> Result<Vec<Image>> {
        let mountpoint = self.mountpoint(namespace)?;
        let inner = mountpoint.inner.lock().expect("mountpoint lock poisoned");
        let from = resolve_in(&inner.tree, reference)?;
        Ok(inner.tree.ancestors(from)?.cloned().collect())
    }

    /// Materialize the target image into the mountpoint.
    ///
    /// The target state is fully built in a staging area and verified
    /// before the live state and HEAD swap, so any failure leaves the
    /// mountpoint exactly as it was. Uncommitted live changes are
    /// discarded by a successful checkout.
    pub fn checkout(&self, namespace: &str, reference: &str) -> Result<Digest> {
        let mountpoint = self.mountpoint(namespace)?;
        let mut inner = mountpoint.inner.lock().expect("mountpoint lock poisoned");
        let inner = &mut *inner;

        let target = resolve_in(&inner.tree, reference)
            .map_err(|e| VcError::checkout_failed("plan", e))?;
        let current = if inner.tree.has_ref(HEAD_REF) {
            Some(inner.tree.resolve(HEAD_REF)?)
        } else {
            None
        };
        info!(
            event = EVENT_CHECKOUT_START,
            namespace,
            target = %target.short(),
        );

        let staging = checkout::execute(
            &self.objects,
            &inner.tree,
            inner.committed.as_ref(),
            current,
            target,
        )?;

        // Atomic swap: nothing below can fail except the ref repoint,
        // which is checked against the tree before any state changes.
        inner.tree.set_ref_guarded(HEAD_REF, current, target)?;
        inner.live = staging.clone();
        inner.committed = Some(staging);
        info!(
            event = EVENT_CHECKOUT_END,
            namespace,
            target = %target.short(),
        );
        Ok(target)
    }

    /// Reconstruct the logical state of any committed image without
    /// touching the live mountpoint.
    pub fn state_at(&self, namespace: &str, reference: &str) -> Result<TableState> {
        let mountpoint = self.mountpoint(namespace)?;
        let inner = mountpoint.inner.lock().expect("mountpoint lock poisoned");
        let target = resolve_in(&inner.tree, reference)?;
        checkout::reconstruct(&self.objects, &inner.tree, target)
    }

    /// Row-level change set between two committed images.
    pub fn diff_images(&self, namespace: &str, base: &str, target: &str) -> Result<ChangeSet> {
        let mountpoint = self.mountpoint(namespace)?;
        let inner = mountpoint.inner.lock().expect("mountpoint lock poisoned");
        let base = resolve_in(&inner.tree, base)?;
        let target = resolve_in(&inner.tree, target)?;
        let base_state = checkout::reconstruct(&self.objects, &inner.tree, base)?;
        let target_state = checkout::reconstruct(&self.objects, &inner.tree, target)?;
        diff(&base_state, &target_state)
    }

    /// Push a ref's history to a remote site.
    pub fn push(
        &self,
        namespace: &str,
        remote: &dyn RemoteSite,
        ref_name: &str,
        registry: Option<&dyn LocationRegistry>,
        strategy: &dyn TransferStrategy,
    ) -> Result<SyncReport> {
        let mountpoint = self.mountpoint(namespace)?;
        let inner = mountpoint.inner.lock().expect("mountpoint lock poisoned");
        sync::push(&inner.tree, &self.objects, remote, ref_name, registry, strategy)
    }

    /// Pull a remote ref's history and repoint the local ref of the same
    /// name. Does not touch the live state; follow with [`checkout`] to
    /// materialize.
    ///
    /// [`checkout`]: Repository::checkout
    pub fn pull(
        &self,
        namespace: &str,
        remote: &dyn RemoteSite,
        ref_name: &str,
        registry: Option<&dyn LocationRegistry>,
    ) -> Result<(Digest, SyncReport)> {
        let mountpoint = self.mountpoint(namespace)?;
        let mut inner = mountpoint.inner.lock().expect("mountpoint lock poisoned");
        let inner = &mut *inner;
        let (target, report) =
            sync::pull(&mut inner.tree, &self.objects, remote, ref_name, registry)?;
        inner.tree.set_ref(ref_name, target)?;
        Ok((target, report))
    }

    /// Initialize a new mountpoint from a remote ref and materialize it.
    pub fn clone_from(
        &self,
        namespace: &str,
        remote: &dyn RemoteSite,
        ref_name: &str,
        registry: Option<&dyn LocationRegistry>,
    ) -> Result<Digest> {
        let target = remote
            .resolve_ref(ref_name)?
            .ok_or_else(|| VcError::UnknownRef {
                name: ref_name.to_string(),
            })?;
        let schema = remote.get_image(&target)?.schema;
        self.init_mountpoint(namespace, schema)?;
        self.pull(namespace, remote, ref_name, registry)?;
        self.checkout(namespace, ref_name)
    }
}

/// Ref name first, then full hex digest.
fn resolve_in(tree: &CommitTree, reference: &str) -> Result<Digest> {
    if tree.has_ref(reference) {
        return tree.resolve(reference);
    }
    match reference.parse::<Digest>() {
        Ok(digest) if tree.contains(&digest) => Ok(digest),
        Ok(digest) => Err(VcError::NotFound { digest }),
        Err(_) => Err(VcError::UnknownRef {
            name: reference.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::table::id_value_schema;
    use crate::model::Datum;
    use crate::objects::MemoryObjectStore;
    use crate::sync::{CheapestPlan, MemorySite};

    fn test_repo(interval: u64) -> Repository<MemoryObjectStore> {
        Repository::new(
            MemoryObjectStore::new(),
            Settings {
                checkpoint_interval: interval,
                storage_root: None,
            },
        )
    }

    fn row(id: i64, value: &str) -> Row {
        vec![Datum::Integer(id), Datum::Text(value.to_string())]
    }

    fn key(id: i64) -> Key {
        Key(vec![Datum::Integer(id)])
    }

    #[test]
    fn test_init_and_duplicate_mountpoint() {
        let repo = test_repo(10);
        repo.init_mountpoint("db", id_value_schema("t")).unwrap();
        let err = repo
            .init_mountpoint("db", id_value_schema("t"))
            .unwrap_err();
        assert_eq!(err.code(), "ERR_MOUNTPOINT_EXISTS");
        assert_eq!(repo.list_mountpoints(), vec!["db"]);
    }

    #[test]
    fn test_unknown_mountpoint() {
        let repo = test_repo(10);
        let err = repo.live_state("nope").unwrap_err();
        assert_eq!(err.code(), "ERR_UNKNOWN_MOUNTPOINT");
    }

    #[test]
    fn test_first_commit_is_snapshot_root() {
        let repo = test_repo(10);
        repo.init_mountpoint("db", id_value_schema("t")).unwrap();
        repo.upsert_row("db", row(1, "a")).unwrap();

        let image = repo.commit("db", Some("initial".into())).unwrap();
        assert!(image.is_root());
        assert!(image.payload.is_snapshot());
        assert_eq!(repo.head("db").unwrap(), Some(image.digest));
    }

    #[test]
    fn test_second_commit_is_delta() {
        let repo = test_repo(10);
        repo.init_mountpoint("db", id_value_schema("t")).unwrap();
        repo.upsert_row("db", row(1, "a")).unwrap();
        let h1 = repo.commit("db", None).unwrap();

        repo.upsert_row("db", row(2, "b")).unwrap();
        let h2 = repo.commit("db", None).unwrap();
        assert!(!h2.payload.is_snapshot());
        assert_eq!(h2.derivation_parent(), Some(h1.digest));
    }

    #[test]
    fn test_empty_commit_is_noop() {
        let repo = test_repo(10);
        repo.init_mountpoint("db", id_value_schema("t")).unwrap();
        repo.upsert_row("db", row(1, "a")).unwrap();
        let h1 = repo.commit("db", None).unwrap();
        let again = repo.commit("db", None).unwrap();
        assert_eq!(h1.digest, again.digest);
    }

    #[test]
    fn test_checkpoint_interval_forces_snapshot() {
        let repo = test_repo(3);
        repo.init_mountpoint("db", id_value_schema("t")).unwrap();
        repo.upsert_row("db", row(1, "v0")).unwrap();
        let mut images = vec![repo.commit("db", None).unwrap()];
        for i in 1..=4 {
            repo.upsert_row("db", row(1, &format!("v{}", i))).unwrap();
            images.push(repo.commit("db", None).unwrap());
        }

        // Depths 0..4 with interval 3: snapshots at depth 0 and 3.
        let snapshots: Vec<bool> = images.iter().map(|i| i.payload.is_snapshot()).collect();
        assert_eq!(snapshots, vec![true, false, false, true, false]);
    }

    #[test]
    fn test_checkout_restores_previous_state() {
        let repo = test_repo(10);
        repo.init_mountpoint("db", id_value_schema("t")).unwrap();
        repo.upsert_row("db", row(1, "a")).unwrap();
        repo.upsert_row("db", row(2, "b")).unwrap();
        let h1 = repo.commit("db", None).unwrap();

        repo.upsert_row("db", row(1, "a2")).unwrap();
        repo.delete_row("db", &key(2)).unwrap();
        repo.upsert_row("db", row(3, "c")).unwrap();
        repo.commit("db", None).unwrap();

        repo.checkout("db", &h1.digest.to_string()).unwrap();
        let state = repo.live_state("db").unwrap();
        assert_eq!(state.rows(), vec![row(1, "a"), row(2, "b")]);
        assert_eq!(repo.head("db").unwrap(), Some(h1.digest));
    }

    #[test]
    fn test_checkout_discards_uncommitted_changes() {
        let repo = test_repo(10);
        repo.init_mountpoint("db", id_value_schema("t")).unwrap();
        repo.upsert_row("db", row(1, "a")).unwrap();
        let h1 = repo.commit("db", None).unwrap();

        repo.upsert_row("db", row(9, "dirty")).unwrap();
        repo.checkout("db", &h1.digest.to_string()).unwrap();
        assert_eq!(repo.live_state("db").unwrap().rows(), vec![row(1, "a")]);
    }

    #[test]
    fn test_checkout_unknown_reference_reports_plan_step() {
        let repo = test_repo(10);
        repo.init_mountpoint("db", id_value_schema("t")).unwrap();
        let err = repo.checkout("db", "no-such-ref").unwrap_err();
        match err {
            VcError::CheckoutFailed { step, .. } => assert_eq!(step, "plan"),
            other => panic!("expected CheckoutFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_tag_and_resolve() {
        let repo = test_repo(10);
        repo.init_mountpoint("db", id_value_schema("t")).unwrap();
        repo.upsert_row("db", row(1, "a")).unwrap();
        let h1 = repo.commit("db", None).unwrap();

        repo.tag("db", "v1", HEAD_REF).unwrap();
        assert_eq!(repo.resolve("db", "v1").unwrap(), h1.digest);
        assert_eq!(
            repo.resolve("db", &h1.digest.to_string()).unwrap(),
            h1.digest
        );
        assert_eq!(
            repo.resolve("db", "missing").unwrap_err().code(),
            "ERR_UNKNOWN_REF"
        );
    }

    #[test]
    fn test_log_walks_history() {
        let repo = test_repo(10);
        repo.init_mountpoint("db", id_value_schema("t")).unwrap();
        repo.upsert_row("db", row(1, "a")).unwrap();
        let h1 = repo.commit("db", None).unwrap();
        repo.upsert_row("db", row(1, "b")).unwrap();
        let h2 = repo.commit("db", None).unwrap();

        let log = repo.log("db", HEAD_REF).unwrap();
        let digests: Vec<Digest> = log.iter().map(|i| i.digest).collect();
        assert_eq!(digests, vec![h2.digest, h1.digest]);
    }

    #[test]
    fn test_commit_after_pull_of_head_extends_pulled_history() {
        let origin = test_repo(10);
        origin.init_mountpoint("db", id_value_schema("t")).unwrap();
        origin.upsert_row("db", row(1, "a")).unwrap();
        let h1 = origin.commit("db", None).unwrap();

        let remote = MemorySite::new("mem://hub");
        origin
            .push("db", &remote, HEAD_REF, None, &CheapestPlan)
            .unwrap();

        // Pull repoints HEAD without materializing any state.
        let replica = test_repo(10);
        replica.init_mountpoint("db", id_value_schema("t")).unwrap();
        replica.pull("db", &remote, HEAD_REF, None).unwrap();
        assert_eq!(replica.head("db").unwrap(), Some(h1.digest));

        // A commit now must diff against HEAD's state and record it as
        // parent, not start a detached root.
        replica.upsert_row("db", row(2, "b")).unwrap();
        let h2 = replica.commit("db", None).unwrap();
        assert_eq!(h2.derivation_parent(), Some(h1.digest));
        assert!(!h2.payload.is_snapshot());

        // The live state was never materialized, so the delta records
        // the literal transition from h1's rows to the working rows.
        let changeset = replica
            .diff_images("db", &h1.digest.to_string(), &h2.digest.to_string())
            .unwrap();
        assert_eq!(changeset.len(), 2);
        assert_eq!(
            replica.state_at("db", &h2.digest.to_string()).unwrap().rows(),
            vec![row(2, "b")]
        );
    }

    #[test]
    fn test_clone_from_remote() {
        let origin = test_repo(10);
        origin.init_mountpoint("db", id_value_schema("t")).unwrap();
        origin.upsert_row("db", row(1, "a")).unwrap();
        origin.commit("db", None).unwrap();
        origin.upsert_row("db", row(2, "b")).unwrap();
        let tip = origin.commit("db", None).unwrap();
        origin.tag("db", "main", HEAD_REF).unwrap();

        let remote = MemorySite::new("mem://hub");
        origin
            .push("db", &remote, "main", None, &CheapestPlan)
            .unwrap();

        let replica = test_repo(10);
        let cloned = replica.clone_from("db", &remote, "main", None).unwrap();
        assert_eq!(cloned, tip.digest);
        assert_eq!(
            replica.live_state("db").unwrap().rows(),
            vec![row(1, "a"), row(2, "b")]
        );
    }
}
