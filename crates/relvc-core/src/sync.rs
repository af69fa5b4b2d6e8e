//! Push/pull coordination with remote sites.
//!
//! Transfers move the minimal object set: the ancestry of the source
//! image is walked, objects already held by the destination (per the
//! destination itself or a location registry) are skipped, and the
//! final ref repoint on the destination is guarded compare-and-swap.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::{Result, VcError};
use crate::model::Image;
use crate::objects::{MemoryObjectStore, ObjectStore};
use crate::tree::CommitTree;
use relvc_core_types::schema::{EVENT_PULL_PROGRESS, EVENT_PUSH_PROGRESS};
use relvc_core_types::Digest;

/// An opaque location descriptor, typically a URI.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location {
    pub uri: String,
}

impl Location {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.uri)
    }
}

/// Object location registry. Maps an object digest to the set of
/// locations known to hold it, so transfers can skip objects the
/// destination already has without a round trip per object.
pub trait LocationRegistry {
    fn locate(&self, object: &Digest) -> Result<BTreeSet<Location>>;
    fn announce(&self, object: &Digest, location: &Location) -> Result<()>;
}

/// A remote peer holding an object store, an image index, and refs.
pub trait RemoteSite {
    fn location(&self) -> Location;

    fn has_object(&self, digest: &Digest) -> Result<bool>;
    fn get_object(&self, digest: &Digest) -> Result<Vec<u8>>;
    fn put_object(&self, bytes: &[u8]) -> Result<Digest>;

    fn has_image(&self, digest: &Digest) -> Result<bool>;
    fn get_image(&self, digest: &Digest) -> Result<Image>;
    fn put_image(&self, image: Image) -> Result<()>;

    fn resolve_ref(&self, name: &str) -> Result<Option<Digest>>;
    /// Guarded repoint; fails `RefConflict` when the ref moved since
    /// `expected` was read.
    fn set_ref(&self, name: &str, expected: Option<Digest>, target: Digest) -> Result<()>;
}

/// Pluggable policy deciding whether an object must move to reach a
/// destination, given the locations already known to hold it.
pub trait TransferStrategy {
    fn should_transfer(
        &self,
        object: &Digest,
        destination: &Location,
        known_holders: &BTreeSet<Location>,
    ) -> bool;
}

/// Default policy: transfer only when no record shows the destination
/// already holding the object.
#[derive(Debug, Default, Clone, Copy)]
pub struct CheapestPlan;

impl TransferStrategy for CheapestPlan {
    fn should_transfer(
        &self,
        _object: &Digest,
        destination: &Location,
        known_holders: &BTreeSet<Location>,
    ) -> bool {
        !known_holders.contains(destination)
    }
}

/// Outcome counters for a push or pull.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub transferred_images: usize,
    pub transferred_objects: usize,
    pub skipped_objects: usize,
}

fn known_holders(
    registry: Option<&dyn LocationRegistry>,
    object: &Digest,
) -> Result<BTreeSet<Location>> {
    match registry {
        Some(registry) => registry.locate(object),
        None => Ok(BTreeSet::new()),
    }
}

fn announce(
    registry: Option<&dyn LocationRegistry>,
    object: &Digest,
    location: &Location,
) -> Result<()> {
    if let Some(registry) = registry {
        registry.announce(object, location)?;
    }
    Ok(())
}

/// Push the history of `ref_name` to a remote site.
///
/// Walks local ancestors of the ref target, sends the images the remote
/// lacks (oldest first, so parents always arrive before children) and
/// only the payload objects nothing at the destination already holds,
/// then repoints the remote ref with compare-and-swap.
///
/// # Errors
///
/// - `UnknownRef` — `ref_name` is not set locally
/// - `RefConflict` — the remote ref moved during the transfer
pub fn push<S: ObjectStore>(
    tree: &CommitTree,
    store: &S,
    remote: &dyn RemoteSite,
    ref_name: &str,
    registry: Option<&dyn LocationRegistry>,
    strategy: &dyn TransferStrategy,
) -> Result<SyncReport> {
    let target = tree.resolve(ref_name)?;
    let destination = remote.location();
    let remote_head = remote.resolve_ref(ref_name)?;

    // Oldest first: ancestors() yields child-to-root.
    let mut missing: Vec<Image> = Vec::new();
    for image in tree.ancestors(target)? {
        if !remote.has_image(&image.digest)? {
            missing.push(image.clone());
        }
    }
    missing.reverse();

    let mut report = SyncReport::default();
    for image in missing {
        let object = image.payload.object();
        let holders = known_holders(registry, &object)?;
        let wanted = strategy.should_transfer(&object, &destination, &holders)
            && !remote.has_object(&object)?;
        if wanted {
            let bytes = store.get(&object)?;
            let stored = remote.put_object(&bytes)?;
            if stored != object {
                return Err(VcError::Integrity {
                    digest: object,
                    actual: stored,
                });
            }
            announce(registry, &object, &destination)?;
            report.transferred_objects += 1;
        } else {
            report.skipped_objects += 1;
        }
        remote.put_image(image.clone())?;
        report.transferred_images += 1;
        info!(
            event = EVENT_PUSH_PROGRESS,
            image = %image.digest.short(),
            transferred = report.transferred_objects,
            skipped = report.skipped_objects,
        );
    }

    remote.set_ref(ref_name, remote_head, target)?;
    Ok(report)
}

/// Pull the history of a remote ref into the local tree and store.
///
/// Fetches only the images absent locally, in parent-before-child
/// order, verifying every object against its digest on arrival.
/// Returns the remote ref target; the caller repoints local refs.
///
/// # Errors
///
/// - `UnknownRef` — the remote does not have `ref_name`
/// - `Integrity` — a fetched image or object fails digest verification
pub fn pull<S: ObjectStore>(
    tree: &mut CommitTree,
    store: &S,
    remote: &dyn RemoteSite,
    ref_name: &str,
    registry: Option<&dyn LocationRegistry>,
) -> Result<(Digest, SyncReport)> {
    let target = remote
        .resolve_ref(ref_name)?
        .ok_or_else(|| VcError::UnknownRef {
            name: ref_name.to_string(),
        })?;

    // Walk remote ancestry until reaching images the local tree holds.
    let mut missing: HashMap<Digest, Image> = HashMap::new();
    let mut frontier = vec![target];
    let mut seen: HashSet<Digest> = HashSet::new();
    while let Some(digest) = frontier.pop() {
        if !seen.insert(digest) || tree.contains(&digest) || missing.contains_key(&digest) {
            continue;
        }
        let image = remote.get_image(&digest)?;
        for edge in &image.parents {
            frontier.push(edge.target);
        }
        missing.insert(digest, image);
    }

    let mut report = SyncReport::default();
    // Adopt in dependency order: an image is ready once all its parents
    // are in the tree.
    while !missing.is_empty() {
        let ready: Vec<Digest> = missing
            .values()
            .filter(|image| {
                image
                    .parents
                    .iter()
                    .all(|edge| tree.contains(&edge.target))
            })
            .map(|image| image.digest)
            .collect();
        if ready.is_empty() {
            return Err(VcError::InvalidCommit {
                reason: "remote history references parents that cannot be fetched".to_string(),
            });
        }
        for digest in ready {
            let image = match missing.remove(&digest) {
                Some(image) => image,
                None => continue,
            };
            let object = image.payload.object();
            if store.has(&object)? {
                report.skipped_objects += 1;
            } else {
                let bytes = remote.get_object(&object)?;
                let stored = store.put(&bytes)?;
                if stored != object {
                    return Err(VcError::Integrity {
                        digest: object,
                        actual: stored,
                    });
                }
                announce(registry, &object, &remote.location())?;
                report.transferred_objects += 1;
            }
            tree.adopt(image)?;
            report.transferred_images += 1;
            info!(
                event = EVENT_PULL_PROGRESS,
                image = %digest.short(),
                transferred = report.transferred_objects,
                skipped = report.skipped_objects,
            );
        }
    }

    Ok((target, report))
}

/// In-memory remote peer. Reference implementation of [`RemoteSite`]
/// for tests and single-process setups.
pub struct MemorySite {
    location: Location,
    objects: MemoryObjectStore,
    images: RwLock<HashMap<Digest, Image>>,
    refs: RwLock<HashMap<String, Digest>>,
}

impl MemorySite {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            location: Location::new(uri),
            objects: MemoryObjectStore::new(),
            images: RwLock::new(HashMap::new()),
            refs: RwLock::new(HashMap::new()),
        }
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn image_count(&self) -> usize {
        self.images.read().expect("image index lock poisoned").len()
    }
}

impl RemoteSite for MemorySite {
    fn location(&self) -> Location {
        self.location.clone()
    }

    fn has_object(&self, digest: &Digest) -> Result<bool> {
        self.objects.has(digest)
    }

    fn get_object(&self, digest: &Digest) -> Result<Vec<u8>> {
        self.objects.get(digest)
    }

    fn put_object(&self, bytes: &[u8]) -> Result<Digest> {
        self.objects.put(bytes)
    }

    fn has_image(&self, digest: &Digest) -> Result<bool> {
        let images = self.images.read().expect("image index lock poisoned");
        Ok(images.contains_key(digest))
    }

    fn get_image(&self, digest: &Digest) -> Result<Image> {
        let images = self.images.read().expect("image index lock poisoned");
        images
            .get(digest)
            .cloned()
            .ok_or(VcError::NotFound { digest: *digest })
    }

    fn put_image(&self, image: Image) -> Result<()> {
        let mut images = self.images.write().expect("image index lock poisoned");
        images.entry(image.digest).or_insert(image);
        Ok(())
    }

    fn resolve_ref(&self, name: &str) -> Result<Option<Digest>> {
        let refs = self.refs.read().expect("ref table lock poisoned");
        Ok(refs.get(name).copied())
    }

    fn set_ref(&self, name: &str, expected: Option<Digest>, target: Digest) -> Result<()> {
        let mut refs = self.refs.write().expect("ref table lock poisoned");
        let current = refs.get(name).copied();
        if current != expected {
            return Err(VcError::RefConflict {
                name: name.to_string(),
                expected,
            });
        }
        refs.insert(name.to_string(), target);
        Ok(())
    }
}
