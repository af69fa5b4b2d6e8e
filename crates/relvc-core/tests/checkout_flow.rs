// End-to-end checkout behavior through the Repository facade: the
// commit/update/checkout scenario, path independence, and atomicity of
// failed checkouts.

use relvc_core::diff::RowOp;
use relvc_core::errors::{Result, VcError};
use relvc_core::model::table::id_value_schema;
use relvc_core::model::{Datum, Key, Row};
use relvc_core::objects::{MemoryObjectStore, ObjectStore};
use relvc_core::{Digest, Repository, Settings};

fn row(id: i64, value: &str) -> Row {
    vec![Datum::Integer(id), Datum::Text(value.to_string())]
}

fn key(id: i64) -> Key {
    Key(vec![Datum::Integer(id)])
}

fn test_repo() -> Repository<MemoryObjectStore> {
    Repository::new(MemoryObjectStore::new(), Settings::default())
}

/// Insert {1,"a"},{2,"b"}, commit H1; update 1, delete 2, insert 3,
/// commit H2.
fn two_image_history<S: ObjectStore>(repo: &Repository<S>) -> (Digest, Digest) {
    repo.init_mountpoint("db", id_value_schema("t")).unwrap();
    repo.upsert_row("db", row(1, "a")).unwrap();
    repo.upsert_row("db", row(2, "b")).unwrap();
    let h1 = repo.commit("db", None).unwrap();

    repo.upsert_row("db", row(1, "a2")).unwrap();
    repo.delete_row("db", &key(2)).unwrap();
    repo.upsert_row("db", row(3, "c")).unwrap();
    let h2 = repo.commit("db", None).unwrap();
    (h1.digest, h2.digest)
}

#[test]
fn test_diff_between_images_is_minimal_edit_script() {
    let repo = test_repo();
    let (h1, h2) = two_image_history(&repo);

    let changeset = repo
        .diff_images("db", &h1.to_string(), &h2.to_string())
        .unwrap();

    // Primary-key order: update pk=1, delete pk=2, insert pk=3.
    assert_eq!(changeset.len(), 3);
    match &changeset.ops[0] {
        RowOp::Update { key, changes } => {
            assert_eq!(key, &Key(vec![Datum::Integer(1)]));
            assert_eq!(changes.len(), 1);
            assert_eq!(changes[0].column, "value");
            assert_eq!(changes[0].new, Datum::Text("a2".into()));
        }
        other => panic!("expected update, got {:?}", other),
    }
    assert!(matches!(&changeset.ops[1], RowOp::Delete { .. }));
    assert!(matches!(&changeset.ops[2], RowOp::Insert { .. }));
}

#[test]
fn test_checkout_h1_after_h2_restores_exact_rows() {
    let repo = test_repo();
    let (h1, h2) = two_image_history(&repo);

    assert_eq!(repo.head("db").unwrap(), Some(h2));
    repo.checkout("db", &h1.to_string()).unwrap();

    let state = repo.live_state("db").unwrap();
    assert_eq!(state.rows(), vec![row(1, "a"), row(2, "b")]);
    assert_eq!(repo.head("db").unwrap(), Some(h1));

    // And forward again.
    repo.checkout("db", &h2.to_string()).unwrap();
    assert_eq!(
        repo.live_state("db").unwrap().rows(),
        vec![row(1, "a2"), row(3, "c")]
    );
}

#[test]
fn test_state_at_is_path_independent() {
    let repo = test_repo();
    let (h1, h2) = two_image_history(&repo);

    // Materialize h2 while standing at h2, at h1, and via detached
    // reconstruction; all three must agree.
    let direct = repo.state_at("db", &h2.to_string()).unwrap();
    repo.checkout("db", &h1.to_string()).unwrap();
    let after_rewind = repo.state_at("db", &h2.to_string()).unwrap();
    repo.checkout("db", &h2.to_string()).unwrap();
    let live = repo.live_state("db").unwrap();

    assert_eq!(direct, after_rewind);
    assert_eq!(direct, live);
}

/// Object store that serves reads until a budget runs out, then fails.
/// Simulates transient backend loss mid-checkout.
struct FlakyStore {
    inner: MemoryObjectStore,
    reads_allowed: std::sync::atomic::AtomicUsize,
}

impl ObjectStore for FlakyStore {
    fn put(&self, bytes: &[u8]) -> Result<Digest> {
        self.inner.put(bytes)
    }

    fn get(&self, digest: &Digest) -> Result<Vec<u8>> {
        let remaining = self
            .reads_allowed
            .fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
        if remaining == 0 {
            // Pin the budget so the wraparound from fetch_sub does not
            // re-enable reads.
            self.reads_allowed
                .store(0, std::sync::atomic::Ordering::SeqCst);
            return Err(VcError::Io {
                op: "get_object".to_string(),
                message: "connection reset".to_string(),
            });
        }
        self.inner.get(digest)
    }

    fn has(&self, digest: &Digest) -> Result<bool> {
        self.inner.has(digest)
    }
}

#[test]
fn test_failed_checkout_leaves_mountpoint_untouched() {
    let store = FlakyStore {
        inner: MemoryObjectStore::new(),
        reads_allowed: std::sync::atomic::AtomicUsize::new(usize::MAX),
    };
    let repo = Repository::new(store, Settings::default());
    let (h1, h2) = two_image_history(&repo);

    let before = repo.live_state("db").unwrap();

    // Cut off object reads, then attempt the rewind.
    repo.objects()
        .reads_allowed
        .store(0, std::sync::atomic::Ordering::SeqCst);
    let err = repo.checkout("db", &h1.to_string()).unwrap_err();
    assert_eq!(err.code(), "ERR_CHECKOUT_FAILED");

    // Pre-checkout state and HEAD are fully intact.
    repo.objects()
        .reads_allowed
        .store(usize::MAX, std::sync::atomic::Ordering::SeqCst);
    assert_eq!(repo.live_state("db").unwrap(), before);
    assert_eq!(repo.head("db").unwrap(), Some(h2));
}

#[test]
fn test_checkout_to_current_head_is_noop() {
    let repo = test_repo();
    let (_, h2) = two_image_history(&repo);

    let before = repo.live_state("db").unwrap();
    let landed = repo.checkout("db", &h2.to_string()).unwrap();
    assert_eq!(landed, h2);
    assert_eq!(repo.live_state("db").unwrap(), before);
}

#[test]
fn test_long_history_checks_out_through_checkpoints() {
    let repo = Repository::new(
        MemoryObjectStore::new(),
        Settings {
            checkpoint_interval: 4,
            storage_root: None,
        },
    );
    repo.init_mountpoint("db", id_value_schema("t")).unwrap();

    let mut digests = Vec::new();
    for i in 0..12 {
        repo.upsert_row("db", row(1, &format!("v{}", i))).unwrap();
        repo.upsert_row("db", row(100 + i, "fill")).unwrap();
        digests.push(repo.commit("db", None).unwrap().digest);
    }

    // Rewind to an early image and back to the tip, across several
    // checkpoint boundaries.
    repo.checkout("db", &digests[1].to_string()).unwrap();
    let early = repo.live_state("db").unwrap();
    assert_eq!(early.get(&key(1)), Some(&row(1, "v1")));
    assert_eq!(early.len(), 3);

    repo.checkout("db", &digests[11].to_string()).unwrap();
    let tip = repo.live_state("db").unwrap();
    assert_eq!(tip.get(&key(1)), Some(&row(1, "v11")));
    assert_eq!(tip.len(), 13);
}
