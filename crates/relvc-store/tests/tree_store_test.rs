// Persistence round-trips for commit trees: save, hydrate, and verify
// navigation data is rebuilt rather than trusted from disk.

use relvc_core::diff::diff;
use relvc_core::model::table::id_value_schema;
use relvc_core::model::{Datum, ParentEdge, PayloadRef, TableState};
use relvc_core::objects::{put_payload, MemoryObjectStore, ObjectPayload, SnapshotPayload};
use relvc_core::tree::CommitTree;
use relvc_core::Digest;
use relvc_store::{db, SqliteTreeStore};

fn state_with(rows: &[(i64, &str)]) -> TableState {
    let mut state = TableState::new(id_value_schema("t"));
    for (id, value) in rows {
        state
            .upsert(vec![Datum::Integer(*id), Datum::Text(value.to_string())])
            .unwrap();
    }
    state
}

fn sample_tree(store: &MemoryObjectStore) -> (CommitTree, Vec<Digest>) {
    let mut tree = CommitTree::new();
    let states = [
        state_with(&[(1, "a")]),
        state_with(&[(1, "a"), (2, "b")]),
        state_with(&[(2, "b")]),
    ];

    let snap = put_payload(
        store,
        &ObjectPayload::Snapshot(SnapshotPayload::from_state(&states[0])),
    )
    .unwrap();
    let root = tree
        .commit(
            vec![],
            states[0].schema().clone(),
            PayloadRef::Snapshot { object: snap },
            Some("initial".into()),
        )
        .unwrap();

    let mut digests = vec![root.digest];
    for i in 1..states.len() {
        let delta = put_payload(
            store,
            &ObjectPayload::Delta(diff(&states[i - 1], &states[i]).unwrap()),
        )
        .unwrap();
        let image = tree
            .commit(
                vec![ParentEdge::derivation(digests[i - 1])],
                states[i].schema().clone(),
                PayloadRef::Delta { object: delta },
                None,
            )
            .unwrap();
        digests.push(image.digest);
    }
    tree.set_ref("HEAD", digests[2]).unwrap();
    tree.set_ref("v1", digests[0]).unwrap();
    (tree, digests)
}

#[test]
fn test_save_and_hydrate_round_trip() {
    let objects = MemoryObjectStore::new();
    let (tree, digests) = sample_tree(&objects);

    let mut conn = db::open_in_memory().unwrap();
    db::init_schema(&conn).unwrap();
    SqliteTreeStore::save(&mut conn, "db", &tree).unwrap();

    let hydrated = SqliteTreeStore::load(&conn, "db").unwrap();
    assert_eq!(hydrated.len(), 3);
    for digest in &digests {
        assert!(hydrated.contains(digest));
    }

    // Navigation data is recomputed during hydration.
    let tip = hydrated.get(&digests[2]).unwrap();
    assert_eq!(tip.depth, 2);
    assert_eq!(tip.snapshot_floor, digests[0]);

    // Refs survive.
    assert_eq!(hydrated.resolve("HEAD").unwrap(), digests[2]);
    assert_eq!(hydrated.resolve("v1").unwrap(), digests[0]);
}

#[test]
fn test_save_is_idempotent() {
    let objects = MemoryObjectStore::new();
    let (tree, _) = sample_tree(&objects);

    let mut conn = db::open_in_memory().unwrap();
    db::init_schema(&conn).unwrap();
    SqliteTreeStore::save(&mut conn, "db", &tree).unwrap();
    SqliteTreeStore::save(&mut conn, "db", &tree).unwrap();

    let hydrated = SqliteTreeStore::load(&conn, "db").unwrap();
    assert_eq!(hydrated.len(), 3);
}

#[test]
fn test_ref_repoint_persists() {
    let objects = MemoryObjectStore::new();
    let (mut tree, digests) = sample_tree(&objects);

    let mut conn = db::open_in_memory().unwrap();
    db::init_schema(&conn).unwrap();
    SqliteTreeStore::save(&mut conn, "db", &tree).unwrap();

    tree.set_ref("HEAD", digests[0]).unwrap();
    SqliteTreeStore::save(&mut conn, "db", &tree).unwrap();

    assert_eq!(
        SqliteTreeStore::resolve_ref(&conn, "db", "HEAD").unwrap(),
        Some(digests[0])
    );
    assert_eq!(
        SqliteTreeStore::resolve_ref(&conn, "db", "missing").unwrap(),
        None
    );
}

#[test]
fn test_namespaces_are_isolated() {
    let objects = MemoryObjectStore::new();
    let (tree, _) = sample_tree(&objects);

    let mut conn = db::open_in_memory().unwrap();
    db::init_schema(&conn).unwrap();
    SqliteTreeStore::save(&mut conn, "alpha", &tree).unwrap();

    let empty = SqliteTreeStore::load(&conn, "beta").unwrap();
    assert!(empty.is_empty());
    assert_eq!(
        SqliteTreeStore::list_namespaces(&conn).unwrap(),
        vec!["alpha"]
    );
}

#[test]
fn test_tampered_image_row_fails_hydration() {
    let objects = MemoryObjectStore::new();
    let (tree, digests) = sample_tree(&objects);

    let mut conn = db::open_in_memory().unwrap();
    db::init_schema(&conn).unwrap();
    SqliteTreeStore::save(&mut conn, "db", &tree).unwrap();

    // Corrupt the stored digest of the root image.
    let body: String = conn
        .query_row(
            "SELECT body FROM images WHERE namespace = 'db' AND digest = ?1",
            rusqlite::params![digests[0].to_hex()],
            |row| row.get(0),
        )
        .unwrap();
    let tampered = body.replace(&digests[0].to_hex(), &digests[1].to_hex());
    conn.execute(
        "UPDATE images SET body = ?1 WHERE namespace = 'db' AND digest = ?2",
        rusqlite::params![tampered, digests[0].to_hex()],
    )
    .unwrap();

    let err = SqliteTreeStore::load(&conn, "db").unwrap_err();
    assert_eq!(err.code(), "ERR_INTEGRITY");
}
