//! SQLite persistence for commit trees.
//!
//! Images round-trip as canonical JSON; hydration re-verifies every
//! digest through [`CommitTree::adopt`], so a tampered row fails load
//! rather than poisoning the in-memory tree.

use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use crate::errors::{decode_error, from_rusqlite, Result};
use relvc_core::model::Image;
use relvc_core::tree::CommitTree;
use relvc_core_types::Digest;

/// Persists and hydrates per-namespace commit trees.
pub struct SqliteTreeStore;

impl SqliteTreeStore {
    /// Write a namespace's tree, replacing any previous rows.
    ///
    /// Image rows are append-only in practice (nodes never change), so
    /// the upsert only ever inserts; refs are replaced wholesale since
    /// they are the mutable part.
    pub fn save(conn: &mut Connection, namespace: &str, tree: &CommitTree) -> Result<()> {
        let tx = conn.transaction().map_err(from_rusqlite)?;

        for node in tree.nodes() {
            let body = serde_json::to_string(&node.image)?;
            tx.execute(
                "INSERT INTO images (namespace, digest, depth, body)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(namespace, digest) DO NOTHING",
                rusqlite::params![namespace, node.image.digest.to_hex(), node.depth as i64, body],
            )
            .map_err(from_rusqlite)?;
        }

        tx.execute(
            "DELETE FROM refs WHERE namespace = ?1",
            rusqlite::params![namespace],
        )
        .map_err(from_rusqlite)?;
        for (name, digest) in tree.list_refs() {
            tx.execute(
                "INSERT INTO refs (namespace, name, digest) VALUES (?1, ?2, ?3)",
                rusqlite::params![namespace, name, digest.to_hex()],
            )
            .map_err(from_rusqlite)?;
        }

        tx.commit().map_err(from_rusqlite)?;
        debug!(namespace, nodes = tree.len(), "tree saved");
        Ok(())
    }

    /// Hydrate a namespace's tree. Returns an empty tree for an unknown
    /// namespace.
    pub fn load(conn: &Connection, namespace: &str) -> Result<CommitTree> {
        let mut tree = CommitTree::new();

        // Parents always have strictly smaller depth, so loading in
        // depth order satisfies adopt's parent-presence check.
        let mut stmt = conn
            .prepare(
                "SELECT body FROM images WHERE namespace = ?1 ORDER BY depth ASC, digest ASC",
            )
            .map_err(from_rusqlite)?;
        let bodies = stmt
            .query_map(rusqlite::params![namespace], |row| {
                row.get::<_, String>(0)
            })
            .map_err(from_rusqlite)?;
        for body in bodies {
            let body = body.map_err(from_rusqlite)?;
            let image: Image =
                serde_json::from_str(&body).map_err(|e| decode_error("image", e))?;
            tree.adopt(image)?;
        }

        let mut stmt = conn
            .prepare("SELECT name, digest FROM refs WHERE namespace = ?1")
            .map_err(from_rusqlite)?;
        let refs = stmt
            .query_map(rusqlite::params![namespace], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(from_rusqlite)?;
        for entry in refs {
            let (name, hex) = entry.map_err(from_rusqlite)?;
            let digest = hex
                .parse::<Digest>()
                .map_err(|e| relvc_core::errors::VcError::Serialization {
                    message: format!("bad ref digest for {}: {}", name, e),
                })?;
            tree.set_ref(&name, digest)?;
        }

        debug!(namespace, nodes = tree.len(), "tree hydrated");
        Ok(tree)
    }

    /// Namespaces with at least one persisted image, sorted.
    pub fn list_namespaces(conn: &Connection) -> Result<Vec<String>> {
        let mut stmt = conn
            .prepare("SELECT DISTINCT namespace FROM images ORDER BY namespace")
            .map_err(from_rusqlite)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(from_rusqlite)?;
        let mut namespaces = Vec::new();
        for row in rows {
            namespaces.push(row.map_err(from_rusqlite)?);
        }
        Ok(namespaces)
    }

    /// Digest a persisted ref points at, if the ref exists.
    pub fn resolve_ref(
        conn: &Connection,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Digest>> {
        let hex: Option<String> = conn
            .query_row(
                "SELECT digest FROM refs WHERE namespace = ?1 AND name = ?2",
                rusqlite::params![namespace, name],
                |row| row.get(0),
            )
            .optional()
            .map_err(from_rusqlite)?;
        match hex {
            None => Ok(None),
            Some(hex) => Ok(Some(hex.parse::<Digest>().map_err(|e| {
                relvc_core::errors::VcError::Serialization {
                    message: format!("bad ref digest for {}: {}", name, e),
                }
            })?)),
        }
    }
}
