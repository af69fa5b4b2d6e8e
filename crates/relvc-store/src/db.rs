//! Database connection management
//!
//! Utilities for opening and configuring SQLite connections, plus the
//! table schema for persisted commit trees.

use crate::errors::{from_rusqlite, Result};
use rusqlite::Connection;
use std::path::Path;

/// Open a SQLite database at the given path
pub fn open<P: AsRef<Path>>(path: P) -> Result<Connection> {
    Connection::open(path).map_err(from_rusqlite)
}

/// Open an in-memory SQLite database (for testing)
pub fn open_in_memory() -> Result<Connection> {
    Connection::open_in_memory().map_err(from_rusqlite)
}

/// Configure a connection with optimal settings
pub fn configure(conn: &Connection) -> Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])
        .map_err(from_rusqlite)?;

    // WAL mode for better concurrency
    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(from_rusqlite)?;

    Ok(())
}

/// Create the persistence schema if it does not exist.
///
/// Images are stored as canonical JSON keyed by (namespace, digest);
/// `depth` orders hydration so parents always load before children.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS images (
            namespace TEXT NOT NULL,
            digest    TEXT NOT NULL,
            depth     INTEGER NOT NULL,
            body      TEXT NOT NULL,
            PRIMARY KEY (namespace, digest)
        );
        CREATE INDEX IF NOT EXISTS idx_images_depth
            ON images (namespace, depth);

        CREATE TABLE IF NOT EXISTS refs (
            namespace TEXT NOT NULL,
            name      TEXT NOT NULL,
            digest    TEXT NOT NULL,
            PRIMARY KEY (namespace, name)
        );

        CREATE TABLE IF NOT EXISTS object_locations (
            object   TEXT NOT NULL,
            location TEXT NOT NULL,
            PRIMARY KEY (object, location)
        );",
    )
    .map_err(from_rusqlite)?;

    Ok(())
}
