//! SQLite-backed object location registry.
//!
//! Records which locations hold which objects so push can skip transfers
//! the destination already covers. The table is advisory: a stale or
//! missing row only costs an extra transfer, never correctness.

use std::collections::BTreeSet;
use std::sync::Mutex;

use rusqlite::Connection;

use crate::errors::{from_rusqlite, Result};
use relvc_core::sync::{Location, LocationRegistry};
use relvc_core_types::Digest;

/// Location registry persisted in the `object_locations` table.
pub struct SqliteRegistry {
    conn: Mutex<Connection>,
}

impl SqliteRegistry {
    /// Wrap a connection whose schema has been initialized with
    /// [`crate::db::init_schema`].
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }
}

impl LocationRegistry for SqliteRegistry {
    fn locate(&self, object: &Digest) -> Result<BTreeSet<Location>> {
        let conn = self.conn.lock().expect("registry lock poisoned");
        let mut stmt = conn
            .prepare("SELECT location FROM object_locations WHERE object = ?1")
            .map_err(from_rusqlite)?;
        let rows = stmt
            .query_map(rusqlite::params![object.to_hex()], |row| {
                row.get::<_, String>(0)
            })
            .map_err(from_rusqlite)?;
        let mut locations = BTreeSet::new();
        for row in rows {
            locations.insert(Location::new(row.map_err(from_rusqlite)?));
        }
        Ok(locations)
    }

    fn announce(&self, object: &Digest, location: &Location) -> Result<()> {
        let conn = self.conn.lock().expect("registry lock poisoned");
        conn.execute(
            "INSERT INTO object_locations (object, location) VALUES (?1, ?2)
             ON CONFLICT(object, location) DO NOTHING",
            rusqlite::params![object.to_hex(), location.uri],
        )
        .map_err(from_rusqlite)?;
        Ok(())
    }
}
