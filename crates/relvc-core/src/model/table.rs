//! Table schema descriptors and logical table state.
//!
//! [`TableState`] is the logical content of one table at one image: a map
//! from primary key to row, ordered by key. Its content digest is the
//! anchor for every diff precondition check, so the serialization fed to
//! the hasher must stay canonical (schema, then rows in key order).

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::collections::BTreeMap;

use crate::errors::{Result, VcError};
use crate::model::value::{Datum, Key, Row};
use relvc_core_types::Digest;

/// Column value domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Boolean,
    Integer,
    Real,
    Text,
    Bytes,
}

/// A single column descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name, unique within the table
    pub name: String,
    /// Value domain
    pub col_type: ColumnType,
    /// Whether the column is part of the primary key
    pub primary_key: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, col_type: ColumnType, primary_key: bool) -> Self {
        Self {
            name: name.into(),
            col_type,
            primary_key,
        }
    }
}

/// Logical schema of one versioned table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name within the mountpoint
    pub table_name: String,
    /// Columns in positional order
    pub columns: Vec<Column>,
}

impl TableSchema {
    /// Build a schema, validating structural invariants.
    ///
    /// # Errors
    ///
    /// Returns `SchemaMismatch` if the table has no primary-key column or
    /// a duplicate column name.
    pub fn new(table_name: impl Into<String>, columns: Vec<Column>) -> Result<Self> {
        let schema = Self {
            table_name: table_name.into(),
            columns,
        };
        if schema.key_indices().is_empty() {
            return Err(VcError::SchemaMismatch {
                reason: format!("table {} has no primary key column", schema.table_name),
            });
        }
        for (i, col) in schema.columns.iter().enumerate() {
            if schema.columns[..i].iter().any(|c| c.name == col.name) {
                return Err(VcError::SchemaMismatch {
                    reason: format!(
                        "table {} has duplicate column {}",
                        schema.table_name, col.name
                    ),
                });
            }
        }
        Ok(schema)
    }

    /// Positional indices of the primary-key columns.
    pub fn key_indices(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.primary_key)
            .map(|(i, _)| i)
            .collect()
    }

    /// Positional index of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Extract the primary key of a row under this schema.
    ///
    /// # Errors
    ///
    /// Returns `SchemaMismatch` if the row arity does not match the schema.
    pub fn key_of(&self, row: &Row) -> Result<Key> {
        if row.len() != self.columns.len() {
            return Err(VcError::SchemaMismatch {
                reason: format!(
                    "row has {} cells, table {} has {} columns",
                    row.len(),
                    self.table_name,
                    self.columns.len()
                ),
            });
        }
        Ok(Key(self
            .key_indices()
            .into_iter()
            .map(|i| row[i].clone())
            .collect()))
    }
}

/// The logical content of one table at one image.
#[derive(Debug, Clone, PartialEq)]
pub struct TableState {
    schema: TableSchema,
    rows: BTreeMap<Key, Row>,
}

impl TableState {
    /// Create an empty state for the given schema.
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: BTreeMap::new(),
        }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Insert or replace a row, keyed by its primary key.
    pub fn upsert(&mut self, row: Row) -> Result<()> {
        let key = self.schema.key_of(&row)?;
        self.rows.insert(key, row);
        Ok(())
    }

    /// Remove a row by primary key, returning it if present.
    pub fn delete(&mut self, key: &Key) -> Option<Row> {
        self.rows.remove(key)
    }

    /// Look up a row by primary key.
    pub fn get(&self, key: &Key) -> Option<&Row> {
        self.rows.get(key)
    }

    /// Iterate rows in primary-key order.
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Row)> {
        self.rows.iter()
    }

    /// Rows in primary-key order.
    pub fn rows(&self) -> Vec<Row> {
        self.rows.values().cloned().collect()
    }

    /// Rebuild a state from rows (e.g. a decoded snapshot payload).
    pub fn from_rows(schema: TableSchema, rows: Vec<Row>) -> Result<Self> {
        let mut state = Self::new(schema);
        for row in rows {
            state.upsert(row)?;
        }
        Ok(state)
    }

    /// Content digest of this logical state.
    ///
    /// Canonical encoding: JSON of `{schema, rows}` with rows in
    /// primary-key order. Two states with identical logical content always
    /// produce the same digest.
    pub fn content_digest(&self) -> Result<Digest> {
        let canonical = serde_json::to_vec(&serde_json::json!({
            "schema": self.schema,
            "rows": self.rows.values().collect::<Vec<_>>(),
        }))?;
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        Ok(Digest::from_bytes(hasher.finalize().into()))
    }
}

/// The canonical test fixture schema: `(id INTEGER PRIMARY KEY, value TEXT)`.
#[doc(hidden)]
pub fn id_value_schema(table_name: &str) -> TableSchema {
    TableSchema::new(
        table_name,
        vec![
            Column::new("id", ColumnType::Integer, true),
            Column::new("value", ColumnType::Text, false),
        ],
    )
    .expect("fixture schema is valid")
}
