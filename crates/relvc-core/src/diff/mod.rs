//! Row-level diff engine: compute, apply, and invert change-sets.

pub mod engine;
pub mod model;

pub use engine::{apply, diff, invert, CHANGESET_SCHEMA_VERSION};
pub use model::{ChangeSet, ColumnChange, RowOp};
