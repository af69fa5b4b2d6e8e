//! relvc-core: version control for relational table data.
//!
//! Tables are versioned as content-addressed **images** in an append-only
//! commit tree. Most images store only a row-level change set against
//! their parent; periodic checkpoints store full snapshots so that any
//! image can be rebuilt by bounded replay rather than root-to-tip
//! reconstruction. Checkout plans the cheapest path (common-ancestor
//! delta walk or snapshot floor), materializes into staging, and swaps
//! atomically; push/pull move only the objects the other side lacks.
//!
//! [`Repository`] is the embedding surface; the component modules
//! (`tree`, `diff`, `checkout`, `sync`, `objects`) are public for
//! callers that need to compose them directly.

pub mod checkout;
pub mod config;
pub mod diff;
pub mod errors;
pub mod hasher;
pub mod logging;
pub mod model;
pub mod objects;
pub mod repo;
pub mod sync;
pub mod tree;

pub use config::Settings;
pub use diff::{ChangeSet, RowOp};
pub use errors::{Result, VcError};
pub use model::{
    Column, ColumnType, Datum, Image, Key, ParentEdge, ParentKind, PayloadRef, Row, TableSchema,
    TableState,
};
pub use objects::{MemoryObjectStore, ObjectStore};
pub use repo::{Repository, HEAD_REF};
pub use sync::{
    CheapestPlan, Location, LocationRegistry, MemorySite, RemoteSite, SyncReport, TransferStrategy,
};
pub use tree::CommitTree;

pub use relvc_core_types::Digest;
