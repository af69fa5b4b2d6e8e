//! relvc-store - durable backends for the version-control engine
//!
//! Provides:
//! - Filesystem content-addressed object store (atomic writes, digest
//!   verification, sharding)
//! - SQLite persistence for commit trees and refs
//! - SQLite-backed object location registry for push/pull planning

pub mod cas;
pub mod db;
pub mod errors;
pub mod registry;
pub mod tree_store;

pub use cas::FsObjectStore;
pub use errors::Result;
pub use registry::SqliteRegistry;
pub use tree_store::SqliteTreeStore;
