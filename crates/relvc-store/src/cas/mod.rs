//! Content-addressed object storage on the filesystem.
//!
//! Provides:
//! - Atomic temp→rename writes
//! - Digest verification on every read
//! - Sharding by the first 2 hex chars of the digest

mod atomic;
mod fs_store;
mod sharding;

pub use fs_store::FsObjectStore;
