//! Error helpers for the persistence layer.
//!
//! The store surfaces the core [`VcError`] taxonomy; these helpers map
//! backend failures into it with operation context attached.

use relvc_core::errors::VcError;

pub use relvc_core::errors::{io_error, Result};

/// Map a rusqlite failure to a retryable I/O error.
pub fn from_rusqlite(err: rusqlite::Error) -> VcError {
    VcError::Io {
        op: "sqlite".to_string(),
        message: err.to_string(),
    }
}

/// A persisted record that fails to decode. Not retryable; the row is
/// corrupt or written by an incompatible version.
pub fn decode_error(what: &str, err: serde_json::Error) -> VcError {
    VcError::Serialization {
        message: format!("failed to decode stored {}: {}", what, err),
    }
}
