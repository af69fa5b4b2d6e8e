//! Error taxonomy for relvc operations.
//!
//! Every failure mode has a stable error code (see [`VcError::code`]) so
//! callers and tests can classify errors without matching on display
//! strings. Retryability is explicit: only [`VcError::Io`] is transient.

use relvc_core_types::Digest;
use thiserror::Error;

/// Result type alias using VcError
pub type Result<T> = std::result::Result<T, VcError>;

/// Canonical error taxonomy for relvc operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VcError {
    /// Object bytes for a digest are absent from the object store
    #[error("object not found: {digest}")]
    NotFound { digest: Digest },

    /// Named ref does not exist in the target namespace
    #[error("unknown ref: {name}")]
    UnknownRef { name: String },

    /// Mountpoint namespace does not exist
    #[error("unknown mountpoint: {namespace}")]
    UnknownMountpoint { namespace: String },

    /// Mountpoint namespace already initialized
    #[error("mountpoint already exists: {namespace}")]
    MountpointExists { namespace: String },

    /// Stored bytes rehash to a different digest (store corruption, fatal)
    #[error("integrity failure: object {digest} rehashes to {actual}")]
    Integrity { digest: Digest, actual: Digest },

    /// Change-set applied to a state other than its base
    #[error("change-set base mismatch: computed against {expected}, state is {actual}")]
    BaseMismatch { expected: Digest, actual: Digest },

    /// Commit references a parent that is not present in the tree.
    ///
    /// Nodes are append-only and parents are verified before insert, so an
    /// actual cycle can never be constructed; this variant is the rejection
    /// that keeps it that way.
    #[error("commit references unreachable parent: {parent}")]
    Cycle { parent: Digest },

    /// Commit would violate a structural precondition (e.g. a delta
    /// payload with no derivation parent to replay from)
    #[error("invalid commit: {reason}")]
    InvalidCommit { reason: String },

    /// Diff requested between states with different table schemas
    #[error("table schema mismatch: {reason}")]
    SchemaMismatch { reason: String },

    /// Compare-and-swap ref update lost a race
    #[error("ref {name} moved concurrently (expected {expected:?})")]
    RefConflict {
        name: String,
        expected: Option<Digest>,
    },

    /// Checkout aborted; the live mountpoint is untouched
    #[error("checkout aborted at step `{step}`: {source}")]
    CheckoutFailed {
        step: String,
        #[source]
        source: Box<VcError>,
    },

    /// Transient I/O failure, retryable by the caller
    #[error("I/O error during {op}: {message}")]
    Io { op: String, message: String },

    /// Serialization error (JSON encoding/decoding)
    #[error("serialization error: {message}")]
    Serialization { message: String },
}

impl VcError {
    /// Stable error code for programmatic handling.
    pub fn code(&self) -> &'static str {
        match self {
            VcError::NotFound { .. } => "ERR_NOT_FOUND",
            VcError::UnknownRef { .. } => "ERR_UNKNOWN_REF",
            VcError::UnknownMountpoint { .. } => "ERR_UNKNOWN_MOUNTPOINT",
            VcError::MountpointExists { .. } => "ERR_MOUNTPOINT_EXISTS",
            VcError::Integrity { .. } => "ERR_INTEGRITY",
            VcError::BaseMismatch { .. } => "ERR_BASE_MISMATCH",
            VcError::Cycle { .. } => "ERR_CYCLE",
            VcError::InvalidCommit { .. } => "ERR_INVALID_COMMIT",
            VcError::SchemaMismatch { .. } => "ERR_SCHEMA_MISMATCH",
            VcError::RefConflict { .. } => "ERR_REF_CONFLICT",
            VcError::CheckoutFailed { .. } => "ERR_CHECKOUT_FAILED",
            VcError::Io { .. } => "ERR_IO",
            VcError::Serialization { .. } => "ERR_SERIALIZATION",
        }
    }

    /// Whether the caller may retry the operation with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VcError::Io { .. })
    }

    /// Wrap an underlying failure as a checkout abort at the named step.
    pub fn checkout_failed(step: impl Into<String>, source: VcError) -> Self {
        VcError::CheckoutFailed {
            step: step.into(),
            source: Box::new(source),
        }
    }
}

impl From<serde_json::Error> for VcError {
    fn from(err: serde_json::Error) -> Self {
        VcError::Serialization {
            message: err.to_string(),
        }
    }
}

/// Create an IO error with operation context
pub fn io_error(op: &str, err: std::io::Error) -> VcError {
    VcError::Io {
        op: op.to_string(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relvc_core_types::digest::DIGEST_LEN;

    fn d(byte: u8) -> Digest {
        Digest::from_bytes([byte; DIGEST_LEN])
    }

    #[test]
    fn test_error_codes_are_distinct() {
        let errors = [
            VcError::NotFound { digest: d(1) },
            VcError::UnknownRef { name: "HEAD".into() },
            VcError::Integrity {
                digest: d(1),
                actual: d(2),
            },
            VcError::BaseMismatch {
                expected: d(1),
                actual: d(2),
            },
            VcError::Cycle { parent: d(1) },
            VcError::Io {
                op: "read".into(),
                message: "boom".into(),
            },
        ];
        let mut codes: Vec<&str> = errors.iter().map(|e| e.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_only_io_is_retryable() {
        assert!(io_error("read", std::io::Error::other("x")).is_retryable());
        assert!(!VcError::NotFound { digest: d(1) }.is_retryable());
        assert!(!VcError::Integrity {
            digest: d(1),
            actual: d(2)
        }
        .is_retryable());
    }

    #[test]
    fn test_checkout_failed_carries_step_and_source() {
        let err = VcError::checkout_failed("apply_delta", VcError::NotFound { digest: d(7) });
        assert_eq!(err.code(), "ERR_CHECKOUT_FAILED");
        let msg = err.to_string();
        assert!(msg.contains("apply_delta"));
        assert!(msg.contains("not found"));
    }
}
