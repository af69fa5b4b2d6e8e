//! Canonical event names for structured logging
//!
//! Every `tracing` call site in the engine tags its record with one of
//! these as the `event` field, so log consumers match on a closed set.

// Canonical event names emitted by the engine
pub const EVENT_COMMIT: &str = "commit";
pub const EVENT_CHECKOUT_START: &str = "checkout_start";
pub const EVENT_CHECKOUT_END: &str = "checkout_end";
pub const EVENT_DIFF_COMPUTED: &str = "diff_computed";
pub const EVENT_PUSH_PROGRESS: &str = "push_progress";
pub const EVENT_PULL_PROGRESS: &str = "pull_progress";
