//! Core types shared across relvc facilities
//!
//! This crate provides foundational types used by the engine, the
//! persistence layer, and the logging facility:
//!
//! - **Digest**: fixed-width content-address value for images and objects
//! - **Schema constants**: canonical event names for structured logging

pub mod digest;
pub mod schema;

pub use digest::{Digest, DigestParseError};
