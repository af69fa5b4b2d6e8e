//! Content-address digest type.
//!
//! Every image and stored object in relvc is identified by a SHA256
//! digest. The digest is a fixed-width 32-byte value; it is rendered
//! and serialized as a 64-character lowercase hex string so that
//! persisted trees and wire payloads stay human-inspectable.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of raw bytes in a digest (SHA256).
pub const DIGEST_LEN: usize = 32;

/// Error returned when parsing a digest from its hex form fails.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DigestParseError {
    /// Input was not valid hex
    #[error("digest is not valid hex: {0}")]
    InvalidHex(String),
    /// Input decoded to the wrong number of bytes
    #[error("digest must be {expected} bytes, got {actual}")]
    WrongLength { expected: usize, actual: usize },
}

/// Fixed-width content-address digest.
///
/// Ordered and hashable so it can key `BTreeMap`s and `HashMap`s
/// throughout the commit tree and object store.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    /// Wrap raw digest bytes.
    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Full lowercase hex rendering (64 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, DigestParseError> {
        let bytes =
            hex::decode(s).map_err(|_| DigestParseError::InvalidHex(s.to_string()))?;
        let arr: [u8; DIGEST_LEN] =
            bytes
                .try_into()
                .map_err(|v: Vec<u8>| DigestParseError::WrongLength {
                    expected: DIGEST_LEN,
                    actual: v.len(),
                })?;
        Ok(Self(arr))
    }

    /// Abbreviated hex form for log output (first 12 characters).
    pub fn short(&self) -> String {
        self.to_hex()[..12].to_string()
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.short())
    }
}

impl FromStr for Digest {
    type Err = DigestParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Digest::from_hex(&s).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Digest {
        Digest::from_bytes([0xab; DIGEST_LEN])
    }

    #[test]
    fn test_hex_round_trip() {
        let d = sample();
        let hex = d.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(Digest::from_hex(&hex).unwrap(), d);
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        assert!(matches!(
            Digest::from_hex("zz"),
            Err(DigestParseError::InvalidHex(_))
        ));
        assert!(matches!(
            Digest::from_hex("abcd"),
            Err(DigestParseError::WrongLength {
                expected: 32,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_serde_as_hex_string() {
        let d = sample();
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, format!("\"{}\"", d.to_hex()));
        let back: Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn test_short_is_prefix() {
        let d = sample();
        assert!(d.to_hex().starts_with(&d.short()));
        assert_eq!(d.short().len(), 12);
    }
}
