//! Cell values and primary keys.
//!
//! Diff output is ordered by primary key, so [`Datum`] carries a total
//! order: variants rank `Null < Bool < Integer < Real < Text < Bytes`,
//! and `Real` compares via `f64::total_cmp` (equality via bit pattern)
//! so that states containing floats still sort and hash deterministically.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A single cell value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Datum {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Datum {
    fn variant_rank(&self) -> u8 {
        match self {
            Datum::Null => 0,
            Datum::Bool(_) => 1,
            Datum::Integer(_) => 2,
            Datum::Real(_) => 3,
            Datum::Text(_) => 4,
            Datum::Bytes(_) => 5,
        }
    }
}

impl PartialEq for Datum {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Datum::Null, Datum::Null) => true,
            (Datum::Bool(a), Datum::Bool(b)) => a == b,
            (Datum::Integer(a), Datum::Integer(b)) => a == b,
            (Datum::Real(a), Datum::Real(b)) => a.to_bits() == b.to_bits(),
            (Datum::Text(a), Datum::Text(b)) => a == b,
            (Datum::Bytes(a), Datum::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Datum {}

impl PartialOrd for Datum {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Datum {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Datum::Null, Datum::Null) => Ordering::Equal,
            (Datum::Bool(a), Datum::Bool(b)) => a.cmp(b),
            (Datum::Integer(a), Datum::Integer(b)) => a.cmp(b),
            (Datum::Real(a), Datum::Real(b)) => a.total_cmp(b),
            (Datum::Text(a), Datum::Text(b)) => a.cmp(b),
            (Datum::Bytes(a), Datum::Bytes(b)) => a.cmp(b),
            _ => self.variant_rank().cmp(&other.variant_rank()),
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => write!(f, "NULL"),
            Datum::Bool(b) => write!(f, "{}", b),
            Datum::Integer(i) => write!(f, "{}", i),
            Datum::Real(r) => write!(f, "{}", r),
            Datum::Text(s) => write!(f, "'{}'", s),
            Datum::Bytes(b) => write!(f, "x'{}'", hex::encode(b)),
        }
    }
}

impl From<i64> for Datum {
    fn from(v: i64) -> Self {
        Datum::Integer(v)
    }
}

impl From<&str> for Datum {
    fn from(v: &str) -> Self {
        Datum::Text(v.to_string())
    }
}

impl From<bool> for Datum {
    fn from(v: bool) -> Self {
        Datum::Bool(v)
    }
}

/// A full table row, cells in schema column order.
pub type Row = Vec<Datum>;

/// Primary-key value for a row, cells in key-column order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(pub Vec<Datum>);

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, datum) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", datum)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_within_variant() {
        assert!(Datum::Integer(1) < Datum::Integer(2));
        assert!(Datum::Text("a".into()) < Datum::Text("b".into()));
        assert!(Datum::Real(1.0) < Datum::Real(1.5));
    }

    #[test]
    fn test_ordering_across_variants_is_total() {
        let mut data = vec![
            Datum::Text("a".into()),
            Datum::Null,
            Datum::Integer(0),
            Datum::Bool(true),
        ];
        data.sort();
        assert_eq!(data[0], Datum::Null);
        assert_eq!(data[1], Datum::Bool(true));
        assert_eq!(data[2], Datum::Integer(0));
    }

    #[test]
    fn test_real_equality_by_bits() {
        assert_eq!(Datum::Real(1.5), Datum::Real(1.5));
        assert_ne!(Datum::Real(0.0), Datum::Real(-0.0));
        assert_eq!(Datum::Real(f64::NAN), Datum::Real(f64::NAN));
    }

    #[test]
    fn test_key_display() {
        let key = Key(vec![Datum::Integer(1), Datum::Text("a".into())]);
        assert_eq!(key.to_string(), "(1, 'a')");
    }
}
