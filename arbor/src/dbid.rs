//! Object identifiers.
//!
//! A [`DBID`] is an opaque, stable handle into a relation. Indexes store
//! DBIDs (plus geometric summaries), never the objects themselves.

use std::fmt::{Display, Formatter};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Database object identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DBID(u32);

impl DBID {
    pub const fn new(value: u32) -> Self {
        DBID(value)
    }

    /// Raw value, usable as an offset into dense arrays.
    pub fn index(&self) -> usize {
        self.0 as usize
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl Display for DBID {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for DBID {
    fn from(value: u32) -> Self {
        DBID(value)
    }
}

/// An identifier paired with its distance to some reference object.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DoubleDBIDPair {
    pub distance: f64,
    pub id: DBID,
}

impl DoubleDBIDPair {
    pub fn new(distance: f64, id: DBID) -> Self {
        Self { distance, id }
    }

    /// Orders by distance, then by id. NaN sorts last.
    pub fn compare(&self, other: &Self) -> std::cmp::Ordering {
        crate::util::cmp_distance(self.distance, other.distance).then(self.id.cmp(&other.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dbid_roundtrips_raw_value() {
        let id = DBID::new(42);
        assert_eq!(id.index(), 42);
        assert_eq!(id.value(), 42);
        assert_eq!(DBID::from(42u32), id);
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn test_pair_ordering_uses_distance_then_id() {
        let a = DoubleDBIDPair::new(1.0, DBID::new(9));
        let b = DoubleDBIDPair::new(1.0, DBID::new(3));
        let c = DoubleDBIDPair::new(0.5, DBID::new(10));
        let mut pairs = vec![a, b, c];
        pairs.sort_by(|x, y| x.compare(y));
        assert_eq!(
            pairs.iter().map(|p| p.id.value()).collect::<Vec<_>>(),
            vec![10, 3, 9]
        );
    }

    #[test]
    fn test_nan_sorts_last() {
        let mut pairs = vec![
            DoubleDBIDPair::new(f64::NAN, DBID::new(1)),
            DoubleDBIDPair::new(3.0, DBID::new(2)),
        ];
        pairs.sort_by(|x, y| x.compare(y));
        assert_eq!(pairs[0].id, DBID::new(2));
    }
}
