//! Axis-aligned hyper-rectangles and the spatial comparison helpers built
//! on them.
//!
//! Points (`[f64]`) and [`HyperBoundingBox`]es both implement
//! [`SpatialComparable`], so the helpers here work on either.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Anything with a per-dimension minimum and maximum.
pub trait SpatialComparable {
    fn dim(&self) -> usize;
    fn min(&self, d: usize) -> f64;
    fn max(&self, d: usize) -> f64;
}

impl SpatialComparable for [f64] {
    fn dim(&self) -> usize {
        self.len()
    }

    fn min(&self, d: usize) -> f64 {
        self[d]
    }

    fn max(&self, d: usize) -> f64 {
        self[d]
    }
}

impl SpatialComparable for Vec<f64> {
    fn dim(&self) -> usize {
        self.len()
    }

    fn min(&self, d: usize) -> f64 {
        self[d]
    }

    fn max(&self, d: usize) -> f64 {
        self[d]
    }
}

/// A minimum bounding rectangle in any number of dimensions.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HyperBoundingBox {
    min: Vec<f64>,
    max: Vec<f64>,
}

impl HyperBoundingBox {
    /// Creates a box from its corners.
    ///
    /// Callers are expected to pass `min[d] <= max[d]`; the constructor
    /// does not reorder.
    pub fn new(min: Vec<f64>, max: Vec<f64>) -> Self {
        debug_assert_eq!(min.len(), max.len());
        Self { min, max }
    }

    /// A degenerate box around a single point.
    pub fn from_point(point: &[f64]) -> Self {
        Self {
            min: point.to_vec(),
            max: point.to_vec(),
        }
    }

    /// Copies the extent of any spatial object.
    pub fn from_spatial(obj: &(impl SpatialComparable + ?Sized)) -> Self {
        let dim = obj.dim();
        Self {
            min: (0..dim).map(|d| obj.min(d)).collect(),
            max: (0..dim).map(|d| obj.max(d)).collect(),
        }
    }

    /// Smallest box containing every object, or `None` for an empty input.
    pub fn union_all<'a, T, I>(objects: I) -> Option<Self>
    where
        T: SpatialComparable + ?Sized + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        let mut iter = objects.into_iter();
        let mut mbr = Self::from_spatial(iter.next()?);
        for obj in iter {
            mbr.extend(obj);
        }
        Some(mbr)
    }

    /// Grows this box in place to include `other`.
    pub fn extend(&mut self, other: &(impl SpatialComparable + ?Sized)) {
        for d in 0..self.min.len() {
            self.min[d] = self.min[d].min(other.min(d));
            self.max[d] = self.max[d].max(other.max(d));
        }
    }

    pub fn min_corner(&self) -> &[f64] {
        &self.min
    }

    pub fn max_corner(&self) -> &[f64] {
        &self.max
    }
}

impl std::fmt::Display for HyperBoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HyperBoundingBox({:?}, {:?})", self.min, self.max)
    }
}

impl SpatialComparable for HyperBoundingBox {
    fn dim(&self) -> usize {
        self.min.len()
    }

    fn min(&self, d: usize) -> f64 {
        self.min[d]
    }

    fn max(&self, d: usize) -> f64 {
        self.max[d]
    }
}

// ============================================================================
// Spatial helpers
// ============================================================================

/// Product of the side lengths.
pub fn volume(obj: &(impl SpatialComparable + ?Sized)) -> f64 {
    (0..obj.dim()).map(|d| obj.max(d) - obj.min(d)).product()
}

/// Sum of the side lengths (the R*-tree "margin").
pub fn margin(obj: &(impl SpatialComparable + ?Sized)) -> f64 {
    (0..obj.dim()).map(|d| obj.max(d) - obj.min(d)).sum()
}

/// Smallest box containing both objects.
pub fn union(
    a: &(impl SpatialComparable + ?Sized),
    b: &(impl SpatialComparable + ?Sized),
) -> HyperBoundingBox {
    let mut mbr = HyperBoundingBox::from_spatial(a);
    mbr.extend(b);
    mbr
}

/// Volume of the union of two objects, without materializing it.
pub fn volume_union(
    a: &(impl SpatialComparable + ?Sized),
    b: &(impl SpatialComparable + ?Sized),
) -> f64 {
    (0..a.dim())
        .map(|d| a.max(d).max(b.max(d)) - a.min(d).min(b.min(d)))
        .product()
}

/// Volume of the intersection, 0 when disjoint.
pub fn overlap(
    a: &(impl SpatialComparable + ?Sized),
    b: &(impl SpatialComparable + ?Sized),
) -> f64 {
    let mut result = 1.0;
    for d in 0..a.dim() {
        let lo = a.min(d).max(b.min(d));
        let hi = a.max(d).min(b.max(d));
        if hi <= lo {
            return 0.0;
        }
        result *= hi - lo;
    }
    result
}

pub fn intersects(
    a: &(impl SpatialComparable + ?Sized),
    b: &(impl SpatialComparable + ?Sized),
) -> bool {
    (0..a.dim()).all(|d| a.max(d) >= b.min(d) && a.min(d) <= b.max(d))
}

/// True when `outer` contains `inner` (boundaries included).
pub fn contains(
    outer: &(impl SpatialComparable + ?Sized),
    inner: &(impl SpatialComparable + ?Sized),
) -> bool {
    (0..outer.dim()).all(|d| outer.min(d) <= inner.min(d) && outer.max(d) >= inner.max(d))
}

/// Volume increase of `mbr` if it had to cover `obj` too.
pub fn enlargement(
    mbr: &(impl SpatialComparable + ?Sized),
    obj: &(impl SpatialComparable + ?Sized),
) -> f64 {
    volume_union(mbr, obj) - volume(mbr)
}

pub fn centroid(obj: &(impl SpatialComparable + ?Sized)) -> Vec<f64> {
    (0..obj.dim()).map(|d| (obj.min(d) + obj.max(d)) * 0.5).collect()
}

/// Squared euclidean distance between the centers of two objects.
pub fn center_distance_sq(
    a: &(impl SpatialComparable + ?Sized),
    b: &(impl SpatialComparable + ?Sized),
) -> f64 {
    (0..a.dim())
        .map(|d| {
            let diff = (a.min(d) + a.max(d)) * 0.5 - (b.min(d) + b.max(d)) * 0.5;
            diff * diff
        })
        .sum()
}
