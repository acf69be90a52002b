//! Distance functions consumed by the indexes.
//!
//! Distances are plain values: the common norms are zero-sized types, the
//! general Lp norm carries its exponent. Spatial distances additionally
//! provide an admissible `min_dist` lower bound between rectangles, which
//! is what the R*-tree needs to prune.

use crate::bounding_box::SpatialComparable;
use crate::errors::{ArborError, ArborResult, ErrorKind};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A distance between two objects of type `O`.
///
/// Implementations must be symmetric, non-negative and return 0 for
/// `distance(a, a)`.
pub trait PrimitiveDistance<O: ?Sized>: Send + Sync {
    fn distance(&self, a: &O, b: &O) -> f64;

    /// Stable name, used in error messages and to match metric indexes.
    fn name(&self) -> &str;

    /// Whether the triangle inequality holds.
    fn is_metric(&self) -> bool {
        false
    }

    /// Returns the spatial capability if this distance can bound rectangles.
    fn as_spatial(&self) -> Option<&dyn SpatialPrimitiveDistance> {
        None
    }
}

/// A vector distance with a rectangle lower bound.
pub trait SpatialPrimitiveDistance: PrimitiveDistance<[f64]> {
    /// Lower bound of the distance between any point of `a` and any point of `b`.
    /// Returns 0 when the two overlap.
    fn min_dist(&self, a: &dyn SpatialComparable, b: &dyn SpatialComparable) -> f64;
}

/// Per-dimension gap between two rectangles, 0 when their extents overlap.
#[inline]
fn gap(a: &dyn SpatialComparable, b: &dyn SpatialComparable, d: usize) -> f64 {
    let (amin, amax, bmin, bmax) = (a.min(d), a.max(d), b.min(d), b.max(d));
    if amax < bmin {
        bmin - amax
    } else if bmax < amin {
        amin - bmax
    } else {
        0.0
    }
}

#[inline]
fn common_dim(a: usize, b: usize) -> usize {
    a.min(b)
}

// ============================================================================
// Euclidean family
// ============================================================================

/// Euclidean (L2) distance.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EuclideanDistance;

impl PrimitiveDistance<[f64]> for EuclideanDistance {
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        SquaredEuclideanDistance.distance(a, b).sqrt()
    }

    fn name(&self) -> &str {
        "EuclideanDistance"
    }

    fn is_metric(&self) -> bool {
        true
    }

    fn as_spatial(&self) -> Option<&dyn SpatialPrimitiveDistance> {
        Some(self)
    }
}

impl SpatialPrimitiveDistance for EuclideanDistance {
    fn min_dist(&self, a: &dyn SpatialComparable, b: &dyn SpatialComparable) -> f64 {
        SquaredEuclideanDistance.min_dist(a, b).sqrt()
    }
}

/// Squared Euclidean distance. Not a metric, but order-equivalent to L2.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SquaredEuclideanDistance;

impl PrimitiveDistance<[f64]> for SquaredEuclideanDistance {
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        let dim = common_dim(a.len(), b.len());
        (0..dim)
            .map(|d| {
                let diff = a[d] - b[d];
                diff * diff
            })
            .sum()
    }

    fn name(&self) -> &str {
        "SquaredEuclideanDistance"
    }

    fn as_spatial(&self) -> Option<&dyn SpatialPrimitiveDistance> {
        Some(self)
    }
}

impl SpatialPrimitiveDistance for SquaredEuclideanDistance {
    fn min_dist(&self, a: &dyn SpatialComparable, b: &dyn SpatialComparable) -> f64 {
        let dim = common_dim(a.dim(), b.dim());
        (0..dim)
            .map(|d| {
                let g = gap(a, b, d);
                g * g
            })
            .sum()
    }
}

// ============================================================================
// Other Lp norms
// ============================================================================

/// Manhattan (L1) distance.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ManhattanDistance;

impl PrimitiveDistance<[f64]> for ManhattanDistance {
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        let dim = common_dim(a.len(), b.len());
        (0..dim).map(|d| (a[d] - b[d]).abs()).sum()
    }

    fn name(&self) -> &str {
        "ManhattanDistance"
    }

    fn is_metric(&self) -> bool {
        true
    }

    fn as_spatial(&self) -> Option<&dyn SpatialPrimitiveDistance> {
        Some(self)
    }
}

impl SpatialPrimitiveDistance for ManhattanDistance {
    fn min_dist(&self, a: &dyn SpatialComparable, b: &dyn SpatialComparable) -> f64 {
        let dim = common_dim(a.dim(), b.dim());
        (0..dim).map(|d| gap(a, b, d)).sum()
    }
}

/// Maximum (L-infinity) distance.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MaximumDistance;

impl PrimitiveDistance<[f64]> for MaximumDistance {
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        let dim = common_dim(a.len(), b.len());
        (0..dim).map(|d| (a[d] - b[d]).abs()).fold(0.0, f64::max)
    }

    fn name(&self) -> &str {
        "MaximumDistance"
    }

    fn is_metric(&self) -> bool {
        true
    }

    fn as_spatial(&self) -> Option<&dyn SpatialPrimitiveDistance> {
        Some(self)
    }
}

impl SpatialPrimitiveDistance for MaximumDistance {
    fn min_dist(&self, a: &dyn SpatialComparable, b: &dyn SpatialComparable) -> f64 {
        let dim = common_dim(a.dim(), b.dim());
        (0..dim).map(|d| gap(a, b, d)).fold(0.0, f64::max)
    }
}

/// General Lp norm for `p >= 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LpNormDistance {
    p: f64,
}

impl LpNormDistance {
    pub fn new(p: f64) -> ArborResult<Self> {
        if !(p >= 1.0) || !p.is_finite() {
            return Err(ArborError::new(
                &format!("Lp norm requires a finite p >= 1, got {}", p),
                ErrorKind::Configuration,
            ));
        }
        Ok(Self { p })
    }

    pub fn p(&self) -> f64 {
        self.p
    }
}

impl PrimitiveDistance<[f64]> for LpNormDistance {
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        let dim = common_dim(a.len(), b.len());
        (0..dim)
            .map(|d| (a[d] - b[d]).abs().powf(self.p))
            .sum::<f64>()
            .powf(1.0 / self.p)
    }

    fn name(&self) -> &str {
        "LpNormDistance"
    }

    fn is_metric(&self) -> bool {
        true
    }

    fn as_spatial(&self) -> Option<&dyn SpatialPrimitiveDistance> {
        Some(self)
    }
}

impl SpatialPrimitiveDistance for LpNormDistance {
    fn min_dist(&self, a: &dyn SpatialComparable, b: &dyn SpatialComparable) -> f64 {
        let dim = common_dim(a.dim(), b.dim());
        (0..dim)
            .map(|d| gap(a, b, d).powf(self.p))
            .sum::<f64>()
            .powf(1.0 / self.p)
    }
}

// ============================================================================
// Angular
// ============================================================================

const PARALLEL_TOLERANCE: f64 = 4.0 * f64::EPSILON;

/// Angle between two vectors, in radians.
///
/// Has no rectangle lower bound, so spatial indexes cannot serve it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ArcCosineDistance;

impl PrimitiveDistance<[f64]> for ArcCosineDistance {
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        let dim = common_dim(a.len(), b.len());
        if a[..dim] == b[..dim] {
            return 0.0;
        }
        let (mut dot, mut na, mut nb) = (0.0, 0.0, 0.0);
        for d in 0..dim {
            dot += a[d] * b[d];
            na += a[d] * a[d];
            nb += b[d] * b[d];
        }
        if na == 0.0 || nb == 0.0 {
            return if na == nb { 0.0 } else { std::f64::consts::FRAC_PI_2 };
        }
        let cosine = dot / (na.sqrt() * nb.sqrt());
        // rounding can leave parallel vectors a few ulp below 1
        if cosine >= 1.0 - PARALLEL_TOLERANCE {
            return 0.0;
        }
        cosine.max(-1.0).acos()
    }

    fn name(&self) -> &str {
        "ArcCosineDistance"
    }

    fn is_metric(&self) -> bool {
        true
    }
}
