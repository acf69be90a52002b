//! Squared distances between points and cluster features.
//!
//! All criteria are computed from weight, centroid and SSD alone, so they
//! work with any [`ClusterFeature`]. A point is treated as a feature of
//! weight one and zero SSD.

use serde::{Deserialize, Serialize};

use crate::features::ClusterFeature;

/// Squared distance between a point or feature and a feature.
pub trait CFDistance {
    fn squared_point<F: ClusterFeature>(&self, point: &[f64], cf: &F) -> f64;

    fn squared_cf<F: ClusterFeature>(&self, a: &F, b: &F) -> f64;
}

/// The CF distances and absorption criteria of BIRCH and BETULA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CFDistanceKind {
    /// Distance between the centroids (BIRCH D0).
    CentroidEuclidean,
    /// Mean squared distance between members of different clusters (D2).
    AverageInterCluster,
    /// Mean squared distance over all pairs of the merged cluster (D3).
    AverageIntraCluster,
    /// Increase of the SSD when merging (D4).
    VarianceIncrease,
    /// Squared radius of the merged cluster.
    Radius,
    /// Squared diameter of the merged cluster.
    Diameter,
}

/// Weight, squared centroid distance and SSDs of the two sides.
struct Moments {
    n1: f64,
    n2: f64,
    centroid_sq: f64,
    ssd1: f64,
    ssd2: f64,
}

impl Moments {
    fn of_point<F: ClusterFeature>(point: &[f64], cf: &F) -> Self {
        let centroid_sq = point
            .iter()
            .enumerate()
            .take(cf.dim())
            .map(|(d, v)| {
                let diff = v - cf.centroid(d);
                diff * diff
            })
            .sum();
        Self {
            n1: 1.0,
            n2: cf.weight() as f64,
            centroid_sq,
            ssd1: 0.0,
            ssd2: cf.sum_of_squared_deviations(),
        }
    }

    fn of_features<F: ClusterFeature>(a: &F, b: &F) -> Self {
        let centroid_sq = (0..a.dim().min(b.dim()))
            .map(|d| {
                let diff = a.centroid(d) - b.centroid(d);
                diff * diff
            })
            .sum();
        Self {
            n1: a.weight() as f64,
            n2: b.weight() as f64,
            centroid_sq,
            ssd1: a.sum_of_squared_deviations(),
            ssd2: b.sum_of_squared_deviations(),
        }
    }

    fn merged_ssd(&self) -> f64 {
        let n = self.n1 + self.n2;
        self.ssd1 + self.ssd2 + self.n1 * self.n2 / n * self.centroid_sq
    }
}

impl CFDistanceKind {
    fn evaluate(&self, m: &Moments) -> f64 {
        if m.n1 == 0.0 || m.n2 == 0.0 {
            return 0.0;
        }
        let n = m.n1 + m.n2;
        let value = match self {
            CFDistanceKind::CentroidEuclidean => m.centroid_sq,
            CFDistanceKind::AverageInterCluster => m.ssd1 / m.n1 + m.ssd2 / m.n2 + m.centroid_sq,
            CFDistanceKind::AverageIntraCluster => 2.0 * m.merged_ssd() / n,
            CFDistanceKind::VarianceIncrease => m.n1 * m.n2 / n * m.centroid_sq,
            CFDistanceKind::Radius => m.merged_ssd() / n,
            CFDistanceKind::Diameter => 2.0 * m.merged_ssd() / (n - 1.0),
        };
        value.max(0.0)
    }
}

impl CFDistance for CFDistanceKind {
    fn squared_point<F: ClusterFeature>(&self, point: &[f64], cf: &F) -> f64 {
        self.evaluate(&Moments::of_point(point, cf))
    }

    fn squared_cf<F: ClusterFeature>(&self, a: &F, b: &F) -> f64 {
        self.evaluate(&Moments::of_features(a, b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{BirchCF, VIIFeature};
    use approx::assert_relative_eq;

    const ALL: [CFDistanceKind; 6] = [
        CFDistanceKind::CentroidEuclidean,
        CFDistanceKind::AverageInterCluster,
        CFDistanceKind::AverageIntraCluster,
        CFDistanceKind::VarianceIncrease,
        CFDistanceKind::Radius,
        CFDistanceKind::Diameter,
    ];

    fn cf_of<F: ClusterFeature>(points: &[[f64; 2]]) -> F {
        let mut cf = F::new(2);
        for p in points {
            cf.add_point(p);
        }
        cf
    }

    /// Brute-force value of each criterion from the raw points.
    fn brute(kind: CFDistanceKind, a: &[[f64; 2]], b: &[[f64; 2]]) -> f64 {
        let sq = |p: &[f64; 2], q: &[f64; 2]| (p[0] - q[0]).powi(2) + (p[1] - q[1]).powi(2);
        let mean = |ps: &[[f64; 2]]| {
            let n = ps.len() as f64;
            [ps.iter().map(|p| p[0]).sum::<f64>() / n, ps.iter().map(|p| p[1]).sum::<f64>() / n]
        };
        let merged: Vec<[f64; 2]> = a.iter().chain(b).copied().collect();
        let n = merged.len() as f64;
        let pair_sum: f64 = merged.iter().flat_map(|p| merged.iter().map(move |q| sq(p, q))).sum();
        match kind {
            CFDistanceKind::CentroidEuclidean => sq(&mean(a), &mean(b)),
            CFDistanceKind::AverageInterCluster => {
                let total: f64 = a.iter().flat_map(|p| b.iter().map(move |q| sq(p, q))).sum();
                total / (a.len() * b.len()) as f64
            }
            CFDistanceKind::AverageIntraCluster => pair_sum / (n * n),
            CFDistanceKind::VarianceIncrease => {
                let ssd = |ps: &[[f64; 2]]| {
                    let m = mean(ps);
                    ps.iter().map(|p| sq(p, &m)).sum::<f64>()
                };
                ssd(&merged[..]) - ssd(a) - ssd(b)
            }
            CFDistanceKind::Radius => {
                let m = mean(&merged[..]);
                merged.iter().map(|p| sq(p, &m)).sum::<f64>() / n
            }
            CFDistanceKind::Diameter => pair_sum / (n * (n - 1.0)),
        }
    }

    #[test]
    fn test_matches_brute_force() {
        let a = [[0.0, 0.0], [1.0, 0.0], [0.0, 2.0]];
        let b = [[5.0, 5.0], [6.0, 4.0]];
        for kind in ALL {
            let expected = brute(kind, &a, &b);
            let birch = kind.squared_cf(&cf_of::<BirchCF>(&a), &cf_of::<BirchCF>(&b));
            let vii = kind.squared_cf(&cf_of::<VIIFeature>(&a), &cf_of::<VIIFeature>(&b));
            assert_relative_eq!(birch, expected, epsilon = 1e-9);
            assert_relative_eq!(vii, expected, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_point_equals_singleton_feature() {
        let a = [[0.0, 0.0], [1.0, 0.0], [0.0, 2.0]];
        let cf = cf_of::<VIIFeature>(&a);
        let point = [3.0, -1.0];
        let singleton = cf_of::<VIIFeature>(&[point]);
        for kind in ALL {
            assert_relative_eq!(
                kind.squared_point(&point, &cf),
                kind.squared_cf(&singleton, &cf),
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn test_symmetric_and_zero_for_empty() {
        let a = cf_of::<VIIFeature>(&[[0.0, 0.0], [2.0, 2.0]]);
        let b = cf_of::<VIIFeature>(&[[7.0, 1.0]]);
        let empty = VIIFeature::new(2);
        for kind in ALL {
            assert_relative_eq!(kind.squared_cf(&a, &b), kind.squared_cf(&b, &a), epsilon = 1e-12);
            assert_eq!(kind.squared_cf(&a, &empty), 0.0);
            assert_eq!(kind.squared_point(&[1.0, 1.0], &empty), 0.0);
        }
    }
}
