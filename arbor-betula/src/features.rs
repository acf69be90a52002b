//! Cluster features: constant-size summaries of a set of vectors.
//!
//! A feature knows its weight (number of points), centroid and sum of
//! squared deviations (SSD) from the centroid. Everything else, including
//! all CF distances, is derived from those three.

use serde::{Deserialize, Serialize};

/// Summary statistics of a cluster that can absorb points and other
/// features.
pub trait ClusterFeature: Clone + Send + Sync + std::fmt::Debug {
    /// An empty feature for vectors of dimensionality `dim`.
    fn new(dim: usize) -> Self;

    fn weight(&self) -> u64;

    fn dim(&self) -> usize;

    /// Centroid coordinate in dimension `d`; 0 for an empty feature.
    fn centroid(&self, d: usize) -> f64;

    fn sum_of_squared_deviations(&self) -> f64;

    fn add_point(&mut self, point: &[f64]);

    fn add_cf(&mut self, other: &Self);

    /// Forgets all absorbed data.
    fn reset(&mut self);

    /// Mean squared distance to the centroid.
    fn variance(&self) -> f64 {
        match self.weight() {
            0 => 0.0,
            n => self.sum_of_squared_deviations() / n as f64,
        }
    }

    /// Root mean squared distance to the centroid.
    fn radius(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Root mean squared distance between two distinct members.
    fn diameter(&self) -> f64 {
        match self.weight() {
            0 | 1 => 0.0,
            n => (2.0 * self.sum_of_squared_deviations() / (n - 1) as f64).sqrt(),
        }
    }

    fn centroid_vec(&self) -> Vec<f64> {
        (0..self.dim()).map(|d| self.centroid(d)).collect()
    }
}

/// Classic BIRCH feature: count, linear sum and scalar square sum.
///
/// Cheap, but the SSD is a difference of two large numbers and loses
/// precision when data sits far from the origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BirchCF {
    n: u64,
    ls: Vec<f64>,
    ss: f64,
}

impl ClusterFeature for BirchCF {
    fn new(dim: usize) -> Self {
        Self {
            n: 0,
            ls: vec![0.0; dim],
            ss: 0.0,
        }
    }

    fn weight(&self) -> u64 {
        self.n
    }

    fn dim(&self) -> usize {
        self.ls.len()
    }

    fn centroid(&self, d: usize) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        self.ls[d] / self.n as f64
    }

    fn sum_of_squared_deviations(&self) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        let ls_sq: f64 = self.ls.iter().map(|v| v * v).sum();
        (self.ss - ls_sq / self.n as f64).max(0.0)
    }

    fn add_point(&mut self, point: &[f64]) {
        self.n += 1;
        for (sum, v) in self.ls.iter_mut().zip(point) {
            *sum += v;
            self.ss += v * v;
        }
    }

    fn add_cf(&mut self, other: &Self) {
        self.n += other.n;
        for (sum, v) in self.ls.iter_mut().zip(&other.ls) {
            *sum += v;
        }
        self.ss += other.ss;
    }

    fn reset(&mut self) {
        self.n = 0;
        self.ls.iter_mut().for_each(|v| *v = 0.0);
        self.ss = 0.0;
    }
}

/// BETULA feature: count, mean and SSD, updated incrementally so the SSD
/// never suffers from cancellation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VIIFeature {
    n: u64,
    mean: Vec<f64>,
    ssd: f64,
}

impl ClusterFeature for VIIFeature {
    fn new(dim: usize) -> Self {
        Self {
            n: 0,
            mean: vec![0.0; dim],
            ssd: 0.0,
        }
    }

    fn weight(&self) -> u64 {
        self.n
    }

    fn dim(&self) -> usize {
        self.mean.len()
    }

    fn centroid(&self, d: usize) -> f64 {
        self.mean[d]
    }

    fn sum_of_squared_deviations(&self) -> f64 {
        self.ssd
    }

    fn add_point(&mut self, point: &[f64]) {
        self.n += 1;
        let n = self.n as f64;
        for (mean, &v) in self.mean.iter_mut().zip(point) {
            let delta = v - *mean;
            *mean += delta / n;
            self.ssd += delta * (v - *mean);
        }
    }

    fn add_cf(&mut self, other: &Self) {
        if other.n == 0 {
            return;
        }
        if self.n == 0 {
            *self = other.clone();
            return;
        }
        let (n1, n2) = (self.n as f64, other.n as f64);
        let n = n1 + n2;
        let mut dist_sq = 0.0;
        for (mean, &o) in self.mean.iter_mut().zip(&other.mean) {
            let delta = o - *mean;
            dist_sq += delta * delta;
            *mean += delta * n2 / n;
        }
        self.ssd += other.ssd + n1 * n2 / n * dist_sq;
        self.n += other.n;
    }

    fn reset(&mut self) {
        self.n = 0;
        self.mean.iter_mut().for_each(|v| *v = 0.0);
        self.ssd = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const POINTS: [[f64; 2]; 4] = [[1.0, 2.0], [3.0, 2.0], [2.0, 5.0], [2.0, -1.0]];

    fn check_moments<F: ClusterFeature>() {
        let mut cf = F::new(2);
        for p in &POINTS {
            cf.add_point(p);
        }
        assert_eq!(cf.weight(), 4);
        assert_relative_eq!(cf.centroid(0), 2.0);
        assert_relative_eq!(cf.centroid(1), 2.0);
        // deviations: (1,0) (1,0) (0,9) (0,9)
        assert_relative_eq!(cf.sum_of_squared_deviations(), 20.0, epsilon = 1e-12);
        assert_relative_eq!(cf.variance(), 5.0, epsilon = 1e-12);
        assert_relative_eq!(cf.radius(), 5.0f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(cf.diameter(), (40.0f64 / 3.0).sqrt(), epsilon = 1e-12);

        let mut left = F::new(2);
        let mut right = F::new(2);
        left.add_point(&POINTS[0]);
        left.add_point(&POINTS[1]);
        right.add_point(&POINTS[2]);
        right.add_point(&POINTS[3]);
        left.add_cf(&right);
        assert_eq!(left.weight(), 4);
        assert_relative_eq!(left.sum_of_squared_deviations(), 20.0, epsilon = 1e-12);
        assert_relative_eq!(left.centroid(1), 2.0, epsilon = 1e-12);

        left.reset();
        assert_eq!(left.weight(), 0);
        assert_eq!(left.variance(), 0.0);
        assert_eq!(left.diameter(), 0.0);
    }

    #[test]
    fn test_birch_moments() {
        check_moments::<BirchCF>();
    }

    #[test]
    fn test_vii_moments() {
        check_moments::<VIIFeature>();
    }

    #[test]
    fn test_vii_is_stable_far_from_origin() {
        let offset = 1e9;
        let mut vii = VIIFeature::new(1);
        let mut birch = BirchCF::new(1);
        for v in [offset, offset + 1.0, offset + 2.0] {
            vii.add_point(&[v]);
            birch.add_point(&[v]);
        }
        assert_relative_eq!(vii.sum_of_squared_deviations(), 2.0, epsilon = 1e-6);
        // the square sum cancels out at this magnitude
        assert!((birch.sum_of_squared_deviations() - 2.0).abs() > 1e-3);
    }

    #[test]
    fn test_merging_with_empty() {
        let mut empty = VIIFeature::new(2);
        let mut one = VIIFeature::new(2);
        one.add_point(&[4.0, 4.0]);
        empty.add_cf(&one);
        assert_eq!(empty, one);
        one.add_cf(&VIIFeature::new(2));
        assert_eq!(one.weight(), 1);
        assert_eq!(one.centroid_vec(), vec![4.0, 4.0]);
    }
}
