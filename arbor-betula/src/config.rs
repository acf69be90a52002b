//! CF-tree configuration.

use arbor::errors::{ArborError, ArborResult, ErrorKind};
use serde::{Deserialize, Serialize};

use crate::distance::CFDistanceKind;

/// How a rebuild derives the new threshold from the per-leaf estimates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ThresholdHeuristic {
    /// Square of the mean of the estimated radii.
    #[default]
    Mean,
    /// Median of the estimated squared radii.
    Median,
}

/// Upper bound on the number of leaf features before the tree is rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MaxLeaves {
    Absolute(usize),
    /// A fraction of the number of objects the tree is built from.
    Fraction(f64),
}

impl MaxLeaves {
    /// The absolute bound for a data set of `n` objects, at least 1.
    pub fn resolve(&self, n: usize) -> usize {
        match *self {
            MaxLeaves::Absolute(max) => max.max(1),
            MaxLeaves::Fraction(fraction) => ((fraction * n as f64) as usize).max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CFTreeConfig {
    /// Maximum number of children of a directory node.
    pub branching_factor: usize,
    /// Initial absorption threshold (a radius, not squared).
    pub threshold: f64,
    pub max_leaves: MaxLeaves,
    pub threshold_heuristic: ThresholdHeuristic,
    /// Criterion deciding whether a leaf feature absorbs new data.
    pub absorption: CFDistanceKind,
    /// Distance used to route data to the closest child.
    pub distance: CFDistanceKind,
    /// Whether leaves remember the ids of the objects they absorbed.
    pub store_ids: bool,
}

impl Default for CFTreeConfig {
    fn default() -> Self {
        Self {
            branching_factor: 64,
            threshold: 0.0,
            max_leaves: MaxLeaves::Fraction(0.05),
            threshold_heuristic: ThresholdHeuristic::default(),
            absorption: CFDistanceKind::Radius,
            distance: CFDistanceKind::VarianceIncrease,
            store_ids: false,
        }
    }
}

impl CFTreeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_branching_factor(mut self, branching_factor: usize) -> Self {
        self.branching_factor = branching_factor;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_max_leaves(mut self, max_leaves: MaxLeaves) -> Self {
        self.max_leaves = max_leaves;
        self
    }

    pub fn with_threshold_heuristic(mut self, heuristic: ThresholdHeuristic) -> Self {
        self.threshold_heuristic = heuristic;
        self
    }

    pub fn with_absorption(mut self, absorption: CFDistanceKind) -> Self {
        self.absorption = absorption;
        self
    }

    pub fn with_distance(mut self, distance: CFDistanceKind) -> Self {
        self.distance = distance;
        self
    }

    pub fn with_store_ids(mut self, store_ids: bool) -> Self {
        self.store_ids = store_ids;
        self
    }

    pub fn validate(&self) -> ArborResult<()> {
        if self.branching_factor < 2 {
            return Err(configuration(format!(
                "branching factor must be at least 2, got {}",
                self.branching_factor
            )));
        }
        if !(self.threshold >= 0.0 && self.threshold.is_finite()) {
            return Err(configuration(format!(
                "threshold must be finite and non-negative, got {}",
                self.threshold
            )));
        }
        match self.max_leaves {
            MaxLeaves::Absolute(0) => {
                return Err(configuration("maximum number of leaves must be positive".into()));
            }
            MaxLeaves::Fraction(f) if !(f > 0.0 && f <= 1.0) => {
                return Err(configuration(format!(
                    "leaf fraction must be in (0, 1], got {}",
                    f
                )));
            }
            _ => {}
        }
        Ok(())
    }
}

fn configuration(message: String) -> ArborError {
    ArborError::new(&message, ErrorKind::Configuration)
}
