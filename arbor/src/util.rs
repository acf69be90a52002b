//! Small numeric helpers shared by the query code.

use std::cmp::Ordering;

/// Total order on distances: ascending, NaN after everything else.
pub fn cmp_distance(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (true, true) => Ordering::Equal,
    }
}

/// Normalizes a lower bound for pruning decisions.
///
/// NaN and infinite bounds cannot be trusted, so they become 0 and the
/// candidate is always expanded.
pub fn admissible_bound(bound: f64) -> f64 {
    if bound.is_finite() {
        bound.max(0.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_finite_bounds_never_prune() {
        assert_eq!(admissible_bound(f64::NAN), 0.0);
        assert_eq!(admissible_bound(f64::INFINITY), 0.0);
        assert_eq!(admissible_bound(f64::NEG_INFINITY), 0.0);
        assert_eq!(admissible_bound(-0.5), 0.0);
        assert_eq!(admissible_bound(2.5), 2.5);
    }

    #[test]
    fn test_nan_compares_greater() {
        assert_eq!(cmp_distance(f64::NAN, 1.0), Ordering::Greater);
        assert_eq!(cmp_distance(1.0, f64::NAN), Ordering::Less);
        assert_eq!(cmp_distance(1.0, 2.0), Ordering::Less);
    }
}
