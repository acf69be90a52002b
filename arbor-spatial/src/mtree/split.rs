//! Promotion and distribution for M-tree splits.
//!
//! Everything works on the pairwise distance matrix of the overflowing
//! node's entries, so a split computes each distance once.

use rand::rngs::StdRng;
use rand::Rng;

use super::config::{DistributionStrategy, PromotionStrategy};

/// Result of splitting: the two promoted entries, which entries follow the
/// second one, and the covering radius of each side.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SplitPlan {
    pub first: usize,
    pub second: usize,
    pub mask: Vec<bool>,
    pub first_radius: f64,
    pub second_radius: f64,
}

/// Entry data a split needs besides the distance matrix.
pub(crate) struct SplitInput<'a> {
    pub matrix: &'a [Vec<f64>],
    pub covering_radii: &'a [f64],
    pub parent_distances: &'a [f64],
}

pub(crate) fn plan_split(
    input: &SplitInput<'_>,
    promotion: PromotionStrategy,
    distribution: DistributionStrategy,
    rng: &mut StdRng,
) -> SplitPlan {
    let n = input.matrix.len();
    let (first, second) = match promotion {
        PromotionStrategy::MMRad => return min_max_radius(input, distribution),
        PromotionStrategy::MLBDist => {
            // the current routing object sits at parent distance 0
            let first = (0..n)
                .min_by(|&a, &b| input.parent_distances[a].total_cmp(&input.parent_distances[b]))
                .unwrap_or(0);
            (first, farthest_from(input.matrix, first))
        }
        PromotionStrategy::FarthestPoints => farthest_pair(input.matrix),
        PromotionStrategy::Random => {
            let first = rng.gen_range(0..n);
            let mut second = rng.gen_range(0..n - 1);
            if second >= first {
                second += 1;
            }
            (first, second)
        }
    };
    plan_for(input, first, second, distribution)
}

fn plan_for(
    input: &SplitInput<'_>,
    first: usize,
    second: usize,
    distribution: DistributionStrategy,
) -> SplitPlan {
    let mask = match distribution {
        DistributionStrategy::GeneralizedHyperplane => hyperplane(input.matrix, first, second),
        DistributionStrategy::Balanced => balanced(input.matrix, first, second),
    };
    let first_radius = group_radius(input, &mask, false, first);
    let second_radius = group_radius(input, &mask, true, second);
    SplitPlan {
        first,
        second,
        mask,
        first_radius,
        second_radius,
    }
}

/// Covering radius around `routing` of the entries with `mask[i] == side`.
fn group_radius(input: &SplitInput<'_>, mask: &[bool], side: bool, routing: usize) -> f64 {
    mask.iter()
        .enumerate()
        .filter(|(_, &m)| m == side)
        .map(|(i, _)| input.matrix[i][routing] + input.covering_radii[i])
        .fold(0.0, f64::max)
}

fn min_max_radius(input: &SplitInput<'_>, distribution: DistributionStrategy) -> SplitPlan {
    let n = input.matrix.len();
    let mut best: Option<SplitPlan> = None;
    for i in 0..n {
        for j in (i + 1)..n {
            let plan = plan_for(input, i, j, distribution);
            let radius = plan.first_radius.max(plan.second_radius);
            let better = best
                .as_ref()
                .map_or(true, |b| radius < b.first_radius.max(b.second_radius));
            if better {
                best = Some(plan);
            }
        }
    }
    best.unwrap_or_else(|| plan_for(input, 0, n.saturating_sub(1), distribution))
}

fn farthest_from(matrix: &[Vec<f64>], from: usize) -> usize {
    (0..matrix.len())
        .filter(|&j| j != from)
        .max_by(|&a, &b| matrix[from][a].total_cmp(&matrix[from][b]).then(b.cmp(&a)))
        .unwrap_or(0)
}

fn farthest_pair(matrix: &[Vec<f64>]) -> (usize, usize) {
    let n = matrix.len();
    let mut best = (0, 1.min(n.saturating_sub(1)));
    let mut best_distance = f64::NEG_INFINITY;
    for i in 0..n {
        for j in (i + 1)..n {
            if matrix[i][j] > best_distance {
                best_distance = matrix[i][j];
                best = (i, j);
            }
        }
    }
    best
}

/// Each entry to the nearer routing object, ties to the smaller side.
fn hyperplane(matrix: &[Vec<f64>], first: usize, second: usize) -> Vec<bool> {
    let n = matrix.len();
    let mut mask = vec![false; n];
    let (mut count_first, mut count_second) = (0usize, 0usize);
    for i in 0..n {
        let to_second = if i == first {
            false
        } else if i == second {
            true
        } else {
            match matrix[i][first].total_cmp(&matrix[i][second]) {
                std::cmp::Ordering::Less => false,
                std::cmp::Ordering::Greater => true,
                std::cmp::Ordering::Equal => count_second < count_first,
            }
        };
        mask[i] = to_second;
        if to_second {
            count_second += 1;
        } else {
            count_first += 1;
        }
    }
    mask
}

/// The routing objects take turns picking their nearest unassigned entry.
fn balanced(matrix: &[Vec<f64>], first: usize, second: usize) -> Vec<bool> {
    let n = matrix.len();
    let mut mask = vec![false; n];
    let mut assigned = vec![false; n];
    assigned[first] = true;
    assigned[second] = true;
    mask[second] = true;

    let mut remaining = n.saturating_sub(2);
    let mut turn_second = false;
    while remaining > 0 {
        let routing = if turn_second { second } else { first };
        let pick = (0..n)
            .filter(|&i| !assigned[i])
            .min_by(|&a, &b| matrix[a][routing].total_cmp(&matrix[b][routing]));
        let Some(pick) = pick else { break };
        assigned[pick] = true;
        mask[pick] = turn_second;
        remaining -= 1;
        turn_second = !turn_second;
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    /// Distance matrix of points on a line.
    fn line(points: &[f64]) -> Vec<Vec<f64>> {
        points
            .iter()
            .map(|a| points.iter().map(|b| (a - b).abs()).collect())
            .collect()
    }

    fn split(points: &[f64], promotion: PromotionStrategy, distribution: DistributionStrategy) -> SplitPlan {
        let matrix = line(points);
        let zeros = vec![0.0; points.len()];
        let input = SplitInput {
            matrix: &matrix,
            covering_radii: &zeros,
            parent_distances: &zeros,
        };
        plan_split(&input, promotion, distribution, &mut StdRng::seed_from_u64(3))
    }

    #[test]
    fn test_mmrad_separates_clusters() {
        let plan = split(
            &[0.0, 0.5, 1.0, 10.0, 10.5, 11.0],
            PromotionStrategy::MMRad,
            DistributionStrategy::GeneralizedHyperplane,
        );
        assert_eq!(plan.mask, vec![false, false, false, true, true, true]);
        assert_eq!(plan.first, 1);
        assert_eq!(plan.second, 4);
        assert_eq!(plan.first_radius, 0.5);
        assert_eq!(plan.second_radius, 0.5);
    }

    #[test]
    fn test_farthest_points() {
        let plan = split(
            &[3.0, 0.0, 5.0, 9.0],
            PromotionStrategy::FarthestPoints,
            DistributionStrategy::GeneralizedHyperplane,
        );
        assert_eq!((plan.first, plan.second), (1, 3));
        assert_eq!(plan.mask, vec![false, false, true, true]);
        assert_eq!(plan.first_radius, 3.0);
        assert_eq!(plan.second_radius, 4.0);
    }

    #[test]
    fn test_balanced_distribution_alternates() {
        // hyperplane would put everything but one entry on the left
        let plan = split(
            &[0.0, 0.1, 0.2, 0.3, 0.4, 10.0],
            PromotionStrategy::FarthestPoints,
            DistributionStrategy::Balanced,
        );
        let moved = plan.mask.iter().filter(|&&m| m).count();
        assert_eq!(moved, 3);
    }

    #[test]
    fn test_random_promotes_distinct_entries() {
        for seed in 0..20 {
            let matrix = line(&[0.0, 1.0, 2.0]);
            let zeros = vec![0.0; 3];
            let input = SplitInput {
                matrix: &matrix,
                covering_radii: &zeros,
                parent_distances: &zeros,
            };
            let plan = plan_split(
                &input,
                PromotionStrategy::Random,
                DistributionStrategy::GeneralizedHyperplane,
                &mut StdRng::seed_from_u64(seed),
            );
            assert_ne!(plan.first, plan.second);
            assert!(plan.mask[plan.second] && !plan.mask[plan.first]);
        }
    }

    #[test]
    fn test_radius_includes_subtree_radii() {
        let matrix = line(&[0.0, 1.0, 10.0]);
        let radii = vec![0.0, 2.0, 0.0];
        let zeros = vec![0.0; 3];
        let input = SplitInput {
            matrix: &matrix,
            covering_radii: &radii,
            parent_distances: &zeros,
        };
        let plan = plan_split(
            &input,
            PromotionStrategy::MLBDist,
            DistributionStrategy::GeneralizedHyperplane,
            &mut StdRng::seed_from_u64(0),
        );
        // entry 0 is the current routing object, entry 2 the farthest from it
        assert_eq!((plan.first, plan.second), (0, 2));
        assert_eq!(plan.first_radius, 3.0);
    }
}
