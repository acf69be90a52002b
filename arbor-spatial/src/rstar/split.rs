//! Node split heuristics.
//!
//! Both strategies return a mask over the entries: `false` stays in the
//! split node, `true` moves to the new sibling. Each side receives at
//! least `minimum` entries.

use std::cmp::Ordering;

use arbor::bounding_box::{self, HyperBoundingBox, SpatialComparable};

use super::config::SplitStrategy;

pub(crate) fn split_mask<E: SpatialComparable>(
    entries: &[E],
    minimum: usize,
    strategy: SplitStrategy,
) -> Vec<bool> {
    let n = entries.len();
    let minimum = minimum.clamp(1, (n / 2).max(1));
    if n < 2 {
        return vec![false; n];
    }
    match strategy {
        SplitStrategy::Topological => topological_split(entries, minimum),
        SplitStrategy::Quadratic => quadratic_split(entries, minimum),
    }
}

// ============================================================================
// R*-tree topological split
// ============================================================================

/// Orders entry indexes by lower bound then upper bound in dimension `d`
/// (or upper then lower when `by_upper`).
fn sorted_by_axis<E: SpatialComparable>(entries: &[E], d: usize, by_upper: bool) -> Vec<usize> {
    let mut order: Vec<usize> = (0..entries.len()).collect();
    order.sort_by(|&a, &b| {
        let (ea, eb) = (&entries[a], &entries[b]);
        let (first, second) = if by_upper {
            (ea.max(d).total_cmp(&eb.max(d)), ea.min(d).total_cmp(&eb.min(d)))
        } else {
            (ea.min(d).total_cmp(&eb.min(d)), ea.max(d).total_cmp(&eb.max(d)))
        };
        first.then(second)
    });
    order
}

/// Bounding boxes of every prefix and every suffix of `order`.
fn prefix_suffix<E: SpatialComparable>(
    entries: &[E],
    order: &[usize],
) -> (Vec<HyperBoundingBox>, Vec<HyperBoundingBox>) {
    let n = order.len();
    let mut prefix: Vec<HyperBoundingBox> = Vec::with_capacity(n);
    for (i, &idx) in order.iter().enumerate() {
        let mut mbr = if i == 0 {
            HyperBoundingBox::from_spatial(&entries[idx])
        } else {
            prefix[i - 1].clone()
        };
        mbr.extend(&entries[idx]);
        prefix.push(mbr);
    }

    let mut suffix: Vec<HyperBoundingBox> = Vec::with_capacity(n);
    for (i, &idx) in order.iter().rev().enumerate() {
        let mut mbr = if i == 0 {
            HyperBoundingBox::from_spatial(&entries[idx])
        } else {
            suffix[i - 1].clone()
        };
        mbr.extend(&entries[idx]);
        suffix.push(mbr);
    }
    suffix.reverse();
    (prefix, suffix)
}

fn topological_split<E: SpatialComparable>(entries: &[E], minimum: usize) -> Vec<bool> {
    let n = entries.len();
    let dims = entries[0].dim();

    // choose the axis with the smallest margin sum over all distributions
    let mut best_axis = 0;
    let mut best_margin = f64::INFINITY;
    for d in 0..dims {
        let mut margin_sum = 0.0;
        for by_upper in [false, true] {
            let order = sorted_by_axis(entries, d, by_upper);
            let (prefix, suffix) = prefix_suffix(entries, &order);
            for k in minimum..=(n - minimum) {
                margin_sum += bounding_box::margin(&prefix[k - 1]) + bounding_box::margin(&suffix[k]);
            }
        }
        if margin_sum < best_margin {
            best_margin = margin_sum;
            best_axis = d;
        }
    }

    // along that axis, minimum overlap then minimum volume
    let mut best: Option<(f64, f64, Vec<usize>, usize)> = None;
    for by_upper in [false, true] {
        let order = sorted_by_axis(entries, best_axis, by_upper);
        let (prefix, suffix) = prefix_suffix(entries, &order);
        for k in minimum..=(n - minimum) {
            let overlap = bounding_box::overlap(&prefix[k - 1], &suffix[k]);
            let volume = bounding_box::volume(&prefix[k - 1]) + bounding_box::volume(&suffix[k]);
            let better = match &best {
                None => true,
                Some((best_overlap, best_volume, _, _)) => {
                    match overlap.total_cmp(best_overlap) {
                        Ordering::Less => true,
                        Ordering::Equal => volume < *best_volume,
                        Ordering::Greater => false,
                    }
                }
            };
            if better {
                best = Some((overlap, volume, order.clone(), k));
            }
        }
    }

    let mut mask = vec![false; n];
    if let Some((_, _, order, k)) = best {
        for &idx in &order[k..] {
            mask[idx] = true;
        }
    }
    mask
}

// ============================================================================
// Guttman quadratic split
// ============================================================================

fn quadratic_split<E: SpatialComparable>(entries: &[E], minimum: usize) -> Vec<bool> {
    let n = entries.len();

    // seeds: the pair wasting the most volume when grouped
    let (mut seed_a, mut seed_b, mut worst) = (0, 1, f64::NEG_INFINITY);
    for i in 0..n {
        for j in (i + 1)..n {
            let waste = bounding_box::volume_union(&entries[i], &entries[j])
                - bounding_box::volume(&entries[i])
                - bounding_box::volume(&entries[j]);
            if waste > worst {
                worst = waste;
                seed_a = i;
                seed_b = j;
            }
        }
    }

    let mut assigned: Vec<Option<bool>> = vec![None; n];
    assigned[seed_a] = Some(false);
    assigned[seed_b] = Some(true);
    let mut mbr_a = HyperBoundingBox::from_spatial(&entries[seed_a]);
    let mut mbr_b = HyperBoundingBox::from_spatial(&entries[seed_b]);
    let (mut count_a, mut count_b) = (1usize, 1usize);
    let mut remaining = n - 2;

    while remaining > 0 {
        // one group needs everything left to reach the minimum
        if count_a + remaining <= minimum || count_b + remaining <= minimum {
            let to_b = count_b + remaining <= minimum;
            for slot in assigned.iter_mut().filter(|s| s.is_none()) {
                *slot = Some(to_b);
            }
            break;
        }

        // pick the entry with the strongest preference
        let mut pick = None;
        let mut best_diff = f64::NEG_INFINITY;
        for (i, slot) in assigned.iter().enumerate() {
            if slot.is_some() {
                continue;
            }
            let diff = (bounding_box::enlargement(&mbr_a, &entries[i])
                - bounding_box::enlargement(&mbr_b, &entries[i]))
            .abs();
            if diff > best_diff || pick.is_none() {
                best_diff = diff;
                pick = Some(i);
            }
        }
        let Some(i) = pick else { break };

        let grow_a = bounding_box::enlargement(&mbr_a, &entries[i]);
        let grow_b = bounding_box::enlargement(&mbr_b, &entries[i]);
        let to_b = match grow_a.total_cmp(&grow_b) {
            Ordering::Less => false,
            Ordering::Greater => true,
            Ordering::Equal => {
                match bounding_box::volume(&mbr_a).total_cmp(&bounding_box::volume(&mbr_b)) {
                    Ordering::Less => false,
                    Ordering::Greater => true,
                    Ordering::Equal => count_b < count_a,
                }
            }
        };
        assigned[i] = Some(to_b);
        if to_b {
            mbr_b.extend(&entries[i]);
            count_b += 1;
        } else {
            mbr_a.extend(&entries[i]);
            count_a += 1;
        }
        remaining -= 1;
    }

    assigned.into_iter().map(|s| s.unwrap_or(false)).collect()
}
