//! Hilbert curve keys in any dimensionality.
//!
//! The Hilbert curve maps grid cells to positions along a continuous
//! space-filling curve; consecutive keys are always neighbouring cells.
//! Sorting by key keeps spatially close points together, which is what the
//! Hilbert bulk loader relies on.
//!
//! Keys are computed with Skilling's transpose algorithm ("Programming the
//! Hilbert curve", 2004) and packed into a `u128`.

use arbor::bounding_box::{HyperBoundingBox, SpatialComparable};

/// Total key bits available.
const KEY_BITS: u32 = 128;

/// Highest per-dimension order used.
const MAX_ORDER: u32 = 32;

/// Per-dimension grid order for `dim` dimensions so the key fits a `u128`.
pub fn order_for(dim: usize) -> u32 {
    if dim == 0 {
        return 1;
    }
    (KEY_BITS / dim as u32).clamp(1, MAX_ORDER)
}

/// Hilbert key of a grid cell. Each coordinate must be below `2^order`.
pub fn hilbert_key(cell: &[u64], order: u32) -> u128 {
    let n = cell.len();
    if n == 0 || order == 0 {
        return 0;
    }
    let mut x = cell.to_vec();
    let top = 1u64 << (order - 1);

    // undo excess work
    let mut q = top;
    while q > 1 {
        let p = q - 1;
        for i in 0..n {
            if x[i] & q != 0 {
                x[0] ^= p;
            } else {
                let t = (x[0] ^ x[i]) & p;
                x[0] ^= t;
                x[i] ^= t;
            }
        }
        q >>= 1;
    }

    // gray encode
    for i in 1..n {
        x[i] ^= x[i - 1];
    }
    let mut t = 0;
    let mut q = top;
    while q > 1 {
        if x[n - 1] & q != 0 {
            t ^= q - 1;
        }
        q >>= 1;
    }
    for v in x.iter_mut() {
        *v ^= t;
    }

    // interleave the transposed bits, most significant first
    let mut key: u128 = 0;
    for bit in (0..order).rev() {
        for v in &x {
            key = (key << 1) | ((v >> bit) & 1) as u128;
        }
    }
    key
}

/// Hilbert key of a point, after mapping `bounds` onto the grid.
///
/// Degenerate extents map to the middle of the grid; NaN coordinates to 0.
pub fn hilbert_key_bounded(point: &[f64], bounds: &HyperBoundingBox, order: u32) -> u128 {
    let cells = (1u64 << order) as f64;
    let max_cell = (1u64 << order) - 1;
    let cell: Vec<u64> = point
        .iter()
        .enumerate()
        .map(|(d, &v)| {
            let (lo, hi) = (bounds.min(d), bounds.max(d));
            let normalized = if hi > lo {
                ((v - lo) / (hi - lo)).clamp(0.0, 1.0)
            } else {
                0.5
            };
            // NaN casts to 0
            ((normalized * cells) as u64).min(max_cell)
        })
        .collect();
    hilbert_key(&cell, order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_cells(dim: usize, order: u32) -> Vec<Vec<u64>> {
        let side = 1u64 << order;
        let total = side.pow(dim as u32);
        (0..total)
            .map(|mut i| {
                (0..dim)
                    .map(|_| {
                        let c = i % side;
                        i /= side;
                        c
                    })
                    .collect()
            })
            .collect()
    }

    fn assert_curve(dim: usize, order: u32) {
        let mut keyed: Vec<(u128, Vec<u64>)> = all_cells(dim, order)
            .into_iter()
            .map(|c| (hilbert_key(&c, order), c))
            .collect();
        keyed.sort();

        // keys form a permutation of 0..cells
        for (i, (key, _)) in keyed.iter().enumerate() {
            assert_eq!(*key, i as u128);
        }
        // consecutive keys are grid neighbours
        for pair in keyed.windows(2) {
            let step: u64 = pair[0]
                .1
                .iter()
                .zip(&pair[1].1)
                .map(|(a, b)| a.abs_diff(*b))
                .sum();
            assert_eq!(step, 1, "{:?} -> {:?}", pair[0].1, pair[1].1);
        }
    }

    #[test]
    fn test_two_dimensional_curve() {
        assert_curve(2, 1);
        assert_curve(2, 3);
    }

    #[test]
    fn test_higher_dimensional_curve() {
        assert_curve(3, 2);
        assert_curve(4, 2);
    }

    #[test]
    fn test_first_order_square() {
        assert_eq!(hilbert_key(&[0, 0], 1), 0);
        assert_eq!(hilbert_key(&[0, 1], 1), 1);
        assert_eq!(hilbert_key(&[1, 1], 1), 2);
        assert_eq!(hilbert_key(&[1, 0], 1), 3);
    }

    #[test]
    fn test_order_fits_key() {
        assert_eq!(order_for(2), 32);
        assert_eq!(order_for(5), 25);
        assert_eq!(order_for(200), 1);
    }

    #[test]
    fn test_bounded_key_clamps() {
        let bounds = HyperBoundingBox::new(vec![0.0, 0.0], vec![10.0, 10.0]);
        let inside = hilbert_key_bounded(&[0.0, 0.0], &bounds, 4);
        let outside = hilbert_key_bounded(&[-5.0, -5.0], &bounds, 4);
        assert_eq!(inside, outside);
        let nan = hilbert_key_bounded(&[f64::NAN, 0.0], &bounds, 4);
        assert_eq!(nan, inside);
    }
}
