//! Shuffle and weighted sampling shared by every strategy.

use rand::Rng;

/// Weights below this are raised to it so every item stays selectable.
const MIN_WEIGHT: f64 = 1e-9;

/// Fisher–Yates, in place. For `i` from the last index down to 1, swap
/// `items[i]` with `items[j]`, `j` uniform in `[0, i]`.
pub fn shuffle<T, R: Rng>(items: &mut [T], rng: &mut R) {
    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
}

/// Draw up to `k` items without replacement, each draw proportional to the
/// remaining items' weights.
///
/// O(k·n): every draw rescans what is left. Non-finite or non-positive weights are clamped to `MIN_WEIGHT`.
pub fn weighted_select<T, R: Rng>(items: Vec<(T, f64)>, k: usize, rng: &mut R) -> Vec<T> {
    let mut remaining: Vec<(T, f64)> = items
        .into_iter()
        .map(|(item, w)| {
            let w = if w.is_finite() && w > MIN_WEIGHT { w } else { MIN_WEIGHT };
            (item, w)
        })
        .collect();

    let mut out = Vec::with_capacity(k.min(remaining.len()));

    while out.len() < k && !remaining.is_empty() {
        let total: f64 = remaining.iter().map(|(_, w)| *w).sum();
        let draw = rng.gen_range(0.0..total);

        let mut acc = 0.0;
        // Float drift can leave `acc` a hair below `draw` at the end; the
        // last item absorbs that.
        let mut picked = remaining.len() - 1;
        for (idx, (_, w)) in remaining.iter().enumerate() {
            acc += *w;
            if acc > draw {
                picked = idx;
                break;
            }
        }

        let (item, _) = remaining.swap_remove(picked);
        out.push(item);
    }

    out
}
