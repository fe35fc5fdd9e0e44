//! Uniform k-of-n selection

use rand::Rng;

/// Pick `k` distinct items uniformly at random, without replacement.
///
/// Runs a Fisher-Yates shuffle over an index permutation but stops after the
/// first `k` positions, so every `k`-subset is equally likely. Returns all
/// items (in random order) when `k >= items.len()`.
pub fn sample_without_replacement<'a, T, R: Rng + ?Sized>(
    items: &'a [T],
    k: usize,
    rng: &mut R,
) -> Vec<&'a T> {
    let n = items.len();
    let k = k.min(n);
    let mut indices: Vec<usize> = (0..n).collect();

    for i in 0..k {
        let j = rng.gen_range(i..n);
        indices.swap(i, j);
    }

    indices[..k].iter().map(|&i| &items[i]).collect()
}
