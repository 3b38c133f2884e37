//! Seeded train/test split.

use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Row indices for the two partitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffle `0..n` with a seeded RNG and hold out `ceil(n * test_size)` rows.
///
/// `test_size` is clamped to `[0, 1]`. The same `(n, test_size, seed)` always
/// yields the same split.
pub fn train_test_split(n: usize, test_size: f64, seed: u64) -> Split {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    // Absorb representation error so that e.g. 300 * 0.2 holds out 60 rows.
    let exact = (n as f64) * test_size.clamp(0.0, 1.0);
    let n_test = ((exact - 1e-9).ceil().max(0.0) as usize).min(n);
    let train = indices.split_off(n_test);

    debug!(
        "Dataset split: {} training, {} test (seed {})",
        train.len(),
        indices.len(),
        seed
    );

    Split {
        train,
        test: indices,
    }
}
