use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::ops::RangeInclusive;

use crate::types::Matrix;

/// Range of the elements of generated input matrices.
pub const VALUE_RANGE: RangeInclusive<i32> = -100..=100;

/// Fills an `n`x`n` matrix with uniformly distributed values from [`VALUE_RANGE`].
pub fn generate_matrix<R: Rng>(rng: &mut R, n: usize) -> Matrix<i32> {
    let mut matrix = Matrix::zeros(n);

    for value in matrix.as_mut_slice() {
        *value = rng.gen_range(VALUE_RANGE);
    }

    matrix
}

/// Random generator for the inputs of size `n`. With a seed, the inputs of each size are
/// reproducible independently of the other sizes in the run.
pub fn matrix_rng(seed: Option<u64>, n: usize) -> SmallRng {
    match seed {
        Some(seed) => SmallRng::seed_from_u64(seed.wrapping_add(n as u64)),
        None => SmallRng::from_entropy(),
    }
}
