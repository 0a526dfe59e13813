//! Triple-loop integer matrix multiplication restricted to a row partition.
use matbench_core::prelude::*;
use matbench_core::{Matrix, Partition};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    #[error("dimension mismatch: A is {lhs}x{lhs} but B is {rhs}x{rhs}")]
    DimensionMismatch { lhs: usize, rhs: usize },

    #[error("{partition} does not fit in a {n}x{n} matrix")]
    PartitionOutOfBounds { partition: Partition, n: usize },

    #[error("output block holds {actual} elements, expected {expected} for {partition}")]
    BlockSize {
        partition: Partition,
        expected: usize,
        actual: usize,
    },
}

/// Computes `C[i][j] = sum_k A[i][k] * B[k][j]` for every row `i` in `partition`.
///
/// `out` is the contiguous row-major block of C for exactly these rows, so it must hold
/// `partition.len() * n` elements. Products are accumulated in `i64`: with inputs bounded by
/// 100 in magnitude this does not overflow for any realistic `n`.
pub fn host_matmul(
    a: &Matrix<i32>,
    b: &Matrix<i32>,
    partition: Partition,
    out: &mut [i64],
) -> Result<(), KernelError> {
    let n = a.dim();
    if b.dim() != n {
        return Err(KernelError::DimensionMismatch {
            lhs: n,
            rhs: b.dim(),
        });
    }

    if partition.end > n {
        return Err(KernelError::PartitionOutOfBounds { partition, n });
    }

    let expected = partition.element_count(n);
    if out.len() != expected {
        return Err(KernelError::BlockSize {
            partition,
            expected,
            actual: out.len(),
        });
    }

    trace!("multiplying {} of {}x{} matrix", partition, n, n);
    let lhs = a.as_slice();
    let rhs = b.as_slice();

    for (local, i) in enumerate(partition.range()) {
        let a_row = &lhs[i * n..(i + 1) * n];
        let c_row = &mut out[local * n..(local + 1) * n];

        for j in 0..n {
            let mut sum: i64 = 0;
            for k in 0..n {
                sum += a_row[k] as i64 * rhs[k * n + j] as i64;
            }

            c_row[j] = sum;
        }
    }

    Ok(())
}

/// Like [`host_matmul`], but writes the rows directly into the full output matrix `c`.
pub fn host_matmul_into(
    a: &Matrix<i32>,
    b: &Matrix<i32>,
    partition: Partition,
    c: &mut Matrix<i64>,
) -> Result<(), KernelError> {
    if c.dim() != a.dim() {
        return Err(KernelError::DimensionMismatch {
            lhs: a.dim(),
            rhs: c.dim(),
        });
    }

    if partition.end > c.dim() {
        return Err(KernelError::PartitionOutOfBounds { partition, n: c.dim() });
    }

    host_matmul(a, b, partition, c.rows_mut(partition))
}

/// Single-process multiplication of the full matrices.
pub fn reference_matmul(a: &Matrix<i32>, b: &Matrix<i32>) -> Result<Matrix<i64>, KernelError> {
    let mut c = Matrix::zeros(a.dim());
    host_matmul_into(a, b, Partition::new(0, a.dim()), &mut c)?;
    Ok(c)
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn random_matrix(rng: &mut SmallRng, n: usize, bound: i32) -> Matrix<i32> {
        let data = (0..n * n).map(|_| rng.gen_range(-bound..=bound)).collect();
        Matrix::from_vec(n, data).unwrap()
    }

    #[test]
    fn test_small_product() {
        let a = Matrix::from_rows(&[[1, 2], [3, 4]]).unwrap();
        let b = Matrix::from_rows(&[[5, 6], [7, 8]]).unwrap();

        let c = reference_matmul(&a, &b).unwrap();
        assert_eq!(c, Matrix::from_rows(&[[19i64, 22], [43, 50]]).unwrap());
    }

    #[test]
    fn test_partial_rows() {
        let a = Matrix::from_rows(&[[1, 2], [3, 4]]).unwrap();
        let b = Matrix::from_rows(&[[5, 6], [7, 8]]).unwrap();

        let mut block = vec![0i64; 2];
        host_matmul(&a, &b, Partition::new(1, 2), &mut block).unwrap();
        assert_eq!(block, vec![43, 50]);

        // Only the given rows are touched.
        let mut c = Matrix::zeros(2);
        host_matmul_into(&a, &b, Partition::new(0, 1), &mut c).unwrap();
        assert_eq!(c.as_slice(), &[19, 22, 0, 0]);
    }

    #[test]
    fn test_empty_partition() {
        let a = Matrix::from_rows(&[[1]]).unwrap();
        let b = Matrix::from_rows(&[[2]]).unwrap();

        host_matmul(&a, &b, Partition::new(1, 1), &mut []).unwrap();
        assert_eq!(reference_matmul(&Matrix::zeros(0), &Matrix::zeros(0)).unwrap().len(), 0);
    }

    #[test]
    fn test_rows_concatenate_to_full_product() {
        let mut rng = SmallRng::seed_from_u64(5);
        let a = random_matrix(&mut rng, 17, 100);
        let b = random_matrix(&mut rng, 17, 100);
        let expected = reference_matmul(&a, &b).unwrap();

        let mut c = Matrix::zeros(17);
        for (start, end) in [(0, 5), (5, 6), (6, 6), (6, 17)].iter() {
            host_matmul_into(&a, &b, Partition::new(*start, *end), &mut c).unwrap();
        }

        assert_eq!(c, expected);
    }

    #[test]
    fn test_accumulator_does_not_overflow() {
        // Worst case for n = 2000: every product is 100 * 100.
        let n = 2000;
        let a = Matrix::from_vec(n, vec![100; n * n]).unwrap();
        let b = Matrix::from_vec(n, vec![-100; n * n]).unwrap();

        let mut block = vec![0; n];
        host_matmul(&a, &b, Partition::new(n - 1, n), &mut block).unwrap();
        assert!(block.iter().all(|&v| v == -20_000_000));
    }

    #[test]
    fn test_invalid_arguments() {
        let a = Matrix::<i32>::zeros(2);
        let b = Matrix::<i32>::zeros(3);

        assert_eq!(
            reference_matmul(&a, &b).unwrap_err(),
            KernelError::DimensionMismatch { lhs: 2, rhs: 3 }
        );

        let err = host_matmul(&a, &a, Partition::new(0, 1), &mut [0; 3]).unwrap_err();
        assert!(matches!(err, KernelError::BlockSize { expected: 2, actual: 3, .. }));

        let err = host_matmul(&a, &a, Partition::new(1, 3), &mut [0; 4]).unwrap_err();
        assert!(matches!(err, KernelError::PartitionOutOfBounds { n: 2, .. }));
    }
}
