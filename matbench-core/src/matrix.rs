use std::fmt::{self, Debug};
use std::ops::{Index, IndexMut};
use thiserror::Error;

use crate::data_type::HasDataType;
use crate::partition::Partition;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatrixError {
    #[error("buffer of {actual} elements cannot hold a {n}x{n} matrix")]
    InvalidLength { n: usize, actual: usize },

    #[error("row {row} has {actual} elements, expected {expected}")]
    NotSquare {
        row: usize,
        expected: usize,
        actual: usize,
    },
}

/// Dense `n`x`n` matrix stored contiguously in row-major order, so any range of rows is a
/// single contiguous slice.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Matrix<T> {
    n: usize,
    data: Vec<T>,
}

impl<T: HasDataType> Matrix<T> {
    pub fn zeros(n: usize) -> Self {
        Self {
            n,
            data: vec![T::default(); n * n],
        }
    }

    pub fn from_vec(n: usize, data: Vec<T>) -> Result<Self, MatrixError> {
        if data.len() != n * n {
            return Err(MatrixError::InvalidLength {
                n,
                actual: data.len(),
            });
        }

        Ok(Self { n, data })
    }

    pub fn from_rows<R: AsRef<[T]>>(rows: &[R]) -> Result<Self, MatrixError> {
        let n = rows.len();
        let mut data = Vec::with_capacity(n * n);

        for (row, values) in rows.iter().enumerate() {
            let values = values.as_ref();
            if values.len() != n {
                return Err(MatrixError::NotSquare {
                    row,
                    expected: n,
                    actual: values.len(),
                });
            }

            data.extend_from_slice(values);
        }

        Ok(Self { n, data })
    }

    pub fn dim(&self) -> usize {
        self.n
    }

    /// Total number of elements (`n * n`).
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn get(&self, i: usize, j: usize) -> Option<T> {
        if i < self.n && j < self.n {
            Some(self.data[i * self.n + j])
        } else {
            None
        }
    }

    pub fn row(&self, i: usize) -> &[T] {
        &self.data[i * self.n..(i + 1) * self.n]
    }

    /// The rows of `partition` as one contiguous block.
    pub fn rows(&self, partition: Partition) -> &[T] {
        &self.data[partition.element_range(self.n)]
    }

    pub fn rows_mut(&mut self, partition: Partition) -> &mut [T] {
        let range = partition.element_range(self.n);
        &mut self.data[range]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[T]> + '_ {
        // chunks_exact panics on a zero chunk size.
        let n = usize::max(self.n, 1);
        self.data.chunks_exact(n)
    }
}

impl<T: HasDataType> Index<(usize, usize)> for Matrix<T> {
    type Output = T;

    fn index(&self, (i, j): (usize, usize)) -> &T {
        assert!(j < self.n, "column {} out of bounds for {}x{}", j, self.n, self.n);
        &self.data[i * self.n + j]
    }
}

impl<T: HasDataType> IndexMut<(usize, usize)> for Matrix<T> {
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut T {
        assert!(j < self.n, "column {} out of bounds for {}x{}", j, self.n, self.n);
        &mut self.data[i * self.n + j]
    }
}

impl<T: HasDataType> Debug for Matrix<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Matrix<{}>({}x{}) ", T::DATA_TYPE, self.n, self.n)?;
        f.debug_list().entries(self.iter_rows()).finish()
    }
}
