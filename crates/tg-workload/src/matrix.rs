use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::Range;

use tg_engine::matmul_nt_reference;

use crate::error::{Result, WorkloadError};

/// Dense row-major matrix of 32-bit words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntMatrix {
    rows: usize,
    cols: usize,
    data: Vec<i32>,
}

impl IntMatrix {
    /// Wrap `data` as a `rows`×`cols` matrix.
    pub fn new(rows: usize, cols: usize, data: Vec<i32>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(WorkloadError::ShapeMismatch {
                rows,
                cols,
                len: data.len(),
            });
        }
        Ok(IntMatrix { rows, cols, data })
    }

    pub fn filled(rows: usize, cols: usize, value: i32) -> Self {
        IntMatrix {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::filled(rows, cols, 0)
    }

    pub fn ones(rows: usize, cols: usize) -> Self {
        Self::filled(rows, cols, 1)
    }

    /// Uniform random entries in `range`.
    pub fn random<R: Rng>(rows: usize, cols: usize, range: Range<i32>, rng: &mut R) -> Self {
        let data = (0..rows * cols)
            .map(|_| rng.gen_range(range.clone()))
            .collect();
        IntMatrix { rows, cols, data }
    }

    /// Seeded random entries in `[0, bound)`.
    pub fn random_seeded(rows: usize, cols: usize, bound: i32, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::random(rows, cols, 0..bound.max(1), &mut rng)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn data(&self) -> &[i32] {
        &self.data
    }

    /// Entry at (`row`, `col`).
    ///
    /// # Panics
    /// Panics if the position is outside the matrix.
    pub fn get(&self, row: usize, col: usize) -> i32 {
        assert!(row < self.rows && col < self.cols, "({row}, {col}) out of bounds");
        self.data[row * self.cols + col]
    }

    /// `self · otherᵀ`, where `other` holds one output column per row.
    pub fn matmul_nt(&self, other: &IntMatrix) -> Result<IntMatrix> {
        if self.cols != other.cols {
            return Err(WorkloadError::InnerMismatch {
                m: self.rows,
                k: self.cols,
                n: other.rows,
                k2: other.cols,
            });
        }
        let data = matmul_nt_reference(&self.data, &other.data, self.rows, other.rows, self.cols)?;
        Ok(IntMatrix {
            rows: self.rows,
            cols: other.rows,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_shape_mismatch() {
        assert!(IntMatrix::new(2, 3, vec![0; 5]).is_err());
        let m = IntMatrix::new(2, 3, (0..6).collect()).unwrap();
        assert_eq!(m.get(1, 2), 5);
        assert_eq!(m.rows(), 2);
        assert_eq!(m.cols(), 3);
    }

    #[test]
    fn test_random_seeded_is_deterministic() {
        let a = IntMatrix::random_seeded(4, 8, 64, 7);
        let b = IntMatrix::random_seeded(4, 8, 64, 7);
        let c = IntMatrix::random_seeded(4, 8, 64, 8);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.data().iter().all(|&v| (0..64).contains(&v)));
    }

    #[test]
    fn test_matmul_nt() {
        let a = IntMatrix::new(2, 2, vec![1, 2, 3, 4]).unwrap();
        let b = IntMatrix::new(2, 2, vec![5, 7, 6, 8]).unwrap();
        let c = a.matmul_nt(&b).unwrap();
        assert_eq!(c.data(), &[19, 22, 43, 50]);

        let wrong = IntMatrix::zeros(2, 3);
        assert!(matches!(
            a.matmul_nt(&wrong),
            Err(WorkloadError::InnerMismatch { k: 2, k2: 3, .. })
        ));
    }

    #[test]
    #[should_panic]
    fn test_get_out_of_bounds_panics() {
        IntMatrix::ones(2, 2).get(2, 0);
    }
}
