use std::fmt;

use crate::error::{Result, WorkloadError};
use crate::matrix::IntMatrix;

/// Number of mismatching elements kept in a [`ValidationReport`].
pub const MAX_REPORTED: usize = 8;

/// A single output element that differs from the gold value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mismatch {
    pub row: usize,
    pub col: usize,
    pub expected: i32,
    pub got: i32,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "C[{}][{}]: expected {}, got {}",
            self.row, self.col, self.expected, self.got
        )
    }
}

/// Outcome of comparing an output matrix against its gold reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    /// Elements compared.
    pub checked: usize,
    /// Elements that differ.
    pub errors: usize,
    /// The first few mismatches in row-major order.
    pub mismatches: Vec<Mismatch>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.errors == 0
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.passed() {
            return write!(f, "PASSED ({} elements)", self.checked);
        }
        write!(f, "FAILED ({} of {} elements)", self.errors, self.checked)?;
        for m in &self.mismatches {
            write!(f, "\n  {m}")?;
        }
        Ok(())
    }
}

/// Count the elements of `output` that differ from `gold`.
pub fn validate(output: &IntMatrix, gold: &IntMatrix) -> Result<ValidationReport> {
    if output.rows() != gold.rows() || output.cols() != gold.cols() {
        return Err(WorkloadError::ShapeMismatch {
            rows: gold.rows(),
            cols: gold.cols(),
            len: output.data().len(),
        });
    }

    let cols = gold.cols();
    let mut errors = 0;
    let mut mismatches = Vec::new();
    for (i, (&got, &expected)) in output.data().iter().zip(gold.data()).enumerate() {
        if got != expected {
            errors += 1;
            if mismatches.len() < MAX_REPORTED {
                mismatches.push(Mismatch {
                    row: i / cols,
                    col: i % cols,
                    expected,
                    got,
                });
            }
        }
    }

    Ok(ValidationReport {
        checked: gold.data().len(),
        errors,
        mismatches,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_passes() {
        let gold = IntMatrix::random_seeded(4, 4, 10, 1);
        let report = validate(&gold.clone(), &gold).unwrap();
        assert!(report.passed());
        assert_eq!(report.checked, 16);
        assert_eq!(report.to_string(), "PASSED (16 elements)");
    }

    #[test]
    fn test_counts_mismatches() {
        let gold = IntMatrix::zeros(3, 4);
        let mut data = vec![0; 12];
        data[5] = 7;
        data[11] = -1;
        let out = IntMatrix::new(3, 4, data).unwrap();

        let report = validate(&out, &gold).unwrap();
        assert!(!report.passed());
        assert_eq!(report.errors, 2);
        assert_eq!(
            report.mismatches[0],
            Mismatch {
                row: 1,
                col: 1,
                expected: 0,
                got: 7
            }
        );
        assert_eq!(report.mismatches[1].row, 2);
        assert_eq!(report.mismatches[1].col, 3);
    }

    #[test]
    fn test_reported_mismatches_are_capped() {
        let report = validate(&IntMatrix::ones(8, 8), &IntMatrix::zeros(8, 8)).unwrap();
        assert_eq!(report.errors, 64);
        assert_eq!(report.mismatches.len(), MAX_REPORTED);
    }

    #[test]
    fn test_shape_mismatch() {
        assert!(validate(&IntMatrix::zeros(2, 2), &IntMatrix::zeros(2, 3)).is_err());
    }
}
