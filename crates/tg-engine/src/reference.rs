use crate::error::{EngineError, Result};

/// Reference C = A·Bᵀ with B stored as N×K rows.
///
/// Straight triple loop summing left to right over K with the same
/// wrapping 32-bit arithmetic as the engine. Works for any dimensions,
/// tile-aligned or not.
pub fn matmul_nt_reference(a: &[i32], b: &[i32], m: usize, n: usize, k: usize) -> Result<Vec<i32>> {
    if a.len() != m * k {
        return Err(EngineError::Other(format!(
            "matmul_nt_reference: a.len()={} but expected m*k={}",
            a.len(),
            m * k
        )));
    }
    if b.len() != n * k {
        return Err(EngineError::Other(format!(
            "matmul_nt_reference: b.len()={} but expected n*k={}",
            b.len(),
            n * k
        )));
    }

    let mut c = vec![0i32; m * n];
    for i in 0..m {
        for j in 0..n {
            let mut sum = 0i32;
            for p in 0..k {
                sum = sum.wrapping_add(a[i * k + p].wrapping_mul(b[j * k + p]));
            }
            c[i * n + j] = sum;
        }
    }
    Ok(c)
}
