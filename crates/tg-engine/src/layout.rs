use crate::error::{EngineError, Result};

/// Placement of the operands and the result in the flat external buffer.
///
/// The buffer holds `[A: M·K][B: N·K][C: M·N]` words, row-major. B is stored
/// as N rows of K words, so a B-tile is addressed exactly like an A-tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLayout {
    m: usize,
    n: usize,
    k: usize,
    b_offset: usize,
    c_offset: usize,
    total: usize,
}

impl MemoryLayout {
    /// Compute the layout, failing if any region length overflows `usize`.
    pub fn new(m: usize, n: usize, k: usize) -> Result<Self> {
        let overflow = || EngineError::LayoutOverflow { m, n, k };

        let a_len = m.checked_mul(k).ok_or_else(overflow)?;
        let b_len = n.checked_mul(k).ok_or_else(overflow)?;
        let c_len = m.checked_mul(n).ok_or_else(overflow)?;
        let c_offset = a_len.checked_add(b_len).ok_or_else(overflow)?;
        let total = c_offset.checked_add(c_len).ok_or_else(overflow)?;

        Ok(MemoryLayout {
            m,
            n,
            k,
            b_offset: a_len,
            c_offset,
            total,
        })
    }

    /// (M, N, K).
    pub fn dims(&self) -> (usize, usize, usize) {
        (self.m, self.n, self.k)
    }

    pub fn a_offset(&self) -> usize {
        0
    }

    pub fn b_offset(&self) -> usize {
        self.b_offset
    }

    /// First word of the output region; equal to the combined input length.
    pub fn c_offset(&self) -> usize {
        self.c_offset
    }

    pub fn input_len(&self) -> usize {
        self.c_offset
    }

    pub fn output_len(&self) -> usize {
        self.m * self.n
    }

    /// Words the external buffer must hold.
    pub fn total_len(&self) -> usize {
        self.total
    }

    /// Distance in words between consecutive rows of an A- or B-tile.
    pub fn input_row_stride(&self) -> usize {
        self.k
    }

    /// Distance in words between consecutive rows of a C-tile.
    pub fn output_row_stride(&self) -> usize {
        self.n
    }

    /// Word offset of the first row of the A-tile at (m_tile, k_tile).
    pub fn a_tile_base(&self, m_tile: usize, k_tile: usize, tile: usize) -> usize {
        m_tile * tile * self.k + k_tile * tile
    }

    /// Word offset of the first row of the B-tile at (n_tile, k_tile).
    pub fn b_tile_base(&self, n_tile: usize, k_tile: usize, tile: usize) -> usize {
        self.b_offset + n_tile * tile * self.k + k_tile * tile
    }

    /// Word offset of the first row of the C-tile at (m_tile, n_tile).
    pub fn c_tile_base(&self, m_tile: usize, n_tile: usize, tile: usize) -> usize {
        self.c_offset + m_tile * tile * self.n + n_tile * tile
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_offsets() {
        let l = MemoryLayout::new(128, 64, 192).unwrap();
        assert_eq!(l.dims(), (128, 64, 192));
        assert_eq!(l.a_offset(), 0);
        assert_eq!(l.b_offset(), 128 * 192);
        assert_eq!(l.c_offset(), 128 * 192 + 64 * 192);
        assert_eq!(l.input_len(), l.c_offset());
        assert_eq!(l.output_len(), 128 * 64);
        assert_eq!(l.total_len(), 128 * 192 + 64 * 192 + 128 * 64);
    }

    #[test]
    fn test_tile_bases() {
        let l = MemoryLayout::new(128, 128, 128).unwrap();
        // A-tile (1, 1): 64 rows down, 64 words across.
        assert_eq!(l.a_tile_base(1, 1, 64), 64 * 128 + 64);
        // B-tile (1, 0) starts after A, 64 rows down.
        assert_eq!(l.b_tile_base(1, 0, 64), 128 * 128 + 64 * 128);
        // C-tile (0, 1) is 64 words into the output region.
        assert_eq!(l.c_tile_base(0, 1, 64), 2 * 128 * 128 + 64);
        assert_eq!(l.c_tile_base(1, 1, 64), 2 * 128 * 128 + 64 * 128 + 64);
    }

    #[test]
    fn test_strides() {
        let l = MemoryLayout::new(64, 128, 192).unwrap();
        assert_eq!(l.input_row_stride(), 192);
        assert_eq!(l.output_row_stride(), 128);
    }

    #[test]
    fn test_overflow() {
        assert!(matches!(
            MemoryLayout::new(usize::MAX, 2, 2),
            Err(EngineError::LayoutOverflow { .. })
        ));
    }
}
