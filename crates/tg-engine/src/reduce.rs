//! Blocked multiply-accumulate with a pairwise reduction tree.
//!
//! A tile is processed in W×W sub-blocks. For every output row inside a
//! sub-block, W products along K are summed by a binary tree of log2(W)
//! levels and folded into the matching accumulator. All arithmetic is
//! 32-bit two's complement; sums that leave the i32 range wrap silently, so
//! callers must pick operands whose dot products stay representable.

use crate::tiling::Tiling;

/// Sum `lanes` pairwise in place (W → W/2 → … → 1) and return the total.
///
/// With a power-of-two length this is a balanced tree of log2(W) levels. An
/// odd lane at the end of a level is carried up unchanged. The slice is
/// clobbered.
pub fn reduce_tree(lanes: &mut [i32]) -> i32 {
    if lanes.is_empty() {
        return 0;
    }

    let mut width = lanes.len();
    while width > 1 {
        let half = width / 2;
        for i in 0..half {
            lanes[i] = lanes[2 * i].wrapping_add(lanes[2 * i + 1]);
        }
        if width % 2 == 1 {
            lanes[half] = lanes[width - 1];
            width = half + 1;
        } else {
            width = half;
        }
    }
    lanes[0]
}

/// Working registers of the compute stage, sized from a [`Tiling`].
#[derive(Debug, Clone)]
pub struct BlockKernel {
    tiling: Tiling,
    products: Vec<i32>,
    acc: Vec<i32>,
}

impl BlockKernel {
    pub fn new(tiling: Tiling) -> Self {
        BlockKernel {
            tiling,
            products: vec![0; tiling.width],
            acc: vec![0; tiling.width],
        }
    }

    /// Fold the partial product of one K-step into `out`.
    ///
    /// `a` is a T×T A-tile, `b` a T×T B-tile (rows are output columns) and
    /// `out` the T×T accumulator tile. When `reset` is set the accumulators
    /// start from zero instead of their stored value, which must be the case
    /// on the first K-step of every output tile.
    pub fn accumulate(&mut self, a: &[i32], b: &[i32], out: &mut [i32], reset: bool) {
        let tile = self.tiling.tile;
        let width = self.tiling.width;
        let blocks = self.tiling.sub_blocks();
        debug_assert_eq!(a.len(), tile * tile);
        debug_assert_eq!(b.len(), tile * tile);
        debug_assert_eq!(out.len(), tile * tile);

        for m_block in 0..blocks {
            for n_block in 0..blocks {
                for k_block in 0..blocks {
                    for m in 0..width {
                        let out_offset = m_block * tile * width + n_block * width + m * tile;
                        let out_slice = &mut out[out_offset..out_offset + width];

                        if reset && k_block == 0 {
                            self.acc.fill(0);
                        } else {
                            self.acc.copy_from_slice(out_slice);
                        }

                        let a_offset = m_block * tile * width + k_block * width + m * tile;
                        let a_row = &a[a_offset..a_offset + width];

                        for n in 0..width {
                            let b_offset = n_block * tile * width + k_block * width + n * tile;
                            let b_row = &b[b_offset..b_offset + width];

                            let lanes = self.products.iter_mut().zip(a_row.iter().zip(b_row));
                            for (p, (x, y)) in lanes {
                                *p = x.wrapping_mul(*y);
                            }
                            let sum = reduce_tree(&mut self.products);
                            self.acc[n] = self.acc[n].wrapping_add(sum);
                        }

                        out_slice.copy_from_slice(&self.acc);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive_tile(a: &[i32], b: &[i32], tile: usize) -> Vec<i32> {
        let mut c = vec![0i32; tile * tile];
        for i in 0..tile {
            for j in 0..tile {
                let mut sum = 0i32;
                for p in 0..tile {
                    sum = sum.wrapping_add(a[i * tile + p].wrapping_mul(b[j * tile + p]));
                }
                c[i * tile + j] = sum;
            }
        }
        c
    }

    fn pattern(len: usize, seed: i32) -> Vec<i32> {
        (0..len as i32).map(|i| (i * 7 + seed) % 13 - 6).collect()
    }

    #[test]
    fn test_reduce_tree_sums() {
        let mut lanes: Vec<i32> = (1..=16).collect();
        assert_eq!(reduce_tree(&mut lanes), 136);

        let mut one = [42];
        assert_eq!(reduce_tree(&mut one), 42);

        let mut empty: [i32; 0] = [];
        assert_eq!(reduce_tree(&mut empty), 0);
    }

    #[test]
    fn test_reduce_tree_odd_lengths() {
        let mut three = [1, 2, 3];
        assert_eq!(reduce_tree(&mut three), 6);

        for len in [5, 6, 7, 12] {
            let mut lanes: Vec<i32> = (1..=len).collect();
            assert_eq!(reduce_tree(&mut lanes), len * (len + 1) / 2, "len {len}");
        }
    }

    #[test]
    fn test_reduce_tree_wraps() {
        let mut lanes = [i32::MAX, 1];
        assert_eq!(reduce_tree(&mut lanes), i32::MIN);
    }

    #[test]
    fn test_accumulate_matches_naive() {
        for (tile, width) in [(8, 2), (8, 4), (8, 8), (16, 4), (4, 1)] {
            let tiling = Tiling::new(tile, width).unwrap();
            let a = pattern(tile * tile, 3);
            let b = pattern(tile * tile, 5);
            let mut out = vec![999; tile * tile];
            BlockKernel::new(tiling).accumulate(&a, &b, &mut out, true);
            assert_eq!(out, naive_tile(&a, &b, tile), "T={tile} W={width}");
        }
    }

    #[test]
    fn test_accumulate_folds_into_previous() {
        let tiling = Tiling::new(8, 4).unwrap();
        let a = pattern(64, 1);
        let b = pattern(64, 2);
        let mut kernel = BlockKernel::new(tiling);

        let mut out = vec![0; 64];
        kernel.accumulate(&a, &b, &mut out, true);
        kernel.accumulate(&a, &b, &mut out, false);

        let expected: Vec<i32> = naive_tile(&a, &b, 8).iter().map(|v| v * 2).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_reset_discards_stale_values() {
        let tiling = Tiling::new(8, 2).unwrap();
        let ones = vec![1; 64];
        let mut out = vec![i32::MIN; 64];
        BlockKernel::new(tiling).accumulate(&ones, &ones, &mut out, true);
        assert!(out.iter().all(|&v| v == 8));
    }
}
