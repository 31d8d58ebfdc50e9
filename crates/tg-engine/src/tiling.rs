use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{EngineError, Result};

/// Default tile edge length (T).
pub const DEFAULT_TILE: usize = 64;

/// Default reduction width (W).
pub const DEFAULT_WIDTH: usize = 16;

/// Tile geometry shared by every stage.
///
/// `tile` is the edge length of the square tiles moved between memory and
/// the scratch store. `width` is the number of lanes reduced by one pass of
/// the pairwise sum tree. A tile is processed as `tile / width` sub-blocks
/// along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tiling {
    #[serde(default = "default_tile")]
    pub tile: usize,
    #[serde(default = "default_width")]
    pub width: usize,
}

fn default_tile() -> usize {
    DEFAULT_TILE
}

fn default_width() -> usize {
    DEFAULT_WIDTH
}

impl Tiling {
    /// Create a tiling, checking that `width` is a power of two dividing `tile`.
    pub fn new(tile: usize, width: usize) -> Result<Self> {
        let tiling = Tiling { tile, width };
        tiling.validate()?;
        Ok(tiling)
    }

    pub fn validate(&self) -> Result<()> {
        let reason = if self.tile == 0 {
            Some("tile edge must be positive")
        } else if self.width == 0 {
            Some("reduction width must be positive")
        } else if !self.width.is_power_of_two() {
            Some("reduction width must be a power of two")
        } else if self.tile % self.width != 0 {
            Some("reduction width must divide the tile edge")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(EngineError::InvalidTiling {
                tile: self.tile,
                width: self.width,
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Number of words in one T×T tile.
    pub fn tile_words(&self) -> usize {
        self.tile * self.tile
    }

    /// Number of W-wide sub-blocks along one tile edge.
    pub fn sub_blocks(&self) -> usize {
        self.tile / self.width
    }
}

impl Default for Tiling {
    fn default() -> Self {
        Tiling {
            tile: DEFAULT_TILE,
            width: DEFAULT_WIDTH,
        }
    }
}

impl fmt::Display for Tiling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T={} W={}", self.tile, self.width)
    }
}

/// Position of one K-step in the (M, N, K) traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub m: usize,
    pub n: usize,
    pub k: usize,
}

/// Position of one output tile in the (M, N) traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputCoord {
    pub m: usize,
    pub n: usize,
}

/// Row-major walk over (m_tile, n_tile, k_tile), K innermost.
#[derive(Debug, Clone)]
pub struct TileWalk {
    tiles_m: usize,
    tiles_n: usize,
    tiles_k: usize,
    next: usize,
}

impl TileWalk {
    pub fn new(tiles_m: usize, tiles_n: usize, tiles_k: usize) -> Self {
        TileWalk {
            tiles_m,
            tiles_n,
            tiles_k,
            next: 0,
        }
    }

    fn total(&self) -> usize {
        self.tiles_m * self.tiles_n * self.tiles_k
    }
}

impl Iterator for TileWalk {
    type Item = TileCoord;

    fn next(&mut self) -> Option<TileCoord> {
        if self.next >= self.total() {
            return None;
        }
        let i = self.next;
        self.next += 1;
        Some(TileCoord {
            m: i / (self.tiles_n * self.tiles_k),
            n: (i / self.tiles_k) % self.tiles_n,
            k: i % self.tiles_k,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.total() - self.next.min(self.total());
        (left, Some(left))
    }
}

impl ExactSizeIterator for TileWalk {}

/// Row-major walk over output tiles (m_tile, n_tile).
#[derive(Debug, Clone)]
pub struct OutputWalk {
    tiles_m: usize,
    tiles_n: usize,
    next: usize,
}

impl OutputWalk {
    pub fn new(tiles_m: usize, tiles_n: usize) -> Self {
        OutputWalk {
            tiles_m,
            tiles_n,
            next: 0,
        }
    }
}

impl Iterator for OutputWalk {
    type Item = OutputCoord;

    fn next(&mut self) -> Option<OutputCoord> {
        if self.next >= self.tiles_m * self.tiles_n {
            return None;
        }
        let i = self.next;
        self.next += 1;
        Some(OutputCoord {
            m: i / self.tiles_n,
            n: i % self.tiles_n,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let total = self.tiles_m * self.tiles_n;
        let left = total - self.next.min(total);
        (left, Some(left))
    }
}

impl ExactSizeIterator for OutputWalk {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tiling() {
        let t = Tiling::default();
        assert_eq!(t.tile, 64);
        assert_eq!(t.width, 16);
        assert_eq!(t.sub_blocks(), 4);
        assert_eq!(t.tile_words(), 4096);
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_invalid_tilings() {
        assert!(Tiling::new(0, 16).is_err());
        assert!(Tiling::new(64, 0).is_err());
        assert!(Tiling::new(48, 12).is_err()); // not a power of two
        assert!(Tiling::new(8, 16).is_err()); // does not divide
        assert!(Tiling::new(8, 8).is_ok());
        assert!(Tiling::new(4, 1).is_ok());
    }

    #[test]
    fn test_tile_walk_order() {
        let coords: Vec<_> = TileWalk::new(2, 2, 2)
            .map(|c| (c.m, c.n, c.k))
            .collect();
        assert_eq!(
            coords,
            vec![
                (0, 0, 0),
                (0, 0, 1),
                (0, 1, 0),
                (0, 1, 1),
                (1, 0, 0),
                (1, 0, 1),
                (1, 1, 0),
                (1, 1, 1),
            ]
        );
    }

    #[test]
    fn test_tile_walk_len() {
        let walk = TileWalk::new(2, 3, 4);
        assert_eq!(walk.len(), 24);
        assert_eq!(walk.filter(|c| c.k == 0).count(), 6);
    }

    #[test]
    fn test_output_walk_order() {
        let coords: Vec<_> = OutputWalk::new(2, 3).map(|c| (c.m, c.n)).collect();
        assert_eq!(coords, vec![(0, 0), (0, 1), (0, 2), (1, 0), (1, 1), (1, 2)]);
    }
}
