use std::fmt;

use crate::tiling::Tiling;

/// Which of the two instances of a double-buffered region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Front,
    Back,
}

impl Slot {
    /// The other instance.
    pub fn flip(self) -> Slot {
        match self {
            Slot::Front => Slot::Back,
            Slot::Back => Slot::Front,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Front => write!(f, "front"),
            Slot::Back => write!(f, "back"),
        }
    }
}

/// A buffer instance that knows which slot it occupies.
pub trait Tagged {
    fn slot(&self) -> Slot;
}

/// Input buffer instance: one A-tile followed by one B-tile.
///
/// Both tiles are stored row-major with a row length of T words. The B-tile
/// holds T rows of B, each row being a K-slice of one output column.
#[derive(Debug, Clone)]
pub struct InputTile {
    slot: Slot,
    tile: usize,
    words: Vec<i32>,
}

impl InputTile {
    pub fn new(slot: Slot, tiling: Tiling) -> Self {
        InputTile {
            slot,
            tile: tiling.tile,
            words: vec![0; 2 * tiling.tile_words()],
        }
    }

    /// The A-tile and the B-tile.
    pub fn operands(&self) -> (&[i32], &[i32]) {
        self.words.split_at(self.tile * self.tile)
    }

    /// Row `row` of the A-tile (`b = false`) or of the B-tile (`b = true`).
    pub fn row_mut(&mut self, b: bool, row: usize) -> &mut [i32] {
        let region = if b { self.tile * self.tile } else { 0 };
        let base = region + row * self.tile;
        &mut self.words[base..base + self.tile]
    }

    pub fn fill(&mut self, value: i32) {
        self.words.fill(value);
    }
}

impl Tagged for InputTile {
    fn slot(&self) -> Slot {
        self.slot
    }
}

/// Output buffer instance: one T×T tile of accumulators.
#[derive(Debug, Clone)]
pub struct OutputTile {
    slot: Slot,
    tile: usize,
    words: Vec<i32>,
}

impl OutputTile {
    pub fn new(slot: Slot, tiling: Tiling) -> Self {
        OutputTile {
            slot,
            tile: tiling.tile,
            words: vec![0; tiling.tile_words()],
        }
    }

    pub fn words(&self) -> &[i32] {
        &self.words
    }

    pub fn words_mut(&mut self) -> &mut [i32] {
        &mut self.words
    }

    pub fn row(&self, row: usize) -> &[i32] {
        &self.words[row * self.tile..(row + 1) * self.tile]
    }

    pub fn fill(&mut self, value: i32) {
        self.words.fill(value);
    }
}

impl Tagged for OutputTile {
    fn slot(&self) -> Slot {
        self.slot
    }
}

/// The two instances of one double-buffered region.
#[derive(Debug, Clone)]
pub struct PingPong<T> {
    front: T,
    back: T,
}

impl<T: Tagged> PingPong<T> {
    pub fn new(front: T, back: T) -> Self {
        PingPong { front, back }
    }

    /// Rebuild the pair from instances returned by the stages.
    ///
    /// Returns `None` unless exactly one Front and one Back instance are
    /// present.
    pub fn reassemble(items: Vec<T>) -> Option<Self> {
        if items.len() != 2 {
            return None;
        }
        let mut front = None;
        let mut back = None;
        for item in items {
            match item.slot() {
                Slot::Front => front = Some(item),
                Slot::Back => back = Some(item),
            }
        }
        Some(PingPong {
            front: front?,
            back: back?,
        })
    }

    pub fn front(&self) -> &T {
        &self.front
    }

    pub fn back(&self) -> &T {
        &self.back
    }

    /// Both instances, Front first.
    pub fn into_slots(self) -> [T; 2] {
        [self.front, self.back]
    }

    fn each_mut(&mut self, mut f: impl FnMut(&mut T)) {
        f(&mut self.front);
        f(&mut self.back);
    }
}

/// Scratch memory of the engine: the input and output ping/pong regions.
///
/// Allocated once per [`crate::Accelerator`] and lent to the stages for the
/// duration of a run. Contents are never cleared between runs; the compute
/// stage resets accumulators itself on the first K-step of every tile.
#[derive(Debug, Clone)]
pub struct ScratchStore {
    tiling: Tiling,
    input: PingPong<InputTile>,
    output: PingPong<OutputTile>,
}

impl ScratchStore {
    pub fn new(tiling: Tiling) -> Self {
        ScratchStore {
            tiling,
            input: PingPong::new(
                InputTile::new(Slot::Front, tiling),
                InputTile::new(Slot::Back, tiling),
            ),
            output: PingPong::new(
                OutputTile::new(Slot::Front, tiling),
                OutputTile::new(Slot::Back, tiling),
            ),
        }
    }

    pub fn tiling(&self) -> Tiling {
        self.tiling
    }

    /// Total words held by all four instances.
    pub fn capacity_words(&self) -> usize {
        2 * 2 * self.tiling.tile_words() + 2 * self.tiling.tile_words()
    }

    pub fn input(&self) -> &PingPong<InputTile> {
        &self.input
    }

    pub fn output(&self) -> &PingPong<OutputTile> {
        &self.output
    }

    /// Overwrite every instance with `value`.
    pub fn fill(&mut self, value: i32) {
        self.input.each_mut(|t| t.fill(value));
        self.output.each_mut(|t| t.fill(value));
    }

    pub fn into_parts(self) -> (PingPong<InputTile>, PingPong<OutputTile>) {
        (self.input, self.output)
    }

    /// Rebuild the store from the instances handed back after a run.
    pub fn reassemble(
        tiling: Tiling,
        inputs: Vec<InputTile>,
        outputs: Vec<OutputTile>,
    ) -> Option<Self> {
        Some(ScratchStore {
            tiling,
            input: PingPong::reassemble(inputs)?,
            output: PingPong::reassemble(outputs)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> Tiling {
        Tiling::new(4, 2).unwrap()
    }

    #[test]
    fn test_slot_flip() {
        assert_eq!(Slot::Front.flip(), Slot::Back);
        assert_eq!(Slot::Back.flip(), Slot::Front);
        assert_eq!(Slot::Front.flip().flip(), Slot::Front);
    }

    #[test]
    fn test_input_tile_rows() {
        let mut t = InputTile::new(Slot::Front, small());
        t.row_mut(false, 1).copy_from_slice(&[1, 2, 3, 4]);
        t.row_mut(true, 3).copy_from_slice(&[5, 6, 7, 8]);
        let (a, b) = t.operands();
        assert_eq!(a.len(), 16);
        assert_eq!(b.len(), 16);
        assert_eq!(&a[4..8], &[1, 2, 3, 4]);
        assert_eq!(&b[12..16], &[5, 6, 7, 8]);
    }

    #[test]
    fn test_output_tile_row() {
        let mut t = OutputTile::new(Slot::Back, small());
        t.words_mut()[8..12].copy_from_slice(&[9, 9, 9, 9]);
        assert_eq!(t.row(2), &[9, 9, 9, 9]);
        assert_eq!(t.slot(), Slot::Back);
    }

    #[test]
    fn test_reassemble() {
        let tiling = small();
        let pair = PingPong::reassemble(vec![
            OutputTile::new(Slot::Back, tiling),
            OutputTile::new(Slot::Front, tiling),
        ])
        .unwrap();
        assert_eq!(pair.front().slot(), Slot::Front);
        assert_eq!(pair.back().slot(), Slot::Back);

        assert!(PingPong::reassemble(vec![
            OutputTile::new(Slot::Front, tiling),
            OutputTile::new(Slot::Front, tiling),
        ])
        .is_none());
        assert!(PingPong::reassemble(vec![OutputTile::new(Slot::Front, tiling)]).is_none());
    }

    #[test]
    fn test_store_round_trip() {
        let tiling = small();
        let mut store = ScratchStore::new(tiling);
        store.fill(-3);
        assert_eq!(store.capacity_words(), 6 * 16);

        let (input, output) = store.into_parts();
        let [front, back] = output.into_slots();
        assert!(front.words().iter().all(|&w| w == -3));
        let rebuilt = ScratchStore::reassemble(
            tiling,
            input.into_slots().into_iter().rev().collect(),
            vec![back, front],
        )
        .unwrap();
        assert_eq!(rebuilt.input().front().slot(), Slot::Front);
        assert_eq!(rebuilt.output().back().slot(), Slot::Back);
    }
}
