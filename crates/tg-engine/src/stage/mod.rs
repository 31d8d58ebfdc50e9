pub mod compute;
pub mod load;
pub mod store;

use std::fmt;
use std::sync::mpsc::{Receiver, SyncSender};

use crate::error::{EngineError, Result};
use crate::scratch::{Slot, Tagged};

pub use compute::ComputeStage;
pub use load::LoadStage;
pub use store::StoreStage;

/// The three concurrently running stages of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Load,
    Compute,
    Store,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::Compute => "compute",
            Stage::Store => "store",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Completion signals raised towards the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// The compute stage folded its last K-step and handed off its last tile.
    CoreDone,
    /// The store stage drained the last output tile.
    Done,
}

/// What a stage did during one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageReport {
    pub stage: Stage,
    /// Tiles handed on: K-steps for load and compute, output tiles for store.
    pub tiles: usize,
    /// Transfer channel requests issued.
    pub requests: usize,
}

impl StageReport {
    pub fn new(stage: Stage) -> Self {
        StageReport {
            stage,
            tiles: 0,
            requests: 0,
        }
    }
}

/// Receiving end of a buffer handoff.
///
/// Instances must arrive in strict Front/Back alternation starting with
/// Front; anything else is reported as [`EngineError::Handoff`].
#[derive(Debug)]
pub struct Inbox<T> {
    stage: Stage,
    rx: Receiver<T>,
    expected: Slot,
}

impl<T: Tagged> Inbox<T> {
    pub fn new(stage: Stage, rx: Receiver<T>) -> Self {
        Inbox {
            stage,
            rx,
            expected: Slot::Front,
        }
    }

    /// Block until the next instance arrives.
    pub fn recv(&mut self) -> Result<T> {
        let item = self
            .rx
            .recv()
            .map_err(|_| EngineError::Disconnected { stage: self.stage })?;
        if item.slot() != self.expected {
            return Err(EngineError::Handoff {
                stage: self.stage,
                expected: self.expected,
                got: item.slot(),
            });
        }
        self.expected = self.expected.flip();
        Ok(item)
    }

    /// Collect every instance still in flight until all senders are gone.
    pub fn drain(self) -> Vec<T> {
        self.rx.iter().collect()
    }
}

/// Sending end of a buffer handoff.
#[derive(Debug)]
pub struct Outbox<T> {
    stage: Stage,
    tx: SyncSender<T>,
}

impl<T> Outbox<T> {
    pub fn new(stage: Stage, tx: SyncSender<T>) -> Self {
        Outbox { stage, tx }
    }

    /// Hand `item` to the peer stage, blocking while its queue is full.
    pub fn send(&self, item: T) -> Result<()> {
        self.tx
            .send(item)
            .map_err(|_| EngineError::Disconnected { stage: self.stage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scratch::OutputTile;
    use crate::tiling::Tiling;
    use std::sync::mpsc;

    fn tile(slot: Slot) -> OutputTile {
        OutputTile::new(slot, Tiling::new(2, 2).unwrap())
    }

    #[test]
    fn test_inbox_alternates() {
        let (tx, rx) = mpsc::sync_channel(2);
        let outbox = Outbox::new(Stage::Compute, tx);
        let mut inbox = Inbox::new(Stage::Store, rx);

        outbox.send(tile(Slot::Front)).unwrap();
        outbox.send(tile(Slot::Back)).unwrap();
        assert_eq!(inbox.recv().unwrap().slot(), Slot::Front);
        assert_eq!(inbox.recv().unwrap().slot(), Slot::Back);
    }

    #[test]
    fn test_inbox_rejects_out_of_order() {
        let (tx, rx) = mpsc::sync_channel(1);
        let mut inbox = Inbox::new(Stage::Compute, rx);
        tx.send(tile(Slot::Back)).unwrap();
        assert!(matches!(
            inbox.recv(),
            Err(EngineError::Handoff {
                stage: Stage::Compute,
                expected: Slot::Front,
                got: Slot::Back
            })
        ));
    }

    #[test]
    fn test_disconnect() {
        let (tx, rx) = mpsc::sync_channel::<OutputTile>(1);
        let mut inbox = Inbox::new(Stage::Store, rx);
        drop(tx);
        assert!(matches!(
            inbox.recv(),
            Err(EngineError::Disconnected { stage: Stage::Store })
        ));

        let (tx, rx) = mpsc::sync_channel(1);
        drop(rx);
        let outbox = Outbox::new(Stage::Load, tx);
        assert!(outbox.send(tile(Slot::Front)).is_err());
    }

    #[test]
    fn test_drain() {
        let (tx, rx) = mpsc::sync_channel(2);
        tx.send(tile(Slot::Back)).unwrap();
        tx.send(tile(Slot::Front)).unwrap();
        drop(tx);
        let inbox = Inbox::new(Stage::Load, rx);
        assert_eq!(inbox.drain().len(), 2);
    }
}
