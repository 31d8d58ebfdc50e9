use std::sync::mpsc::Sender;
use std::sync::Arc;

use crate::error::Result;
use crate::probe::{Access, AccessProbe, Region};
use crate::problem::ConfigPort;
use crate::scratch::{OutputTile, Tagged};
use crate::stage::{Inbox, Outbox, Signal, Stage, StageReport};
use crate::transfer::{TransferChannel, TransferDescriptor};

/// Drains finalized output tiles to the result region of external memory.
#[derive(Debug)]
pub struct StoreStage {
    config: ConfigPort,
    channel: Arc<dyn TransferChannel>,
    probe: Arc<dyn AccessProbe>,
    done: Inbox<OutputTile>,
    free: Outbox<OutputTile>,
    signals: Sender<Signal>,
}

impl StoreStage {
    pub fn new(
        config: ConfigPort,
        channel: Arc<dyn TransferChannel>,
        probe: Arc<dyn AccessProbe>,
        done: Inbox<OutputTile>,
        free: Outbox<OutputTile>,
        signals: Sender<Signal>,
    ) -> Self {
        StoreStage {
            config,
            channel,
            probe,
            done,
            free,
            signals,
        }
    }

    pub fn run(mut self) -> Result<StageReport> {
        let problem = self.config.wait()?;
        let tile = problem.tiling.tile;
        let layout = problem.layout;
        let stride = layout.output_row_stride();
        let mut report = StageReport::new(Stage::Store);

        log::debug!("store: {} output tiles", problem.output_tiles());

        for coord in problem.output_walk() {
            let out = self.done.recv()?;
            let slot = out.slot();
            self.probe.begin(Stage::Store, Region::Output, slot, Access::Read);

            let mut offset = layout.c_tile_base(coord.m, coord.n, tile);
            for row in 0..tile {
                let desc = TransferDescriptor::words(offset, tile);
                self.channel.write(desc, out.row(row))?;
                report.requests += 1;
                offset += stride;
            }

            self.probe.end(Stage::Store, Region::Output, slot, Access::Read);
            log::trace!(
                "store: tile ({}, {}) written from {} instance",
                coord.m,
                coord.n,
                slot
            );
            self.free.send(out)?;
            report.tiles += 1;
        }

        let _ = self.signals.send(Signal::Done);
        log::debug!("store: done after {} requests", report.requests);
        Ok(report)
    }
}
