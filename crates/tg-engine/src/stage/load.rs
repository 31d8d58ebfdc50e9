use std::sync::Arc;

use crate::error::Result;
use crate::probe::{Access, AccessProbe, Region};
use crate::problem::ConfigPort;
use crate::scratch::{InputTile, Tagged};
use crate::stage::{Inbox, Outbox, Stage, StageReport};
use crate::transfer::{TransferChannel, TransferDescriptor};

/// Fetches A- and B-tiles from external memory into free input instances.
///
/// For every (m, n, k) step the stage waits for a free instance (the one the
/// compute stage handed back), reads T rows of the A-tile at (m, k) and T
/// rows of the B-tile at (n, k), one transfer request per row, and passes the
/// filled instance on.
#[derive(Debug)]
pub struct LoadStage {
    config: ConfigPort,
    channel: Arc<dyn TransferChannel>,
    probe: Arc<dyn AccessProbe>,
    free: Inbox<InputTile>,
    ready: Outbox<InputTile>,
}

/// Result of a completed load stage.
#[derive(Debug)]
pub struct LoadOutcome {
    pub report: StageReport,
    /// Input instances handed back by the compute stage after the last step.
    pub buffers: Vec<InputTile>,
}

impl LoadStage {
    pub fn new(
        config: ConfigPort,
        channel: Arc<dyn TransferChannel>,
        probe: Arc<dyn AccessProbe>,
        free: Inbox<InputTile>,
        ready: Outbox<InputTile>,
    ) -> Self {
        LoadStage {
            config,
            channel,
            probe,
            free,
            ready,
        }
    }

    pub fn run(mut self) -> Result<LoadOutcome> {
        let problem = self.config.wait()?;
        let tile = problem.tiling.tile;
        let layout = problem.layout;
        let stride = layout.input_row_stride();
        let mut report = StageReport::new(Stage::Load);

        log::debug!(
            "load: {} k-steps of [{}x{}] tiles",
            problem.k_steps(),
            tile,
            tile
        );

        for coord in problem.walk() {
            let mut buf = self.free.recv()?;
            let slot = buf.slot();
            self.probe.begin(Stage::Load, Region::Input, slot, Access::Write);

            let bases = [
                (false, layout.a_tile_base(coord.m, coord.k, tile)),
                (true, layout.b_tile_base(coord.n, coord.k, tile)),
            ];
            for (is_b, base) in bases {
                let mut offset = base;
                for row in 0..tile {
                    let desc = TransferDescriptor::words(offset, tile);
                    self.channel.read(desc, buf.row_mut(is_b, row))?;
                    report.requests += 1;
                    offset += stride;
                }
            }

            self.probe.end(Stage::Load, Region::Input, slot, Access::Write);
            log::trace!(
                "load: ({}, {}, {}) ready in {} instance",
                coord.m,
                coord.n,
                coord.k,
                slot
            );
            self.ready.send(buf)?;
            report.tiles += 1;
        }

        drop(self.ready);
        let buffers = self.free.drain();
        log::debug!(
            "load: done after {} requests, reclaimed {} instances",
            report.requests,
            buffers.len()
        );
        Ok(LoadOutcome { report, buffers })
    }
}
