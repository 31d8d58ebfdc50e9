use std::sync::mpsc::Sender;
use std::sync::Arc;

use crate::error::Result;
use crate::probe::{Access, AccessProbe, Region};
use crate::problem::ConfigPort;
use crate::reduce::BlockKernel;
use crate::scratch::{InputTile, OutputTile, Tagged};
use crate::stage::{Inbox, Outbox, Signal, Stage, StageReport};

/// Folds input tiles into output accumulators.
///
/// An output instance is taken from the free queue at the start of each
/// (m, n) tile, accumulates all K/T steps and is then handed to the store
/// stage. Each input instance goes back to the load stage as soon as its
/// partial product is folded in.
#[derive(Debug)]
pub struct ComputeStage {
    config: ConfigPort,
    probe: Arc<dyn AccessProbe>,
    input_ready: Inbox<InputTile>,
    input_free: Outbox<InputTile>,
    output_free: Inbox<OutputTile>,
    output_done: Outbox<OutputTile>,
    signals: Sender<Signal>,
}

/// Result of a completed compute stage.
#[derive(Debug)]
pub struct ComputeOutcome {
    pub report: StageReport,
    /// Output instances handed back by the store stage after the last tile.
    pub buffers: Vec<OutputTile>,
}

impl ComputeStage {
    pub fn new(
        config: ConfigPort,
        probe: Arc<dyn AccessProbe>,
        input_ready: Inbox<InputTile>,
        input_free: Outbox<InputTile>,
        output_free: Inbox<OutputTile>,
        output_done: Outbox<OutputTile>,
        signals: Sender<Signal>,
    ) -> Self {
        ComputeStage {
            config,
            probe,
            input_ready,
            input_free,
            output_free,
            output_done,
            signals,
        }
    }

    pub fn run(mut self) -> Result<ComputeOutcome> {
        let problem = self.config.wait()?;
        let mut kernel = BlockKernel::new(problem.tiling);
        let mut report = StageReport::new(Stage::Compute);

        log::debug!(
            "compute: {} output tiles, {} k-steps each ({})",
            problem.output_tiles(),
            problem.tiles_k(),
            problem.tiling
        );

        for out_coord in problem.output_walk() {
            let mut out = self.output_free.recv()?;
            let out_slot = out.slot();
            self.probe
                .begin(Stage::Compute, Region::Output, out_slot, Access::Write);

            for k in 0..problem.tiles_k() {
                let input = self.input_ready.recv()?;
                let in_slot = input.slot();
                self.probe
                    .begin(Stage::Compute, Region::Input, in_slot, Access::Read);

                let (a, b) = input.operands();
                kernel.accumulate(a, b, out.words_mut(), k == 0);

                self.probe
                    .end(Stage::Compute, Region::Input, in_slot, Access::Read);
                self.input_free.send(input)?;
                report.tiles += 1;
            }

            self.probe
                .end(Stage::Compute, Region::Output, out_slot, Access::Write);
            log::trace!(
                "compute: tile ({}, {}) final in {} instance",
                out_coord.m,
                out_coord.n,
                out_slot
            );
            self.output_done.send(out)?;
        }

        drop(self.input_free);
        // The host may have stopped listening; completion is still reported by join.
        let _ = self.signals.send(Signal::CoreDone);
        drop(self.output_done);

        let buffers = self.output_free.drain();
        log::debug!(
            "compute: done after {} k-steps, reclaimed {} instances",
            report.tiles,
            buffers.len()
        );
        Ok(ComputeOutcome { report, buffers })
    }
}
