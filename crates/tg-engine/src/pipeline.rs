use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::probe::{AccessProbe, NullProbe};
use crate::problem::{ConfigLoader, GemmConfig, Problem};
use crate::scratch::{InputTile, OutputTile, ScratchStore};
use crate::stage::compute::ComputeOutcome;
use crate::stage::load::LoadOutcome;
use crate::stage::{
    ComputeStage, Inbox, LoadStage, Outbox, Signal, Stage, StageReport, StoreStage,
};
use crate::tiling::Tiling;
use crate::transfer::TransferChannel;

/// Depth of the "instance ready" queues between stages.
const READY_DEPTH: usize = 1;

/// Depth of the free-instance queues; both instances of a region fit.
const FREE_DEPTH: usize = 2;

/// The GEMM engine: a scratch store plus the channel it streams through.
///
/// Every call to [`Accelerator::start`] spawns the load, compute and store
/// stages, distributes the configuration to them and lends them the scratch
/// instances. The instances come back when the run handle is joined or
/// dropped, and are reused by the next run without being cleared.
#[derive(Debug)]
pub struct Accelerator {
    config: EngineConfig,
    channel: Arc<dyn TransferChannel>,
    probe: Arc<dyn AccessProbe>,
    scratch: Option<ScratchStore>,
    runs: usize,
}

impl Accelerator {
    pub fn new(config: EngineConfig, channel: Arc<dyn TransferChannel>) -> Result<Self> {
        config.tiling.validate()?;
        let scratch = ScratchStore::new(config.tiling);
        Ok(Accelerator {
            config,
            channel,
            probe: Arc::new(NullProbe),
            scratch: Some(scratch),
            runs: 0,
        })
    }

    /// Route buffer access events of subsequent runs to `probe`.
    pub fn with_probe(mut self, probe: Arc<dyn AccessProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn tiling(&self) -> Tiling {
        self.config.tiling
    }

    /// Number of runs started so far.
    pub fn runs(&self) -> usize {
        self.runs
    }

    /// The scratch store, reallocated if a failed run lost instances.
    pub fn scratch_mut(&mut self) -> &mut ScratchStore {
        let tiling = self.config.tiling;
        self.scratch.get_or_insert_with(|| ScratchStore::new(tiling))
    }

    /// Validate `gemm` and start a run.
    ///
    /// Misaligned or non-positive dimensions are rejected here, before any
    /// stage is spawned.
    pub fn start(&mut self, gemm: GemmConfig) -> Result<RunHandle<'_>> {
        let problem = Problem::new(gemm, self.config.tiling)?;
        let scratch = match self.scratch.take() {
            Some(scratch) => scratch,
            None => {
                log::warn!("scratch store was lost by a previous run, reallocating");
                ScratchStore::new(self.config.tiling)
            }
        };
        self.runs += 1;
        log::info!("run {}: {} with {}", self.runs, gemm, problem.tiling);

        let (input, output) = scratch.into_parts();
        let (in_free_tx, in_free_rx) = mpsc::sync_channel::<InputTile>(FREE_DEPTH);
        let (in_ready_tx, in_ready_rx) = mpsc::sync_channel::<InputTile>(READY_DEPTH);
        let (out_free_tx, out_free_rx) = mpsc::sync_channel::<OutputTile>(FREE_DEPTH);
        let (out_done_tx, out_done_rx) = mpsc::sync_channel::<OutputTile>(READY_DEPTH);
        let (signal_tx, signal_rx) = mpsc::channel();

        // Both instances start out free, Front first.
        for buf in input.into_slots() {
            in_free_tx
                .send(buf)
                .map_err(|_| EngineError::Disconnected { stage: Stage::Load })?;
        }
        for buf in output.into_slots() {
            out_free_tx
                .send(buf)
                .map_err(|_| EngineError::Disconnected {
                    stage: Stage::Compute,
                })?;
        }

        let mut loader = ConfigLoader::new();
        let load = LoadStage::new(
            loader.port(Stage::Load),
            self.channel.clone(),
            self.probe.clone(),
            Inbox::new(Stage::Load, in_free_rx),
            Outbox::new(Stage::Load, in_ready_tx),
        );
        let compute = ComputeStage::new(
            loader.port(Stage::Compute),
            self.probe.clone(),
            Inbox::new(Stage::Compute, in_ready_rx),
            Outbox::new(Stage::Compute, in_free_tx),
            Inbox::new(Stage::Compute, out_free_rx),
            Outbox::new(Stage::Compute, out_done_tx),
            signal_tx.clone(),
        );
        let store = StoreStage::new(
            loader.port(Stage::Store),
            self.channel.clone(),
            self.probe.clone(),
            Inbox::new(Stage::Store, out_done_rx),
            Outbox::new(Stage::Store, out_free_tx),
            signal_tx,
        );

        let load = spawn_stage(Stage::Load, move || load.run())?;
        let compute = spawn_stage(Stage::Compute, move || compute.run())?;
        let store = spawn_stage(Stage::Store, move || store.run())?;

        loader.publish(problem);

        Ok(RunHandle {
            scratch: &mut self.scratch,
            tiling: self.config.tiling,
            problem,
            run: self.runs,
            signals: signal_rx,
            core_done: false,
            done: false,
            joined: false,
            load: Some(load),
            compute: Some(compute),
            store: Some(store),
        })
    }

    /// Run one full computation and wait for it.
    pub fn run(&mut self, gemm: GemmConfig) -> Result<RunReport> {
        self.start(gemm)?.join()
    }
}

fn spawn_stage<T, F>(stage: Stage, f: F) -> Result<JoinHandle<Result<T>>>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let handle = thread::Builder::new()
        .name(format!("tg-{}", stage))
        .spawn(f)?;
    Ok(handle)
}

/// Per-stage summary of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub problem: Problem,
    pub load: StageReport,
    pub compute: StageReport,
    pub store: StageReport,
}

impl RunReport {
    pub fn read_requests(&self) -> usize {
        self.load.requests
    }

    pub fn write_requests(&self) -> usize {
        self.store.requests
    }
}

/// A run in progress.
///
/// Dropping the handle without joining still waits for every stage to stop
/// and hands the scratch instances back to the engine; only the outcome of
/// the run is lost.
#[derive(Debug)]
pub struct RunHandle<'a> {
    scratch: &'a mut Option<ScratchStore>,
    tiling: Tiling,
    problem: Problem,
    run: usize,
    signals: Receiver<Signal>,
    core_done: bool,
    done: bool,
    joined: bool,
    load: Option<JoinHandle<Result<LoadOutcome>>>,
    compute: Option<JoinHandle<Result<ComputeOutcome>>>,
    store: Option<JoinHandle<Result<StageReport>>>,
}

impl RunHandle<'_> {
    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    fn note(&mut self, signal: Signal) {
        match signal {
            Signal::CoreDone => self.core_done = true,
            Signal::Done => self.done = true,
        }
    }

    fn wait_for(&mut self, target: Signal) -> bool {
        loop {
            let seen = match target {
                Signal::CoreDone => self.core_done,
                Signal::Done => self.done,
            };
            if seen {
                return true;
            }
            match self.signals.recv() {
                Ok(signal) => self.note(signal),
                Err(_) => return false,
            }
        }
    }

    /// Block until the compute stage has finished its last tile.
    ///
    /// Returns false if the run aborted first; [`RunHandle::join`] reports why.
    pub fn wait_core_done(&mut self) -> bool {
        self.wait_for(Signal::CoreDone)
    }

    /// Block until the store stage has drained the last tile.
    pub fn wait_done(&mut self) -> bool {
        self.wait_for(Signal::Done)
    }

    /// Non-blocking check of the overall "done" signal.
    pub fn is_done(&mut self) -> bool {
        while let Ok(signal) = self.signals.try_recv() {
            self.note(signal);
        }
        self.done
    }

    /// Wait for every stage, hand the scratch instances back to the engine
    /// and report the run.
    ///
    /// When several stages fail, the root cause is returned rather than the
    /// disconnects it caused downstream.
    pub fn join(mut self) -> Result<RunReport> {
        self.finish()
    }

    fn finish(&mut self) -> Result<RunReport> {
        self.joined = true;
        let load = join_stage(Stage::Load, self.load.take());
        let compute = join_stage(Stage::Compute, self.compute.take());
        let store = join_stage(Stage::Store, self.store.take());

        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        let mut errors = Vec::new();

        let load = match load {
            Ok(outcome) => {
                inputs = outcome.buffers;
                Some(outcome.report)
            }
            Err(err) => {
                errors.push(err);
                None
            }
        };
        let compute = match compute {
            Ok(outcome) => {
                outputs = outcome.buffers;
                Some(outcome.report)
            }
            Err(err) => {
                errors.push(err);
                None
            }
        };
        let store = match store {
            Ok(report) => Some(report),
            Err(err) => {
                errors.push(err);
                None
            }
        };

        *self.scratch = ScratchStore::reassemble(self.tiling, inputs, outputs);

        match (load, compute, store) {
            (Some(load), Some(compute), Some(store)) => {
                log::info!(
                    "run {}: done, {} k-steps, {} reads, {} writes",
                    self.run,
                    compute.tiles,
                    load.requests,
                    store.requests
                );
                Ok(RunReport {
                    problem: self.problem,
                    load,
                    compute,
                    store,
                })
            }
            _ => {
                let root = errors
                    .iter()
                    .position(|e| !e.is_secondary())
                    .unwrap_or(0);
                let err = errors.swap_remove(root);
                log::warn!("run {}: aborted: {}", self.run, err);
                Err(err)
            }
        }
    }
}

impl Drop for RunHandle<'_> {
    fn drop(&mut self) {
        if !self.joined {
            let _ = self.finish();
        }
    }
}

fn join_stage<T>(stage: Stage, handle: Option<JoinHandle<Result<T>>>) -> Result<T> {
    match handle {
        Some(handle) => handle
            .join()
            .unwrap_or_else(|_| Err(EngineError::StagePanicked { stage })),
        None => Err(EngineError::Other(format!("{} stage already joined", stage))),
    }
}
