use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::mpsc::{self, Receiver, SyncSender};

use crate::error::{EngineError, Result};
use crate::layout::MemoryLayout;
use crate::stage::Stage;
use crate::tiling::{OutputWalk, TileWalk, Tiling};

/// Dimension record written by the host before a run.
///
/// The values are signed 32-bit as they arrive from the control interface;
/// [`Problem::new`] turns them into validated tile counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GemmConfig {
    pub m: i32,
    pub n: i32,
    pub k: i32,
}

impl GemmConfig {
    pub fn new(m: i32, n: i32, k: i32) -> Self {
        GemmConfig { m, n, k }
    }
}

impl Default for GemmConfig {
    fn default() -> Self {
        GemmConfig {
            m: 64,
            n: 64,
            k: 64,
        }
    }
}

impl fmt::Display for GemmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{gemm_m = {}, gemm_n = {}, gemm_k = {}}}",
            self.m, self.n, self.k
        )
    }
}

/// A validated configuration: dimensions, tiling and the derived layout.
///
/// Immutable for the duration of a run and shared by value with every stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Problem {
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub tiling: Tiling,
    pub layout: MemoryLayout,
}

impl Problem {
    /// Validate `config` against `tiling`.
    ///
    /// Every dimension must be a positive multiple of the tile edge; misaligned
    /// dimensions are rejected rather than padded.
    pub fn new(config: GemmConfig, tiling: Tiling) -> Result<Problem> {
        tiling.validate()?;
        let m = check_dim("M", config.m, tiling.tile)?;
        let n = check_dim("N", config.n, tiling.tile)?;
        let k = check_dim("K", config.k, tiling.tile)?;
        let layout = MemoryLayout::new(m, n, k)?;
        Ok(Problem {
            m,
            n,
            k,
            tiling,
            layout,
        })
    }

    pub fn tiles_m(&self) -> usize {
        self.m / self.tiling.tile
    }

    pub fn tiles_n(&self) -> usize {
        self.n / self.tiling.tile
    }

    pub fn tiles_k(&self) -> usize {
        self.k / self.tiling.tile
    }

    /// Number of (m, n, k) steps the load and compute stages go through.
    pub fn k_steps(&self) -> usize {
        self.tiles_m() * self.tiles_n() * self.tiles_k()
    }

    /// Number of output tiles the store stage drains.
    pub fn output_tiles(&self) -> usize {
        self.tiles_m() * self.tiles_n()
    }

    pub fn walk(&self) -> TileWalk {
        TileWalk::new(self.tiles_m(), self.tiles_n(), self.tiles_k())
    }

    pub fn output_walk(&self) -> OutputWalk {
        OutputWalk::new(self.tiles_m(), self.tiles_n())
    }
}

fn check_dim(dim: &'static str, value: i32, tile: usize) -> Result<usize> {
    if value <= 0 {
        return Err(EngineError::NonPositive { dim, value });
    }
    let size = value as usize;
    if size % tile != 0 {
        return Err(EngineError::Misaligned { dim, value, tile });
    }
    Ok(size)
}

/// One-shot distribution of a [`Problem`] to the pipeline stages.
///
/// Each stage registers a [`ConfigPort`] before the run starts and blocks on
/// it until the loader publishes. Every port is consumed exactly once.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    ports: Vec<(Stage, SyncSender<Problem>)>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        ConfigLoader { ports: Vec::new() }
    }

    /// Register a stage and return the port it waits on.
    pub fn port(&mut self, stage: Stage) -> ConfigPort {
        let (tx, rx) = mpsc::sync_channel(1);
        self.ports.push((stage, tx));
        ConfigPort { stage, rx }
    }

    /// Raise "configuration ready" on every registered port.
    ///
    /// Returns the number of stages that received the configuration. A stage
    /// that already exited is skipped.
    pub fn publish(self, problem: Problem) -> usize {
        let mut delivered = 0;
        for (stage, tx) in self.ports {
            match tx.send(problem) {
                Ok(()) => delivered += 1,
                Err(_) => log::warn!("{} stage exited before configuration", stage),
            }
        }
        delivered
    }
}

/// Receiving side of the configuration broadcast for a single stage.
#[derive(Debug)]
pub struct ConfigPort {
    stage: Stage,
    rx: Receiver<Problem>,
}

impl ConfigPort {
    /// Block until the configuration is published.
    pub fn wait(self) -> Result<Problem> {
        self.rx
            .recv()
            .map_err(|_| EngineError::ConfigMissing { stage: self.stage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_problem_tile_counts() {
        let p = Problem::new(GemmConfig::new(128, 64, 192), Tiling::default()).unwrap();
        assert_eq!(p.tiles_m(), 2);
        assert_eq!(p.tiles_n(), 1);
        assert_eq!(p.tiles_k(), 3);
        assert_eq!(p.k_steps(), 6);
        assert_eq!(p.output_tiles(), 2);
        assert_eq!(p.walk().count(), 6);
        assert_eq!(p.output_walk().count(), 2);
    }

    #[test]
    fn test_rejects_misaligned() {
        let err = Problem::new(GemmConfig::new(64, 100, 64), Tiling::default()).unwrap_err();
        match err {
            EngineError::Misaligned { dim, value, tile } => {
                assert_eq!(dim, "N");
                assert_eq!(value, 100);
                assert_eq!(tile, 64);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_rejects_non_positive() {
        assert!(matches!(
            Problem::new(GemmConfig::new(0, 64, 64), Tiling::default()),
            Err(EngineError::NonPositive { dim: "M", .. })
        ));
        assert!(matches!(
            Problem::new(GemmConfig::new(64, 64, -64), Tiling::default()),
            Err(EngineError::NonPositive { dim: "K", .. })
        ));
    }

    #[test]
    fn test_rejects_invalid_tiling() {
        let tiling = Tiling { tile: 8, width: 3 };
        assert!(matches!(
            Problem::new(GemmConfig::new(8, 8, 8), tiling),
            Err(EngineError::InvalidTiling { .. })
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            GemmConfig::default().to_string(),
            "{gemm_m = 64, gemm_n = 64, gemm_k = 64}"
        );
    }

    #[test]
    fn test_loader_publishes_to_every_port() {
        let problem = Problem::new(GemmConfig::default(), Tiling::default()).unwrap();
        let mut loader = ConfigLoader::new();
        let ports: Vec<_> = [Stage::Load, Stage::Compute, Stage::Store]
            .into_iter()
            .map(|s| loader.port(s))
            .collect();
        assert_eq!(loader.publish(problem), 3);
        for port in ports {
            assert_eq!(port.wait().unwrap(), problem);
        }
    }

    #[test]
    fn test_port_without_publish() {
        let mut loader = ConfigLoader::new();
        let port = loader.port(Stage::Store);
        drop(loader);
        assert!(matches!(
            port.wait(),
            Err(EngineError::ConfigMissing { stage: Stage::Store })
        ));
    }
}
