use thiserror::Error;

use crate::scratch::Slot;
use crate::stage::Stage;
use crate::transfer::TransferError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{dim} = {value} is not a multiple of the tile size {tile}")]
    Misaligned {
        dim: &'static str,
        value: i32,
        tile: usize,
    },
    #[error("{dim} = {value} must be positive")]
    NonPositive { dim: &'static str, value: i32 },
    #[error("invalid tiling (tile={tile}, width={width}): {reason}")]
    InvalidTiling {
        tile: usize,
        width: usize,
        reason: String,
    },
    #[error("memory layout for [{m}x{k}] x [{n}x{k}] does not fit in the address space")]
    LayoutOverflow { m: usize, n: usize, k: usize },
    #[error("transfer failed: {0}")]
    Transfer(#[from] TransferError),
    #[error("{stage} stage lost its peer before the run completed")]
    Disconnected { stage: Stage },
    #[error("{stage} stage expected the {expected} instance, got {got}")]
    Handoff {
        stage: Stage,
        expected: Slot,
        got: Slot,
    },
    #[error("{stage} stage panicked")]
    StagePanicked { stage: Stage },
    #[error("{stage} stage never received its configuration")]
    ConfigMissing { stage: Stage },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("{0}")]
    Other(String),
}

impl EngineError {
    /// Returns true for errors that only report a stage losing its peer.
    ///
    /// These are consequences of an abort elsewhere in the pipeline, so the
    /// run reports the root cause in preference to them.
    pub fn is_secondary(&self) -> bool {
        matches!(self, EngineError::Disconnected { .. })
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
