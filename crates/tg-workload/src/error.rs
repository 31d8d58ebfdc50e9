use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkloadError {
    #[error("matrix data length {len} does not match [{rows}x{cols}]")]
    ShapeMismatch { rows: usize, cols: usize, len: usize },
    #[error("operand dimension mismatch: A is [{m}x{k}], B is [{n}x{k2}]")]
    InnerMismatch {
        m: usize,
        k: usize,
        n: usize,
        k2: usize,
    },
    #[error("dimension {0} does not fit in a 32-bit configuration field")]
    DimensionTooLarge(usize),
    #[error("engine error: {0}")]
    Engine(#[from] tg_engine::EngineError),
    #[error("transfer error: {0}")]
    Transfer(#[from] tg_engine::TransferError),
}

pub type Result<T> = std::result::Result<T, WorkloadError>;
