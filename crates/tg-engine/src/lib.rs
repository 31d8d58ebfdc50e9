//! `tg-engine` - Double-buffered tiled integer GEMM engine for tilegemm.
//!
//! This crate provides:
//! - A `TransferChannel` trait for descriptor-driven word transfers, with an
//!   in-process `HostMemory` implementation
//! - A ping/pong `ScratchStore` whose instances move between stages by value
//! - The load, compute and store stages and the `Accelerator` that runs them
//! - Tiling, memory layout and configuration utilities
//! - A naive reference kernel for validation

pub mod config;
pub mod error;
pub mod layout;
pub mod pipeline;
pub mod probe;
pub mod problem;
pub mod reduce;
pub mod reference;
pub mod scratch;
pub mod stage;
pub mod tiling;
pub mod transfer;

// Re-export primary types at the crate root for convenience.
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use layout::MemoryLayout;
pub use pipeline::{Accelerator, RunHandle, RunReport};
pub use probe::{Access, AccessLog, AccessProbe, NullProbe};
pub use problem::{ConfigLoader, GemmConfig, Problem};
pub use reference::matmul_nt_reference;
pub use scratch::{ScratchStore, Slot};
pub use stage::Stage;
pub use tiling::Tiling;
pub use transfer::{FaultyChannel, HostMemory, TransferChannel, TransferError};
