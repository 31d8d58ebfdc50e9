//! `tg-workload` - Host-side workload tooling for the tilegemm engine.
//!
//! Builds operand matrices, lays them out in an external buffer the engine
//! can stream from, runs the engine and checks its output against a gold
//! reference.

pub mod buffer;
pub mod error;
pub mod matrix;
pub mod session;
pub mod validate;

pub use buffer::ExternalBuffer;
pub use error::{Result, WorkloadError};
pub use matrix::IntMatrix;
pub use session::{Outcome, Session, Workload};
pub use validate::{validate, Mismatch, ValidationReport};
