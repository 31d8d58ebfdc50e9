use std::sync::Arc;

use tg_engine::{AccessProbe, Accelerator, EngineConfig, RunReport};

use crate::buffer::ExternalBuffer;
use crate::error::{Result, WorkloadError};
use crate::matrix::IntMatrix;
use crate::validate::{validate, ValidationReport};

/// Operands of one GEMM: A is M×K, B is N×K.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workload {
    a: IntMatrix,
    b: IntMatrix,
}

impl Workload {
    pub fn new(a: IntMatrix, b: IntMatrix) -> Result<Self> {
        if a.cols() != b.cols() {
            return Err(WorkloadError::InnerMismatch {
                m: a.rows(),
                k: a.cols(),
                n: b.rows(),
                k2: b.cols(),
            });
        }
        Ok(Workload { a, b })
    }

    /// Seeded random operands with entries in `[0, K)`.
    pub fn random(m: usize, n: usize, k: usize, seed: u64) -> Self {
        let bound = i32::try_from(k).unwrap_or(i32::MAX);
        Workload {
            a: IntMatrix::random_seeded(m, k, bound, seed),
            b: IntMatrix::random_seeded(n, k, bound, seed.wrapping_add(1)),
        }
    }

    pub fn zeros(m: usize, n: usize, k: usize) -> Self {
        Workload {
            a: IntMatrix::zeros(m, k),
            b: IntMatrix::zeros(n, k),
        }
    }

    pub fn ones(m: usize, n: usize, k: usize) -> Self {
        Workload {
            a: IntMatrix::ones(m, k),
            b: IntMatrix::ones(n, k),
        }
    }

    pub fn a(&self) -> &IntMatrix {
        &self.a
    }

    pub fn b(&self) -> &IntMatrix {
        &self.b
    }

    /// (M, N, K).
    pub fn dims(&self) -> (usize, usize, usize) {
        (self.a.rows(), self.b.rows(), self.a.cols())
    }

    /// A·Bᵀ computed on the host.
    pub fn gold(&self) -> Result<IntMatrix> {
        self.a.matmul_nt(&self.b)
    }
}

/// Result of one engine run over a workload.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub output: IntMatrix,
    pub report: RunReport,
    pub validation: ValidationReport,
}

impl Outcome {
    pub fn passed(&self) -> bool {
        self.validation.passed()
    }
}

/// An engine bound to an external buffer for one problem size.
///
/// The engine and its scratch store are kept across [`Session::run`] calls,
/// so consecutive workloads of the same shape reuse the same instances.
#[derive(Debug)]
pub struct Session {
    buffer: ExternalBuffer,
    accelerator: Accelerator,
    gold: IntMatrix,
}

impl Session {
    pub fn new(config: EngineConfig, workload: &Workload) -> Result<Self> {
        let buffer = ExternalBuffer::assemble(&workload.a, &workload.b)?;
        let accelerator = Accelerator::new(config, buffer.memory())?;
        let gold = workload.gold()?;
        Ok(Session {
            buffer,
            accelerator,
            gold,
        })
    }

    pub fn with_probe(mut self, probe: Arc<dyn AccessProbe>) -> Self {
        self.accelerator = self.accelerator.with_probe(probe);
        self
    }

    pub fn buffer(&self) -> &ExternalBuffer {
        &self.buffer
    }

    pub fn accelerator_mut(&mut self) -> &mut Accelerator {
        &mut self.accelerator
    }

    /// Replace the operands with `workload`, which must have the same shape.
    ///
    /// The output region is zeroed so a stale result cannot pass validation.
    pub fn load(&mut self, workload: &Workload) -> Result<()> {
        self.buffer.load_operands(&workload.a, &workload.b)?;
        self.buffer.clear_output()?;
        self.gold = workload.gold()?;
        Ok(())
    }

    /// Run the engine over the loaded operands and validate the output.
    pub fn run(&mut self) -> Result<Outcome> {
        let gemm = self.buffer.gemm_config()?;
        let report = self.accelerator.run(gemm)?;
        let output = self.buffer.output()?;
        let validation = validate(&output, &self.gold)?;
        log::debug!("{}: {}", gemm, validation);
        Ok(Outcome {
            output,
            report,
            validation,
        })
    }
}
