use std::sync::Arc;

use tg_engine::{GemmConfig, HostMemory, MemoryLayout};

use crate::error::{Result, WorkloadError};
use crate::matrix::IntMatrix;

/// Host memory holding `[A][B][C]` for one problem size.
#[derive(Debug, Clone)]
pub struct ExternalBuffer {
    layout: MemoryLayout,
    memory: Arc<HostMemory>,
}

impl ExternalBuffer {
    /// Allocate a buffer for A (M×K) and B (N×K) and copy both in.
    ///
    /// The output region starts zeroed.
    pub fn assemble(a: &IntMatrix, b: &IntMatrix) -> Result<Self> {
        check_operands(a, b)?;
        let layout = MemoryLayout::new(a.rows(), b.rows(), a.cols())?;

        let mut words = Vec::with_capacity(layout.total_len());
        words.extend_from_slice(a.data());
        words.extend_from_slice(b.data());
        words.resize(layout.total_len(), 0);

        Ok(ExternalBuffer {
            layout,
            memory: Arc::new(HostMemory::from_words(words)),
        })
    }

    pub fn layout(&self) -> &MemoryLayout {
        &self.layout
    }

    pub fn memory(&self) -> Arc<HostMemory> {
        self.memory.clone()
    }

    /// Overwrite the operands with new ones of the same shape.
    pub fn load_operands(&self, a: &IntMatrix, b: &IntMatrix) -> Result<()> {
        check_operands(a, b)?;
        let (m, n, k) = self.dims();
        if a.rows() != m || b.rows() != n || a.cols() != k {
            return Err(WorkloadError::InnerMismatch {
                m: a.rows(),
                k: a.cols(),
                n: b.rows(),
                k2: b.cols(),
            });
        }
        self.memory.fill(self.layout.a_offset(), a.data())?;
        self.memory.fill(self.layout.b_offset(), b.data())?;
        Ok(())
    }

    /// Zero the output region.
    pub fn clear_output(&self) -> Result<()> {
        let zeros = vec![0; self.layout.output_len()];
        self.memory.fill(self.layout.c_offset(), &zeros)?;
        Ok(())
    }

    /// Read the output region back as an M×N matrix.
    pub fn output(&self) -> Result<IntMatrix> {
        let (m, n, _) = self.dims();
        let data = self
            .memory
            .region(self.layout.c_offset(), self.layout.output_len())?;
        IntMatrix::new(m, n, data)
    }

    /// The dimension record to hand to the engine.
    pub fn gemm_config(&self) -> Result<GemmConfig> {
        let (m, n, k) = self.dims();
        Ok(GemmConfig::new(to_i32(m)?, to_i32(n)?, to_i32(k)?))
    }

    fn dims(&self) -> (usize, usize, usize) {
        self.layout.dims()
    }
}

fn check_operands(a: &IntMatrix, b: &IntMatrix) -> Result<()> {
    if a.cols() != b.cols() {
        return Err(WorkloadError::InnerMismatch {
            m: a.rows(),
            k: a.cols(),
            n: b.rows(),
            k2: b.cols(),
        });
    }
    Ok(())
}

fn to_i32(dim: usize) -> Result<i32> {
    i32::try_from(dim).map_err(|_| WorkloadError::DimensionTooLarge(dim))
}
