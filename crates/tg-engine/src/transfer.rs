use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;

/// Element width of a transfer request.
///
/// Only 32-bit words are moved today; packing several words into one bus
/// beat is left to the channel implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferUnit {
    /// Signed 32-bit word.
    Word,
}

/// A single burst request: `len` units starting at word `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferDescriptor {
    pub offset: usize,
    pub len: usize,
    pub unit: TransferUnit,
}

impl TransferDescriptor {
    pub fn words(offset: usize, len: usize) -> Self {
        TransferDescriptor {
            offset,
            len,
            unit: TransferUnit::Word,
        }
    }

    /// One past the last word touched by this request.
    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("request [{offset}, +{len}) exceeds memory of {capacity} words")]
    OutOfBounds {
        offset: usize,
        len: usize,
        capacity: usize,
    },
    #[error("request of {expected} words paired with a buffer of {got}")]
    LengthMismatch { expected: usize, got: usize },
    #[error("injected failure on {direction} request #{request}")]
    Injected {
        direction: &'static str,
        request: usize,
    },
}

/// Descriptor-driven bulk transfer service between external memory and the
/// pipeline.
///
/// Requests are served in the order they are issued by a given caller and
/// block until satisfied. The load stage only reads and the store stage only
/// writes, so both may use the channel concurrently.
pub trait TransferChannel: Send + Sync + Debug {
    /// Returns the name of this channel (e.g., "host").
    fn name(&self) -> &str;

    /// Copy `desc.len` words starting at `desc.offset` into `dst`.
    ///
    /// `dst.len()` must equal `desc.len`.
    fn read(&self, desc: TransferDescriptor, dst: &mut [i32]) -> Result<(), TransferError>;

    /// Copy `src` to `desc.len` words starting at `desc.offset`.
    ///
    /// `src.len()` must equal `desc.len`.
    fn write(&self, desc: TransferDescriptor, src: &[i32]) -> Result<(), TransferError>;
}

impl<T: TransferChannel + ?Sized> TransferChannel for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn read(&self, desc: TransferDescriptor, dst: &mut [i32]) -> Result<(), TransferError> {
        (**self).read(desc, dst)
    }

    fn write(&self, desc: TransferDescriptor, src: &[i32]) -> Result<(), TransferError> {
        (**self).write(desc, src)
    }
}

/// Request counters of a [`HostMemory`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub reads: usize,
    pub writes: usize,
}

/// Flat, word-addressable external memory living in the host process.
#[derive(Debug)]
pub struct HostMemory {
    words: RwLock<Vec<i32>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl HostMemory {
    /// Create zero-filled memory of `len` words.
    pub fn new(len: usize) -> Self {
        Self::from_words(vec![0; len])
    }

    pub fn from_words(words: Vec<i32>) -> Self {
        HostMemory {
            words: RwLock::new(words),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// Copy of `len` words starting at `offset`, as seen by the host.
    pub fn region(&self, offset: usize, len: usize) -> Result<Vec<i32>, TransferError> {
        let words = self.words.read().unwrap_or_else(PoisonError::into_inner);
        let range = checked_range(offset, len, words.len())?;
        Ok(words[range].to_vec())
    }

    /// Host-side store of `data` at `offset`; not counted as a channel request.
    pub fn fill(&self, offset: usize, data: &[i32]) -> Result<(), TransferError> {
        let mut words = self.words.write().unwrap_or_else(PoisonError::into_inner);
        let capacity = words.len();
        let range = checked_range(offset, data.len(), capacity)?;
        words[range].copy_from_slice(data);
        Ok(())
    }

    /// Copy of the whole buffer.
    pub fn snapshot(&self) -> Vec<i32> {
        self.words
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn stats(&self) -> TransferStats {
        TransferStats {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }
}

fn checked_range(
    offset: usize,
    len: usize,
    capacity: usize,
) -> Result<std::ops::Range<usize>, TransferError> {
    match offset.checked_add(len) {
        Some(end) if end <= capacity => Ok(offset..end),
        _ => Err(TransferError::OutOfBounds {
            offset,
            len,
            capacity,
        }),
    }
}

fn check_len(desc: &TransferDescriptor, got: usize) -> Result<(), TransferError> {
    if desc.len != got {
        return Err(TransferError::LengthMismatch {
            expected: desc.len,
            got,
        });
    }
    Ok(())
}

impl TransferChannel for HostMemory {
    fn name(&self) -> &str {
        "host"
    }

    fn read(&self, desc: TransferDescriptor, dst: &mut [i32]) -> Result<(), TransferError> {
        check_len(&desc, dst.len())?;
        let words = self.words.read().unwrap_or_else(PoisonError::into_inner);
        let range = checked_range(desc.offset, desc.len, words.len())?;
        dst.copy_from_slice(&words[range]);
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn write(&self, desc: TransferDescriptor, src: &[i32]) -> Result<(), TransferError> {
        check_len(&desc, src.len())?;
        let mut words = self.words.write().unwrap_or_else(PoisonError::into_inner);
        let capacity = words.len();
        let range = checked_range(desc.offset, desc.len, capacity)?;
        words[range].copy_from_slice(src);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Channel wrapper that fails one chosen request.
///
/// Requests of the selected direction are numbered from zero; request number
/// `fail_at` returns [`TransferError::Injected`] and every other request is
/// forwarded to the inner channel.
#[derive(Debug)]
pub struct FaultyChannel<C> {
    inner: C,
    fail_reads: bool,
    fail_at: usize,
    seen: AtomicUsize,
}

impl<C: TransferChannel> FaultyChannel<C> {
    /// Fail the `fail_at`-th read request.
    pub fn failing_read(inner: C, fail_at: usize) -> Self {
        FaultyChannel {
            inner,
            fail_reads: true,
            fail_at,
            seen: AtomicUsize::new(0),
        }
    }

    /// Fail the `fail_at`-th write request.
    pub fn failing_write(inner: C, fail_at: usize) -> Self {
        FaultyChannel {
            inner,
            fail_reads: false,
            fail_at,
            seen: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    fn tick(&self, direction: &'static str) -> Result<(), TransferError> {
        let request = self.seen.fetch_add(1, Ordering::Relaxed);
        if request == self.fail_at {
            return Err(TransferError::Injected { direction, request });
        }
        Ok(())
    }
}

impl<C: TransferChannel> TransferChannel for FaultyChannel<C> {
    fn name(&self) -> &str {
        "faulty"
    }

    fn read(&self, desc: TransferDescriptor, dst: &mut [i32]) -> Result<(), TransferError> {
        if self.fail_reads {
            self.tick("read")?;
        }
        self.inner.read(desc, dst)
    }

    fn write(&self, desc: TransferDescriptor, src: &[i32]) -> Result<(), TransferError> {
        if !self.fail_reads {
            self.tick("write")?;
        }
        self.inner.write(desc, src)
    }
}
