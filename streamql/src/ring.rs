//! The kernel/user-space ring buffer boundary (`spec.md` §5/§6), modeled as
//! a `RingBuffer` trait plus a bounded in-process `ArrayRingBuffer`: the
//! producer reserves-then-submits a whole batch at once, the consumer
//! peeks-then-releases, and nothing here ever blocks.

use crate::error::EngineError;

/// A single-producer, single-consumer bounded channel of published result
/// batches, standing in for the host sandbox's lock-free ring buffer map.
pub trait RingBuffer<T> {
    /// Atomically reserves space for `items.len()` elements and writes
    /// them, or fails without writing anything. Mirrors `spec.md` §4.9
    /// step (e): "reserve `n · sizeof(result)`... if reserve fails, report
    /// `RingReserveFail` and drop the batch."
    fn try_publish(&mut self, items: &[T]) -> Result<(), EngineError>;

    /// Copies out every currently published element without consuming it.
    fn peek(&self) -> &[T];

    /// Consumes the first `n` peeked elements. `n` must not exceed
    /// [`RingBuffer::peek`]'s length.
    fn release(&mut self, n: usize);

    /// Number of elements currently published and unreleased.
    fn len(&self) -> usize;

    /// Remaining free capacity.
    fn free(&self) -> usize;
}

/// A bounded ring buffer backed by a flat `Vec`, capacity `CAP`. Not a
/// true lock-free SPSC queue (this is a host-runnable stand-in for one);
/// a real attach target would back this with the sandbox's ring buffer
/// map instead.
#[derive(Debug, Clone)]
pub struct ArrayRingBuffer<T, const CAP: usize> {
    buf: Vec<T>,
}

impl<T, const CAP: usize> ArrayRingBuffer<T, CAP> {
    /// Builds an empty buffer.
    pub fn new() -> Self {
        ArrayRingBuffer { buf: Vec::new() }
    }
}

impl<T, const CAP: usize> Default for ArrayRingBuffer<T, CAP> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone, const CAP: usize> RingBuffer<T> for ArrayRingBuffer<T, CAP> {
    fn try_publish(&mut self, items: &[T]) -> Result<(), EngineError> {
        if self.buf.len() + items.len() > CAP {
            tracing::warn!(requested = items.len(), free = CAP - self.buf.len(), "ring reserve failed");
            return Err(EngineError::RingReserveFail);
        }
        self.buf.extend_from_slice(items);
        Ok(())
    }

    fn peek(&self) -> &[T] {
        &self.buf
    }

    fn release(&mut self, n: usize) {
        self.buf.drain(0..n.min(self.buf.len()));
    }

    fn len(&self) -> usize {
        self.buf.len()
    }

    fn free(&self) -> usize {
        CAP - self.buf.len()
    }
}
