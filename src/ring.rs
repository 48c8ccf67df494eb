//! Lock-free single-producer/single-consumer byte ring buffer.
//!
//! The producer (mainline code) writes into a contiguous free region and
//! commits; the consumer (the consumption-interrupt handler) removes whole
//! chunks. The two sides may run on different threads concurrently.
//!
//! # Safety Contract
//!
//! - Only ONE context may use the producer side
//!   ([`writable_region`](RingBuffer::writable_region) /
//!   [`commit`](RingBuffer::commit)) at a time.
//! - Only ONE context may use the consumer side
//!   ([`pop_into`](RingBuffer::pop_into)) at a time.
//!
//! Each side advances only its own index; the other index is read with
//! acquire ordering, so a stale value is always conservative (the producer
//! may see less free space than exists, the consumer less data).
//! [`Stream`](crate::Stream) upholds the producer half by requiring
//! `&mut self` on its feed operations; the consumer half is serialized by
//! the binder's interrupt dispatch.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};

/// Bounded circular byte store shared between a producer and a consumer
/// running in different execution contexts.
pub struct RingBuffer {
    data: UnsafeCell<Box<[u8]>>,
    capacity: usize,
    /// Total bytes ever committed. Advanced only by the producer.
    write_index: AtomicU64,
    /// Total bytes ever consumed. Advanced only by the consumer.
    read_index: AtomicU64,
}

// SAFETY: interior access to `data` is partitioned by the SPSC contract
// above; the indices are atomic and the release/acquire pairs make written
// bytes visible before the index that publishes them.
unsafe impl Send for RingBuffer {}
unsafe impl Sync for RingBuffer {}

impl RingBuffer {
    /// Create a ring buffer holding up to `capacity` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        Self {
            data: UnsafeCell::new(vec![0u8; capacity].into_boxed_slice()),
            capacity,
            write_index: AtomicU64::new(0),
            read_index: AtomicU64::new(0),
        }
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently buffered.
    pub fn len(&self) -> usize {
        let write = self.write_index.load(Ordering::Acquire);
        let read = self.read_index.load(Ordering::Acquire);
        write.saturating_sub(read).min(self.capacity as u64) as usize
    }

    /// Whether no bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes of free space.
    pub fn free(&self) -> usize {
        self.capacity - self.len()
    }

    /// Write offset within the buffer (diagnostic).
    pub fn write_offset(&self) -> usize {
        (self.write_index.load(Ordering::Acquire) % self.capacity as u64) as usize
    }

    /// Read offset within the buffer (diagnostic).
    pub fn read_offset(&self) -> usize {
        (self.read_index.load(Ordering::Acquire) % self.capacity as u64) as usize
    }

    /// Contiguous writable run starting at the write offset (producer side).
    ///
    /// The run may be shorter than the total free space when the free region
    /// wraps past the end of the buffer: fill it, [`commit`](Self::commit),
    /// then call again for the remainder. Empty when the buffer is full.
    ///
    /// # Safety
    ///
    /// The caller must be the sole producer and must release the returned
    /// borrow before the next producer-side call.
    pub unsafe fn writable_region(&self) -> &mut [u8] {
        let write = self.write_index.load(Ordering::Relaxed);
        let read = self.read_index.load(Ordering::Acquire);
        let used = write.saturating_sub(read).min(self.capacity as u64) as usize;
        let head = (write % self.capacity as u64) as usize;
        let run = (self.capacity - used).min(self.capacity - head);

        // SAFETY: the producer owns [head, head + run); the consumer only
        // reads committed bytes, which all lie outside that range.
        let data = unsafe { &mut *self.data.get() };
        &mut data[head..head + run]
    }

    /// Commit `n` bytes previously written into the writable region
    /// (producer side), clamped so the buffered length never exceeds the
    /// capacity. Returns the number of bytes actually committed.
    pub fn commit(&self, n: usize) -> usize {
        let write = self.write_index.load(Ordering::Relaxed);
        let read = self.read_index.load(Ordering::Acquire);
        let used = write.saturating_sub(read).min(self.capacity as u64) as usize;
        let n = n.min(self.capacity - used);
        self.write_index.store(write + n as u64, Ordering::Release);
        n
    }

    /// Copy up to `out.len()` buffered bytes into `out` and remove them
    /// (consumer side). Returns the number of bytes copied.
    pub fn pop_into(&self, out: &mut [u8]) -> usize {
        let read = self.read_index.load(Ordering::Relaxed);
        let write = self.write_index.load(Ordering::Acquire);
        let available = write.saturating_sub(read).min(self.capacity as u64) as usize;
        let to_read = out.len().min(available);
        if to_read == 0 {
            return 0;
        }

        let tail = (read % self.capacity as u64) as usize;
        // SAFETY: [tail, tail + to_read) holds committed bytes the producer
        // never touches again until the read index moves past them.
        let data = unsafe { &*self.data.get() };
        let first = (self.capacity - tail).min(to_read);
        out[..first].copy_from_slice(&data[tail..tail + first]);
        if to_read > first {
            out[first..to_read].copy_from_slice(&data[..to_read - first]);
        }

        self.read_index.store(read + to_read as u64, Ordering::Release);
        to_read
    }
}

#[cfg(test)]
mod tests {
    use super::RingBuffer;

    fn fill(rb: &RingBuffer, bytes: &[u8]) -> usize {
        let region = unsafe { rb.writable_region() };
        let n = region.len().min(bytes.len());
        region[..n].copy_from_slice(&bytes[..n]);
        rb.commit(n)
    }

    #[test]
    fn new_is_empty() {
        let rb = RingBuffer::new(8);
        assert!(rb.is_empty());
        assert_eq!(rb.capacity(), 8);
        assert_eq!(rb.free(), 8);
    }

    #[test]
    fn commit_and_pop_roundtrip() {
        let rb = RingBuffer::new(8);
        assert_eq!(fill(&rb, &[1, 2, 3]), 3);
        assert_eq!(rb.len(), 3);

        let mut out = [0u8; 3];
        assert_eq!(rb.pop_into(&mut out), 3);
        assert_eq!(out, [1, 2, 3]);
        assert!(rb.is_empty());
    }

    #[test]
    fn commit_clamps_to_free_space() {
        let rb = RingBuffer::new(4);
        assert_eq!(rb.commit(100), 4);
        assert_eq!(rb.len(), 4);
        assert_eq!(rb.commit(1), 0);
    }

    #[test]
    fn writable_region_is_contiguous_only() {
        let rb = RingBuffer::new(8);
        fill(&rb, &[0; 5]);
        let mut out = [0u8; 5];
        rb.pop_into(&mut out);

        // 8 bytes free, but only 3 before the wrap point.
        assert_eq!(rb.free(), 8);
        assert_eq!(unsafe { rb.writable_region() }.len(), 3);

        // After filling the first run, the second run is the rest.
        assert_eq!(fill(&rb, &[0; 3]), 3);
        assert_eq!(unsafe { rb.writable_region() }.len(), 5);
    }

    #[test]
    fn writable_region_empty_when_full() {
        let rb = RingBuffer::new(4);
        fill(&rb, &[0; 4]);
        assert!(unsafe { rb.writable_region() }.is_empty());
    }

    #[test]
    fn pop_on_empty_returns_zero() {
        let rb = RingBuffer::new(4);
        let mut out = [0u8; 4];
        assert_eq!(rb.pop_into(&mut out), 0);
    }

    #[test]
    fn pop_copies_across_the_wrap_point() {
        let rb = RingBuffer::new(8);
        fill(&rb, &[0; 6]);
        let mut out = [0u8; 6];
        rb.pop_into(&mut out);

        // Data now spans the boundary: 2 bytes at the end, 3 at the start.
        fill(&rb, &[10, 11]);
        fill(&rb, &[12, 13, 14]);
        assert_eq!(rb.len(), 5);

        let mut out = [0u8; 5];
        assert_eq!(rb.pop_into(&mut out), 5);
        assert_eq!(out, [10, 11, 12, 13, 14]);
    }

    #[test]
    fn offsets_advance_modulo_capacity() {
        let rb = RingBuffer::new(4);
        let mut out = [0u8; 4];
        for lap in 0..10u8 {
            fill(&rb, &[lap; 4]);
            assert_eq!(rb.write_offset(), 0);
            assert_eq!(rb.pop_into(&mut out), 4);
            assert_eq!(rb.read_offset(), 0);
            assert_eq!(out, [lap; 4]);
        }
    }

    #[test]
    fn read_offset_tracks_partial_consumption() {
        let rb = RingBuffer::new(8);
        fill(&rb, &[0; 8]);
        let mut out = [0u8; 3];
        rb.pop_into(&mut out);
        assert_eq!(rb.read_offset(), 3);
        assert_eq!(rb.len(), 5);
    }

    #[test]
    #[should_panic(expected = "non-zero")]
    fn zero_capacity_panics() {
        let _ = RingBuffer::new(0);
    }
}
