//! Packet buffer allocation for egress packets.

use std::sync::atomic::{AtomicUsize, Ordering};

use ndnfw_core::packets::MAX_PACKET_SIZE;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    #[error("Packet buffer pool exhausted")]
    Exhausted,
    #[error("Requested {requested} bytes exceeds the buffer size {limit}")]
    TooLarge { requested: usize, limit: usize },
}

pub trait PacketAllocator: Send + Sync {
    /// Allocate an empty buffer able to hold `size` bytes
    fn allocate(&self, size: usize) -> Result<Vec<u8>, AllocError>;
}

/// Allocates from the global heap, bounded only by the packet size limit
#[derive(Debug, Clone)]
pub struct HeapAllocator {
    max_size: usize,
}

impl Default for HeapAllocator {
    fn default() -> Self {
        Self {
            max_size: MAX_PACKET_SIZE,
        }
    }
}

impl PacketAllocator for HeapAllocator {
    fn allocate(&self, size: usize) -> Result<Vec<u8>, AllocError> {
        if size > self.max_size {
            return Err(AllocError::TooLarge {
                requested: size,
                limit: self.max_size,
            });
        }
        Ok(Vec::with_capacity(size))
    }
}

/// Heap allocator that hands out a fixed number of buffers, then fails
/// until refilled. Models a drained mempool.
#[derive(Debug, Default)]
pub struct BoundedAllocator {
    remaining: AtomicUsize,
    inner: HeapAllocator,
}

impl BoundedAllocator {
    pub fn new(buffers: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(buffers),
            inner: HeapAllocator::default(),
        }
    }

    pub fn refill(&self, buffers: usize) {
        self.remaining.store(buffers, Ordering::Relaxed);
    }

    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Relaxed)
    }
}

impl PacketAllocator for BoundedAllocator {
    fn allocate(&self, size: usize) -> Result<Vec<u8>, AllocError> {
        self.remaining
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .map_err(|_| AllocError::Exhausted)?;
        self.inner.allocate(size)
    }
}
