//! Name Dispatch Table: assigns every name to exactly one forwarding worker.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU8, Ordering};

use ndnfw_core::Name;

use crate::config::NdtConfig;
use crate::stats::Counter;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NdtError {
    #[error("NDT slot {0} out of range")]
    SlotOutOfRange(usize),
    #[error("Partition {0} out of range")]
    PartitionOutOfRange(u8),
}

#[derive(Debug)]
pub struct Ndt {
    prefix_len: usize,
    mask: u64,
    n_partitions: u8,
    table: Vec<AtomicU8>,
    hits: Vec<Counter>,
}

impl Ndt {
    /// Build a table with `2^table_bits` slots filled round-robin over
    /// `n_partitions` workers.
    pub fn new(config: &NdtConfig, n_partitions: u8) -> Self {
        let n_partitions = n_partitions.max(1);
        let size = 1usize << config.table_bits;
        Self {
            prefix_len: config.prefix_len,
            mask: (size - 1) as u64,
            n_partitions,
            table: (0..size)
                .map(|i| AtomicU8::new((i % n_partitions as usize) as u8))
                .collect(),
            hits: (0..size).map(|_| Counter::default()).collect(),
        }
    }

    pub fn n_partitions(&self) -> u8 {
        self.n_partitions
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Table slot for `name`. DefaultHasher::new uses fixed keys, so the
    /// result is stable for the lifetime of the process.
    pub fn slot_of(&self, name: &Name) -> usize {
        let mut hasher = DefaultHasher::new();
        for component in name.prefix_components(self.prefix_len) {
            component.hash(&mut hasher);
        }
        (hasher.finish() & self.mask) as usize
    }

    /// Owning worker of `name`, counted as a hit on its slot
    pub fn partition_of(&self, name: &Name) -> u8 {
        let slot = self.slot_of(name);
        self.hits[slot].inc();
        self.table[slot].load(Ordering::Relaxed)
    }

    /// Owning worker of `name` without touching the hit counters
    pub fn lookup(&self, name: &Name) -> (usize, u8) {
        let slot = self.slot_of(name);
        (slot, self.table[slot].load(Ordering::Relaxed))
    }

    /// Reassign one slot. Only safe before workers start forwarding.
    pub fn update(&self, slot: usize, partition: u8) -> Result<(), NdtError> {
        if partition >= self.n_partitions {
            return Err(NdtError::PartitionOutOfRange(partition));
        }
        self.table
            .get(slot)
            .ok_or(NdtError::SlotOutOfRange(slot))?
            .store(partition, Ordering::Relaxed);
        Ok(())
    }

    pub fn slot_hits(&self) -> Vec<u64> {
        self.hits.iter().map(Counter::get).collect()
    }

    pub fn partition_hits(&self) -> Vec<u64> {
        let mut totals = vec![0u64; self.n_partitions as usize];
        for (slot, hits) in self.table.iter().zip(&self.hits) {
            totals[slot.load(Ordering::Relaxed) as usize] += hits.get();
        }
        totals
    }
}
