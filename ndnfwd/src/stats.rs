//! Forwarder statistics: lock-free counters updated on the packet path and
//! serialisable snapshots for external polling.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::fib::{FibTable, Strategy};
use crate::ndt::Ndt;

/// Monotonic counter
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.add(1);
    }

    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Point-in-time value published by a single writer
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn set(&self, value: u64) {
        self.0.store(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-worker counters. The worker is the only writer.
#[derive(Debug, Default)]
pub struct FwdCounters {
    pub n_interests: Counter,
    pub n_data: Counter,
    pub n_nacks: Counter,
    pub n_cs_hits: Counter,
    pub n_forwarded: Counter,
    pub n_retransmitted: Counter,
    pub n_suppressed: Counter,
    pub n_no_route: Counter,
    pub n_duplicate: Counter,
    pub n_congestion: Counter,
    pub n_hop_limit_dropped: Counter,
    pub n_data_unmatched: Counter,
    pub n_nack_unmatched: Counter,
    pub n_alloc_errors: Counter,
    pub n_unknown_face: Counter,
    pub n_tx_data: Counter,
    pub n_tx_nacks: Counter,

    // Mirrors of the PCCT partition, refreshed after every poll.
    pub pcct_entries: Gauge,
    pub pcct_pit: Gauge,
    pub pcct_cs: Gauge,
    pub pcct_inserted: Gauge,
    pub pcct_erased: Gauge,
    pub pcct_expired: Gauge,
    pub pcct_cs_evicted: Gauge,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FwdStats {
    pub worker: usize,
    pub n_interests: u64,
    pub n_data: u64,
    pub n_nacks: u64,
    pub n_cs_hits: u64,
    pub n_forwarded: u64,
    pub n_retransmitted: u64,
    pub n_suppressed: u64,
    pub n_no_route: u64,
    pub n_duplicate: u64,
    pub n_congestion: u64,
    pub n_hop_limit_dropped: u64,
    pub n_data_unmatched: u64,
    pub n_nack_unmatched: u64,
    pub n_alloc_errors: u64,
    pub n_unknown_face: u64,
    pub n_tx_data: u64,
    pub n_tx_nacks: u64,
    pub pcct: PcctStats,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcctStats {
    pub n_entries: u64,
    pub n_pit: u64,
    pub n_cs: u64,
    pub n_inserted: u64,
    pub n_erased: u64,
    pub n_expired: u64,
    pub n_cs_evicted: u64,
}

impl FwdCounters {
    pub fn publish_pcct(&self, stats: &PcctStats) {
        self.pcct_entries.set(stats.n_entries);
        self.pcct_pit.set(stats.n_pit);
        self.pcct_cs.set(stats.n_cs);
        self.pcct_inserted.set(stats.n_inserted);
        self.pcct_erased.set(stats.n_erased);
        self.pcct_expired.set(stats.n_expired);
        self.pcct_cs_evicted.set(stats.n_cs_evicted);
    }

    pub fn snapshot(&self, worker: usize) -> FwdStats {
        FwdStats {
            worker,
            n_interests: self.n_interests.get(),
            n_data: self.n_data.get(),
            n_nacks: self.n_nacks.get(),
            n_cs_hits: self.n_cs_hits.get(),
            n_forwarded: self.n_forwarded.get(),
            n_retransmitted: self.n_retransmitted.get(),
            n_suppressed: self.n_suppressed.get(),
            n_no_route: self.n_no_route.get(),
            n_duplicate: self.n_duplicate.get(),
            n_congestion: self.n_congestion.get(),
            n_hop_limit_dropped: self.n_hop_limit_dropped.get(),
            n_data_unmatched: self.n_data_unmatched.get(),
            n_nack_unmatched: self.n_nack_unmatched.get(),
            n_alloc_errors: self.n_alloc_errors.get(),
            n_unknown_face: self.n_unknown_face.get(),
            n_tx_data: self.n_tx_data.get(),
            n_tx_nacks: self.n_tx_nacks.get(),
            pcct: PcctStats {
                n_entries: self.pcct_entries.get(),
                n_pit: self.pcct_pit.get(),
                n_cs: self.pcct_cs.get(),
                n_inserted: self.pcct_inserted.get(),
                n_erased: self.pcct_erased.get(),
                n_expired: self.pcct_expired.get(),
                n_cs_evicted: self.pcct_cs_evicted.get(),
            },
        }
    }
}

/// Per-input dispatcher counters
#[derive(Debug, Default)]
pub struct InputCounters {
    pub n_rx: Counter,
    pub n_malformed: Counter,
    pub n_dispatched: Counter,
    pub n_queue_full: Counter,
    pub n_bad_partition: Counter,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputStats {
    pub input: usize,
    pub faces: Vec<u32>,
    pub n_rx: u64,
    pub n_malformed: u64,
    pub n_dispatched: u64,
    pub n_queue_full: u64,
    pub n_bad_partition: u64,
}

impl InputCounters {
    pub fn snapshot(&self, input: usize, faces: Vec<u32>) -> InputStats {
        InputStats {
            input,
            faces,
            n_rx: self.n_rx.get(),
            n_malformed: self.n_malformed.get(),
            n_dispatched: self.n_dispatched.get(),
            n_queue_full: self.n_queue_full.get(),
            n_bad_partition: self.n_bad_partition.get(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FibEntryStats {
    pub prefix: String,
    pub nexthops: Vec<u32>,
    pub strategy: Strategy,
    pub n_rx_interests: u64,
    pub n_tx_interests: u64,
    pub n_rx_data: u64,
    pub n_rx_nacks: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwarderSnapshot {
    pub timestamp: String,
    pub fib_version: u64,
    pub workers: Vec<FwdStats>,
    pub inputs: Vec<InputStats>,
    pub fib: Vec<FibEntryStats>,
    /// NDT lookups per worker partition
    pub ndt_partition_hits: Vec<u64>,
}

impl ForwarderSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Shared handles to every counter in a running forwarder
#[derive(Clone)]
pub struct StatsSources {
    pub workers: Vec<Arc<FwdCounters>>,
    pub inputs: Vec<(Arc<InputCounters>, Vec<u32>)>,
    pub fib: Arc<FibTable>,
    pub ndt: Arc<Ndt>,
}

impl StatsSources {
    pub fn snapshot(&self) -> ForwarderSnapshot {
        let fib = self.fib.snapshot();
        let mut routes: Vec<FibEntryStats> = fib
            .iter()
            .map(|entry| FibEntryStats {
                prefix: entry.prefix.to_uri(),
                nexthops: entry.nexthops.clone(),
                strategy: entry.strategy,
                n_rx_interests: entry.counters.n_rx_interests.get(),
                n_tx_interests: entry.counters.n_tx_interests.get(),
                n_rx_data: entry.counters.n_rx_data.get(),
                n_rx_nacks: entry.counters.n_rx_nacks.get(),
            })
            .collect();
        routes.sort_by(|a, b| a.prefix.cmp(&b.prefix));

        ForwarderSnapshot {
            timestamp: chrono::Utc::now().to_rfc3339(),
            fib_version: self.fib.version(),
            workers: self
                .workers
                .iter()
                .enumerate()
                .map(|(i, c)| c.snapshot(i))
                .collect(),
            inputs: self
                .inputs
                .iter()
                .enumerate()
                .map(|(i, (c, faces))| c.snapshot(i, faces.clone()))
                .collect(),
            fib: routes,
            ndt_partition_hits: self.ndt.partition_hits(),
        }
    }
}
