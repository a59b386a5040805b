use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use log::info;
use serde::{Deserialize, Serialize};

use ndnfw_core::Name;

use crate::config::{ConfigError, RouteConfig};
use crate::face::FaceId;
use crate::stats::Counter;

/// Forwarding strategy attached to a FIB entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Forward to every next hop
    #[default]
    Multicast,
    /// Forward to the first usable next hop only
    BestRoute,
}

#[derive(Debug, Default)]
pub struct FibCounters {
    pub n_rx_interests: Counter,
    pub n_tx_interests: Counter,
    pub n_rx_data: Counter,
    pub n_rx_nacks: Counter,
}

/// FIB entry: prefix to an ordered set of next hops
#[derive(Debug)]
pub struct FibEntry {
    pub prefix: Name,
    pub nexthops: Vec<FaceId>,
    pub strategy: Strategy,
    pub counters: FibCounters,
}

impl FibEntry {
    pub fn new(prefix: Name, nexthops: Vec<FaceId>, strategy: Strategy) -> Self {
        Self {
            prefix,
            nexthops,
            strategy,
            counters: FibCounters::default(),
        }
    }

    /// Next hops usable for an Interest that arrived on `downstream`
    pub fn select_nexthops(&self, downstream: FaceId) -> Vec<FaceId> {
        let usable = self.nexthops.iter().copied().filter(|&face| face != downstream);
        match self.strategy {
            Strategy::Multicast => usable.collect(),
            Strategy::BestRoute => usable.take(1).collect(),
        }
    }
}

/// Immutable FIB snapshot. Entries are shared between snapshots so their
/// counters survive republication.
#[derive(Debug, Clone, Default)]
pub struct Fib {
    entries: HashMap<Name, Arc<FibEntry>>,
    max_depth: usize,
}

impl Fib {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_routes(routes: &[RouteConfig]) -> Result<Self, ConfigError> {
        let mut fib = Fib::new();
        for route in routes {
            fib.insert(FibEntry::new(route.name()?, route.nexthops.clone(), route.strategy));
        }
        Ok(fib)
    }

    /// Add or replace the entry for `entry.prefix`
    pub fn insert(&mut self, entry: FibEntry) {
        self.max_depth = self.max_depth.max(entry.prefix.len());
        self.entries.insert(entry.prefix.clone(), Arc::new(entry));
    }

    pub fn remove(&mut self, prefix: &Name) -> Option<Arc<FibEntry>> {
        let removed = self.entries.remove(prefix);
        if removed.is_some() {
            self.max_depth = self.entries.keys().map(Name::len).max().unwrap_or(0);
        }
        removed
    }

    /// Exact-prefix lookup
    pub fn get(&self, prefix: &Name) -> Option<&Arc<FibEntry>> {
        self.entries.get(prefix)
    }

    /// Longest prefix match
    pub fn lpm(&self, name: &Name) -> Option<&Arc<FibEntry>> {
        let depth = name.len().min(self.max_depth);
        (0..=depth)
            .rev()
            .find_map(|len| self.entries.get(name.prefix_components(len)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<FibEntry>> {
        self.entries.values()
    }
}

/// Versioned publication point for FIB snapshots
#[derive(Debug, Default)]
pub struct FibTable {
    current: RwLock<Arc<Fib>>,
    version: AtomicU64,
}

impl FibTable {
    pub fn new(fib: Fib) -> Self {
        Self {
            current: RwLock::new(Arc::new(fib)),
            version: AtomicU64::new(0),
        }
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> Arc<Fib> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the published FIB
    pub fn publish(&self, fib: Fib) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *current = Arc::new(fib);
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        info!("FIB version {} published with {} entries", version, current.len());
    }

    /// Copy, modify and republish the current FIB
    pub fn update<F: FnOnce(&mut Fib)>(&self, f: F) {
        let mut fib = (*self.snapshot()).clone();
        f(&mut fib);
        self.publish(fib);
    }

    pub fn reader(self: &Arc<Self>) -> FibReader {
        FibReader {
            table: Arc::clone(self),
            version: self.version(),
            cached: self.snapshot(),
        }
    }
}

/// Per-worker view of a [`FibTable`]; touches the lock only when the
/// version has moved.
#[derive(Debug)]
pub struct FibReader {
    table: Arc<FibTable>,
    cached: Arc<Fib>,
    version: u64,
}

impl FibReader {
    pub fn current(&mut self) -> &Arc<Fib> {
        let version = self.table.version();
        if version != self.version {
            self.cached = self.table.snapshot();
            self.version = version;
        }
        &self.cached
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(uri: &str) -> Name {
        uri.parse().unwrap()
    }

    fn sample_fib() -> Fib {
        let mut fib = Fib::new();
        fib.insert(FibEntry::new(name("/A"), vec![1], Strategy::Multicast));
        fib.insert(FibEntry::new(name("/A/B/C"), vec![2, 3], Strategy::BestRoute));
        fib
    }

    #[test]
    fn test_longest_prefix_match() {
        let fib = sample_fib();
        assert_eq!(fib.lpm(&name("/A/B/C/D")).unwrap().prefix, name("/A/B/C"));
        assert_eq!(fib.lpm(&name("/A/B")).unwrap().prefix, name("/A"));
        assert_eq!(fib.lpm(&name("/A")).unwrap().prefix, name("/A"));
        assert!(fib.lpm(&name("/Z/A")).is_none());
        assert!(fib.lpm(&Name::new()).is_none());
    }

    #[test]
    fn test_default_route() {
        let mut fib = sample_fib();
        fib.insert(FibEntry::new(Name::new(), vec![9], Strategy::Multicast));
        assert_eq!(fib.lpm(&name("/Z/A")).unwrap().nexthops, vec![9]);
    }

    #[test]
    fn test_remove_shrinks_depth() {
        let mut fib = sample_fib();
        assert!(fib.remove(&name("/A/B/C")).is_some());
        assert!(fib.remove(&name("/A/B/C")).is_none());
        assert_eq!(fib.lpm(&name("/A/B/C/D")).unwrap().prefix, name("/A"));
        assert_eq!(fib.len(), 1);
    }

    #[test]
    fn test_strategy_nexthop_selection() {
        let multicast = FibEntry::new(name("/M"), vec![1, 2, 3], Strategy::Multicast);
        assert_eq!(multicast.select_nexthops(2), vec![1, 3]);

        let best = FibEntry::new(name("/B"), vec![1, 2, 3], Strategy::BestRoute);
        assert_eq!(best.select_nexthops(1), vec![2]);
        assert_eq!(best.select_nexthops(5), vec![1]);

        let only = FibEntry::new(name("/O"), vec![4], Strategy::Multicast);
        assert!(only.select_nexthops(4).is_empty());
    }

    #[test]
    fn test_reader_follows_publication() {
        let table = Arc::new(FibTable::new(sample_fib()));
        let mut reader = table.reader();
        assert!(reader.current().lpm(&name("/Q")).is_none());

        table.update(|fib| fib.insert(FibEntry::new(name("/Q"), vec![4], Strategy::Multicast)));
        assert_eq!(table.version(), 1);
        assert_eq!(reader.current().lpm(&name("/Q/1")).unwrap().nexthops, vec![4]);
    }

    #[test]
    fn test_counters_survive_update() {
        let table = Arc::new(FibTable::new(sample_fib()));
        table.snapshot().get(&name("/A")).unwrap().counters.n_rx_interests.inc();
        table.update(|fib| fib.insert(FibEntry::new(name("/Q"), vec![4], Strategy::Multicast)));
        let fib = table.snapshot();
        assert_eq!(fib.get(&name("/A")).unwrap().counters.n_rx_interests.get(), 1);
    }

    #[test]
    fn test_from_routes() {
        let routes = vec![RouteConfig {
            prefix: "/ndn".to_string(),
            nexthops: vec![1, 2],
            strategy: Strategy::BestRoute,
        }];
        let fib = Fib::from_routes(&routes).unwrap();
        assert_eq!(fib.get(&name("/ndn")).unwrap().strategy, Strategy::BestRoute);
    }
}
