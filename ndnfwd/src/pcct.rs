//! PIT/CS Combined Table.
//!
//! Each forwarding worker owns one `Pcct` partition exclusively. Entries
//! live in a slot arena and are referenced by generation-checked
//! [`Handle`]s; a handle or PIT token that outlives its entry simply stops
//! resolving.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use log::{debug, trace};

use ndnfw_core::{Data, Interest, Name};

use crate::config::PcctConfig;
use crate::face::FaceId;
use crate::stats::PcctStats;
use crate::suppress::SuppressState;

const TOKEN_GENERATION_MASK: u32 = 0x00FF_FFFF;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PcctError {
    #[error("PCCT is full")]
    Full,
    #[error("PIT entry already has {0} downstream records")]
    TooManyDownstreams(usize),
}

/// Generation-checked reference to a PCCT entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    index: u32,
    generation: u32,
}

/// Lookup key: original name plus selector signature
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PccKey {
    pub name: Name,
    pub can_be_prefix: bool,
    /// Forwarding-hint delegation chosen for routing, if any
    pub fwd_hint: Option<Name>,
}

impl PccKey {
    pub fn new(name: Name, can_be_prefix: bool, fwd_hint: Option<Name>) -> Self {
        Self {
            name,
            can_be_prefix,
            fwd_hint,
        }
    }

    pub fn for_interest(interest: &Interest, fwd_hint: Option<&Name>) -> Self {
        Self::new(interest.name.clone(), interest.can_be_prefix, fwd_hint.cloned())
    }

    /// Name used for route selection
    pub fn route_name(&self) -> &Name {
        self.fwd_hint.as_ref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownstreamRecord {
    pub face: FaceId,
    pub token: u64,
    pub nonce: u32,
    pub last_arrival: Instant,
    pub expiry: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamRecord {
    pub face: FaceId,
    /// Nonce of the most recent Interest sent to this face
    pub nonce: u32,
    pub suppress: SuppressState,
}

/// Pending-request state
#[derive(Debug, Clone)]
pub struct PitEntry {
    /// First Interest of the entry, the template for outgoing Nacks
    pub interest: Interest,
    pub downstreams: Vec<DownstreamRecord>,
    pub upstreams: Vec<UpstreamRecord>,
    pub expiry: Instant,
}

impl PitEntry {
    fn new(interest: &Interest, now: Instant) -> Self {
        Self {
            interest: interest.clone(),
            downstreams: Vec::new(),
            upstreams: Vec::new(),
            expiry: now + interest.lifetime,
        }
    }

    /// Add a downstream record, or refresh the one already held for `face`.
    /// A refreshed record keeps the newest token and nonce.
    pub fn add_downstream(
        &mut self,
        face: FaceId,
        token: u64,
        nonce: u32,
        lifetime: Duration,
        now: Instant,
        max_downstreams: usize,
    ) -> Result<(), PcctError> {
        let expiry = now + lifetime;
        let n_downstreams = self.downstreams.len();
        match self.downstreams.iter_mut().find(|d| d.face == face) {
            Some(record) => {
                record.token = token;
                record.nonce = nonce;
                record.last_arrival = now;
                record.expiry = expiry;
            }
            None if n_downstreams >= max_downstreams => {
                return Err(PcctError::TooManyDownstreams(n_downstreams));
            }
            None => self.downstreams.push(DownstreamRecord {
                face,
                token,
                nonce,
                last_arrival: now,
                expiry,
            }),
        }
        self.refresh_expiry();
        Ok(())
    }

    pub fn downstream(&self, face: FaceId) -> Option<&DownstreamRecord> {
        self.downstreams.iter().find(|d| d.face == face)
    }

    fn refresh_expiry(&mut self) {
        if let Some(latest) = self.downstreams.iter().map(|d| d.expiry).max() {
            self.expiry = latest;
        }
    }

    /// Whether an Interest with `nonce` from `face` duplicates one already
    /// seen: the same nonce from another downstream, or one of our own
    /// upstream nonces coming back.
    pub fn is_duplicate(&self, face: FaceId, nonce: u32) -> bool {
        self.downstreams
            .iter()
            .any(|d| d.face != face && d.nonce == nonce)
            || self.upstreams.iter().any(|u| u.nonce == nonce)
    }

    pub fn upstream(&self, face: FaceId) -> Option<&UpstreamRecord> {
        self.upstreams.iter().find(|u| u.face == face)
    }

    /// Record an Interest sent to `face` with `nonce`
    pub fn record_upstream_tx(&mut self, face: FaceId, nonce: u32, now: Instant) {
        match self.upstreams.iter_mut().find(|u| u.face == face) {
            Some(record) => {
                record.nonce = nonce;
                record.suppress.record_tx(now);
            }
            None => {
                let mut suppress = SuppressState::default();
                suppress.record_tx(now);
                self.upstreams.push(UpstreamRecord {
                    face,
                    nonce,
                    suppress,
                });
            }
        }
    }

    /// Remove the upstream record of `face` if it was last sent `nonce`
    pub fn remove_upstream(&mut self, face: FaceId, nonce: u32) -> bool {
        match self
            .upstreams
            .iter()
            .position(|u| u.face == face && u.nonce == nonce)
        {
            Some(pos) => {
                self.upstreams.remove(pos);
                true
            }
            None => false,
        }
    }
}

/// Cached content
#[derive(Debug, Clone)]
pub struct CsEntry {
    pub data: Data,
    pub fresh_until: Instant,
    /// Entry is dropped after this instant
    pub expiry: Instant,
}

impl CsEntry {
    pub fn is_fresh(&self, now: Instant) -> bool {
        now < self.fresh_until
    }

    /// Whether this entry may answer `interest` at `now`
    pub fn satisfies(&self, interest: &Interest, now: Instant) -> bool {
        now < self.expiry
            && (!interest.must_be_fresh || self.is_fresh(now))
            && interest.matches_data(&self.data.name)
    }
}

#[derive(Debug, Clone)]
pub enum PccState {
    Pit(PitEntry),
    Cs(CsEntry),
}

#[derive(Debug, Clone)]
pub struct PccEntry {
    key: PccKey,
    pub state: PccState,
}

impl PccEntry {
    pub fn key(&self) -> &PccKey {
        &self.key
    }

    fn expiry(&self) -> Instant {
        match &self.state {
            PccState::Pit(pit) => pit.expiry,
            PccState::Cs(cs) => cs.expiry,
        }
    }

    pub fn as_pit(&self) -> Option<&PitEntry> {
        match &self.state {
            PccState::Pit(pit) => Some(pit),
            PccState::Cs(_) => None,
        }
    }

    pub fn as_cs(&self) -> Option<&CsEntry> {
        match &self.state {
            PccState::Cs(cs) => Some(cs),
            PccState::Pit(_) => None,
        }
    }
}

/// Result of [`Pcct::insert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    /// Pending entry; the caller adds a downstream record and forwards
    Pit(Handle),
    /// Cache hit; the caller answers from the cached Data
    Cs(Handle),
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    entry: Option<PccEntry>,
}

#[derive(Debug, Default, Clone, Copy)]
struct PcctCounters {
    n_inserted: u64,
    n_erased: u64,
    n_expired: u64,
    n_cs_evicted: u64,
}

pub struct Pcct {
    partition: u8,
    config: PcctConfig,
    slots: Vec<Slot>,
    free: Vec<u32>,
    index: HashMap<PccKey, Handle>,
    cs_fifo: VecDeque<Handle>,
    n_pit: usize,
    n_cs: usize,
    sweep_cursor: usize,
    counters: PcctCounters,
}

impl Pcct {
    pub fn new(partition: u8, config: PcctConfig) -> Self {
        Self {
            partition,
            config,
            slots: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            cs_fifo: VecDeque::new(),
            n_pit: 0,
            n_cs: 0,
            sweep_cursor: 0,
            counters: PcctCounters::default(),
        }
    }

    pub fn partition(&self) -> u8 {
        self.partition
    }

    pub fn count_entries(&self) -> usize {
        self.index.len()
    }

    pub fn n_pit(&self) -> usize {
        self.n_pit
    }

    pub fn n_cs(&self) -> usize {
        self.n_cs
    }

    pub fn stats(&self) -> PcctStats {
        PcctStats {
            n_entries: self.count_entries() as u64,
            n_pit: self.n_pit as u64,
            n_cs: self.n_cs as u64,
            n_inserted: self.counters.n_inserted,
            n_erased: self.counters.n_erased,
            n_expired: self.counters.n_expired,
            n_cs_evicted: self.counters.n_cs_evicted,
        }
    }

    pub fn get(&self, handle: Handle) -> Option<&PccEntry> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    fn get_mut(&mut self, handle: Handle) -> Option<&mut PccEntry> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_mut())
    }

    pub fn pit(&self, handle: Handle) -> Option<&PitEntry> {
        self.get(handle)?.as_pit()
    }

    pub fn pit_mut(&mut self, handle: Handle) -> Option<&mut PitEntry> {
        match &mut self.get_mut(handle)?.state {
            PccState::Pit(pit) => Some(pit),
            PccState::Cs(_) => None,
        }
    }

    pub fn cs(&self, handle: Handle) -> Option<&CsEntry> {
        self.get(handle)?.as_cs()
    }

    /// PIT token of `handle`: partition in bits 56..63, low 24 bits of the
    /// slot generation in bits 32..55, slot index in bits 0..31.
    pub fn token_of(&self, handle: Handle) -> u64 {
        (self.partition as u64) << 56
            | ((handle.generation & TOKEN_GENERATION_MASK) as u64) << 32
            | handle.index as u64
    }

    /// Look up a pending entry by key, expiring it if its time has passed
    pub fn find_pit_by_key(&mut self, key: &PccKey, now: Instant) -> Option<Handle> {
        let handle = *self.index.get(key)?;
        let entry = self.get(handle)?;
        if entry.expiry() <= now {
            self.expire(handle);
            return None;
        }
        entry.as_pit().map(|_| handle)
    }

    /// Find the pending entry a PIT token refers to
    pub fn find(&mut self, token: u64, now: Instant) -> Option<Handle> {
        if (token >> 56) as u8 != self.partition {
            return None;
        }
        let index = token as u32;
        let generation = (token >> 32) as u32 & TOKEN_GENERATION_MASK;
        let slot = self.slots.get(index as usize)?;
        if slot.generation & TOKEN_GENERATION_MASK != generation {
            return None;
        }
        let handle = Handle {
            index,
            generation: slot.generation,
        };
        let pit = slot.entry.as_ref()?.as_pit()?;
        if pit.expiry <= now {
            self.expire(handle);
            return None;
        }
        Some(handle)
    }

    /// Find or create the entry for an Interest.
    ///
    /// Returns a CS entry when cached Data satisfies the Interest; stale Data
    /// blocking a MustBeFresh Interest is replaced by a new PIT entry.
    pub fn insert(&mut self, key: PccKey, interest: &Interest, now: Instant) -> Result<InsertResult, PcctError> {
        if let Some(&handle) = self.index.get(&key) {
            match self.get(handle).map(|entry| (entry.expiry() <= now, &entry.state)) {
                Some((true, _)) => self.expire(handle),
                Some((false, PccState::Pit(_))) => return Ok(InsertResult::Pit(handle)),
                Some((false, PccState::Cs(cs))) => {
                    if cs.satisfies(interest, now) {
                        return Ok(InsertResult::Cs(handle));
                    }
                    trace!("replacing stale CS entry for {}", key.name);
                    self.erase(handle);
                }
                None => {
                    self.index.remove(&key);
                }
            }
        }

        if key.can_be_prefix {
            let exact = PccKey::new(key.name.clone(), false, key.fwd_hint.clone());
            if let Some(&handle) = self.index.get(&exact) {
                if self.cs(handle).is_some_and(|cs| cs.satisfies(interest, now)) {
                    return Ok(InsertResult::Cs(handle));
                }
            }
        }

        self.make_room(now)?;
        let handle = self.allocate(PccEntry {
            state: PccState::Pit(PitEntry::new(interest, now)),
            key: key.clone(),
        });
        self.index.insert(key, handle);
        self.n_pit += 1;
        self.counters.n_inserted += 1;
        Ok(InsertResult::Pit(handle))
    }

    /// Turn a satisfied PIT entry into a CS entry holding `data`. The entry
    /// is erased instead when caching is disabled or `data` is not
    /// cacheable. Returns whether the Data was cached.
    pub fn convert_to_cs(&mut self, handle: Handle, data: Data, now: Instant) -> bool {
        if self.pit(handle).is_none() {
            return false;
        }
        if !self.config.cs_enabled || self.config.cs_capacity == 0 || !data.is_cacheable() {
            self.erase(handle);
            return false;
        }

        while self.n_cs >= self.config.cs_capacity {
            if !self.evict_oldest_cs() {
                break;
            }
        }

        let fresh_until = now + data.freshness_period;
        let expiry = fresh_until + self.config.cs_stale_retention();
        let Some(entry) = self.get_mut(handle) else {
            return false;
        };
        entry.state = PccState::Cs(CsEntry {
            data,
            fresh_until,
            expiry,
        });
        self.n_pit -= 1;
        self.n_cs += 1;
        self.cs_fifo.push_back(handle);
        if self.cs_fifo.len() > 2 * self.n_cs + 16 {
            self.compact_cs_fifo();
        }
        true
    }

    /// Release an entry. Erasing a stale handle is a no-op returning false.
    pub fn erase(&mut self, handle: Handle) -> bool {
        let Some(slot) = self.slots.get_mut(handle.index as usize) else {
            return false;
        };
        if slot.generation != handle.generation {
            return false;
        }
        let Some(entry) = slot.entry.take() else {
            return false;
        };

        slot.generation = next_generation(slot.generation);
        self.free.push(handle.index);
        if self.index.get(&entry.key) == Some(&handle) {
            self.index.remove(&entry.key);
        }
        match entry.state {
            PccState::Pit(_) => self.n_pit -= 1,
            PccState::Cs(_) => self.n_cs -= 1,
        }
        self.counters.n_erased += 1;
        true
    }

    /// Erase expired entries among the next `budget` slots, returning how
    /// many were erased
    pub fn sweep(&mut self, now: Instant, budget: usize) -> usize {
        if self.slots.is_empty() {
            return 0;
        }
        let mut erased = 0;
        for _ in 0..budget.min(self.slots.len()) {
            if self.sweep_cursor >= self.slots.len() {
                self.sweep_cursor = 0;
            }
            let index = self.sweep_cursor;
            self.sweep_cursor += 1;

            let slot = &self.slots[index];
            if let Some(entry) = &slot.entry {
                if entry.expiry() <= now {
                    let handle = Handle {
                        index: index as u32,
                        generation: slot.generation,
                    };
                    self.expire(handle);
                    erased += 1;
                }
            }
        }
        erased
    }

    fn expire(&mut self, handle: Handle) {
        if self.erase(handle) {
            self.counters.n_expired += 1;
        }
    }

    fn make_room(&mut self, now: Instant) -> Result<(), PcctError> {
        if self.count_entries() < self.config.max_entries {
            return Ok(());
        }
        self.sweep(now, self.config.sweep_budget.max(1));
        while self.count_entries() >= self.config.max_entries {
            if !self.evict_oldest_cs() {
                debug!("PCCT partition {} full", self.partition);
                return Err(PcctError::Full);
            }
        }
        Ok(())
    }

    fn evict_oldest_cs(&mut self) -> bool {
        while let Some(handle) = self.cs_fifo.pop_front() {
            if self.cs(handle).is_some() && self.erase(handle) {
                self.counters.n_cs_evicted += 1;
                return true;
            }
        }
        false
    }

    fn compact_cs_fifo(&mut self) {
        let fifo = std::mem::take(&mut self.cs_fifo);
        self.cs_fifo = fifo.into_iter().filter(|&h| self.cs(h).is_some()).collect();
    }

    fn allocate(&mut self, entry: PccEntry) -> Handle {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entry = Some(entry);
                Handle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 1,
                    entry: Some(entry),
                });
                Handle { index, generation: 1 }
            }
        }
    }
}

/// Next slot generation, skipping values whose token bits are zero so that
/// a PIT token is never 0
fn next_generation(generation: u32) -> u32 {
    let mut next = generation.wrapping_add(1);
    if next & TOKEN_GENERATION_MASK == 0 {
        next = next.wrapping_add(1);
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndnfw_core::ContentType;

    fn name(uri: &str) -> Name {
        uri.parse().unwrap()
    }

    fn config() -> PcctConfig {
        PcctConfig {
            max_entries: 8,
            cs_capacity: 4,
            ..PcctConfig::default()
        }
    }

    fn insert_pit(pcct: &mut Pcct, interest: &Interest, now: Instant) -> Handle {
        match pcct.insert(PccKey::for_interest(interest, None), interest, now).unwrap() {
            InsertResult::Pit(handle) => handle,
            other => panic!("expected PIT entry, got {:?}", other),
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_insert_aggregates_same_key() {
        let mut pcct = Pcct::new(0, config());
        let now = Instant::now();
        let interest = Interest::new(name("/A/1"));

        let h1 = insert_pit(&mut pcct, &interest, now);
        let h2 = insert_pit(&mut pcct, &interest.clone().with_must_be_fresh(true), now);
        assert_eq!(h1, h2);
        assert_eq!(pcct.count_entries(), 1);

        let h3 = insert_pit(&mut pcct, &interest.clone().with_can_be_prefix(true), now);
        assert_ne!(h1, h3);

        let hinted = PccKey::for_interest(&interest, Some(&name("/B")));
        assert!(matches!(pcct.insert(hinted, &interest, now), Ok(InsertResult::Pit(h)) if h != h1));
        assert_eq!(pcct.n_pit(), 3);
    }

    #[test]
    fn test_token_resolution_and_idempotent_erase() {
        let mut pcct = Pcct::new(3, config());
        let now = Instant::now();
        let handle = insert_pit(&mut pcct, &Interest::new(name("/A/1")), now);
        let token = pcct.token_of(handle);

        assert_ne!(token, 0);
        assert_eq!(token >> 56, 3);
        assert_eq!(pcct.find(token, now), Some(handle));
        assert_eq!(pcct.find(token ^ (1 << 56), now), None);

        assert!(pcct.erase(handle));
        assert!(!pcct.erase(handle));
        assert_eq!(pcct.find(token, now), None);
        assert!(pcct.get(handle).is_none());
        assert_eq!(pcct.count_entries(), 0);

        // The slot is reused under a new generation.
        let reused = insert_pit(&mut pcct, &Interest::new(name("/A/2")), now);
        assert_ne!(pcct.token_of(reused), token);
        assert_eq!(pcct.find(token, now), None);
        assert!(!pcct.erase(handle));
        assert_eq!(pcct.count_entries(), 1);
    }

    #[test]
    fn test_downstream_records() {
        let now = Instant::now();
        let mut pit = PitEntry::new(&Interest::new(name("/A")), now);
        pit.add_downstream(1, 11, 100, ms(1000), now, 2).unwrap();
        pit.add_downstream(2, 22, 200, ms(4000), now, 2).unwrap();
        assert_eq!(pit.expiry, now + ms(4000));

        // Same face refreshes instead of adding.
        pit.add_downstream(1, 12, 101, ms(1000), now + ms(5), 2).unwrap();
        assert_eq!(pit.downstreams.len(), 2);
        assert_eq!(pit.downstream(1).unwrap().nonce, 101);
        assert_eq!(pit.downstream(1).unwrap().token, 12);

        assert_eq!(
            pit.add_downstream(3, 33, 300, ms(1000), now, 2),
            Err(PcctError::TooManyDownstreams(2))
        );

        assert!(pit.is_duplicate(3, 200));
        assert!(!pit.is_duplicate(2, 200));
    }

    #[test]
    fn test_upstream_records() {
        let now = Instant::now();
        let mut pit = PitEntry::new(&Interest::new(name("/A")), now);
        pit.record_upstream_tx(7, 0xAAAA, now);
        assert!(pit.is_duplicate(1, 0xAAAA));

        pit.record_upstream_tx(7, 0xBBBB, now + ms(10));
        assert_eq!(pit.upstreams.len(), 1);
        assert_eq!(pit.upstream(7).unwrap().suppress.retransmits, 1);

        assert!(!pit.remove_upstream(7, 0xAAAA));
        assert!(pit.remove_upstream(7, 0xBBBB));
        assert!(pit.upstreams.is_empty());
    }

    #[test]
    fn test_cs_hit_and_freshness() {
        let mut pcct = Pcct::new(0, config());
        let t0 = Instant::now();
        let interest = Interest::new(name("/B/1"));
        let handle = insert_pit(&mut pcct, &interest, t0);

        let data = Data::new(name("/B/1"), b"x".to_vec()).with_freshness_period(ms(100));
        assert!(pcct.convert_to_cs(handle, data, t0));
        assert_eq!((pcct.n_pit(), pcct.n_cs()), (0, 1));
        assert!(pcct.find(pcct.token_of(handle), t0).is_none());

        let key = PccKey::for_interest(&interest, None);
        assert_eq!(pcct.insert(key.clone(), &interest, t0 + ms(50)), Ok(InsertResult::Cs(handle)));

        // Stale Data still answers plain Interests but not MustBeFresh ones.
        let t1 = t0 + ms(200);
        assert_eq!(pcct.insert(key.clone(), &interest, t1), Ok(InsertResult::Cs(handle)));
        let mbf = interest.clone().with_must_be_fresh(true);
        let replaced = match pcct.insert(key, &mbf, t1).unwrap() {
            InsertResult::Pit(h) => h,
            other => panic!("expected PIT entry, got {:?}", other),
        };
        assert_ne!(replaced, handle);
        assert!(pcct.get(handle).is_none());
        assert_eq!((pcct.n_pit(), pcct.n_cs()), (1, 0));
    }

    #[test]
    fn test_cs_entry_expires_after_retention() {
        let mut pcct = Pcct::new(0, config());
        let t0 = Instant::now();
        let interest = Interest::new(name("/B/1"));
        let handle = insert_pit(&mut pcct, &interest, t0);
        pcct.convert_to_cs(handle, Data::new(name("/B/1"), vec![]), t0);

        let late = t0 + pcct.config.cs_stale_retention() + ms(1);
        let result = pcct.insert(PccKey::for_interest(&interest, None), &interest, late);
        assert!(matches!(result, Ok(InsertResult::Pit(_))));
        assert_eq!(pcct.stats().n_expired, 1);
    }

    #[test]
    fn test_can_be_prefix_probes_exact_key() {
        let mut pcct = Pcct::new(0, config());
        let now = Instant::now();
        let exact = Interest::new(name("/A"));
        let handle = insert_pit(&mut pcct, &exact, now);
        pcct.convert_to_cs(handle, Data::new(name("/A"), vec![]).with_freshness_period(ms(1000)), now);

        let prefix = Interest::new(name("/A")).with_can_be_prefix(true);
        let result = pcct.insert(PccKey::for_interest(&prefix, None), &prefix, now);
        assert_eq!(result, Ok(InsertResult::Cs(handle)));
    }

    #[test]
    fn test_nack_content_not_cached() {
        let mut pcct = Pcct::new(0, config());
        let now = Instant::now();
        let handle = insert_pit(&mut pcct, &Interest::new(name("/A")), now);
        let data = Data::new(name("/A"), vec![]).with_content_type(ContentType::Nack);
        assert!(!pcct.convert_to_cs(handle, data, now));
        assert_eq!(pcct.count_entries(), 0);
    }

    #[test]
    fn test_cs_capacity_evicts_oldest() {
        let mut pcct = Pcct::new(0, config());
        let now = Instant::now();
        let mut handles = Vec::new();
        for i in 0..5 {
            let uri = format!("/C/{}", i);
            let handle = insert_pit(&mut pcct, &Interest::new(name(&uri)), now);
            pcct.convert_to_cs(handle, Data::new(name(&uri), vec![]), now);
            handles.push(handle);
        }
        assert_eq!(pcct.n_cs(), 4);
        assert!(pcct.get(handles[0]).is_none());
        assert!(pcct.get(handles[4]).is_some());
        assert_eq!(pcct.stats().n_cs_evicted, 1);
    }

    #[test]
    fn test_full_table() {
        let mut pcct = Pcct::new(0, PcctConfig {
            max_entries: 2,
            ..config()
        });
        let now = Instant::now();
        let cached = insert_pit(&mut pcct, &Interest::new(name("/X/0")), now);
        pcct.convert_to_cs(cached, Data::new(name("/X/0"), vec![]), now);
        insert_pit(&mut pcct, &Interest::new(name("/X/1")), now);

        // The CS entry makes room for a new PIT entry.
        insert_pit(&mut pcct, &Interest::new(name("/X/2")), now);
        assert!(pcct.get(cached).is_none());

        // Only PIT entries remain, so the next insert fails.
        let interest = Interest::new(name("/X/3"));
        assert_eq!(
            pcct.insert(PccKey::for_interest(&interest, None), &interest, now),
            Err(PcctError::Full)
        );

        // Once they expire the sweep frees space.
        let later = now + interest.lifetime + ms(1);
        assert!(pcct.insert(PccKey::for_interest(&interest, None), &interest, later).is_ok());
    }

    #[test]
    fn test_sweep_expires_pit_entries() {
        let mut pcct = Pcct::new(0, config());
        let now = Instant::now();
        for i in 0..3 {
            let interest = Interest::new(name(&format!("/S/{}", i))).with_lifetime(ms(100 * (i + 1)));
            let handle = insert_pit(&mut pcct, &interest, now);
            pcct.pit_mut(handle)
                .unwrap()
                .add_downstream(1, 0, 0, interest.lifetime, now, 4)
                .unwrap();
        }

        assert_eq!(pcct.sweep(now + ms(150), 16), 1);
        assert_eq!(pcct.sweep(now + ms(1000), 16), 2);
        assert_eq!(pcct.count_entries(), 0);
        assert_eq!(pcct.stats().n_expired, 3);
    }

    #[test]
    fn test_generation_skips_zero_token_bits() {
        assert_eq!(next_generation(1), 2);
        assert_eq!(next_generation(0x00FF_FFFF), 0x0100_0001);
        assert_eq!(next_generation(u32::MAX), 1);
    }
}
