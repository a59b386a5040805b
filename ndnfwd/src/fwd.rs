//! Forwarding worker: runs the Interest, Data and Nack pipelines over the
//! PCCT partition it owns.

use std::sync::Arc;
use std::time::Instant;

use log::{debug, trace, warn};
use tokio::sync::mpsc;

use ndnfw_core::{Data, Interest, LpPacket, Nack, NackReason, Name, Packet};

use crate::alloc::{AllocError, PacketAllocator};
use crate::config::PcctConfig;
use crate::face::{FaceId, FaceTable};
use crate::fib::{Fib, FibEntry, FibReader};
use crate::pcct::{InsertResult, PccKey, Pcct};
use crate::stats::FwdCounters;
use crate::suppress::SuppressPolicy;

/// A decoded packet queued for a worker
#[derive(Debug, Clone)]
pub struct FwdPacket {
    /// Face the packet arrived on
    pub face: FaceId,
    pub lp: LpPacket,
}

/// Resolve the route of an Interest.
///
/// Without a forwarding hint the Interest name is looked up directly.
/// Otherwise delegations are tried by ascending preference and the first
/// one with a FIB match wins; its name is returned so it can be part of
/// the PCCT key.
pub fn resolve_route<'a>(fib: &'a Fib, interest: &Interest) -> Option<(Option<Name>, &'a Arc<FibEntry>)> {
    if interest.forwarding_hint.is_empty() {
        return fib.lpm(&interest.name).map(|entry| (None, entry));
    }

    let mut delegations: Vec<_> = interest.forwarding_hint.iter().collect();
    delegations.sort_by_key(|d| d.preference);
    delegations
        .into_iter()
        .find_map(|d| fib.lpm(&d.name).map(|entry| (Some(d.name.clone()), entry)))
}

#[derive(Debug, thiserror::Error)]
pub enum EgressError {
    #[error("Unknown face {0}")]
    UnknownFace(FaceId),
    #[error(transparent)]
    Alloc(#[from] AllocError),
}

/// Transmit side shared by the pipelines
struct Egress {
    faces: Arc<FaceTable>,
    alloc: Arc<dyn PacketAllocator>,
}

impl Egress {
    fn send(&self, face: FaceId, lp: &LpPacket) -> Result<(), EgressError> {
        let target = self.faces.get(face).ok_or(EgressError::UnknownFace(face))?;
        let mut buffer = self.alloc.allocate(lp.encoded_length())?;
        lp.encode_into(&mut buffer);
        target.tx(buffer);
        Ok(())
    }
}

fn count_tx_error(counters: &FwdCounters, id: u8, face: FaceId, e: &EgressError) {
    match e {
        EgressError::UnknownFace(_) => {
            counters.n_unknown_face.inc();
            warn!("fwd {} cannot transmit to face {}: {}", id, face, e);
        }
        EgressError::Alloc(_) => {
            counters.n_alloc_errors.inc();
            debug!("fwd {} cannot transmit to face {}: {}", id, face, e);
        }
    }
}

pub struct Fwd {
    id: u8,
    pcct: Pcct,
    fib: FibReader,
    egress: Egress,
    queue: mpsc::Receiver<FwdPacket>,
    suppress: SuppressPolicy,
    rng: fastrand::Rng,
    max_downstreams: usize,
    sweep_budget: usize,
    burst_size: usize,
    counters: Arc<FwdCounters>,
}

impl Fwd {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u8,
        pcct_config: PcctConfig,
        fib: FibReader,
        faces: Arc<FaceTable>,
        alloc: Arc<dyn PacketAllocator>,
        queue: mpsc::Receiver<FwdPacket>,
        suppress: SuppressPolicy,
        rng: fastrand::Rng,
        burst_size: usize,
    ) -> Self {
        Self {
            id,
            max_downstreams: pcct_config.max_downstreams,
            sweep_budget: pcct_config.sweep_budget,
            pcct: Pcct::new(id, pcct_config),
            fib,
            egress: Egress { faces, alloc },
            queue,
            suppress,
            rng,
            burst_size,
            counters: Arc::new(FwdCounters::default()),
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn pcct(&self) -> &Pcct {
        &self.pcct
    }

    pub fn counters(&self) -> &Arc<FwdCounters> {
        &self.counters
    }

    /// Process one burst from the input queue, then run the expiry sweep.
    /// Returns the number of packets processed.
    pub fn poll(&mut self, now: Instant) -> usize {
        let mut processed = 0;
        while processed < self.burst_size {
            match self.queue.try_recv() {
                Ok(pkt) => {
                    self.process_packet(pkt, now);
                    processed += 1;
                }
                Err(_) => break,
            }
        }

        let expired = self.pcct.sweep(now, self.sweep_budget);
        if expired > 0 {
            trace!("fwd {} expired {} entries", self.id, expired);
        }
        self.counters.publish_pcct(&self.pcct.stats());
        processed
    }

    pub fn process_packet(&mut self, pkt: FwdPacket, now: Instant) {
        let FwdPacket { face, lp } = pkt;
        let token = lp.pit_token;
        match lp.packet {
            Packet::Interest(interest) => self.process_interest(face, token, interest, now),
            Packet::Data(data) => self.process_data(face, token, data, now),
            Packet::Nack(nack) => self.process_nack(face, token, nack, now),
        }
    }

    fn reply_nack(&self, face: FaceId, token: u64, interest: Interest, reason: NackReason) {
        let lp = LpPacket::new(Nack::new(reason, interest)).with_pit_token(token);
        match self.egress.send(face, &lp) {
            Ok(()) => self.counters.n_tx_nacks.inc(),
            Err(e) => count_tx_error(&self.counters, self.id, face, &e),
        }
    }

    fn process_interest(&mut self, face: FaceId, token: u64, mut interest: Interest, now: Instant) {
        self.counters.n_interests.inc();
        trace!("fwd {} Interest {} from face {}", self.id, interest.name, face);

        if interest.hop_limit == Some(0) {
            self.counters.n_hop_limit_dropped.inc();
            debug!("fwd {} drop {}: HopLimit exhausted", self.id, interest.name);
            return;
        }
        let nonce = *interest.nonce.get_or_insert_with(|| self.rng.u32(..));

        let fib = Arc::clone(self.fib.current());
        let Some((fwd_hint, fib_entry)) = resolve_route(&fib, &interest) else {
            self.counters.n_no_route.inc();
            debug!("fwd {} no route for {}", self.id, interest.name);
            self.reply_nack(face, token, interest, NackReason::NoRoute);
            return;
        };
        fib_entry.counters.n_rx_interests.inc();
        let key = PccKey::for_interest(&interest, fwd_hint.as_ref());

        if let Some(existing) = self.pcct.find_pit_by_key(&key, now) {
            if self.pcct.pit(existing).is_some_and(|pit| pit.is_duplicate(face, nonce)) {
                self.counters.n_duplicate.inc();
                debug!("fwd {} duplicate nonce {:08x} for {}", self.id, nonce, interest.name);
                self.reply_nack(face, token, interest, NackReason::Duplicate);
                return;
            }
        }

        let handle = match self.pcct.insert(key, &interest, now) {
            Ok(InsertResult::Pit(handle)) => handle,
            Ok(InsertResult::Cs(handle)) => {
                self.counters.n_cs_hits.inc();
                let Some(cs) = self.pcct.cs(handle) else {
                    return;
                };
                let lp = LpPacket::new(cs.data.clone()).with_pit_token(token);
                match self.egress.send(face, &lp) {
                    Ok(()) => self.counters.n_tx_data.inc(),
                    Err(e) => count_tx_error(&self.counters, self.id, face, &e),
                }
                return;
            }
            Err(e) => {
                self.counters.n_congestion.inc();
                debug!("fwd {} cannot insert {}: {}", self.id, interest.name, e);
                self.reply_nack(face, token, interest, NackReason::Congestion);
                return;
            }
        };
        let up_token = self.pcct.token_of(handle);

        let Some(pit) = self.pcct.pit_mut(handle) else {
            return;
        };
        // An entry without downstreams was created by this Interest.
        let created = pit.downstreams.is_empty();

        let nexthops = fib_entry.select_nexthops(face);
        if nexthops.is_empty() {
            if created {
                self.pcct.erase(handle);
            }
            self.counters.n_no_route.inc();
            debug!("fwd {} no usable nexthop for {} from face {}", self.id, interest.name, face);
            self.reply_nack(face, token, interest, NackReason::NoRoute);
            return;
        }

        let added = pit.add_downstream(face, token, nonce, interest.lifetime, now, self.max_downstreams);
        if let Err(e) = added {
            self.counters.n_congestion.inc();
            debug!("fwd {} {}: {}", self.id, interest.name, e);
            if created {
                self.pcct.erase(handle);
            }
            self.reply_nack(face, token, interest, NackReason::Congestion);
            return;
        }

        let hop_limit = interest.hop_limit.map(|h| h - 1);
        let mut n_sent = 0;
        for nexthop in nexthops {
            let retransmit = match pit.upstream(nexthop) {
                None => false,
                Some(up) if up.suppress.should_forward(&self.suppress, now) => true,
                Some(_) => {
                    self.counters.n_suppressed.inc();
                    continue;
                }
            };

            let up_nonce = self.rng.u32(..);
            let mut upstream = interest.clone();
            upstream.nonce = Some(up_nonce);
            upstream.hop_limit = hop_limit;
            let lp = LpPacket::new(upstream).with_pit_token(up_token);
            match self.egress.send(nexthop, &lp) {
                Ok(()) => {
                    pit.record_upstream_tx(nexthop, up_nonce, now);
                    fib_entry.counters.n_tx_interests.inc();
                    n_sent += 1;
                    if retransmit {
                        self.counters.n_retransmitted.inc();
                    } else {
                        self.counters.n_forwarded.inc();
                    }
                }
                Err(e) => count_tx_error(&self.counters, self.id, nexthop, &e),
            }
        }

        if n_sent == 0 && pit.upstreams.is_empty() {
            // Nothing is pending upstream, so no response will ever arrive.
            self.counters.n_congestion.inc();
            let template = pit.interest.clone();
            let downstreams = std::mem::take(&mut pit.downstreams);
            self.pcct.erase(handle);
            for down in downstreams {
                let mut nacked = template.clone();
                nacked.nonce = Some(down.nonce);
                self.reply_nack(down.face, down.token, nacked, NackReason::Congestion);
            }
        }
    }

    fn process_data(&mut self, face: FaceId, token: u64, data: Data, now: Instant) {
        self.counters.n_data.inc();
        let Some(handle) = self.pcct.find(token, now) else {
            self.counters.n_data_unmatched.inc();
            trace!("fwd {} Data {} from face {} has no PIT entry", self.id, data.name, face);
            return;
        };
        let Some(entry) = self.pcct.get(handle) else {
            return;
        };
        let Some(pit) = entry.as_pit() else {
            return;
        };
        if !pit.interest.matches_data(&data.name) {
            self.counters.n_data_unmatched.inc();
            debug!("fwd {} Data {} does not match {}", self.id, data.name, pit.interest.name);
            return;
        }

        if let Some(route) = self.fib.current().lpm(entry.key().route_name()) {
            route.counters.n_rx_data.inc();
        }

        for down in pit.downstreams.iter().filter(|d| d.expiry > now) {
            let lp = LpPacket::new(data.clone()).with_pit_token(down.token);
            match self.egress.send(down.face, &lp) {
                Ok(()) => self.counters.n_tx_data.inc(),
                Err(e) => count_tx_error(&self.counters, self.id, down.face, &e),
            }
        }
        self.pcct.convert_to_cs(handle, data, now);
    }

    fn process_nack(&mut self, face: FaceId, token: u64, nack: Nack, now: Instant) {
        self.counters.n_nacks.inc();
        let Some(handle) = self.pcct.find(token, now) else {
            self.counters.n_nack_unmatched.inc();
            return;
        };
        let Some(nonce) = nack.interest.nonce else {
            self.counters.n_nack_unmatched.inc();
            return;
        };
        let Some(pit) = self.pcct.pit_mut(handle) else {
            return;
        };
        if !pit.remove_upstream(face, nonce) {
            self.counters.n_nack_unmatched.inc();
            trace!("fwd {} Nack from face {} matches no upstream record", self.id, face);
            return;
        }
        if !pit.upstreams.is_empty() {
            return;
        }

        let template = pit.interest.clone();
        let downstreams = std::mem::take(&mut pit.downstreams);
        if let Some(entry) = self.pcct.get(handle) {
            if let Some(route) = self.fib.current().lpm(entry.key().route_name()) {
                route.counters.n_rx_nacks.inc();
            }
        }
        self.pcct.erase(handle);

        debug!("fwd {} Nack~{:?} {} to {} downstreams", self.id, nack.reason, template.name, downstreams.len());
        for down in downstreams.into_iter().filter(|d| d.expiry > now) {
            let mut nacked = template.clone();
            nacked.nonce = Some(down.nonce);
            self.reply_nack(down.face, down.token, nacked, nack.reason);
        }
    }
}
