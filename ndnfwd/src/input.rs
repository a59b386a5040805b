use std::sync::Arc;

use log::{debug, trace, warn};
use tokio::sync::mpsc::{self, error::TrySendError};

use ndnfw_core::{LpPacket, Nack, NackReason, Packet};

use crate::alloc::PacketAllocator;
use crate::face::{Face, FaceId};
use crate::fwd::FwdPacket;
use crate::ndt::Ndt;
use crate::stats::InputCounters;

/// Receive loop for a set of faces. Decodes each packet and queues it to
/// the worker owning it: Interests by NDT partition, Data and Nacks by the
/// partition recorded in their PIT token.
pub struct Input {
    id: usize,
    faces: Vec<Arc<dyn Face>>,
    ndt: Arc<Ndt>,
    queues: Vec<mpsc::Sender<FwdPacket>>,
    alloc: Arc<dyn PacketAllocator>,
    burst_size: usize,
    counters: Arc<InputCounters>,
}

impl Input {
    pub fn new(
        id: usize,
        faces: Vec<Arc<dyn Face>>,
        ndt: Arc<Ndt>,
        queues: Vec<mpsc::Sender<FwdPacket>>,
        alloc: Arc<dyn PacketAllocator>,
        burst_size: usize,
    ) -> Self {
        Self {
            id,
            faces,
            ndt,
            queues,
            alloc,
            burst_size,
            counters: Arc::new(InputCounters::default()),
        }
    }

    pub fn face_ids(&self) -> Vec<FaceId> {
        self.faces.iter().map(|f| f.id()).collect()
    }

    pub fn counters(&self) -> &Arc<InputCounters> {
        &self.counters
    }

    /// Pull one burst from every face. Returns the number of packets received.
    pub fn poll(&self) -> usize {
        let mut received = 0;
        for face in &self.faces {
            let burst = face.rx_burst(self.burst_size);
            received += burst.len();
            for wire in burst {
                self.dispatch(face.as_ref(), &wire);
            }
        }
        received
    }

    /// Decode one packet received on `face` and hand it to its worker
    pub fn dispatch(&self, face: &dyn Face, wire: &[u8]) {
        self.counters.n_rx.inc();
        let lp = match LpPacket::decode(wire) {
            Ok(lp) => lp,
            Err(e) => {
                self.counters.n_malformed.inc();
                debug!("input {} malformed packet from face {}: {}", self.id, face.id(), e);
                return;
            }
        };

        let partition = match &lp.packet {
            Packet::Interest(interest) => self.ndt.partition_of(&interest.name),
            Packet::Data(_) | Packet::Nack(_) => (lp.pit_token >> 56) as u8,
        };
        let Some(queue) = self.queues.get(partition as usize) else {
            self.counters.n_bad_partition.inc();
            trace!("input {} {} with bad token {:016x}", self.id, lp.packet.kind(), lp.pit_token);
            return;
        };

        let pkt = FwdPacket { face: face.id(), lp };
        match queue.try_send(pkt) {
            Ok(()) => self.counters.n_dispatched.inc(),
            Err(TrySendError::Full(pkt)) | Err(TrySendError::Closed(pkt)) => {
                self.counters.n_queue_full.inc();
                self.reject(face, pkt, partition);
            }
        }
    }

    /// Answer an Interest the worker queue could not take with
    /// Nack(Congestion); anything else is dropped.
    fn reject(&self, face: &dyn Face, pkt: FwdPacket, partition: u8) {
        let FwdPacket { lp, .. } = pkt;
        let Packet::Interest(interest) = lp.packet else {
            debug!("input {} queue {} full, dropping {}", self.id, partition, lp.packet.kind());
            return;
        };
        warn!("input {} queue {} full, rejecting {}", self.id, partition, interest.name);

        let nack = LpPacket::new(Nack::new(NackReason::Congestion, interest)).with_pit_token(lp.pit_token);
        match self.alloc.allocate(nack.encoded_length()) {
            Ok(mut buffer) => {
                nack.encode_into(&mut buffer);
                face.tx(buffer);
            }
            Err(e) => debug!("input {} cannot send Nack: {}", self.id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::HeapAllocator;
    use crate::config::NdtConfig;
    use crate::face::MemoryFace;
    use ndnfw_core::{Data, Interest, Name};

    fn name(uri: &str) -> Name {
        uri.parse().unwrap()
    }

    fn setup(
        workers: u8,
        capacity: usize,
    ) -> (Input, Arc<MemoryFace>, Vec<mpsc::Receiver<FwdPacket>>) {
        let face = Arc::new(MemoryFace::new(1));
        let ndt = Arc::new(Ndt::new(&NdtConfig::default(), workers));
        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..workers).map(|_| mpsc::channel(capacity)).unzip();
        let input = Input::new(
            0,
            vec![Arc::clone(&face) as Arc<dyn Face>],
            ndt,
            senders,
            Arc::new(HeapAllocator::default()),
            64,
        );
        (input, face, receivers)
    }

    #[test]
    fn test_interest_follows_ndt() {
        let (input, face, mut queues) = setup(4, 8);
        let interest = Interest::new(name("/A/B/1")).with_nonce(1);
        let expected = input.ndt.lookup(&interest.name).1 as usize;

        face.push_packet(&LpPacket::new(interest));
        assert_eq!(input.poll(), 1);
        let pkt = queues[expected].try_recv().unwrap();
        assert_eq!(pkt.face, 1);
        assert_eq!(input.counters().n_dispatched.get(), 1);
    }

    #[test]
    fn test_data_follows_token() {
        let (input, face, mut queues) = setup(4, 8);
        let data = Data::new(name("/A/B/1"), vec![]);
        face.push_packet(&LpPacket::new(data.clone()).with_pit_token(2 << 56 | 17));
        face.push_packet(&LpPacket::new(data).with_pit_token(9 << 56));
        input.poll();

        assert!(queues[2].try_recv().is_ok());
        assert_eq!(input.counters().n_bad_partition.get(), 1);
    }

    #[test]
    fn test_malformed_dropped() {
        let (input, face, mut queues) = setup(1, 8);
        face.push_rx(vec![0x05, 0x20, 0x07]);
        input.poll();
        assert_eq!(input.counters().n_malformed.get(), 1);
        assert!(queues[0].try_recv().is_err());
        assert!(face.take_tx().is_empty());
    }

    #[test]
    fn test_full_queue_nacks_interest() {
        let (input, face, _queues) = setup(1, 1);
        for nonce in 0..2 {
            let interest = Interest::new(name("/A/1")).with_nonce(nonce);
            face.push_packet(&LpPacket::new(interest).with_pit_token(100 + nonce as u64));
        }
        face.push_packet(&LpPacket::new(Data::new(name("/A/1"), vec![])));
        input.poll();

        assert_eq!(input.counters().n_queue_full.get(), 2);
        let replies = face.take_tx_packets().unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].pit_token, 101);
        assert!(matches!(&replies[0].packet, Packet::Nack(n) if n.reason == NackReason::Congestion));
    }
}
