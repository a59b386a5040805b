use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ndnfw_core::{LpPacket, PacketError};

pub type FaceId = u32;

/// Network face as seen by the forwarding plane
pub trait Face: Send + Sync {
    fn id(&self) -> FaceId;

    /// NUMA socket the face's device is attached to, used only for placement
    fn numa_socket(&self) -> Option<u32> {
        None
    }

    /// Receive up to `max` raw packets
    fn rx_burst(&self, max: usize) -> Vec<Vec<u8>>;

    /// Transmit one encoded packet; never blocks
    fn tx(&self, packet: Vec<u8>);
}

/// Faces known to the forwarder, shared read-only by inputs and workers
#[derive(Default, Clone)]
pub struct FaceTable {
    faces: HashMap<FaceId, Arc<dyn Face>>,
}

impl FaceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, face: Arc<dyn Face>) {
        self.faces.insert(face.id(), face);
    }

    pub fn get(&self, id: FaceId) -> Option<&Arc<dyn Face>> {
        self.faces.get(&id)
    }

    /// Face ids in ascending order
    pub fn ids(&self) -> Vec<FaceId> {
        let mut ids: Vec<FaceId> = self.faces.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}

impl FromIterator<Arc<dyn Face>> for FaceTable {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Face>>>(iter: I) -> Self {
        let mut table = FaceTable::new();
        for face in iter {
            table.add(face);
        }
        table
    }
}

/// In-memory face: packets pushed by the owner are received by the
/// forwarder, and everything the forwarder transmits is queued for the
/// owner to take.
#[derive(Debug, Default)]
pub struct MemoryFace {
    id: FaceId,
    numa_socket: Option<u32>,
    rx_queue: Mutex<VecDeque<Vec<u8>>>,
    tx_queue: Mutex<Vec<Vec<u8>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryFace {
    pub fn new(id: FaceId) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn with_numa_socket(mut self, socket: u32) -> Self {
        self.numa_socket = Some(socket);
        self
    }

    /// Queue raw bytes for reception
    pub fn push_rx(&self, packet: Vec<u8>) {
        lock(&self.rx_queue).push_back(packet);
    }

    /// Queue an encoded packet for reception
    pub fn push_packet(&self, packet: &LpPacket) {
        self.push_rx(packet.encode());
    }

    pub fn rx_pending(&self) -> usize {
        lock(&self.rx_queue).len()
    }

    /// Take everything transmitted so far
    pub fn take_tx(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *lock(&self.tx_queue))
    }

    /// Take and decode everything transmitted so far
    pub fn take_tx_packets(&self) -> Result<Vec<LpPacket>, PacketError> {
        self.take_tx().iter().map(|wire| LpPacket::decode(wire)).collect()
    }
}

impl Face for MemoryFace {
    fn id(&self) -> FaceId {
        self.id
    }

    fn numa_socket(&self) -> Option<u32> {
        self.numa_socket
    }

    fn rx_burst(&self, max: usize) -> Vec<Vec<u8>> {
        let mut queue = lock(&self.rx_queue);
        let n = max.min(queue.len());
        queue.drain(..n).collect()
    }

    fn tx(&self, packet: Vec<u8>) {
        lock(&self.tx_queue).push(packet);
    }
}
