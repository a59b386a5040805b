use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use log::{error, info};
use tokio::sync::mpsc;

use crate::alloc::{HeapAllocator, PacketAllocator};
use crate::config::{Config, ConfigError};
use crate::face::{Face, FaceId, FaceTable};
use crate::fib::{Fib, FibTable};
use crate::fwd::Fwd;
use crate::input::Input;
use crate::ndt::Ndt;
use crate::stats::{ForwarderSnapshot, StatsSources};
use crate::suppress::SuppressPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ForwarderError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("Route {prefix} uses unknown face {face}")]
    UnknownNexthop { prefix: String, face: FaceId },
    #[error("Thread {0} panicked")]
    Panicked(String),
}

/// A fully assembled forwarder: input dispatchers, forwarding workers and
/// the tables they share.
///
/// The forwarder can be driven synchronously with [`Forwarder::poll_once`]
/// or handed to dedicated threads with [`Forwarder::launch`].
pub struct Forwarder {
    fib: Arc<FibTable>,
    ndt: Arc<Ndt>,
    faces: Arc<FaceTable>,
    inputs: Vec<Input>,
    workers: Vec<Fwd>,
}

impl Forwarder {
    pub fn new(config: &Config, faces: Vec<Arc<dyn Face>>) -> Result<Self, ForwarderError> {
        Self::with_allocator(config, faces, Arc::new(HeapAllocator::default()))
    }

    pub fn with_allocator(
        config: &Config,
        faces: Vec<Arc<dyn Face>>,
        alloc: Arc<dyn PacketAllocator>,
    ) -> Result<Self, ForwarderError> {
        config.validate()?;
        let fwd_config = &config.forwarder;
        let n_workers = fwd_config.workers as u8;

        let fib = Arc::new(FibTable::new(Fib::from_routes(&config.fib)?));
        let ndt = Arc::new(Ndt::new(&config.ndt, n_workers));
        let face_table: Arc<FaceTable> = Arc::new(faces.iter().cloned().collect());
        for route in &config.fib {
            if let Some(&face) = route.nexthops.iter().find(|&&id| face_table.get(id).is_none()) {
                return Err(ForwarderError::UnknownNexthop {
                    prefix: route.prefix.clone(),
                    face,
                });
            }
        }
        let suppress = SuppressPolicy::from(&config.suppress);
        let mut seeds = match fwd_config.nonce_seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };

        let mut senders = Vec::with_capacity(n_workers as usize);
        let mut workers = Vec::with_capacity(n_workers as usize);
        for id in 0..n_workers {
            let (tx, rx) = mpsc::channel(fwd_config.queue_capacity);
            senders.push(tx);
            workers.push(Fwd::new(
                id,
                config.pcct.clone(),
                fib.reader(),
                Arc::clone(&face_table),
                Arc::clone(&alloc),
                rx,
                suppress,
                fastrand::Rng::with_seed(seeds.u64(..)),
                fwd_config.burst_size,
            ));
        }

        let inputs = assign_faces(faces, fwd_config.inputs)
            .into_iter()
            .enumerate()
            .map(|(id, faces)| {
                Input::new(
                    id,
                    faces,
                    Arc::clone(&ndt),
                    senders.clone(),
                    Arc::clone(&alloc),
                    fwd_config.burst_size,
                )
            })
            .collect();

        info!(
            "forwarder assembled: {} workers, {} inputs, {} faces, {} routes",
            n_workers,
            fwd_config.inputs,
            face_table.len(),
            config.fib.len()
        );

        Ok(Self {
            fib,
            ndt,
            faces: face_table,
            inputs,
            workers,
        })
    }

    pub fn fib(&self) -> &Arc<FibTable> {
        &self.fib
    }

    pub fn ndt(&self) -> &Arc<Ndt> {
        &self.ndt
    }

    pub fn faces(&self) -> &Arc<FaceTable> {
        &self.faces
    }

    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    pub fn workers(&self) -> &[Fwd] {
        &self.workers
    }

    pub fn workers_mut(&mut self) -> &mut [Fwd] {
        &mut self.workers
    }

    /// Run every input once, then every worker once, at time `now`.
    /// Returns the number of packets handled by the workers.
    pub fn poll_once(&mut self, now: Instant) -> usize {
        for input in &self.inputs {
            input.poll();
        }
        self.workers.iter_mut().map(|w| w.poll(now)).sum()
    }

    pub fn stats_sources(&self) -> StatsSources {
        StatsSources {
            workers: self.workers.iter().map(|w| Arc::clone(w.counters())).collect(),
            inputs: self
                .inputs
                .iter()
                .map(|i| (Arc::clone(i.counters()), i.face_ids()))
                .collect(),
            fib: Arc::clone(&self.fib),
            ndt: Arc::clone(&self.ndt),
        }
    }

    pub fn snapshot(&self) -> ForwarderSnapshot {
        self.stats_sources().snapshot()
    }

    /// Move every input and worker onto its own thread
    pub fn launch(self) -> Result<ForwarderHandle, ForwarderError> {
        let stats = self.stats_sources();
        let stop = Arc::new(AtomicBool::new(false));
        let mut threads = Vec::new();

        for input in self.inputs {
            let running = Arc::clone(&stop);
            let name = format!("input{}", threads.len());
            let handle = thread::Builder::new().name(name.clone()).spawn(move || {
                while !running.load(Ordering::Relaxed) {
                    if input.poll() == 0 {
                        thread::yield_now();
                    }
                }
            });
            threads.push((name, spawned(handle, &stop)?));
        }

        for mut worker in self.workers {
            let running = Arc::clone(&stop);
            let name = format!("fwd{}", worker.id());
            let handle = thread::Builder::new().name(name.clone()).spawn(move || {
                while !running.load(Ordering::Relaxed) {
                    if worker.poll(Instant::now()) == 0 {
                        thread::yield_now();
                    }
                }
            });
            threads.push((name, spawned(handle, &stop)?));
        }

        info!("forwarder launched {} threads", threads.len());
        Ok(ForwarderHandle {
            stop,
            threads,
            stats,
        })
    }
}

/// Stop already-running threads if a later spawn fails
fn spawned(
    handle: std::io::Result<JoinHandle<()>>,
    stop: &AtomicBool,
) -> Result<JoinHandle<()>, ForwarderError> {
    handle.map_err(|e| {
        error!("thread spawn failed: {}", e);
        stop.store(true, Ordering::Relaxed);
        ForwarderError::Spawn(e)
    })
}

/// Spread faces over `n_inputs` groups round-robin, ordered by NUMA socket
/// then face id
fn assign_faces(mut faces: Vec<Arc<dyn Face>>, n_inputs: usize) -> Vec<Vec<Arc<dyn Face>>> {
    faces.sort_by_key(|f| (f.numa_socket(), f.id()));
    let mut groups: Vec<Vec<Arc<dyn Face>>> = (0..n_inputs).map(|_| Vec::new()).collect();
    for (i, face) in faces.into_iter().enumerate() {
        groups[i % n_inputs].push(face);
    }
    groups
}

/// Running forwarder
pub struct ForwarderHandle {
    stop: Arc<AtomicBool>,
    threads: Vec<(String, JoinHandle<()>)>,
    stats: StatsSources,
}

impl ForwarderHandle {
    pub fn snapshot(&self) -> ForwarderSnapshot {
        self.stats.snapshot()
    }

    pub fn fib(&self) -> &Arc<FibTable> {
        &self.stats.fib
    }

    /// Signal every thread to stop and wait for them
    pub fn stop(self) -> Result<ForwarderSnapshot, ForwarderError> {
        self.stop.store(true, Ordering::Relaxed);
        let mut result = Ok(());
        for (name, thread) in self.threads {
            if thread.join().is_err() {
                error!("{} panicked", name);
                result = Err(ForwarderError::Panicked(name));
            }
        }
        info!("forwarder stopped");
        result.map(|_| self.stats.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::face::MemoryFace;

    fn faces(ids: &[u32]) -> Vec<Arc<dyn Face>> {
        ids.iter()
            .map(|&id| Arc::new(MemoryFace::new(id)) as Arc<dyn Face>)
            .collect()
    }

    #[test]
    fn test_assign_faces_round_robin() {
        let groups = assign_faces(faces(&[5, 1, 3, 2]), 2);
        let ids: Vec<Vec<u32>> = groups
            .iter()
            .map(|g| g.iter().map(|f| f.id()).collect())
            .collect();
        assert_eq!(ids, vec![vec![1, 3], vec![2, 5]]);
    }

    #[test]
    fn test_assembly() {
        let mut config = Config::default();
        config.forwarder.workers = 3;
        config.forwarder.inputs = 2;
        let forwarder = Forwarder::new(&config, faces(&[1, 2, 3])).unwrap();

        assert_eq!(forwarder.workers().len(), 3);
        assert_eq!(forwarder.inputs().len(), 2);
        assert_eq!(forwarder.ndt().n_partitions(), 3);
        assert_eq!(forwarder.workers()[2].pcct().partition(), 2);

        let snapshot = forwarder.snapshot();
        assert_eq!(snapshot.workers.len(), 3);
        assert_eq!(snapshot.inputs[0].faces, vec![1, 3]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = Config::default();
        config.forwarder.workers = 0;
        assert!(matches!(
            Forwarder::new(&config, Vec::new()),
            Err(ForwarderError::Config(_))
        ));
    }

    #[test]
    fn test_route_to_unknown_face_rejected() {
        let mut config = Config::default();
        config.fib.push(crate::config::RouteConfig {
            prefix: "/A".to_string(),
            nexthops: vec![2, 9],
            strategy: crate::fib::Strategy::Multicast,
        });
        match Forwarder::new(&config, faces(&[1, 2])) {
            Err(ForwarderError::UnknownNexthop { prefix, face }) => {
                assert_eq!(prefix, "/A");
                assert_eq!(face, 9);
            }
            other => panic!("expected UnknownNexthop, got {:?}", other.err()),
        }
        assert!(Forwarder::new(&config, faces(&[1, 2, 9])).is_ok());
    }

    #[test]
    fn test_launch_and_stop() {
        let forwarder = Forwarder::new(&Config::default(), faces(&[1])).unwrap();
        let handle = forwarder.launch().unwrap();
        let snapshot = handle.stop().unwrap();
        assert_eq!(snapshot.workers.len(), 2);
    }
}
