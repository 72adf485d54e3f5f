use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio::sync::Notify;

use crate::config::TransportConfig;

use super::error::{PoolError, TransportError};
use super::frame::{Connection, encode_frame};
use super::pool::ConnectionPool;
use super::protocol::Packet;

pub type SharedFrame = Arc<[u8]>;

#[derive(Debug, Default)]
pub struct TransportStats {
    frames_enqueued: AtomicU64,
    bytes_enqueued: AtomicU64,
    frames_dropped: AtomicU64,
    frames_delivered: AtomicU64,
    peers_evicted: AtomicU64,
    requests_handled: AtomicU64,
    malformed_frames: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStatsSnapshot {
    pub frames_enqueued: u64,
    pub bytes_enqueued: u64,
    pub frames_dropped: u64,
    pub frames_delivered: u64,
    pub peers_evicted: u64,
    pub requests_handled: u64,
    pub malformed_frames: u64,
}

impl TransportStats {
    pub fn snapshot(&self) -> TransportStatsSnapshot {
        TransportStatsSnapshot {
            frames_enqueued: self.frames_enqueued.load(Ordering::Relaxed),
            bytes_enqueued: self.bytes_enqueued.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
            peers_evicted: self.peers_evicted.load(Ordering::Relaxed),
            requests_handled: self.requests_handled.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_request(&self) {
        self.requests_handled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }
}

/// Bounded FIFO that evicts its oldest frame instead of blocking the producer.
#[derive(Debug)]
struct PeerQueue {
    frames: Mutex<VecDeque<SharedFrame>>,
    capacity: usize,
    ready: Notify,
    closed: AtomicBool,
}

impl PeerQueue {
    fn new(capacity: usize) -> Self {
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            ready: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn frames(&self) -> MutexGuard<'_, VecDeque<SharedFrame>> {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true when an older frame had to be dropped to make room.
    fn push(&self, frame: SharedFrame) -> bool {
        let dropped = {
            let mut frames = self.frames();
            let dropped = if frames.len() >= self.capacity {
                frames.pop_front().is_some()
            } else {
                false
            };
            frames.push_back(frame);
            dropped
        };
        self.ready.notify_one();
        dropped
    }

    async fn pop(&self) -> Option<SharedFrame> {
        loop {
            let next = self.frames().pop_front();
            if let Some(frame) = next {
                return Some(frame);
            }
            if self.closed.load(Ordering::SeqCst) {
                return None;
            }
            self.ready.notified().await;
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.frames().clear();
        self.ready.notify_one();
    }

    fn len(&self) -> usize {
        self.frames().len()
    }
}

#[derive(Debug)]
pub struct Peer {
    id: String,
    queue: PeerQueue,
    pool: ConnectionPool<Connection>,
}

impl Peer {
    fn new(id: impl Into<String>, queue_capacity: usize) -> Self {
        Self {
            id: id.into(),
            queue: PeerQueue::new(queue_capacity),
            pool: ConnectionPool::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn idle_connections(&self) -> usize {
        self.pool.idle_len()
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Borrow a connection and write one frame, each bounded by `timeout`. A
    /// failed or stalled write costs only that connection.
    pub async fn send_with_timeout(
        &self,
        frame: &[u8],
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let mut connection = self.pool.acquire(timeout).await.map_err(|e| match e {
            PoolError::Timeout(_) => TransportError::DeliveryTimeout {
                peer: self.id.clone(),
            },
            other => TransportError::Pool(other),
        })?;

        match tokio::time::timeout(timeout, connection.write_encoded(frame)).await {
            Ok(written) => written?,
            Err(_) => {
                return Err(TransportError::WriteTimeout {
                    peer: self.id.clone(),
                    timeout,
                });
            }
        }
        self.pool.release(connection);
        Ok(())
    }

    fn close(&self) {
        self.queue.close();
        self.pool.close();
    }
}

#[derive(Debug)]
pub struct PeerRegistry {
    peers: RwLock<HashMap<String, Arc<Peer>>>,
    stats: Arc<TransportStats>,
    config: TransportConfig,
}

impl PeerRegistry {
    pub fn new(config: TransportConfig, stats: Arc<TransportStats>) -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
            stats,
            config,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Peer>>> {
        self.peers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Peer>>> {
        self.peers.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn attach(self: &Arc<Self>, client_id: &str, connection: Connection) {
        let (peer, created) = {
            let mut peers = self.write();
            let existing = peers
                .get(client_id)
                .filter(|peer| !peer.is_closed())
                .cloned();
            match existing {
                Some(peer) => (peer, false),
                None => {
                    let peer = Arc::new(Peer::new(client_id, self.config.peer_queue_capacity));
                    peers.insert(client_id.to_string(), Arc::clone(&peer));
                    (peer, true)
                }
            }
        };

        log::debug!("push connection {} joined peer {}", connection.label(), client_id);
        peer.pool.release(connection);

        if created {
            log::info!("peer {} connected", client_id);
            let registry = Arc::clone(self);
            tokio::spawn(async move { registry.deliver(peer).await });
        }
    }

    async fn deliver(self: Arc<Self>, peer: Arc<Peer>) {
        let timeout = self.config.delivery_timeout;
        while let Some(frame) = peer.queue.pop().await {
            match peer.send_with_timeout(&frame, timeout).await {
                Ok(()) => {
                    self.stats.frames_delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(TransportError::DeliveryTimeout { peer: id }) => {
                    log::warn!(
                        "no push connection for peer {} within {:?}, evicting",
                        id,
                        timeout
                    );
                    self.stats.peers_evicted.fetch_add(1, Ordering::Relaxed);
                    break;
                }
                Err(TransportError::Pool(PoolError::Closed)) => break,
                Err(e) => {
                    log::debug!("dropping push connection of peer {}: {}", peer.id(), e);
                }
            }
        }

        peer.close();
        if self.remove(&peer) {
            log::info!("peer {} removed", peer.id());
        }
    }

    /// Remove `peer` only if it is still the registered entry for its id; a
    /// reconnect may already have replaced it.
    fn remove(&self, peer: &Arc<Peer>) -> bool {
        let mut peers = self.write();
        match peers.get(peer.id()) {
            Some(current) if Arc::ptr_eq(current, peer) => {
                peers.remove(peer.id());
                true
            }
            _ => false,
        }
    }

    pub fn disconnect(&self, client_id: &str) -> bool {
        let peer = self.write().remove(client_id);
        match peer {
            Some(peer) => {
                peer.close();
                true
            }
            None => false,
        }
    }

    /// Encode once, queue for every peer. Returns the number of peers targeted.
    pub fn broadcast(&self, packet: &Packet) -> Result<usize, TransportError> {
        let bytes = packet.serialize()?;
        let frame: SharedFrame = encode_frame(
            &bytes,
            self.config.compression_level,
            self.config.max_frame_size,
        )?
        .into();

        let peers: Vec<Arc<Peer>> = self.read().values().cloned().collect();
        for peer in &peers {
            if peer.queue.push(Arc::clone(&frame)) {
                self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }

        let targeted = peers.len() as u64;
        self.stats.frames_enqueued.fetch_add(targeted, Ordering::Relaxed);
        self.stats
            .bytes_enqueued
            .fetch_add(targeted * frame.len() as u64, Ordering::Relaxed);
        Ok(peers.len())
    }

    pub fn get(&self, client_id: &str) -> Option<Arc<Peer>> {
        self.read().get(client_id).cloned()
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.read().contains_key(client_id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn stats(&self) -> TransportStatsSnapshot {
        self.stats.snapshot()
    }
}
