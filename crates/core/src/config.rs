use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

pub const DEFAULT_REQUEST_PORT: u16 = 27015;
pub const DEFAULT_PUSH_PORT: u16 = 27016;
pub const DEFAULT_TIMESTEP_MS: f64 = 15.0;
pub const DEFAULT_BROADCAST_INTERVAL_MS: f64 = 50.0;
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Timing {
    pub timestep_ms: f64,
    pub broadcast_interval_ms: f64,
    /// How far behind `now()` remote entities are rendered.
    pub interpolation_delay_ms: f64,
}

impl Timing {
    pub fn new(timestep_ms: f64, broadcast_interval_ms: f64) -> Self {
        Self {
            timestep_ms,
            broadcast_interval_ms,
            interpolation_delay_ms: broadcast_interval_ms * 2.0,
        }
    }

    pub fn timestep(&self) -> Duration {
        Duration::from_secs_f64(self.timestep_ms / 1000.0)
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_secs_f64(self.broadcast_interval_ms / 1000.0)
    }

    pub fn dt(&self) -> f32 {
        (self.timestep_ms / 1000.0) as f32
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self::new(DEFAULT_TIMESTEP_MS, DEFAULT_BROADCAST_INTERVAL_MS)
    }
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub request_addr: SocketAddr,
    pub push_addr: SocketAddr,
    /// Channel-A connections a client keeps open.
    pub request_pool_size: usize,
    /// Channel-B connections a client keeps open.
    pub push_connections: usize,
    pub peer_queue_capacity: usize,
    pub inbound_queue_capacity: usize,
    pub delivery_timeout: Duration,
    pub request_timeout: Duration,
    pub max_frame_size: usize,
    pub compression_level: i32,
}

impl TransportConfig {
    pub fn with_addrs(request_addr: SocketAddr, push_addr: SocketAddr) -> Self {
        Self {
            request_addr,
            push_addr,
            ..Default::default()
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_REQUEST_PORT)),
            push_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PUSH_PORT)),
            request_pool_size: 4,
            push_connections: 2,
            peer_queue_capacity: 64,
            inbound_queue_capacity: 256,
            delivery_timeout: Duration::from_secs(1),
            request_timeout: Duration::from_secs(5),
            max_frame_size: MAX_FRAME_SIZE,
            compression_level: 3,
        }
    }
}
