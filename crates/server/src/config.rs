use std::time::Duration;

use tether::{Timing, TransportConfig};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub timing: Timing,
    pub transport: TransportConfig,
    pub max_players: usize,
    /// Players silent for longer than this are removed by the sweep.
    pub liveness_timeout: Duration,
    pub sweep_interval: Duration,
    /// How far the simulation may fall behind wall time before it stops
    /// replaying ticks and jumps to the present.
    pub max_catch_up_ticks: i64,
    pub world_size: f32,
    pub tree_count: usize,
    pub max_name_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            timing: Timing::default(),
            transport: TransportConfig::default(),
            max_players: 32,
            liveness_timeout: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(1),
            max_catch_up_ticks: 10,
            world_size: 2_000.0,
            tree_count: 24,
            max_name_len: 16,
        }
    }
}
