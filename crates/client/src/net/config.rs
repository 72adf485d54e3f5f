use tether::{Timing, TransportConfig};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub transport: TransportConfig,
    /// Only the interpolation delay and broadcast interval are used; the
    /// timestep comes from the server at registration.
    pub timing: Timing,
    pub input_rate_hz: f64,
    /// Prediction errors larger than this snap instead of blending.
    pub snap_threshold: f32,
    pub frames_per_second: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            timing: Timing::default(),
            input_rate_hz: 30.0,
            snap_threshold: 100.0,
            frames_per_second: 60,
        }
    }
}
