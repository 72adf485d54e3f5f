use glam::Vec2;

use tether::net::{InputFlags, PlayerInput};

#[derive(Debug, Clone, Default)]
pub struct InputState {
    pub move_direction: Vec2,
    pub aim_angle: f32,
    pub fire: bool,
    pub use_item: bool,
    pub reload: bool,
}

impl InputState {
    pub fn to_input(&self, sequence: u32, timestamp_ms: f64) -> PlayerInput {
        let mut flags = InputFlags::empty();
        flags.set(InputFlags::FIRE, self.fire);
        flags.set(InputFlags::USE, self.use_item);
        flags.set(InputFlags::RELOAD, self.reload);

        let mut input = PlayerInput {
            sequence,
            move_direction: self.move_direction.into(),
            aim_angle: self.aim_angle,
            timestamp_ms,
            ..Default::default()
        };
        input.set_flags(flags);
        input
    }
}

/// Limits how often input is sent; frames in between only feed prediction.
#[derive(Debug, Clone)]
pub struct InputThrottle {
    interval_ms: f64,
    last_sent_ms: Option<f64>,
}

impl InputThrottle {
    pub fn new(rate_hz: f64) -> Self {
        Self {
            interval_ms: 1000.0 / rate_hz.max(f64::MIN_POSITIVE),
            last_sent_ms: None,
        }
    }

    pub fn interval_ms(&self) -> f64 {
        self.interval_ms
    }

    /// True (and the send is recorded) when a send is due at `now_ms`.
    pub fn ready(&mut self, now_ms: f64) -> bool {
        match self.last_sent_ms {
            Some(last) if now_ms - last < self.interval_ms => false,
            _ => {
                self.last_sent_ms = Some(now_ms);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_state_maps_to_flags() {
        let state = InputState {
            move_direction: Vec2::new(1.0, 0.0),
            aim_angle: std::f32::consts::FRAC_PI_4,
            fire: true,
            ..Default::default()
        };

        let input = state.to_input(7, 1_000.0);
        assert_eq!(input.sequence, 7);
        assert_eq!(input.move_direction, [1.0, 0.0]);
        assert!(input.flags().contains(InputFlags::FIRE));
        assert!(!input.flags().contains(InputFlags::RELOAD));
    }

    #[test]
    fn throttle_allows_one_send_per_interval() {
        let mut throttle = InputThrottle::new(30.0);
        assert!(throttle.ready(0.0));
        assert!(!throttle.ready(10.0));
        assert!(!throttle.ready(33.0));
        assert!(throttle.ready(34.0));
        assert!(!throttle.ready(50.0));
    }
}
