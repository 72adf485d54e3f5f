use glam::Vec2;

use tether::Tick;
use tether::entities::integrate_movement;

const ERROR_THRESHOLD: f32 = 0.0001;

/// Local prediction of the player's own position with smoothed correction.
///
/// Input moves `predicted` immediately. When a newer authoritative position
/// arrives the difference is kept as `error` and blended out over
/// `blend_ms`, so corrections never jump unless they exceed the snap
/// threshold.
#[derive(Debug, Clone)]
pub struct Prediction {
    predicted: Vec2,
    error: Vec2,
    corrected_at_ms: f64,
    blend_ms: f64,
    snap_threshold: f32,
    last_tick: Option<Tick>,
}

impl Prediction {
    pub fn new(position: Vec2, blend_ms: f64, snap_threshold: f32) -> Self {
        Self {
            predicted: position,
            error: Vec2::ZERO,
            corrected_at_ms: 0.0,
            blend_ms: blend_ms.max(f64::MIN_POSITIVE),
            snap_threshold,
            last_tick: None,
        }
    }

    /// Same integration the server applies to player input.
    pub fn advance(&mut self, direction: Vec2, dt: f32) {
        self.predicted = integrate_movement(self.predicted, direction, dt);
    }

    fn progress(&self, now_ms: f64) -> f32 {
        ((now_ms - self.corrected_at_ms) / self.blend_ms).clamp(0.0, 1.0) as f32
    }

    /// Fold whatever part of the current correction has already been shown
    /// into `predicted`.
    fn fold(&mut self, now_ms: f64) {
        let shown = self.error * self.progress(now_ms);
        self.predicted -= shown;
        self.error -= shown;
    }

    /// Start correcting towards the authoritative position for `tick`.
    /// Returns false when `tick` is not newer than the last reconciled one.
    pub fn reconcile(&mut self, tick: Tick, authoritative: Vec2, now_ms: f64) -> bool {
        if self.last_tick.is_some_and(|last| tick <= last) {
            return false;
        }
        self.last_tick = Some(tick);

        self.fold(now_ms);
        self.error = self.predicted - authoritative;
        self.corrected_at_ms = now_ms;

        let magnitude = self.error.length();
        if magnitude > self.snap_threshold {
            log::debug!("prediction off by {:.1}, snapping", magnitude);
            self.predicted = authoritative;
            self.error = Vec2::ZERO;
        } else if magnitude < ERROR_THRESHOLD {
            self.error = Vec2::ZERO;
        }
        true
    }

    /// The position to show at `now_ms`. Completed corrections are folded in.
    pub fn position(&mut self, now_ms: f64) -> Vec2 {
        if self.error != Vec2::ZERO && self.progress(now_ms) >= 1.0 {
            self.predicted -= self.error;
            self.error = Vec2::ZERO;
        }
        self.predicted - self.error * self.progress(now_ms)
    }

    pub fn predicted(&self) -> Vec2 {
        self.predicted
    }

    pub fn error(&self) -> Vec2 {
        self.error
    }

    pub fn last_tick(&self) -> Option<Tick> {
        self.last_tick
    }

    pub fn reset(&mut self, position: Vec2) {
        self.predicted = position;
        self.error = Vec2::ZERO;
        self.last_tick = None;
    }
}
