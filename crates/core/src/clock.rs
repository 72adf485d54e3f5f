use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::Timing;

/// Index of one fixed simulation step. Tick 0 starts at the server's start time.
pub type Tick = i64;

pub trait TimeSource: Send + Sync + fmt::Debug {
    /// Wall-clock milliseconds since the UNIX epoch.
    fn now_ms(&self) -> f64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now_ms(&self) -> f64 {
        current_time_ms()
    }
}

/// A time source that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_bits: AtomicU64,
}

impl ManualClock {
    pub fn new(now_ms: f64) -> Self {
        Self {
            now_bits: AtomicU64::new(now_ms.to_bits()),
        }
    }

    pub fn set(&self, now_ms: f64) {
        self.now_bits.store(now_ms.to_bits(), Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: f64) {
        self.set(self.now_ms() + delta_ms);
    }
}

impl TimeSource for ManualClock {
    fn now_ms(&self) -> f64 {
        f64::from_bits(self.now_bits.load(Ordering::SeqCst))
    }
}

/// Offset between this peer's wall clock and the server's, plus the tick anchor.
///
/// One writer (the registration path on a client) and many readers. Both the
/// offset and the start time live in atomics so readers never block.
#[derive(Debug)]
pub struct ClockSync {
    source: Arc<dyn TimeSource>,
    timestep_ms: f64,
    interpolation_delay_ms: f64,
    offset_bits: AtomicU64,
    start_bits: AtomicU64,
    synchronized: AtomicBool,
}

impl ClockSync {
    /// A clock that is not yet synchronized with any server.
    pub fn new(timing: &Timing) -> Self {
        Self::with_source(timing, Arc::new(SystemClock))
    }

    pub fn with_source(timing: &Timing, source: Arc<dyn TimeSource>) -> Self {
        Self {
            source,
            timestep_ms: timing.timestep_ms,
            interpolation_delay_ms: timing.interpolation_delay_ms,
            offset_bits: AtomicU64::new(0f64.to_bits()),
            start_bits: AtomicU64::new(0f64.to_bits()),
            synchronized: AtomicBool::new(false),
        }
    }

    /// The server's own clock: zero offset, tick 0 anchored at "now".
    pub fn authoritative(timing: &Timing, source: Arc<dyn TimeSource>) -> Self {
        let clock = Self::with_source(timing, source);
        clock.set_start_time(clock.local_now());
        clock.synchronized.store(true, Ordering::SeqCst);
        clock
    }

    pub fn sync(&self, server_time_ms: f64, round_trip_ms: f64) {
        let offset = (server_time_ms - self.local_now()) + round_trip_ms / 2.0;
        self.offset_bits.store(offset.to_bits(), Ordering::SeqCst);
        self.synchronized.store(true, Ordering::SeqCst);
        log::debug!(
            "clock synchronized: offset {:.1}ms (rtt {:.1}ms)",
            offset,
            round_trip_ms
        );
    }

    pub fn set_start_time(&self, start_ms: f64) {
        self.start_bits.store(start_ms.to_bits(), Ordering::SeqCst);
    }

    pub fn is_synchronized(&self) -> bool {
        self.synchronized.load(Ordering::SeqCst)
    }

    pub fn local_now(&self) -> f64 {
        self.source.now_ms()
    }

    pub fn offset_ms(&self) -> f64 {
        f64::from_bits(self.offset_bits.load(Ordering::SeqCst))
    }

    pub fn start_time(&self) -> f64 {
        f64::from_bits(self.start_bits.load(Ordering::SeqCst))
    }

    pub fn timestep_ms(&self) -> f64 {
        self.timestep_ms
    }

    pub fn interpolation_delay_ms(&self) -> f64 {
        self.interpolation_delay_ms
    }

    /// The authoritative instant.
    pub fn now(&self) -> f64 {
        self.local_now() + self.offset_ms()
    }

    /// The instant rendered for remote entities, deliberately behind `now()`.
    pub fn render_time(&self) -> f64 {
        self.now() - self.interpolation_delay_ms
    }

    pub fn tick(&self, time_ms: f64) -> Tick {
        ((time_ms - self.start_time()) / self.timestep_ms).floor() as Tick
    }

    pub fn tick_time(&self, tick: Tick) -> f64 {
        self.start_time() + tick as f64 * self.timestep_ms
    }

    pub fn current_tick(&self) -> Tick {
        self.tick(self.now())
    }

    /// `None` until the clock has been synchronized; ticks derived before that
    /// point are meaningless.
    pub fn try_current_tick(&self) -> Option<Tick> {
        self.is_synchronized().then(|| self.current_tick())
    }
}

pub fn current_time_ms() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64() * 1000.0)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual(now_ms: f64) -> (Arc<ManualClock>, ClockSync) {
        let source = Arc::new(ManualClock::new(now_ms));
        let clock = ClockSync::with_source(&Timing::default(), source.clone());
        (source, clock)
    }

    #[test]
    fn sync_accounts_for_half_round_trip() {
        let (_, clock) = manual(1_000.0);
        assert!(!clock.is_synchronized());
        assert!(clock.try_current_tick().is_none());

        clock.sync(5_000.0, 40.0);

        assert!(clock.is_synchronized());
        assert_eq!(clock.offset_ms(), 4_020.0);
        assert_eq!(clock.now(), 5_020.0);
        assert_eq!(clock.render_time(), 5_020.0 - clock.interpolation_delay_ms());
    }

    #[test]
    fn tick_round_trips_through_tick_time() {
        let (_, clock) = manual(0.0);
        clock.set_start_time(1_000.0);

        assert_eq!(clock.tick(1_000.0), 0);
        assert_eq!(clock.tick(1_014.9), 0);
        assert_eq!(clock.tick(1_015.0), 1);
        assert_eq!(clock.tick(985.0), -1);
        assert_eq!(clock.tick(984.9), -2);
        for tick in [0, 1, 7, 100, 12_345] {
            assert_eq!(clock.tick(clock.tick_time(tick)), tick);
        }
    }

    #[test]
    fn tick_is_monotonic_in_time() {
        let (_, clock) = manual(0.0);
        clock.set_start_time(123.456);
        clock.sync(10_000.0, 33.0);

        let mut previous = clock.tick(0.0);
        let mut t = 0.0;
        while t < 5_000.0 {
            t += 0.37;
            let tick = clock.tick(t);
            assert!(tick >= previous, "tick went backwards at {t}");
            previous = tick;
        }
    }

    #[test]
    fn authoritative_clock_starts_at_tick_zero() {
        let source = Arc::new(ManualClock::new(50_000.0));
        let clock = ClockSync::authoritative(&Timing::default(), source.clone());

        assert!(clock.is_synchronized());
        assert_eq!(clock.try_current_tick(), Some(0));

        source.advance(150.0);
        assert_eq!(clock.current_tick(), 10);
    }
}
