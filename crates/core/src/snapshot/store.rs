use std::collections::VecDeque;

use crate::clock::{ClockSync, Tick};

#[derive(Debug, Clone, PartialEq)]
pub struct TickSnapshot<S> {
    pub tick: Tick,
    pub snapshot: S,
}

/// The two stored samples surrounding a requested instant.
#[derive(Debug, Clone, Copy)]
pub struct Bracket<'a, S> {
    pub from: &'a TickSnapshot<S>,
    pub to: &'a TickSnapshot<S>,
    /// Position between `from` and `to`, always in `[0, 1)`.
    pub fraction: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotError {
    #[error("tick {tick} is older than newest stored tick {newest}")]
    StaleTick { tick: Tick, newest: Tick },
}

/// Append-only log of one entity's snapshots, ordered by tick.
#[derive(Debug, Clone)]
pub struct TickSnapshotStore<S> {
    entries: VecDeque<TickSnapshot<S>>,
}

impl<S> Default for TickSnapshotStore<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> TickSnapshotStore<S> {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Ticks must arrive in non-decreasing order. Re-appending the newest tick
    /// replaces that entry.
    pub fn append(&mut self, tick: Tick, snapshot: S) -> Result<(), SnapshotError> {
        if let Some(newest) = self.entries.back_mut() {
            if tick < newest.tick {
                return Err(SnapshotError::StaleTick {
                    tick,
                    newest: newest.tick,
                });
            }
            if tick == newest.tick {
                newest.snapshot = snapshot;
                return Ok(());
            }
        }
        self.entries.push_back(TickSnapshot { tick, snapshot });
        Ok(())
    }

    pub fn latest(&self) -> Option<&TickSnapshot<S>> {
        self.entries.back()
    }

    pub fn oldest(&self) -> Option<&TickSnapshot<S>> {
        self.entries.front()
    }

    pub fn lookup(&self, clock: &ClockSync, time_ms: f64) -> Option<Bracket<'_, S>> {
        let requested = clock.tick(time_ms);
        let latest = self.entries.back()?;

        if latest.tick <= requested {
            return Some(Bracket {
                from: latest,
                to: latest,
                fraction: 0.0,
            });
        }

        // Walk back from the newest pair until from.tick <= requested < to.tick.
        let mut to = latest;
        for from in self.entries.iter().rev().skip(1) {
            if from.tick <= requested {
                let span = clock.timestep_ms() * (to.tick - from.tick) as f64;
                let fraction = if span > 0.0 {
                    (time_ms - clock.tick_time(from.tick)) / span
                } else {
                    0.0
                };
                return Some(Bracket {
                    from,
                    to,
                    fraction: fraction.clamp(0.0, 1.0 - f64::EPSILON),
                });
            }
            to = from;
        }

        // Older than anything retained: hold the oldest sample.
        let oldest = self.entries.front()?;
        Some(Bracket {
            from: oldest,
            to: oldest,
            fraction: 0.0,
        })
    }

    /// Drops entries older than `now - 2 * interpolation_delay`, keeping at
    /// least the newest one. Returns how many entries were removed.
    pub fn prune(&mut self, clock: &ClockSync, now_ms: f64) -> usize {
        let cutoff = now_ms - 2.0 * clock.interpolation_delay_ms();
        let mut removed = 0;
        while self.entries.len() > 1 {
            match self.entries.front() {
                Some(oldest) if clock.tick_time(oldest.tick) < cutoff => {
                    self.entries.pop_front();
                    removed += 1;
                }
                _ => break,
            }
        }
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = &TickSnapshot<S>> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::clock::ManualClock;
    use crate::config::Timing;

    fn clock() -> ClockSync {
        // start = 0, timestep = 15ms, interpolation delay = 100ms
        ClockSync::with_source(&Timing::default(), Arc::new(ManualClock::new(0.0)))
    }

    #[test]
    fn rejects_older_ticks_and_replaces_equal_ticks() {
        let mut store = TickSnapshotStore::new();
        store.append(5, "a").unwrap();
        store.append(5, "b").unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.latest().unwrap().snapshot, "b");

        assert_eq!(
            store.append(4, "c"),
            Err(SnapshotError::StaleTick { tick: 4, newest: 5 })
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn empty_store_has_no_bracket() {
        let store: TickSnapshotStore<u32> = TickSnapshotStore::new();
        assert!(store.lookup(&clock(), 1_000.0).is_none());
        assert!(store.latest().is_none());
    }

    #[test]
    fn lookup_midpoint_between_ticks() {
        let clock = clock();
        let mut store = TickSnapshotStore::new();
        store.append(10, 0.0f32).unwrap();
        store.append(20, 10.0f32).unwrap();

        let bracket = store.lookup(&clock, clock.tick_time(15)).unwrap();
        assert_eq!(bracket.from.tick, 10);
        assert_eq!(bracket.to.tick, 20);
        assert!((bracket.fraction - 0.5).abs() < 1e-9);
    }

    #[test]
    fn lookup_never_extrapolates_past_newest() {
        let clock = clock();
        let mut store = TickSnapshotStore::new();
        store.append(10, 1u32).unwrap();
        store.append(20, 2u32).unwrap();

        for time in [clock.tick_time(20), clock.tick_time(20) + 7.0, 99_999.0] {
            let bracket = store.lookup(&clock, time).unwrap();
            assert_eq!(bracket.from.tick, 20);
            assert_eq!(bracket.to.tick, 20);
            assert_eq!(bracket.fraction, 0.0);
        }
    }

    #[test]
    fn single_entry_holds_after_time_passes() {
        let source = Arc::new(ManualClock::new(0.0));
        let clock = ClockSync::with_source(&Timing::default(), source.clone());
        source.set(clock.tick_time(100));

        let mut store = TickSnapshotStore::new();
        store.append(100, glam::Vec2::new(10.0, 0.0)).unwrap();
        source.advance(200.0);

        let bracket = store.lookup(&clock, clock.render_time()).unwrap();
        assert_eq!(bracket.from.tick, 100);
        assert_eq!(bracket.to.tick, 100);
        assert_eq!(bracket.fraction, 0.0);
        assert_eq!(bracket.to.snapshot, glam::Vec2::new(10.0, 0.0));
    }

    #[test]
    fn lookup_holds_oldest_before_history() {
        let clock = clock();
        let mut store = TickSnapshotStore::new();
        store.append(10, 1u32).unwrap();
        store.append(20, 2u32).unwrap();

        let bracket = store.lookup(&clock, clock.tick_time(3)).unwrap();
        assert_eq!(bracket.from.tick, 10);
        assert_eq!(bracket.to.tick, 10);
        assert_eq!(bracket.fraction, 0.0);
    }

    #[test]
    fn fraction_stays_in_unit_interval() {
        let clock = clock();
        let mut store = TickSnapshotStore::new();
        for (i, tick) in [0, 3, 4, 9, 17, 18, 30].into_iter().enumerate() {
            store.append(tick, i).unwrap();
        }

        let mut time = -20.0;
        while time < clock.tick_time(35) {
            let bracket = store.lookup(&clock, time).unwrap();
            assert!(bracket.fraction >= 0.0 && bracket.fraction < 1.0);
            assert!(bracket.from.tick <= bracket.to.tick);
            time += 0.9;
        }
    }

    #[test]
    fn prune_respects_retention_window() {
        let clock = clock();
        let mut store = TickSnapshotStore::new();
        for tick in 0..100 {
            store.append(tick, tick).unwrap();
        }

        // now = 1500ms, cutoff = 1500 - 200 = 1300ms = tick_time(86.67)
        let now = clock.tick_time(100);
        let removed = store.prune(&clock, now);
        let cutoff = now - 2.0 * clock.interpolation_delay_ms();

        assert!(removed > 0);
        assert!(store.iter().all(|e| clock.tick_time(e.tick) >= cutoff));
        assert_eq!(store.oldest().unwrap().tick, 87);
        assert_eq!(store.latest().unwrap().tick, 99);
    }

    #[test]
    fn prune_keeps_single_newest_entry() {
        let clock = clock();
        let mut store = TickSnapshotStore::new();
        store.append(1, "old").unwrap();
        store.append(2, "newest").unwrap();

        store.prune(&clock, 1_000_000.0);

        assert_eq!(store.len(), 1);
        assert_eq!(store.latest().unwrap().snapshot, "newest");
    }
}
