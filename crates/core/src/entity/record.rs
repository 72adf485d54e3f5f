use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::clock::{ClockSync, Tick};
use crate::entities;
use crate::snapshot::{EntityKind, Snapshot, SnapshotError, TickSnapshotStore};

use super::{FrameContext, Replicable, TickContext};

struct Replica {
    object: Box<dyn Replicable>,
    history: TickSnapshotStore<Snapshot>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Interpolated {
    pub from: Snapshot,
    pub to: Snapshot,
    pub fraction: f64,
}

impl Interpolated {
    pub fn blend(&self) -> Snapshot {
        self.from.interpolate(&self.to, self.fraction as f32)
    }
}

/// One ObjectDB row: the replicated object and its snapshot history, behind a
/// lock scoped to this entity alone.
pub struct EntityRecord {
    id: String,
    kind: EntityKind,
    replica: RwLock<Replica>,
}

impl fmt::Debug for EntityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRecord")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("history_len", &self.history_len())
            .finish()
    }
}

impl EntityRecord {
    pub fn new(object: Box<dyn Replicable>) -> Self {
        Self {
            id: object.id().to_string(),
            kind: object.kind(),
            replica: RwLock::new(Replica {
                object,
                history: TickSnapshotStore::new(),
            }),
        }
    }

    /// A client-side record for an id first seen in a network snapshot.
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self::new(entities::spawn_from_snapshot(snapshot))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    fn read(&self) -> RwLockReadGuard<'_, Replica> {
        self.replica.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Replica> {
        self.replica.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn append(&self, tick: Tick, snapshot: Snapshot) -> Result<(), SnapshotError> {
        self.write().history.append(tick, snapshot)
    }

    /// Newest stored snapshot, or the object's current state when nothing has
    /// been recorded yet.
    pub fn latest(&self, tick: Tick) -> Snapshot {
        let replica = self.read();
        match replica.history.latest() {
            Some(entry) => entry.snapshot.clone(),
            None => replica.object.snapshot(tick),
        }
    }

    pub fn latest_tick(&self) -> Option<Tick> {
        self.read().history.latest().map(|entry| entry.tick)
    }

    pub fn lookup(&self, clock: &ClockSync, time_ms: f64) -> Interpolated {
        let replica = self.read();
        match replica.history.lookup(clock, time_ms) {
            Some(bracket) => Interpolated {
                from: bracket.from.snapshot.clone(),
                to: bracket.to.snapshot.clone(),
                fraction: bracket.fraction,
            },
            None => {
                let current = replica.object.snapshot(clock.tick(time_ms));
                Interpolated {
                    from: current.clone(),
                    to: current,
                    fraction: 0.0,
                }
            }
        }
    }

    /// Capture the object's current state as the snapshot for `tick`.
    pub fn record(&self, tick: Tick) -> Result<(), SnapshotError> {
        let mut replica = self.write();
        let snapshot = replica.object.snapshot(tick);
        replica.history.append(tick, snapshot)
    }

    pub fn server_update(
        &self,
        ctx: &mut TickContext<'_>,
        clock: &ClockSync,
    ) -> Result<(), SnapshotError> {
        let mut replica = self.write();
        let Replica { object, history } = &mut *replica;

        object.server_update(ctx);
        history.append(ctx.tick, object.snapshot(ctx.tick))?;
        history.prune(clock, clock.now());
        Ok(())
    }

    /// Apply the interpolated state at the frame's render time. Returns the
    /// applied snapshot.
    pub fn render(&self, clock: &ClockSync, frame: &FrameContext) -> Snapshot {
        let tick = clock.tick(frame.render_time_ms);
        let mut replica = self.write();
        let Replica { object, history } = &mut *replica;

        let blended = match history.lookup(clock, frame.render_time_ms) {
            Some(bracket) => bracket
                .from
                .snapshot
                .interpolate(&bracket.to.snapshot, bracket.fraction as f32),
            None => object.snapshot(tick),
        };

        object.apply_snapshot(tick, &blended);
        object.client_update(frame);
        history.prune(clock, frame.now_ms);
        blended
    }

    /// Apply an explicit snapshot, bypassing interpolation.
    pub fn apply(&self, tick: Tick, snapshot: &Snapshot, frame: &FrameContext) {
        let mut replica = self.write();
        replica.object.apply_snapshot(tick, snapshot);
        replica.object.client_update(frame);
    }

    pub fn prune(&self, clock: &ClockSync, now_ms: f64) -> usize {
        self.write().history.prune(clock, now_ms)
    }

    pub fn exists(&self) -> bool {
        self.read().object.exists()
    }

    pub fn history_len(&self) -> usize {
        self.read().history.len()
    }

    pub fn with<R>(&self, f: impl FnOnce(&dyn Replicable) -> R) -> R {
        f(self.read().object.as_ref())
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut dyn Replicable) -> R) -> R {
        f(self.write().object.as_mut())
    }
}
