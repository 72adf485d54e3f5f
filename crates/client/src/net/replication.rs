use tether::snapshot::SnapshotError;
use tether::{EntityRecord, ObjectDb, Tick, WorldSnapshot};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub created: usize,
    pub appended: usize,
    pub stale: usize,
    pub removed: usize,
    pub skipped: bool,
}

/// Applies broadcasts in tick order. Pushes arrive over several connections,
/// so a batch older than the last applied one is dropped whole.
#[derive(Debug, Default)]
pub struct Replicator {
    last_tick: Option<Tick>,
}

impl Replicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_tick(&self) -> Option<Tick> {
        self.last_tick
    }

    pub fn apply(&mut self, db: &ObjectDb, world: &WorldSnapshot) -> ApplyReport {
        if let Some(last) = self.last_tick
            && world.tick < last
        {
            log::debug!("dropping world tick {} behind applied tick {}", world.tick, last);
            return ApplyReport {
                skipped: true,
                ..Default::default()
            };
        }
        self.last_tick = Some(world.tick);
        apply_world_snapshot(db, world)
    }
}

/// Fold one broadcast into the local store: unknown ids are created, every
/// entry is appended to its entity's history under the batch tick, and
/// non-static entities missing from the batch are dropped.
pub fn apply_world_snapshot(db: &ObjectDb, world: &WorldSnapshot) -> ApplyReport {
    let mut report = ApplyReport::default();

    for snapshot in &world.entities {
        let (record, created) =
            db.get_or_insert_with(snapshot.id(), || EntityRecord::from_snapshot(snapshot));
        if created {
            log::debug!("new {} {}", snapshot.kind().as_str(), snapshot.id());
            report.created += 1;
        }

        match record.append(world.tick, snapshot.clone()) {
            Ok(()) => report.appended += 1,
            Err(SnapshotError::StaleTick { .. }) => report.stale += 1,
        }
    }

    let removed = db.retain(|record| record.kind().is_static() || world.contains(record.id()));
    for record in &removed {
        log::debug!("{} left the world", record.id());
    }
    report.removed = removed.len();
    report
}
