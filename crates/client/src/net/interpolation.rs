use glam::Vec2;

use tether::{ClockSync, FrameContext, ObjectDb, Snapshot};

/// The locally controlled entity and where prediction puts it this frame.
#[derive(Debug, Clone, Copy)]
pub struct LocalOverride<'a> {
    pub id: &'a str,
    pub position: Vec2,
}

/// Bring every entity to the state shown this frame and return those states.
///
/// Remote entities are interpolated at `frame.render_time_ms`. The local
/// entity takes its newest authoritative snapshot with the predicted position
/// swapped in.
pub fn render_frame(
    db: &ObjectDb,
    clock: &ClockSync,
    local: Option<LocalOverride<'_>>,
    frame: &FrameContext,
) -> Vec<Snapshot> {
    let tick = clock.tick(frame.now_ms);
    db.select_all()
        .iter()
        .map(|record| match local {
            Some(local) if local.id == record.id() => {
                let snapshot = record.latest(tick).with_position(local.position);
                record.apply(tick, &snapshot, frame);
                record.prune(clock, frame.now_ms);
                snapshot
            }
            _ => record.render(clock, frame),
        })
        .collect()
}
