use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use glam::Vec2;

use tether::entities::PLAYER_RADIUS;
use tether::snapshot::Snapshot;
use tether::{Circle, EntityKind, EntityRecord, Tick, TickContext};

use crate::events::ServerEvent;
use crate::server::GameServer;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: Tick,
    pub updated: usize,
    pub spawned: usize,
    pub hits: usize,
    pub removed: usize,
}

/// The tick to simulate after `last` when wall time says `current`. Falling
/// more than `max_catch_up` ticks behind jumps straight to the present.
pub fn next_tick(last: Tick, current: Tick, max_catch_up: i64) -> Tick {
    if current - last > max_catch_up {
        current
    } else {
        last + 1
    }
}

struct PlayerState {
    position: Vec2,
    alive: bool,
}

impl GameServer {
    /// Advance the world by one fixed step and record every entity's state
    /// for `tick`.
    pub fn run_tick(&self, tick: Tick) -> TickReport {
        let clock = self.clock();
        let mut ctx = TickContext::new(tick, self.config().timing.dt(), self.ids());
        let mut report = TickReport {
            tick,
            ..Default::default()
        };

        let records = self.db().select_all();
        for record in &records {
            match record.server_update(&mut ctx, clock) {
                Ok(()) => report.updated += 1,
                Err(e) => log::warn!("{}: {}", record.id(), e),
            }
        }

        let players = player_states(&records, tick);
        self.move_items(&records, &players, tick);
        report.hits = self.resolve_bullets(&records, tick);

        for object in ctx.take_spawned() {
            self.spawn(object, tick);
            report.spawned += 1;
        }

        let removed = self.db().retain(|record| record.exists());
        for record in &removed {
            log::trace!("{} left the world at tick {}", record.id(), tick);
        }
        report.removed = removed.len();

        self.set_last_tick(tick);
        report
    }

    /// Held items follow their holder. Loose items are picked up by the first
    /// live player standing on them.
    fn move_items(
        &self,
        records: &[Arc<EntityRecord>],
        players: &HashMap<String, PlayerState>,
        tick: Tick,
    ) {
        for record in records.iter().filter(|r| r.kind() == EntityKind::Item) {
            let changed = record.with_mut(|object| {
                let Some(item) = object.as_carryable_mut() else {
                    return false;
                };

                if let Some(holder) = item.holder().map(str::to_string) {
                    match players.get(&holder) {
                        Some(player) => item.carry_to(player.position),
                        None => {
                            let position = object.snapshot(tick).position();
                            if let Some(item) = object.as_carryable_mut() {
                                item.drop_at(position);
                            }
                        }
                    }
                    return true;
                }

                let Some(bounds) = object.as_collidable().map(|c| c.bounds()) else {
                    return false;
                };
                let finder = players.iter().find(|(_, player)| {
                    player.alive && Circle::new(player.position, PLAYER_RADIUS).overlaps(&bounds)
                });
                match (finder, object.as_carryable_mut()) {
                    (Some((player_id, _)), Some(item)) => {
                        log::debug!("{} picked up an item", player_id);
                        item.pick_up(player_id);
                        true
                    }
                    _ => false,
                }
            });

            if changed && let Err(e) = record.record(tick) {
                log::warn!("{}: {}", record.id(), e);
            }
        }
    }

    /// Each live bullet hits at most one target per tick. Locks are taken one
    /// record at a time.
    fn resolve_bullets(&self, records: &[Arc<EntityRecord>], tick: Tick) -> usize {
        let (bullets, targets): (Vec<_>, Vec<_>) = records
            .iter()
            .filter(|r| {
                matches!(
                    r.kind(),
                    EntityKind::Bullet | EntityKind::Player | EntityKind::Tree
                )
            })
            .partition(|r| r.kind() == EntityKind::Bullet);

        let mut hits = 0;
        for bullet in bullets {
            let Some((bounds, damage)) = bullet.with(|object| {
                object
                    .as_collidable()
                    .map(|c| (c.bounds(), c.contact_damage()))
            }) else {
                continue;
            };
            if damage <= 0 {
                continue;
            }

            let target = targets.iter().find(|target| {
                let reachable = bullet.with(|object| {
                    object
                        .as_collidable()
                        .is_some_and(|c| c.collides_with(target.id()))
                });
                reachable
                    && target.with(|object| {
                        object.as_collidable().is_some_and(|c| {
                            c.collides_with(bullet.id()) && c.bounds().overlaps(&bounds)
                        })
                    })
            });
            let Some(target) = target.copied() else {
                continue;
            };

            bullet.with_mut(|object| {
                if let Some(c) = object.as_collidable_mut() {
                    c.on_collision(target.id());
                }
            });
            let health = target.with_mut(|object| {
                if let Some(c) = object.as_collidable_mut() {
                    c.on_collision(bullet.id());
                }
                object.as_damageable_mut().map(|d| {
                    d.apply_damage(damage);
                    d.health()
                })
            });

            for record in [bullet, target] {
                if let Err(e) = record.record(tick) {
                    log::warn!("{}: {}", record.id(), e);
                }
            }
            hits += 1;

            if health == Some(0) {
                let by = match bullet.latest(tick) {
                    Snapshot::Bullet(snapshot) => snapshot.owner_id,
                    other => other.id().to_string(),
                };
                self.events().push(ServerEvent::PlayerEliminated {
                    player_id: target.id().to_string(),
                    by,
                });
            }
        }
        hits
    }
}

fn player_states(records: &[Arc<EntityRecord>], tick: Tick) -> HashMap<String, PlayerState> {
    records
        .iter()
        .filter(|r| r.kind() == EntityKind::Player)
        .filter_map(|record| match record.latest(tick) {
            Snapshot::Player(player) => Some((
                player.id,
                PlayerState {
                    position: Vec2::from(player.position),
                    alive: player.alive,
                },
            )),
            _ => None,
        })
        .collect()
}

/// Fixed-step loop. Sleeps until each tick's start time and runs the ticks in
/// order, skipping ahead when it falls too far behind.
pub async fn run_simulation(server: Arc<GameServer>) {
    let max_catch_up = server.config().max_catch_up_ticks;
    let mut last = server.clock().current_tick();
    log::info!(
        "simulation running at {:.1}ms per tick from tick {}",
        server.clock().timestep_ms(),
        last
    );

    loop {
        let wait_ms = server.clock().tick_time(last + 1) - server.clock().now();
        if wait_ms > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(wait_ms / 1000.0)).await;
        }

        let current = server.clock().current_tick();
        let tick = next_tick(last, current, max_catch_up);
        if tick > last + 1 {
            log::warn!(
                "simulation fell {} ticks behind, skipping to tick {}",
                current - last,
                tick
            );
        }

        let report = server.run_tick(tick);
        if report.spawned > 0 || report.removed > 0 || report.hits > 0 {
            log::trace!("{:?}", report);
        }
        last = tick;
    }
}
