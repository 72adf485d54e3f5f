mod record;

use std::sync::atomic::{AtomicU64, Ordering};

use glam::Vec2;

use crate::clock::Tick;
use crate::net::PlayerInput;
use crate::snapshot::{EntityKind, Snapshot};

pub use record::{EntityRecord, Interpolated};

/// The only surface the replication core needs from a game entity.
pub trait Replicable: Send + Sync {
    fn id(&self) -> &str;

    fn kind(&self) -> EntityKind;

    fn snapshot(&self, tick: Tick) -> Snapshot;

    /// Overwrite visible state from an authoritative or interpolated sample.
    /// Samples of another kind are ignored.
    fn apply_snapshot(&mut self, tick: Tick, snapshot: &Snapshot);

    fn server_update(&mut self, ctx: &mut TickContext<'_>);

    fn client_update(&mut self, _frame: &FrameContext) {}

    fn exists(&self) -> bool {
        true
    }

    fn as_collidable(&self) -> Option<&dyn Collidable> {
        None
    }

    fn as_collidable_mut(&mut self) -> Option<&mut dyn Collidable> {
        None
    }

    fn as_damageable_mut(&mut self) -> Option<&mut dyn Damageable> {
        None
    }

    fn as_controllable_mut(&mut self) -> Option<&mut dyn Controllable> {
        None
    }

    fn as_carryable(&self) -> Option<&dyn Carryable> {
        None
    }

    fn as_carryable_mut(&mut self) -> Option<&mut dyn Carryable> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub center: Vec2,
    pub radius: f32,
}

impl Circle {
    pub fn new(center: Vec2, radius: f32) -> Self {
        Self { center, radius }
    }

    pub fn overlaps(&self, other: &Circle) -> bool {
        let reach = self.radius + other.radius;
        self.center.distance_squared(other.center) <= reach * reach
    }
}

pub trait Collidable {
    fn bounds(&self) -> Circle;

    /// Damage dealt to a [`Damageable`] on contact.
    fn contact_damage(&self) -> i32 {
        0
    }

    fn collides_with(&self, _other_id: &str) -> bool {
        true
    }

    fn on_collision(&mut self, _other_id: &str) {}
}

pub trait Damageable {
    fn health(&self) -> i32;

    fn apply_damage(&mut self, amount: i32);

    fn is_alive(&self) -> bool {
        self.health() > 0
    }
}

pub trait Controllable {
    /// Returns false when the input is older than the last one applied.
    fn set_input(&mut self, input: &PlayerInput) -> bool;

    fn position(&self) -> Vec2;
}

pub trait Carryable {
    fn holder(&self) -> Option<&str>;

    fn pick_up(&mut self, holder_id: &str);

    /// Follow the holder. Ignored while nobody holds the item.
    fn carry_to(&mut self, position: Vec2);

    fn drop_at(&mut self, position: Vec2);
}

#[derive(Debug, Default)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&self, prefix: &str) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{prefix}{n}")
    }
}

/// Per-tick state handed to every entity during `server_update`.
pub struct TickContext<'a> {
    pub tick: Tick,
    pub dt: f32,
    ids: &'a IdAllocator,
    spawned: Vec<Box<dyn Replicable>>,
}

impl<'a> TickContext<'a> {
    pub fn new(tick: Tick, dt: f32, ids: &'a IdAllocator) -> Self {
        Self {
            tick,
            dt,
            ids,
            spawned: Vec::new(),
        }
    }

    pub fn allocate_id(&self, prefix: &str) -> String {
        self.ids.allocate(prefix)
    }

    /// Queue an entity to join the world once this tick's updates finish.
    pub fn spawn(&mut self, entity: Box<dyn Replicable>) {
        self.spawned.push(entity);
    }

    pub fn take_spawned(&mut self) -> Vec<Box<dyn Replicable>> {
        std::mem::take(&mut self.spawned)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FrameContext {
    pub now_ms: f64,
    pub render_time_ms: f64,
    pub dt: f32,
}
