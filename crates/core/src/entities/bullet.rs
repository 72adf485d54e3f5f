use glam::Vec2;

use crate::clock::Tick;
use crate::entity::{Circle, Collidable, Replicable, TickContext};
use crate::snapshot::{BulletSnapshot, EntityKind, Snapshot};

pub const BULLET_SPEED: f32 = 900.0;
pub const BULLET_RADIUS: f32 = 3.0;
pub const BULLET_DAMAGE: i32 = 25;
pub const BULLET_LIFETIME_SECS: f32 = 1.5;

#[derive(Debug, Clone)]
pub struct Bullet {
    id: String,
    owner_id: String,
    position: Vec2,
    velocity: Vec2,
    remaining_secs: f32,
    spent: bool,
}

impl Bullet {
    pub fn new(
        id: impl Into<String>,
        owner_id: impl Into<String>,
        position: Vec2,
        velocity: Vec2,
    ) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            position,
            velocity,
            remaining_secs: BULLET_LIFETIME_SECS,
            spent: false,
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }
}

impl From<&BulletSnapshot> for Bullet {
    fn from(snapshot: &BulletSnapshot) -> Self {
        Bullet::new(
            snapshot.id.clone(),
            snapshot.owner_id.clone(),
            Vec2::from(snapshot.position),
            Vec2::from(snapshot.velocity),
        )
    }
}

impl Replicable for Bullet {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Bullet
    }

    fn snapshot(&self, _tick: Tick) -> Snapshot {
        Snapshot::Bullet(BulletSnapshot {
            id: self.id.clone(),
            owner_id: self.owner_id.clone(),
            position: self.position.into(),
            velocity: self.velocity.into(),
        })
    }

    fn apply_snapshot(&mut self, _tick: Tick, snapshot: &Snapshot) {
        if let Snapshot::Bullet(s) = snapshot {
            self.position = Vec2::from(s.position);
            self.velocity = Vec2::from(s.velocity);
        }
    }

    fn server_update(&mut self, ctx: &mut TickContext<'_>) {
        self.position += self.velocity * ctx.dt;
        self.remaining_secs -= ctx.dt;
    }

    fn exists(&self) -> bool {
        !self.spent && self.remaining_secs > 0.0
    }

    fn as_collidable(&self) -> Option<&dyn Collidable> {
        Some(self)
    }

    fn as_collidable_mut(&mut self) -> Option<&mut dyn Collidable> {
        Some(self)
    }
}

impl Collidable for Bullet {
    fn bounds(&self) -> Circle {
        Circle::new(self.position, BULLET_RADIUS)
    }

    fn contact_damage(&self) -> i32 {
        if self.spent { 0 } else { BULLET_DAMAGE }
    }

    fn collides_with(&self, other_id: &str) -> bool {
        other_id != self.owner_id && other_id != self.id
    }

    fn on_collision(&mut self, other_id: &str) {
        log::debug!("{} hit {}", self.id, other_id);
        self.spent = true;
    }
}
