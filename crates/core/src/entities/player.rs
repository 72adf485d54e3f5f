use glam::Vec2;

use crate::clock::Tick;
use crate::entity::{Circle, Collidable, Controllable, Damageable, Replicable, TickContext};
use crate::net::{InputFlags, PlayerInput};
use crate::snapshot::{EntityKind, PlayerSnapshot, Snapshot};

use super::{Bullet, integrate_movement, movement_velocity};

pub const PLAYER_SPEED: f32 = 220.0;
pub const PLAYER_RADIUS: f32 = 16.0;
pub const MAX_HEALTH: i32 = 100;
pub const FIRE_COOLDOWN_SECS: f32 = 0.25;

#[derive(Debug, Clone)]
pub struct Player {
    id: String,
    name: String,
    position: Vec2,
    velocity: Vec2,
    aim_angle: f32,
    health: i32,
    input: PlayerInput,
    last_input_sequence: u32,
    fire_cooldown: f32,
}

impl Player {
    pub fn new(id: impl Into<String>, name: impl Into<String>, position: Vec2) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            position,
            velocity: Vec2::ZERO,
            aim_angle: 0.0,
            health: MAX_HEALTH,
            input: PlayerInput::default(),
            last_input_sequence: 0,
            fire_cooldown: 0.0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_position(&mut self, position: Vec2) {
        self.position = position;
    }

    pub fn velocity(&self) -> Vec2 {
        self.velocity
    }

    pub fn last_input_sequence(&self) -> u32 {
        self.last_input_sequence
    }

    fn aim_direction(&self) -> Vec2 {
        Vec2::from_angle(self.aim_angle)
    }

    fn fire(&mut self, ctx: &mut TickContext<'_>) {
        let direction = self.aim_direction();
        let muzzle = self.position + direction * (PLAYER_RADIUS + super::BULLET_RADIUS + 1.0);
        let bullet = Bullet::new(
            ctx.allocate_id("bullet-"),
            self.id.clone(),
            muzzle,
            direction * super::BULLET_SPEED,
        );
        log::debug!("{} fired {}", self.id, bullet.id());
        ctx.spawn(Box::new(bullet));
        self.fire_cooldown = FIRE_COOLDOWN_SECS;
    }
}

impl From<&PlayerSnapshot> for Player {
    fn from(snapshot: &PlayerSnapshot) -> Self {
        let mut player = Player::new(
            snapshot.id.clone(),
            snapshot.name.clone(),
            Vec2::from(snapshot.position),
        );
        player.apply(snapshot);
        player
    }
}

impl Player {
    fn apply(&mut self, snapshot: &PlayerSnapshot) {
        self.name.clone_from(&snapshot.name);
        self.position = Vec2::from(snapshot.position);
        self.velocity = Vec2::from(snapshot.velocity);
        self.aim_angle = snapshot.aim_angle;
        self.health = snapshot.health;
        self.last_input_sequence = snapshot.last_input_sequence;
    }
}

impl Replicable for Player {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Player
    }

    fn snapshot(&self, _tick: Tick) -> Snapshot {
        Snapshot::Player(PlayerSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            position: self.position.into(),
            velocity: self.velocity.into(),
            aim_angle: self.aim_angle,
            health: self.health,
            alive: self.is_alive(),
            last_input_sequence: self.last_input_sequence,
        })
    }

    fn apply_snapshot(&mut self, _tick: Tick, snapshot: &Snapshot) {
        if let Snapshot::Player(s) = snapshot {
            self.apply(s);
        }
    }

    fn server_update(&mut self, ctx: &mut TickContext<'_>) {
        self.fire_cooldown = (self.fire_cooldown - ctx.dt).max(0.0);

        if !self.is_alive() {
            self.velocity = Vec2::ZERO;
            return;
        }

        let direction = self.input.direction();
        self.velocity = movement_velocity(direction);
        self.position = integrate_movement(self.position, direction, ctx.dt);

        if self.input.flags().contains(InputFlags::FIRE) && self.fire_cooldown <= 0.0 {
            self.fire(ctx);
        }
    }

    fn as_collidable(&self) -> Option<&dyn Collidable> {
        Some(self)
    }

    fn as_collidable_mut(&mut self) -> Option<&mut dyn Collidable> {
        Some(self)
    }

    fn as_damageable_mut(&mut self) -> Option<&mut dyn Damageable> {
        Some(self)
    }

    fn as_controllable_mut(&mut self) -> Option<&mut dyn Controllable> {
        Some(self)
    }
}

impl Collidable for Player {
    fn bounds(&self) -> Circle {
        Circle::new(self.position, PLAYER_RADIUS)
    }

    fn collides_with(&self, _other_id: &str) -> bool {
        self.is_alive()
    }
}

impl Damageable for Player {
    fn health(&self) -> i32 {
        self.health
    }

    fn apply_damage(&mut self, amount: i32) {
        self.health = (self.health - amount).clamp(0, MAX_HEALTH);
        if self.health == 0 {
            log::info!("{} ({}) was eliminated", self.name, self.id);
        }
    }
}

impl Controllable for Player {
    fn set_input(&mut self, input: &PlayerInput) -> bool {
        if input.sequence < self.last_input_sequence {
            return false;
        }
        self.last_input_sequence = input.sequence;
        self.aim_angle = input.aim_angle;
        self.input = input.clone();
        true
    }

    fn position(&self) -> Vec2 {
        self.position
    }
}
