mod bullet;
mod item;
mod player;
mod tree;

use glam::Vec2;

use crate::entity::Replicable;
use crate::snapshot::Snapshot;

pub use bullet::{BULLET_DAMAGE, BULLET_LIFETIME_SECS, BULLET_RADIUS, BULLET_SPEED, Bullet};
pub use item::Item;
pub use player::{FIRE_COOLDOWN_SECS, MAX_HEALTH, PLAYER_RADIUS, PLAYER_SPEED, Player};
pub use tree::Tree;

/// Movement shared by the server simulation and client prediction.
pub fn integrate_movement(position: Vec2, direction: Vec2, dt: f32) -> Vec2 {
    position + movement_velocity(direction) * dt
}

pub fn movement_velocity(direction: Vec2) -> Vec2 {
    direction.clamp_length_max(1.0) * PLAYER_SPEED
}

pub fn spawn_from_snapshot(snapshot: &Snapshot) -> Box<dyn Replicable> {
    match snapshot {
        Snapshot::Player(s) => Box::new(Player::from(s)),
        Snapshot::Bullet(s) => Box::new(Bullet::from(s)),
        Snapshot::Item(s) => Box::new(Item::from(s)),
        Snapshot::Tree(s) => Box::new(Tree::from(s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{EntityKind, TreeSnapshot};

    #[test]
    fn diagonal_input_is_not_faster() {
        let straight = integrate_movement(Vec2::ZERO, Vec2::X, 1.0);
        let diagonal = integrate_movement(Vec2::ZERO, Vec2::new(1.0, 1.0), 1.0);
        assert!((straight.length() - diagonal.length()).abs() < 1e-3);
    }

    #[test]
    fn factory_preserves_kind_and_id() {
        let snapshot = Snapshot::Tree(TreeSnapshot {
            id: "tree-3".to_string(),
            position: [4.0, 5.0],
            radius: 30.0,
        });
        let object = spawn_from_snapshot(&snapshot);
        assert_eq!(object.id(), "tree-3");
        assert_eq!(object.kind(), EntityKind::Tree);
        assert_eq!(object.snapshot(0), snapshot);
    }
}
