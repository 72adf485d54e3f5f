use glam::Vec2;

use crate::clock::Tick;
use crate::entity::{Circle, Collidable, Replicable, TickContext};
use crate::snapshot::{EntityKind, Snapshot, TreeSnapshot};

/// Static world geometry. Never moves, never removed.
#[derive(Debug, Clone)]
pub struct Tree {
    id: String,
    position: Vec2,
    radius: f32,
}

impl Tree {
    pub fn new(id: impl Into<String>, position: Vec2, radius: f32) -> Self {
        Self {
            id: id.into(),
            position,
            radius,
        }
    }
}

impl From<&TreeSnapshot> for Tree {
    fn from(snapshot: &TreeSnapshot) -> Self {
        Tree::new(snapshot.id.clone(), Vec2::from(snapshot.position), snapshot.radius)
    }
}

impl Replicable for Tree {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Tree
    }

    fn snapshot(&self, _tick: Tick) -> Snapshot {
        Snapshot::Tree(TreeSnapshot {
            id: self.id.clone(),
            position: self.position.into(),
            radius: self.radius,
        })
    }

    fn apply_snapshot(&mut self, _tick: Tick, snapshot: &Snapshot) {
        if let Snapshot::Tree(s) = snapshot {
            self.position = Vec2::from(s.position);
            self.radius = s.radius;
        }
    }

    fn server_update(&mut self, _ctx: &mut TickContext<'_>) {}

    fn as_collidable(&self) -> Option<&dyn Collidable> {
        Some(self)
    }

    fn as_collidable_mut(&mut self) -> Option<&mut dyn Collidable> {
        Some(self)
    }
}

impl Collidable for Tree {
    fn bounds(&self) -> Circle {
        Circle::new(self.position, self.radius)
    }
}
