use glam::Vec2;

use crate::clock::Tick;
use crate::entity::{Carryable, Circle, Collidable, Replicable, TickContext};
use crate::snapshot::{EntityKind, ItemKind, ItemSnapshot, Snapshot};

const PICKUP_RADIUS: f32 = 10.0;

#[derive(Debug, Clone)]
pub struct Item {
    id: String,
    kind: ItemKind,
    position: Vec2,
    holder_id: Option<String>,
}

impl Item {
    pub fn new(id: impl Into<String>, kind: ItemKind, position: Vec2) -> Self {
        Self {
            id: id.into(),
            kind,
            position,
            holder_id: None,
        }
    }

    pub fn held_by(mut self, holder_id: impl Into<String>) -> Self {
        self.holder_id = Some(holder_id.into());
        self
    }

    pub fn item_kind(&self) -> ItemKind {
        self.kind
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }
}

impl From<&ItemSnapshot> for Item {
    fn from(snapshot: &ItemSnapshot) -> Self {
        Self {
            id: snapshot.id.clone(),
            kind: snapshot.kind,
            position: Vec2::from(snapshot.position),
            holder_id: snapshot.holder_id.clone(),
        }
    }
}

impl Replicable for Item {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Item
    }

    fn snapshot(&self, _tick: Tick) -> Snapshot {
        Snapshot::Item(ItemSnapshot {
            id: self.id.clone(),
            kind: self.kind,
            position: self.position.into(),
            holder_id: self.holder_id.clone(),
        })
    }

    fn apply_snapshot(&mut self, _tick: Tick, snapshot: &Snapshot) {
        if let Snapshot::Item(s) = snapshot {
            self.kind = s.kind;
            self.position = Vec2::from(s.position);
            self.holder_id.clone_from(&s.holder_id);
        }
    }

    fn server_update(&mut self, _ctx: &mut TickContext<'_>) {}

    fn as_collidable(&self) -> Option<&dyn Collidable> {
        Some(self)
    }

    fn as_collidable_mut(&mut self) -> Option<&mut dyn Collidable> {
        Some(self)
    }

    fn as_carryable(&self) -> Option<&dyn Carryable> {
        Some(self)
    }

    fn as_carryable_mut(&mut self) -> Option<&mut dyn Carryable> {
        Some(self)
    }
}

impl Collidable for Item {
    fn bounds(&self) -> Circle {
        Circle::new(self.position, PICKUP_RADIUS)
    }

    // Held items ride along with their holder and never block bullets.
    fn collides_with(&self, _other_id: &str) -> bool {
        self.holder_id.is_none()
    }
}

impl Carryable for Item {
    fn holder(&self) -> Option<&str> {
        self.holder_id.as_deref()
    }

    fn pick_up(&mut self, holder_id: &str) {
        self.holder_id = Some(holder_id.to_string());
    }

    fn carry_to(&mut self, position: Vec2) {
        if self.holder_id.is_some() {
            self.position = position;
        }
    }

    fn drop_at(&mut self, position: Vec2) {
        self.holder_id = None;
        self.position = position;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carry_only_moves_held_items() {
        let mut item = Item::new("i1", ItemKind::Pistol, Vec2::ZERO);
        item.carry_to(Vec2::ONE);
        assert_eq!(item.position(), Vec2::ZERO);

        item.pick_up("p1");
        item.carry_to(Vec2::ONE);
        assert_eq!(item.position(), Vec2::ONE);
        assert_eq!(item.holder(), Some("p1"));

        item.drop_at(Vec2::new(5.0, 5.0));
        assert_eq!(item.holder(), None);
        assert_eq!(item.position(), Vec2::new(5.0, 5.0));
    }
}
