use glam::Vec2;
use rkyv::{Archive, Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Player,
    Bullet,
    Item,
    Tree,
}

impl EntityKind {
    /// World geometry the server never removes; its absence from a batch
    /// carries no meaning.
    pub fn is_static(self) -> bool {
        matches!(self, EntityKind::Tree)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Player => "player",
            EntityKind::Bullet => "bullet",
            EntityKind::Item => "item",
            EntityKind::Tree => "tree",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: String,
    pub name: String,
    pub position: [f32; 2],
    pub velocity: [f32; 2],
    pub aim_angle: f32,
    pub health: i32,
    pub alive: bool,
    pub last_input_sequence: u32,
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct BulletSnapshot {
    pub id: String,
    pub owner_id: String,
    pub position: [f32; 2],
    pub velocity: [f32; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub enum ItemKind {
    Pistol,
    Medkit,
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub id: String,
    pub kind: ItemKind,
    pub position: [f32; 2],
    pub holder_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct TreeSnapshot {
    pub id: String,
    pub position: [f32; 2],
    pub radius: f32,
}

/// Complete externally visible state of one entity at one tick.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub enum Snapshot {
    Player(PlayerSnapshot),
    Bullet(BulletSnapshot),
    Item(ItemSnapshot),
    Tree(TreeSnapshot),
}

impl Snapshot {
    pub fn id(&self) -> &str {
        match self {
            Snapshot::Player(s) => &s.id,
            Snapshot::Bullet(s) => &s.id,
            Snapshot::Item(s) => &s.id,
            Snapshot::Tree(s) => &s.id,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Snapshot::Player(_) => EntityKind::Player,
            Snapshot::Bullet(_) => EntityKind::Bullet,
            Snapshot::Item(_) => EntityKind::Item,
            Snapshot::Tree(_) => EntityKind::Tree,
        }
    }

    pub fn position(&self) -> Vec2 {
        let position = match self {
            Snapshot::Player(s) => s.position,
            Snapshot::Bullet(s) => s.position,
            Snapshot::Item(s) => s.position,
            Snapshot::Tree(s) => s.position,
        };
        Vec2::from(position)
    }

    pub fn with_position(mut self, position: Vec2) -> Snapshot {
        let slot = match &mut self {
            Snapshot::Player(s) => &mut s.position,
            Snapshot::Bullet(s) => &mut s.position,
            Snapshot::Item(s) => &mut s.position,
            Snapshot::Tree(s) => &mut s.position,
        };
        *slot = position.into();
        self
    }

    /// Blend from `self` (bracket A) towards `to` (bracket B).
    ///
    /// Continuous fields are lerped, discrete fields take B's value. Brackets of
    /// different kinds cannot be blended and yield B.
    pub fn interpolate(&self, to: &Snapshot, fraction: f32) -> Snapshot {
        match (self, to) {
            (Snapshot::Player(a), Snapshot::Player(b)) => Snapshot::Player(PlayerSnapshot {
                position: lerp2(a.position, b.position, fraction),
                velocity: lerp2(a.velocity, b.velocity, fraction),
                aim_angle: lerp_angle(a.aim_angle, b.aim_angle, fraction),
                ..b.clone()
            }),
            (Snapshot::Bullet(a), Snapshot::Bullet(b)) => Snapshot::Bullet(BulletSnapshot {
                position: lerp2(a.position, b.position, fraction),
                velocity: lerp2(a.velocity, b.velocity, fraction),
                ..b.clone()
            }),
            (Snapshot::Item(a), Snapshot::Item(b)) => Snapshot::Item(ItemSnapshot {
                position: lerp2(a.position, b.position, fraction),
                ..b.clone()
            }),
            _ => to.clone(),
        }
    }
}

fn lerp2(a: [f32; 2], b: [f32; 2], t: f32) -> [f32; 2] {
    Vec2::from(a).lerp(Vec2::from(b), t).into()
}

fn lerp_angle(a: f32, b: f32, t: f32) -> f32 {
    let two_pi = std::f32::consts::TAU;
    let mut delta = (b - a) % two_pi;
    if delta > std::f32::consts::PI {
        delta -= two_pi;
    } else if delta < -std::f32::consts::PI {
        delta += two_pi;
    }
    a + delta * t
}
