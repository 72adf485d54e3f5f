mod store;
mod types;
mod world;

pub use store::{Bracket, SnapshotError, TickSnapshot, TickSnapshotStore};
pub use types::{
    BulletSnapshot, EntityKind, ItemKind, ItemSnapshot, PlayerSnapshot, Snapshot, TreeSnapshot,
};
pub use world::WorldSnapshot;
