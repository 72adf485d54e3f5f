//! State replication for an authoritative real-time game server and its
//! clients: clock sync, tick-indexed snapshot history with interpolation, the
//! entity store, and the two-channel framed transport.

pub mod clock;
pub mod config;
pub mod db;
pub mod entities;
pub mod entity;
pub mod net;
pub mod snapshot;

pub use clock::{ClockSync, ManualClock, SystemClock, Tick, TimeSource, current_time_ms};
pub use config::{
    DEFAULT_PUSH_PORT, DEFAULT_REQUEST_PORT, MAX_FRAME_SIZE, Timing, TransportConfig,
};
pub use db::ObjectDb;
pub use entity::{
    Carryable, Circle, Collidable, Controllable, Damageable, EntityRecord, FrameContext,
    IdAllocator, Interpolated, Replicable, TickContext,
};
pub use snapshot::{
    EntityKind, Snapshot, SnapshotError, TickSnapshot, TickSnapshotStore, WorldSnapshot,
};
