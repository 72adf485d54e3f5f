pub mod client;
pub mod config;
pub mod input;
pub mod interpolation;
pub mod prediction;
pub mod replication;

pub use client::{ClientError, NetworkClient};
pub use config::ClientConfig;
pub use input::{InputState, InputThrottle};
pub use interpolation::{LocalOverride, render_frame};
pub use prediction::Prediction;
pub use replication::{ApplyReport, Replicator, apply_world_snapshot};
