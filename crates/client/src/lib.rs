//! Client half of the replication core: registration with clock sync,
//! throttled input, the snapshot apply loop, per-frame interpolation and
//! local prediction with smoothed correction.

pub mod net;

pub use net::{
    ApplyReport, ClientConfig, ClientError, InputState, InputThrottle, NetworkClient, Prediction,
    Replicator, apply_world_snapshot, render_frame,
};
