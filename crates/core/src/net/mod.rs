mod client;
mod error;
mod frame;
mod peers;
mod pool;
mod protocol;
mod server;

pub use client::ClientTransport;
pub use error::{FrameError, PoolError, ProtocolError, TransportError};
pub use frame::{Connection, decode_frame, encode_frame};
pub use peers::{Peer, PeerRegistry, SharedFrame, TransportStats, TransportStatsSnapshot};
pub use pool::ConnectionPool;
pub use protocol::{
    ArchivedPacket, Command, GAME_VERSION, InputAck, InputFlags, PROTOCOL_MAGIC,
    PROTOCOL_VERSION, Packet, PacketHeader, Payload, PlayerInput, Push, RegisterOutcome,
    RegisterPlayer, Registration, Request, Response, SetPlayerInput,
};
pub use server::{RequestHandler, ServerTransport};
