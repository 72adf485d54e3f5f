use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use rkyv::rancor;

use super::protocol::Command;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("connection closed")]
    Closed,
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("frame of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },
    #[error("compression failed: {0}")]
    Compression(io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("serialization failed: {0}")]
    Serialize(rancor::Error),
    #[error("deserialization failed: {0}")]
    Deserialize(rancor::Error),
    #[error("bad magic {0:#010x}")]
    BadMagic(u32),
    #[error("protocol version mismatch: expected {expected}, got {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("unknown command code {0}")]
    UnknownCommand(u8),
    #[error("header command {header} does not match {payload} payload")]
    CommandMismatch { header: Command, payload: Command },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("pool closed")]
    Closed,
    #[error("no connection available within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },
    #[error("failed to connect to {addr}: {source}")]
    Connect { addr: SocketAddr, source: io::Error },
    #[error("delivery to peer {peer} timed out")]
    DeliveryTimeout { peer: String },
    #[error("write to peer {peer} stalled for {timeout:?}")]
    WriteTimeout { peer: String, timeout: Duration },
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("expected a {expected} response, got {found}")]
    UnexpectedResponse { expected: Command, found: Command },
    #[error("push channel already taken")]
    AlreadyListening,
}
