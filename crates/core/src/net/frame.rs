//! Length-prefixed, zstd-compressed frames over any byte stream.
//!
//! ```text
//! ┌──────────────────┬───────────────────────────────┐
//! │ u32 LE length    │ zstd(payload), `length` bytes │
//! └──────────────────┴───────────────────────────────┘
//! ```

use std::io::{self, Read};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::TransportConfig;

use super::error::{FrameError, TransportError};
use super::protocol::Packet;

const LENGTH_PREFIX: usize = 4;

/// Compress `payload` and prepend its length. The result can be written to any
/// number of connections unchanged.
pub fn encode_frame(
    payload: &[u8],
    level: i32,
    max_frame_size: usize,
) -> Result<Vec<u8>, FrameError> {
    if payload.len() > max_frame_size {
        return Err(FrameError::TooLarge {
            size: payload.len(),
            limit: max_frame_size,
        });
    }

    let compressed = zstd::bulk::compress(payload, level).map_err(FrameError::Compression)?;
    if compressed.len() > max_frame_size || compressed.len() > u32::MAX as usize {
        return Err(FrameError::TooLarge {
            size: compressed.len(),
            limit: max_frame_size,
        });
    }

    let mut frame = Vec::with_capacity(LENGTH_PREFIX + compressed.len());
    frame.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
    frame.extend_from_slice(&compressed);
    Ok(frame)
}

/// Decompress one frame body, refusing to inflate past `max_frame_size`.
pub fn decode_frame(compressed: &[u8], max_frame_size: usize) -> Result<Vec<u8>, FrameError> {
    let decoder = zstd::stream::read::Decoder::new(compressed).map_err(FrameError::Compression)?;

    let mut payload = Vec::new();
    decoder
        .take(max_frame_size as u64 + 1)
        .read_to_end(&mut payload)
        .map_err(FrameError::Compression)?;

    if payload.len() > max_frame_size {
        return Err(FrameError::TooLarge {
            size: payload.len(),
            limit: max_frame_size,
        });
    }
    Ok(payload)
}

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One framed stream. Any error other than a clean close leaves the stream in
/// an unknown state; the owner drops the connection.
pub struct Connection {
    reader: BoxedReader,
    writer: BoxedWriter,
    label: String,
    max_frame_size: usize,
    compression_level: i32,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub fn new<S>(stream: S, label: impl Into<String>, config: &TransportConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            label: label.into(),
            max_frame_size: config.max_frame_size,
            compression_level: config.compression_level,
        }
    }

    pub fn tcp(stream: TcpStream, config: &TransportConfig) -> Self {
        if let Err(e) = stream.set_nodelay(true) {
            log::debug!("set_nodelay failed: {}", e);
        }
        let label = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        let (reader, writer) = stream.into_split();
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            label,
            max_frame_size: config.max_frame_size,
            compression_level: config.compression_level,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub async fn write_frame(&mut self, payload: &[u8]) -> Result<(), FrameError> {
        let frame = encode_frame(payload, self.compression_level, self.max_frame_size)?;
        self.write_encoded(&frame).await
    }

    /// Write a frame produced by [`encode_frame`].
    pub async fn write_encoded(&mut self, frame: &[u8]) -> Result<(), FrameError> {
        self.writer.write_all(frame).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn read_frame(&mut self) -> Result<Vec<u8>, FrameError> {
        let mut prefix = [0u8; LENGTH_PREFIX];
        match self.reader.read_exact(&mut prefix).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Err(FrameError::Closed),
            Err(e) => return Err(FrameError::Io(e)),
        }

        let size = u32::from_le_bytes(prefix) as usize;
        if size > self.max_frame_size {
            return Err(FrameError::TooLarge {
                size,
                limit: self.max_frame_size,
            });
        }

        let mut body = vec![0u8; size];
        self.reader.read_exact(&mut body).await?;
        decode_frame(&body, self.max_frame_size)
    }

    pub async fn send_packet(&mut self, packet: &Packet) -> Result<(), TransportError> {
        let bytes = packet.serialize()?;
        self.write_frame(&bytes).await?;
        Ok(())
    }

    pub async fn recv_packet(&mut self) -> Result<Packet, TransportError> {
        let bytes = self.read_frame().await?;
        Ok(Packet::deserialize(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::protocol::{Payload, PlayerInput, Request, SetPlayerInput};

    fn pair() -> (Connection, Connection) {
        let config = TransportConfig::default();
        let (a, b) = tokio::io::duplex(64 * 1024);
        (
            Connection::new(a, "a", &config),
            Connection::new(b, "b", &config),
        )
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    #[tokio::test]
    async fn frames_round_trip_across_sizes() {
        let (mut a, mut b) = pair();
        let sizes = [0, 1, 3, 4, 5, 1_000, 65_535, 65_536, 300_000, 1 << 20];

        let writer = tokio::spawn(async move {
            for size in sizes {
                a.write_frame(&pattern(size)).await.unwrap();
            }
            a
        });

        for size in sizes {
            let frame = b.read_frame().await.unwrap();
            assert_eq!(frame.len(), size);
            assert_eq!(frame, pattern(size));
        }
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn clean_close_between_frames() {
        let (mut a, mut b) = pair();
        a.write_frame(b"last").await.unwrap();
        drop(a);

        assert_eq!(b.read_frame().await.unwrap(), b"last");
        assert!(matches!(b.read_frame().await, Err(FrameError::Closed)));
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let config = TransportConfig {
            max_frame_size: 1024,
            ..Default::default()
        };
        let (mut raw, b) = tokio::io::duplex(4096);
        let mut b = Connection::new(b, "b", &config);
        raw.write_all(&(4096u32).to_le_bytes()).await.unwrap();

        assert!(matches!(
            b.read_frame().await,
            Err(FrameError::TooLarge { size: 4096, limit: 1024 })
        ));
    }

    #[test]
    fn decompression_is_bounded() {
        let payload = vec![0u8; 10_000];
        let frame = encode_frame(&payload, 3, 1 << 20).unwrap();

        let err = decode_frame(&frame[LENGTH_PREFIX..], 1_000).unwrap_err();
        assert!(matches!(err, FrameError::TooLarge { limit: 1_000, .. }));
    }

    #[tokio::test]
    async fn packets_round_trip() {
        let (mut a, mut b) = pair();
        let packet = Packet::request(Request::SetPlayerInput(SetPlayerInput {
            player_id: "p1".to_string(),
            input: PlayerInput {
                sequence: 9,
                move_direction: [0.5, -0.5],
                ..Default::default()
            },
        }));

        a.send_packet(&packet).await.unwrap();
        let received = b.recv_packet().await.unwrap();
        assert!(matches!(received.payload, Payload::Request(_)));
        assert_eq!(received, packet);
    }
}
