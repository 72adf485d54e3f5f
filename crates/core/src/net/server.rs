use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::TransportConfig;

use super::error::{FrameError, TransportError};
use super::frame::Connection;
use super::peers::{PeerRegistry, TransportStats, TransportStatsSnapshot};
use super::protocol::{Packet, Payload, Request, Response};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Game logic behind the request channel. Called from connection tasks, so it
/// must not block for long.
pub trait RequestHandler: Send + Sync + 'static {
    fn handle(&self, request: Request) -> Response;
}

/// Both listeners of the authoritative side: request/response on channel A,
/// server push on channel B.
#[derive(Debug)]
pub struct ServerTransport {
    request_addr: SocketAddr,
    push_addr: SocketAddr,
    peers: Arc<PeerRegistry>,
    stats: Arc<TransportStats>,
    tasks: Vec<JoinHandle<()>>,
}

impl ServerTransport {
    pub async fn start<H: RequestHandler>(
        config: TransportConfig,
        handler: Arc<H>,
    ) -> Result<Self, TransportError> {
        let request_listener = bind(config.request_addr).await?;
        let push_listener = bind(config.push_addr).await?;
        let request_addr = local_addr(&request_listener, config.request_addr)?;
        let push_addr = local_addr(&push_listener, config.push_addr)?;

        let stats = Arc::new(TransportStats::default());
        let peers = Arc::new(PeerRegistry::new(config.clone(), Arc::clone(&stats)));

        let tasks = vec![
            tokio::spawn(accept_requests(
                request_listener,
                handler,
                config.clone(),
                Arc::clone(&stats),
            )),
            tokio::spawn(accept_pushes(push_listener, Arc::clone(&peers), config)),
        ];

        log::info!(
            "transport listening: requests on {}, pushes on {}",
            request_addr,
            push_addr
        );

        Ok(Self {
            request_addr,
            push_addr,
            peers,
            stats,
            tasks,
        })
    }

    pub fn request_addr(&self) -> SocketAddr {
        self.request_addr
    }

    pub fn push_addr(&self) -> SocketAddr {
        self.push_addr
    }

    pub fn peers(&self) -> &Arc<PeerRegistry> {
        &self.peers
    }

    pub fn broadcast(&self, packet: &Packet) -> Result<usize, TransportError> {
        self.peers.broadcast(packet)
    }

    pub fn stats(&self) -> TransportStatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop accepting. Established connections wind down with their tasks.
    pub fn shutdown(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl Drop for ServerTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn bind(addr: SocketAddr) -> Result<TcpListener, TransportError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| TransportError::Bind { addr, source })
}

fn local_addr(listener: &TcpListener, addr: SocketAddr) -> Result<SocketAddr, TransportError> {
    listener
        .local_addr()
        .map_err(|source| TransportError::Bind { addr, source })
}

async fn accept_requests<H: RequestHandler>(
    listener: TcpListener,
    handler: Arc<H>,
    config: TransportConfig,
    stats: Arc<TransportStats>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                log::debug!("request connection from {}", addr);
                let connection = Connection::tcp(stream, &config);
                tokio::spawn(serve_requests(
                    connection,
                    Arc::clone(&handler),
                    Arc::clone(&stats),
                ));
            }
            Err(e) => {
                log::error!("request listener accept failed: {}", e);
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

/// One request, one response, until the client hangs up. Frames that do not
/// decode into a request are dropped and the connection stays open.
async fn serve_requests<H: RequestHandler>(
    mut connection: Connection,
    handler: Arc<H>,
    stats: Arc<TransportStats>,
) {
    loop {
        let bytes = match connection.read_frame().await {
            Ok(bytes) => bytes,
            Err(FrameError::Closed) => {
                log::debug!("request connection {} closed", connection.label());
                return;
            }
            Err(e) => {
                log::warn!("request connection {} failed: {}", connection.label(), e);
                return;
            }
        };

        let request = match Packet::deserialize(&bytes) {
            Ok(Packet {
                payload: Payload::Request(request),
                ..
            }) => request,
            Ok(packet) => {
                stats.record_malformed();
                log::warn!(
                    "dropping {} packet on request channel from {}",
                    packet.command(),
                    connection.label()
                );
                continue;
            }
            Err(e) => {
                stats.record_malformed();
                log::warn!("dropping malformed request from {}: {}", connection.label(), e);
                continue;
            }
        };

        let response = handler.handle(request);
        if let Err(e) = connection.send_packet(&Packet::response(response)).await {
            log::warn!("request connection {} failed: {}", connection.label(), e);
            return;
        }
        stats.record_request();
    }
}

async fn accept_pushes(listener: TcpListener, peers: Arc<PeerRegistry>, config: TransportConfig) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                log::debug!("push connection from {}", addr);
                let connection = Connection::tcp(stream, &config);
                tokio::spawn(handshake(
                    connection,
                    Arc::clone(&peers),
                    config.request_timeout,
                ));
            }
            Err(e) => {
                log::error!("push listener accept failed: {}", e);
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

async fn handshake(mut connection: Connection, peers: Arc<PeerRegistry>, timeout: Duration) {
    let hello = match tokio::time::timeout(timeout, connection.recv_packet()).await {
        Ok(Ok(packet)) => packet,
        Ok(Err(e)) => {
            log::warn!("push handshake with {} failed: {}", connection.label(), e);
            return;
        }
        Err(_) => {
            log::warn!("push handshake with {} timed out", connection.label());
            return;
        }
    };

    match hello.payload {
        Payload::Hello { client_id } if !client_id.is_empty() => {
            peers.attach(&client_id, connection);
        }
        other => {
            log::warn!(
                "push connection {} opened with {} instead of a hello",
                connection.label(),
                other.command()
            );
        }
    }
}
