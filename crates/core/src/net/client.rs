use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::TransportConfig;

use super::error::{FrameError, TransportError};
use super::frame::Connection;
use super::pool::ConnectionPool;
use super::protocol::{Packet, Payload, Push, Request, Response};

#[derive(Debug)]
pub struct ClientTransport {
    client_id: String,
    config: TransportConfig,
    requests: Arc<ConnectionPool<Connection>>,
    inbound: Mutex<Option<mpsc::Receiver<Push>>>,
    push_tasks: Vec<JoinHandle<()>>,
}

impl ClientTransport {
    pub async fn connect(
        config: TransportConfig,
        client_id: impl Into<String>,
    ) -> Result<Self, TransportError> {
        let client_id = client_id.into();

        let requests = Arc::new(ConnectionPool::new());
        for _ in 0..config.request_pool_size.max(1) {
            requests.release(dial(config.request_addr, &config).await?);
        }

        let (tx, rx) = mpsc::channel(config.inbound_queue_capacity.max(1));
        let mut push_tasks = Vec::with_capacity(config.push_connections);
        for _ in 0..config.push_connections.max(1) {
            let mut connection = dial(config.push_addr, &config).await?;
            connection.send_packet(&Packet::hello(client_id.clone())).await?;
            push_tasks.push(tokio::spawn(read_pushes(connection, tx.clone())));
        }

        log::info!(
            "connected to {} / {} as {}",
            config.request_addr,
            config.push_addr,
            client_id
        );

        Ok(Self {
            client_id,
            config,
            requests,
            inbound: Mutex::new(Some(rx)),
            push_tasks,
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// A failed exchange discards the connection and redials in the background.
    pub async fn send(&self, request: Request) -> Result<Response, TransportError> {
        let timeout = self.config.request_timeout;
        let expected = request.command();
        let mut connection = self.requests.acquire(timeout).await?;

        let packet = Packet::request(request);
        let outcome = tokio::time::timeout(timeout, exchange(&mut connection, &packet)).await;
        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                self.replace_connection();
                return Err(e);
            }
            Err(_) => {
                self.replace_connection();
                return Err(TransportError::Timeout(timeout));
            }
        };

        self.requests.release(connection);
        if response.command() != expected {
            return Err(TransportError::UnexpectedResponse {
                expected,
                found: response.command(),
            });
        }
        Ok(response)
    }

    pub fn listen(&self) -> Result<mpsc::Receiver<Push>, TransportError> {
        self.inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(TransportError::AlreadyListening)
    }

    pub fn idle_request_connections(&self) -> usize {
        self.requests.idle_len()
    }

    pub fn close(&self) {
        self.requests.close();
        for task in &self.push_tasks {
            task.abort();
        }
    }

    fn replace_connection(&self) {
        let pool = Arc::clone(&self.requests);
        let config = self.config.clone();
        tokio::spawn(async move {
            match dial(config.request_addr, &config).await {
                Ok(connection) => {
                    pool.release(connection);
                }
                Err(e) => log::warn!("could not replace request connection: {}", e),
            }
        });
    }
}

impl Drop for ClientTransport {
    fn drop(&mut self) {
        self.close();
    }
}

async fn dial(addr: SocketAddr, config: &TransportConfig) -> Result<Connection, TransportError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|source| TransportError::Connect { addr, source })?;
    Ok(Connection::tcp(stream, config))
}

async fn exchange(
    connection: &mut Connection,
    packet: &Packet,
) -> Result<Response, TransportError> {
    connection.send_packet(packet).await?;
    let reply = connection.recv_packet().await?;
    match reply.payload {
        Payload::Response(response) => Ok(response),
        other => Err(TransportError::UnexpectedResponse {
            expected: packet.command(),
            found: other.command(),
        }),
    }
}

/// Forward pushes until the connection fails. A full inbound queue drops the
/// newest push rather than stalling the socket.
async fn read_pushes(mut connection: Connection, tx: mpsc::Sender<Push>) {
    loop {
        match connection.recv_packet().await {
            Ok(Packet {
                payload: Payload::Push(push),
                ..
            }) => match tx.try_send(push) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(push)) => {
                    log::warn!("inbound queue full, dropping {}", push.command());
                }
                Err(mpsc::error::TrySendError::Closed(_)) => return,
            },
            Ok(packet) => {
                log::warn!(
                    "ignoring {} packet on push connection {}",
                    packet.command(),
                    connection.label()
                );
            }
            Err(TransportError::Frame(FrameError::Closed)) => {
                log::debug!("push connection {} closed", connection.label());
                return;
            }
            Err(e) => {
                log::warn!("abandoning push connection {}: {}", connection.label(), e);
                return;
            }
        }
    }
}
