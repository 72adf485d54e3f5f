//! Authoritative game server: fixed-step simulation, world snapshot
//! broadcast, player registration and the liveness sweep.

pub mod config;
pub mod events;
pub mod server;
pub mod session;
pub mod simulation;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use tether::net::{Packet, Push, ServerTransport, TransportError, TransportStatsSnapshot};
use tether::{SystemClock, TimeSource};

pub use config::ServerConfig;
pub use events::{EventLog, LoggedEvent, ServerEvent, Severity};
pub use server::{GameServer, ServerStats};
pub use session::{Session, SessionTable};
pub use simulation::{TickReport, next_tick};

/// A server with its transport bound and all background loops spawned.
#[derive(Debug)]
pub struct RunningServer {
    server: Arc<GameServer>,
    transport: Arc<ServerTransport>,
    tasks: Vec<JoinHandle<()>>,
}

impl RunningServer {
    pub async fn start(config: ServerConfig) -> Result<Self, TransportError> {
        Self::start_with_source(config, Arc::new(SystemClock)).await
    }

    pub async fn start_with_source(
        config: ServerConfig,
        source: Arc<dyn TimeSource>,
    ) -> Result<Self, TransportError> {
        let transport_config = config.transport.clone();
        let broadcast_interval = config.timing.broadcast_interval();
        let sweep_interval = config.sweep_interval;

        let server = Arc::new(GameServer::new(config, source));
        let transport =
            Arc::new(ServerTransport::start(transport_config, Arc::clone(&server)).await?);

        let tasks = vec![
            tokio::spawn(simulation::run_simulation(Arc::clone(&server))),
            tokio::spawn(broadcast_world(
                Arc::clone(&server),
                Arc::clone(&transport),
                broadcast_interval,
            )),
            tokio::spawn(sweep_inactive(
                Arc::clone(&server),
                Arc::clone(&transport),
                sweep_interval,
            )),
        ];

        Ok(Self {
            server,
            transport,
            tasks,
        })
    }

    pub fn server(&self) -> &Arc<GameServer> {
        &self.server
    }

    pub fn request_addr(&self) -> SocketAddr {
        self.transport.request_addr()
    }

    pub fn push_addr(&self) -> SocketAddr {
        self.transport.push_addr()
    }

    pub fn stats(&self) -> ServerStats {
        self.server.stats()
    }

    pub fn transport_stats(&self) -> TransportStatsSnapshot {
        self.transport.stats()
    }

    pub fn peer_count(&self) -> usize {
        self.transport.peers().len()
    }

    pub fn shutdown(&self) {
        for task in &self.tasks {
            task.abort();
        }
        self.transport.shutdown();
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Push the world at the newest simulated tick to every peer. A slow round
/// is skipped rather than bunched up.
async fn broadcast_world(
    server: Arc<GameServer>,
    transport: Arc<ServerTransport>,
    every: Duration,
) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        if transport.peers().is_empty() {
            continue;
        }

        let snapshot = server.world_snapshot(server.last_tick());
        let packet = Packet::push(Push::AddWorldSnapshot(snapshot));
        match transport.broadcast(&packet) {
            Ok(peers) => log::trace!("world snapshot sent to {} peers", peers),
            Err(e) => server.events().push(ServerEvent::Error {
                message: format!("broadcast failed: {}", e),
            }),
        }
    }
}

async fn sweep_inactive(
    server: Arc<GameServer>,
    transport: Arc<ServerTransport>,
    every: Duration,
) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        for session in server.sweep_inactive() {
            if transport.peers().disconnect(&session.client_id) {
                log::debug!("closed push peer {}", session.client_id);
            }
        }
    }
}
