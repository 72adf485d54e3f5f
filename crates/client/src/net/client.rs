use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use glam::Vec2;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use tether::net::{
    ClientTransport, Command, GAME_VERSION, InputAck, Push, RegisterOutcome, RegisterPlayer,
    Registration, Request, Response, SetPlayerInput, TransportError,
};
use tether::{ClockSync, FrameContext, ObjectDb, Snapshot, Timing, WorldSnapshot};

use super::config::ClientConfig;
use super::input::{InputState, InputThrottle};
use super::interpolation::{LocalOverride, render_frame};
use super::prediction::Prediction;
use super::replication::Replicator;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("registration rejected: {reason}")]
    Rejected { reason: String },
    #[error("server answered with a {0} response")]
    UnexpectedResponse(Command),
    #[error("registration did not include player {0}")]
    MissingPlayer(String),
}

/// A registered client: transport, synced clock, local entity store and the
/// prediction for the player it controls.
#[derive(Debug)]
pub struct NetworkClient {
    config: ClientConfig,
    transport: Arc<ClientTransport>,
    clock: Arc<ClockSync>,
    db: Arc<ObjectDb>,
    player_id: String,
    prediction: Arc<Mutex<Prediction>>,
    throttle: Mutex<InputThrottle>,
    sequence: AtomicU32,
    apply_task: JoinHandle<()>,
}

impl NetworkClient {
    /// Connect both channels, register `name` and start applying pushes.
    pub async fn connect(config: ClientConfig, name: &str) -> Result<Self, ClientError> {
        let client_id = uuid::Uuid::new_v4().to_string();
        let transport =
            Arc::new(ClientTransport::connect(config.transport.clone(), &client_id).await?);
        let pushes = transport.listen()?;

        let local = ClockSync::new(&config.timing);
        let sent_at = local.local_now();
        let response = transport
            .send(Request::RegisterPlayer(RegisterPlayer {
                name: name.to_string(),
                game_version: GAME_VERSION.to_string(),
                client_id: client_id.clone(),
            }))
            .await?;
        let round_trip_ms = local.local_now() - sent_at;

        let registration = match response {
            Response::RegisterPlayer(RegisterOutcome::Accepted(registration)) => registration,
            Response::RegisterPlayer(RegisterOutcome::Rejected { reason }) => {
                log::warn!("registration as {:?} rejected: {}", name, reason);
                return Err(ClientError::Rejected { reason });
            }
            other => return Err(ClientError::UnexpectedResponse(other.command())),
        };

        let clock = Arc::new(synced_clock(&config.timing, &registration, round_trip_ms));
        let db = Arc::new(ObjectDb::new());
        let mut replicator = Replicator::new();
        replicator.apply(&db, &registration.world);

        let spawn = registration
            .world
            .get(&registration.player_id)
            .map(Snapshot::position)
            .ok_or_else(|| ClientError::MissingPlayer(registration.player_id.clone()))?;
        let prediction = Arc::new(Mutex::new(Prediction::new(
            spawn,
            config.timing.broadcast_interval_ms,
            config.snap_threshold,
        )));

        log::info!(
            "registered as {} (offset {:.1}ms, rtt {:.1}ms, {} entities)",
            registration.player_id,
            clock.offset_ms(),
            round_trip_ms,
            db.len()
        );

        let apply_task = tokio::spawn(apply_pushes(
            pushes,
            replicator,
            Arc::clone(&db),
            Arc::clone(&clock),
            Arc::clone(&prediction),
            registration.player_id.clone(),
        ));

        Ok(Self {
            throttle: Mutex::new(InputThrottle::new(config.input_rate_hz)),
            config,
            transport,
            clock,
            db,
            player_id: registration.player_id,
            prediction,
            sequence: AtomicU32::new(0),
            apply_task,
        })
    }

    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    pub fn clock(&self) -> &ClockSync {
        &self.clock
    }

    pub fn db(&self) -> &ObjectDb {
        &self.db
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn prediction(&self) -> MutexGuard<'_, Prediction> {
        self.prediction.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn predicted_position(&self) -> Vec2 {
        self.prediction().position(self.clock.now())
    }

    /// One rendered frame: predict locally, send input when the throttle
    /// allows, then bring every entity to its on-screen state.
    pub fn frame(&self, input: &InputState, dt: f32) -> Vec<Snapshot> {
        let now = self.clock.now();
        let position = {
            let mut prediction = self.prediction();
            prediction.advance(input.move_direction, dt);
            prediction.position(now)
        };

        let due = self
            .throttle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ready(now);
        if due {
            self.spawn_input(input);
        }

        let frame = FrameContext {
            now_ms: now,
            render_time_ms: self.clock.render_time(),
            dt,
        };
        let local = LocalOverride {
            id: &self.player_id,
            position,
        };
        render_frame(&self.db, &self.clock, Some(local), &frame)
    }

    fn next_input(&self, input: &InputState) -> SetPlayerInput {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        SetPlayerInput {
            player_id: self.player_id.clone(),
            input: input.to_input(sequence, self.clock.now()),
        }
    }

    /// Fire-and-forget input send; failures are logged.
    fn spawn_input(&self, input: &InputState) {
        let request = Request::SetPlayerInput(self.next_input(input));
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            match transport.send(request).await {
                Ok(Response::SetPlayerInput(ack)) if !ack.accepted => {
                    log::debug!("input rejected at tick {}", ack.tick);
                }
                Ok(_) => {}
                Err(e) => log::warn!("input send failed: {}", e),
            }
        });
    }

    /// Send input immediately and wait for the acknowledgement.
    pub async fn send_input(&self, input: &InputState) -> Result<InputAck, ClientError> {
        let request = Request::SetPlayerInput(self.next_input(input));
        match self.transport.send(request).await? {
            Response::SetPlayerInput(ack) => Ok(ack),
            other => Err(ClientError::UnexpectedResponse(other.command())),
        }
    }

    pub fn remote_count(&self) -> usize {
        self.db.len().saturating_sub(1)
    }

    pub fn close(&self) {
        self.apply_task.abort();
        self.transport.close();
    }
}

impl Drop for NetworkClient {
    fn drop(&mut self) {
        self.close();
    }
}

fn synced_clock(timing: &Timing, registration: &Registration, round_trip_ms: f64) -> ClockSync {
    let timing = Timing {
        timestep_ms: registration.timestep_ms,
        ..timing.clone()
    };
    let clock = ClockSync::new(&timing);
    clock.sync(registration.server_time_ms, round_trip_ms);
    clock.set_start_time(registration.start_time_ms);
    clock
}

/// Apply every pushed world snapshot and reconcile the local prediction
/// against the authoritative position it carries.
async fn apply_pushes(
    mut pushes: mpsc::Receiver<Push>,
    mut replicator: Replicator,
    db: Arc<ObjectDb>,
    clock: Arc<ClockSync>,
    prediction: Arc<Mutex<Prediction>>,
    player_id: String,
) {
    while let Some(push) = pushes.recv().await {
        let Push::AddWorldSnapshot(world) = push;
        let report = replicator.apply(&db, &world);
        if report.skipped {
            continue;
        }
        if report.stale > 0 {
            log::debug!("{} stale entries in tick {}", report.stale, world.tick);
        }
        reconcile_local(&world, &clock, &prediction, &player_id);
    }
    log::info!("push channel closed");
}

fn reconcile_local(
    world: &WorldSnapshot,
    clock: &ClockSync,
    prediction: &Mutex<Prediction>,
    player_id: &str,
) {
    let Some(snapshot) = world.get(player_id) else {
        log::warn!("world tick {} does not contain {}", world.tick, player_id);
        return;
    };
    prediction
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .reconcile(world.tick, snapshot.position(), clock.now());
}
