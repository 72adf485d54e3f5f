use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

use glam::Vec2;

use tether::entities::{Item, Player, Tree};
use tether::net::{
    GAME_VERSION, InputAck, RegisterOutcome, RegisterPlayer, Registration, Request,
    RequestHandler, Response, SetPlayerInput,
};
use tether::snapshot::{ItemKind, Snapshot};
use tether::{
    ClockSync, EntityKind, EntityRecord, IdAllocator, ObjectDb, Replicable, Tick, TimeSource,
    WorldSnapshot,
};

use crate::config::ServerConfig;
use crate::events::{EventLog, ServerEvent};
use crate::session::{Session, SessionTable};

const GOLDEN_ANGLE: f32 = 2.399_963;

#[derive(Debug, Clone, Copy, Default)]
pub struct ServerStats {
    pub uptime_secs: u64,
    pub tick: Tick,
    pub player_count: usize,
    pub max_players: usize,
    pub entity_count: usize,
}

/// Authoritative game state: the entity store, the registered sessions and
/// the clock every tick is derived from.
#[derive(Debug)]
pub struct GameServer {
    config: ServerConfig,
    clock: ClockSync,
    db: ObjectDb,
    sessions: SessionTable,
    events: EventLog,
    ids: IdAllocator,
    last_tick: AtomicI64,
    started: Instant,
}

impl GameServer {
    pub fn new(config: ServerConfig, source: Arc<dyn TimeSource>) -> Self {
        let clock = ClockSync::authoritative(&config.timing, source);
        let server = Self {
            config,
            clock,
            db: ObjectDb::new(),
            sessions: SessionTable::new(),
            events: EventLog::default(),
            ids: IdAllocator::new(),
            last_tick: AtomicI64::new(0),
            started: Instant::now(),
        };
        server.plant_trees();
        server
    }

    fn plant_trees(&self) {
        let count = self.config.tree_count;
        let half = self.config.world_size / 2.0;
        for n in 0..count {
            // Sunflower spiral over the outer part of the map.
            let t = (n as f32 + 0.5) / count.max(1) as f32;
            let distance = half * (0.3 + 0.6 * t.sqrt());
            let position = Vec2::from_angle(n as f32 * GOLDEN_ANGLE) * distance;
            let radius = 18.0 + (n % 3) as f32 * 8.0;

            let tree = Tree::new(format!("tree-{}", n + 1), position, radius);
            self.spawn(Box::new(tree), 0);
        }
        log::debug!("planted {} trees", count);
    }

    pub(crate) fn spawn(&self, object: Box<dyn Replicable>, tick: Tick) -> Arc<EntityRecord> {
        let record = Arc::new(EntityRecord::new(object));
        if let Err(e) = record.record(tick) {
            log::warn!("{}: {}", record.id(), e);
        }
        self.db.set(Arc::clone(&record));
        record
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn clock(&self) -> &ClockSync {
        &self.clock
    }

    pub fn db(&self) -> &ObjectDb {
        &self.db
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub(crate) fn ids(&self) -> &IdAllocator {
        &self.ids
    }

    /// The newest tick the simulation has completed.
    pub fn last_tick(&self) -> Tick {
        self.last_tick.load(Ordering::SeqCst)
    }

    pub(crate) fn set_last_tick(&self, tick: Tick) {
        self.last_tick.fetch_max(tick, Ordering::SeqCst);
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            uptime_secs: self.started.elapsed().as_secs(),
            tick: self.last_tick(),
            player_count: self.sessions.len(),
            max_players: self.config.max_players,
            entity_count: self.db.len(),
        }
    }

    /// Every entity's newest snapshot under one shared tick.
    pub fn world_snapshot(&self, tick: Tick) -> WorldSnapshot {
        let entities = self
            .db
            .select_all()
            .iter()
            .map(|record| record.latest(tick))
            .collect();
        WorldSnapshot::with_entities(tick, entities)
    }

    fn validate(&self, request: &RegisterPlayer) -> Result<(), String> {
        if request.game_version != GAME_VERSION {
            return Err(format!(
                "game version mismatch: server runs {}, client runs {}",
                GAME_VERSION, request.game_version
            ));
        }

        let name = request.name.trim();
        if name.is_empty() {
            return Err("name must not be empty".to_string());
        }
        if name.chars().count() > self.config.max_name_len {
            return Err(format!(
                "name must be at most {} characters",
                self.config.max_name_len
            ));
        }
        if name.chars().any(char::is_control) {
            return Err("name contains control characters".to_string());
        }

        if self.sessions.len() >= self.config.max_players {
            return Err(format!("server full ({} players)", self.config.max_players));
        }
        Ok(())
    }

    pub fn register(&self, request: RegisterPlayer) -> RegisterOutcome {
        if let Err(reason) = self.validate(&request) {
            self.events.push(ServerEvent::RegistrationRejected {
                name: request.name,
                reason: reason.clone(),
            });
            return RegisterOutcome::Rejected { reason };
        }

        // A client that registers again replaces its previous player.
        if let Some(previous) = self.sessions.by_client(&request.client_id) {
            self.remove_player(&previous);
        }

        let now = self.clock.now();
        let tick = self.clock.current_tick();
        let name = request.name.trim().to_string();
        let player_id = self.ids.allocate("player-");
        let position = self.spawn_point();

        self.spawn(Box::new(Player::new(&player_id, &name, position)), tick);
        let starter = Item::new(self.ids.allocate("item-"), ItemKind::Pistol, position)
            .held_by(&player_id);
        self.spawn(Box::new(starter), tick);

        self.sessions.insert(Session {
            player_id: player_id.clone(),
            client_id: request.client_id.clone(),
            name: name.clone(),
            joined_ms: now,
            last_input_ms: now,
        });
        self.events.push(ServerEvent::PlayerRegistered {
            player_id: player_id.clone(),
            name,
            client_id: request.client_id,
        });

        RegisterOutcome::Accepted(Registration {
            player_id,
            server_time_ms: self.clock.now(),
            start_time_ms: self.clock.start_time(),
            timestep_ms: self.clock.timestep_ms(),
            world: self.world_snapshot(tick),
        })
    }

    fn spawn_point(&self) -> Vec2 {
        let n = self.sessions.len() as f32;
        Vec2::from_angle(n * GOLDEN_ANGLE) * self.config.world_size * 0.1
    }

    pub fn set_input(&self, request: SetPlayerInput) -> InputAck {
        let tick = self.clock.current_tick();
        if !self.sessions.touch(&request.player_id, self.clock.now()) {
            log::debug!("input for unknown player {}", request.player_id);
            return InputAck {
                tick,
                accepted: false,
            };
        }

        let accepted = self.db.get(&request.player_id).is_some_and(|record| {
            record.with_mut(|object| {
                object
                    .as_controllable_mut()
                    .is_some_and(|controllable| controllable.set_input(&request.input))
            })
        });
        InputAck { tick, accepted }
    }

    /// Remove players whose last input is older than the liveness timeout.
    /// Returns the removed sessions so their push peers can be torn down.
    pub fn sweep_inactive(&self) -> Vec<Session> {
        let now = self.clock.now();
        let timeout_ms = self.config.liveness_timeout.as_secs_f64() * 1000.0;
        let expired = self.sessions.expired(now, timeout_ms);

        for session in &expired {
            self.remove_player(session);
            self.events.push(ServerEvent::PlayerTimedOut {
                player_id: session.player_id.clone(),
                name: session.name.clone(),
            });
        }
        expired
    }

    fn remove_player(&self, session: &Session) {
        let tick = self.last_tick();
        let position = self
            .db
            .get(&session.player_id)
            .map(|record| record.latest(tick).position());

        if let Some(position) = position {
            self.drop_items_of(&session.player_id, position, tick);
        }
        self.db.delete(&session.player_id);
        self.sessions.remove(&session.player_id);
    }

    fn drop_items_of(&self, holder_id: &str, position: Vec2, tick: Tick) {
        for record in self.db.select_all() {
            if record.kind() != EntityKind::Item {
                continue;
            }
            let dropped = record.with_mut(|object| match object.as_carryable_mut() {
                Some(item) if item.holder() == Some(holder_id) => {
                    item.drop_at(position);
                    true
                }
                _ => false,
            });
            if dropped {
                log::debug!("{} dropped {}", holder_id, record.id());
                if let Err(e) = record.record(tick) {
                    log::warn!("{}: {}", record.id(), e);
                }
            }
        }
    }

    pub fn player_snapshot(&self, player_id: &str) -> Option<Snapshot> {
        self.db
            .get(player_id)
            .map(|record| record.latest(self.last_tick()))
    }
}

impl RequestHandler for GameServer {
    fn handle(&self, request: Request) -> Response {
        match request {
            Request::RegisterPlayer(register) => Response::RegisterPlayer(self.register(register)),
            Request::SetPlayerInput(input) => Response::SetPlayerInput(self.set_input(input)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tether::ManualClock;
    use tether::net::PlayerInput;

    use super::*;

    fn server_with(config: ServerConfig) -> (Arc<ManualClock>, GameServer) {
        let source = Arc::new(ManualClock::new(1_000_000.0));
        let server = GameServer::new(config, source.clone());
        (source, server)
    }

    fn request(name: &str, client_id: &str) -> RegisterPlayer {
        RegisterPlayer {
            name: name.to_string(),
            game_version: GAME_VERSION.to_string(),
            client_id: client_id.to_string(),
        }
    }

    fn accepted(outcome: RegisterOutcome) -> Registration {
        match outcome {
            RegisterOutcome::Accepted(registration) => registration,
            RegisterOutcome::Rejected { reason } => panic!("rejected: {reason}"),
        }
    }

    fn rejection(outcome: RegisterOutcome) -> String {
        match outcome {
            RegisterOutcome::Rejected { reason } => reason,
            RegisterOutcome::Accepted(_) => panic!("expected a rejection"),
        }
    }

    #[test]
    fn registration_returns_clock_anchors_and_world() {
        let (_, server) = server_with(ServerConfig::default());
        let registration = accepted(server.register(request("alice", "c1")));

        assert_eq!(registration.start_time_ms, 1_000_000.0);
        assert_eq!(registration.timestep_ms, 15.0);
        assert!(registration.world.contains(&registration.player_id));
        let trees = registration
            .world
            .entities
            .iter()
            .filter(|s| s.kind() == EntityKind::Tree)
            .count();
        assert_eq!(trees, ServerConfig::default().tree_count);

        let starter = registration
            .world
            .entities
            .iter()
            .find_map(|s| match s {
                Snapshot::Item(item) => Some(item.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(starter.holder_id.as_deref(), Some(registration.player_id.as_str()));
    }

    #[test]
    fn rejects_version_mismatch_and_bad_names() {
        let (_, server) = server_with(ServerConfig::default());

        let mut old = request("alice", "c1");
        old.game_version = "0.0.0-old".to_string();
        assert!(rejection(server.register(old)).contains("version"));

        assert!(rejection(server.register(request("   ", "c1"))).contains("empty"));
        let long_name = request("a-very-long-player-name", "c1");
        assert!(rejection(server.register(long_name)).contains("at most"));
        assert!(server.sessions().is_empty());
    }

    #[test]
    fn rejects_when_full() {
        let config = ServerConfig {
            max_players: 1,
            ..Default::default()
        };
        let (_, server) = server_with(config);

        accepted(server.register(request("alice", "c1")));
        assert!(rejection(server.register(request("bob", "c2"))).contains("full"));
    }

    #[test]
    fn reregistering_client_replaces_its_player() {
        let (_, server) = server_with(ServerConfig::default());
        let first = accepted(server.register(request("alice", "c1")));
        let second = accepted(server.register(request("alice", "c1")));

        assert_ne!(first.player_id, second.player_id);
        assert!(!server.db().contains(&first.player_id));
        assert_eq!(server.sessions().len(), 1);
    }

    #[test]
    fn input_is_acknowledged_for_known_players_only() {
        let (_, server) = server_with(ServerConfig::default());
        let registration = accepted(server.register(request("alice", "c1")));

        let ack = server.set_input(SetPlayerInput {
            player_id: registration.player_id.clone(),
            input: PlayerInput {
                sequence: 1,
                move_direction: [1.0, 0.0],
                ..Default::default()
            },
        });
        assert!(ack.accepted);

        let ack = server.set_input(SetPlayerInput {
            player_id: "player-999".to_string(),
            input: PlayerInput::default(),
        });
        assert!(!ack.accepted);
    }

    #[test]
    fn sweep_removes_silent_players_and_drops_their_items() {
        let config = ServerConfig {
            liveness_timeout: Duration::from_secs(5),
            ..Default::default()
        };
        let (source, server) = server_with(config);
        let quiet = accepted(server.register(request("quiet", "c1")));
        let active = accepted(server.register(request("active", "c2")));

        source.advance(4_000.0);
        server.set_input(SetPlayerInput {
            player_id: active.player_id.clone(),
            input: PlayerInput {
                sequence: 1,
                ..Default::default()
            },
        });
        source.advance(1_500.0);

        let removed = server.sweep_inactive();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].player_id, quiet.player_id);
        assert!(!server.db().contains(&quiet.player_id));
        assert!(server.db().contains(&active.player_id));

        let world = server.world_snapshot(server.last_tick());
        let orphaned = world.entities.iter().any(|s| match s {
            Snapshot::Item(item) => item.holder_id.as_deref() == Some(quiet.player_id.as_str()),
            _ => false,
        });
        assert!(!orphaned);
        assert!(
            server
                .events()
                .recent(10)
                .iter()
                .any(|e| matches!(e.event, ServerEvent::PlayerTimedOut { .. }))
        );
    }
}
