use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use glam::Vec2;

use tether::TransportConfig;
use tether::snapshot::EntityKind;
use tether_client::{ClientConfig, ClientError, InputState, NetworkClient};
use tether_server::{RunningServer, ServerConfig};

async fn start_server() -> (RunningServer, ClientConfig) {
    let any = SocketAddr::from((Ipv4Addr::LOCALHOST, 0));
    let server = RunningServer::start(ServerConfig {
        transport: TransportConfig::with_addrs(any, any),
        ..Default::default()
    })
    .await
    .unwrap();

    let client = ClientConfig {
        transport: TransportConfig::with_addrs(server.request_addr(), server.push_addr()),
        ..Default::default()
    };
    (server, client)
}

async fn run_frames(client: &NetworkClient, input: &InputState, frames: usize) {
    for _ in 0..frames {
        client.frame(input, 1.0 / 60.0);
        tokio::time::sleep(Duration::from_millis(16)).await;
    }
}

#[tokio::test]
async fn client_registers_and_receives_the_world() {
    let (server, config) = start_server().await;
    let client = NetworkClient::connect(config, "alice").await.unwrap();

    assert!(client.clock().is_synchronized());
    assert!(client.db().contains(client.player_id()));
    let trees = client
        .db()
        .select_all()
        .iter()
        .filter(|r| r.kind() == EntityKind::Tree)
        .count();
    assert_eq!(trees, server.server().config().tree_count);

    tokio::time::sleep(Duration::from_millis(300)).await;
    let record = client.db().get(client.player_id()).unwrap();
    assert!(record.latest_tick().unwrap() > 0);
}

#[tokio::test]
async fn rejected_registration_surfaces_the_reason() {
    let (_server, config) = start_server().await;
    match NetworkClient::connect(config, "   ").await {
        Err(ClientError::Rejected { reason }) => assert!(reason.contains("empty")),
        other => panic!("expected a rejection, got {:?}", other.map(|c| c.player_id().to_string())),
    }
}

#[tokio::test]
async fn movement_is_predicted_and_confirmed_by_the_server() {
    let (server, config) = start_server().await;
    let client = NetworkClient::connect(config, "alice").await.unwrap();
    let start = client.predicted_position();

    let input = InputState {
        move_direction: Vec2::X,
        ..Default::default()
    };
    run_frames(&client, &input, 30).await;

    let predicted = client.predicted_position();
    assert!(predicted.x > start.x + 20.0);

    let authoritative = server
        .server()
        .player_snapshot(client.player_id())
        .unwrap()
        .position();
    assert!(authoritative.x > start.x + 20.0);
    assert!(predicted.distance(authoritative) < client.config().snap_threshold);
}

#[tokio::test]
async fn other_players_show_up_as_remote_entities() {
    let (_server, config) = start_server().await;
    let alice = NetworkClient::connect(config.clone(), "alice").await.unwrap();
    let bob = NetworkClient::connect(config, "bob").await.unwrap();

    let idle = InputState::default();
    run_frames(&alice, &idle, 20).await;
    bob.send_input(&idle).await.unwrap();

    assert!(alice.db().contains(bob.player_id()));
    let shown = alice.frame(&idle, 1.0 / 60.0);
    assert!(shown.iter().any(|s| s.id() == bob.player_id()));
}
