use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tether::TransportConfig;
use tether::net::{
    ClientTransport, Connection, InputAck, Packet, PlayerInput, Push, RegisterOutcome,
    RegisterPlayer, Registration, Request, RequestHandler, Response, ServerTransport,
    SetPlayerInput,
};
use tether::snapshot::WorldSnapshot;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

#[derive(Default)]
struct Recorder {
    handled: AtomicUsize,
}

impl RequestHandler for Recorder {
    fn handle(&self, request: Request) -> Response {
        self.handled.fetch_add(1, Ordering::SeqCst);
        match request {
            Request::RegisterPlayer(register) => {
                Response::RegisterPlayer(RegisterOutcome::Accepted(Registration {
                    player_id: format!("player-{}", register.name),
                    server_time_ms: 1_000.0,
                    start_time_ms: 0.0,
                    timestep_ms: 15.0,
                    world: WorldSnapshot::new(0),
                }))
            }
            Request::SetPlayerInput(set) => Response::SetPlayerInput(InputAck {
                tick: i64::from(set.input.sequence),
                accepted: true,
            }),
        }
    }
}

fn loopback() -> TransportConfig {
    let any = SocketAddr::from((Ipv4Addr::LOCALHOST, 0));
    TransportConfig::with_addrs(any, any)
}

async fn start() -> (ServerTransport, Arc<Recorder>, TransportConfig) {
    let handler = Arc::new(Recorder::default());
    let server = ServerTransport::start(loopback(), Arc::clone(&handler))
        .await
        .unwrap();
    let client_config = TransportConfig::with_addrs(server.request_addr(), server.push_addr());
    (server, handler, client_config)
}

async fn wait_for_peers(server: &ServerTransport, count: usize) {
    for _ in 0..200 {
        if server.peers().len() == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {} peers, have {}", count, server.peers().len());
}

fn register(name: &str) -> Request {
    Request::RegisterPlayer(RegisterPlayer {
        name: name.to_string(),
        game_version: tether::net::GAME_VERSION.to_string(),
        client_id: "client-1".to_string(),
    })
}

#[tokio::test]
async fn request_round_trip_over_loopback() {
    let (_server, handler, config) = start().await;
    let client = ClientTransport::connect(config, "client-1").await.unwrap();

    let response = client.send(register("alice")).await.unwrap();
    let Response::RegisterPlayer(RegisterOutcome::Accepted(registration)) = response else {
        panic!("unexpected response {response:?}");
    };
    assert_eq!(registration.player_id, "player-alice");

    let ack = client
        .send(Request::SetPlayerInput(SetPlayerInput {
            player_id: registration.player_id,
            input: PlayerInput {
                sequence: 12,
                ..Default::default()
            },
        }))
        .await
        .unwrap();
    assert_eq!(
        ack,
        Response::SetPlayerInput(InputAck {
            tick: 12,
            accepted: true
        })
    );
    assert_eq!(handler.handled.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn concurrent_requests_share_the_pool() {
    let (_server, handler, config) = start().await;
    let client = Arc::new(ClientTransport::connect(config, "client-1").await.unwrap());

    let mut tasks = Vec::new();
    for n in 0..32u32 {
        let client = Arc::clone(&client);
        tasks.push(tokio::spawn(async move {
            client
                .send(Request::SetPlayerInput(SetPlayerInput {
                    player_id: "p".to_string(),
                    input: PlayerInput {
                        sequence: n,
                        ..Default::default()
                    },
                }))
                .await
        }));
    }

    for (n, task) in tasks.into_iter().enumerate() {
        let response = task.await.unwrap().unwrap();
        assert_eq!(
            response,
            Response::SetPlayerInput(InputAck {
                tick: n as i64,
                accepted: true
            })
        );
    }
    assert_eq!(handler.handled.load(Ordering::SeqCst), 32);
    assert_eq!(client.idle_request_connections(), 4);
}

#[tokio::test]
async fn broadcast_reaches_listening_client() {
    let (server, _handler, config) = start().await;
    let client = ClientTransport::connect(config, "client-1").await.unwrap();
    let mut inbound = client.listen().unwrap();
    assert!(client.listen().is_err());

    wait_for_peers(&server, 1).await;
    let world = WorldSnapshot::new(77);
    let targeted = server
        .broadcast(&Packet::push(Push::AddWorldSnapshot(world.clone())))
        .unwrap();
    assert_eq!(targeted, 1);

    let push = tokio::time::timeout(Duration::from_secs(2), inbound.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(push, Push::AddWorldSnapshot(world));
}

#[tokio::test]
async fn malformed_request_frame_is_dropped_without_closing() {
    let (server, handler, config) = start().await;
    let stream = TcpStream::connect(server.request_addr()).await.unwrap();
    let mut connection = Connection::tcp(stream, &config);

    connection.write_frame(b"definitely not a packet").await.unwrap();
    connection.send_packet(&Packet::request(register("bob"))).await.unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(2), connection.recv_packet())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        reply.payload,
        tether::net::Payload::Response(Response::RegisterPlayer(_))
    ));
    assert_eq!(handler.handled.load(Ordering::SeqCst), 1);
    assert_eq!(server.stats().malformed_frames, 1);
}

#[tokio::test]
async fn push_connection_without_hello_never_becomes_a_peer() {
    let (server, _handler, config) = start().await;
    let stream = TcpStream::connect(server.push_addr()).await.unwrap();
    let mut connection = Connection::tcp(stream, &config);
    connection.send_packet(&Packet::request(register("eve"))).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(server.peers().is_empty());

    let mut raw = TcpStream::connect(server.push_addr()).await.unwrap();
    raw.write_all(&[0xff; 16]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(server.peers().is_empty());
}

#[tokio::test]
async fn peer_is_evicted_after_client_disappears() {
    let (server, _handler, config) = start().await;
    let client = ClientTransport::connect(config, "client-1").await.unwrap();
    wait_for_peers(&server, 1).await;

    drop(client);
    // Each broadcast either fails a write and costs a connection, or finds the
    // pool empty and waits out the delivery timeout.
    for tick in 0..20 {
        server
            .broadcast(&Packet::push(Push::AddWorldSnapshot(WorldSnapshot::new(tick))))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    wait_for_peers(&server, 0).await;
    assert_eq!(server.stats().peers_evicted, 1);
}
