use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use glam::Vec2;
use tokio::time::MissedTickBehavior;

use tether::{DEFAULT_PUSH_PORT, DEFAULT_REQUEST_PORT, TransportConfig};
use tether_client::{ClientConfig, InputState, NetworkClient};

const FIRE_EVERY: Duration = Duration::from_secs(2);
const TRIGGER_HOLD: Duration = Duration::from_millis(150);
const TURN_RATE: f32 = 0.8;

#[derive(Parser)]
#[command(name = "tether-client")]
#[command(about = "Headless Tether client that plays as a simple bot")]
struct Args {
    #[arg(short, long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    server: IpAddr,

    #[arg(long, default_value_t = DEFAULT_REQUEST_PORT)]
    request_port: u16,

    #[arg(long, default_value_t = DEFAULT_PUSH_PORT)]
    push_port: u16,

    #[arg(short, long, default_value = "bot")]
    name: String,

    #[arg(
        long,
        default_value_t = 30,
        help = "How long to play; 0 plays until Ctrl-C"
    )]
    seconds: u64,

    #[arg(long, default_value_t = 60)]
    fps: u32,
}

impl Args {
    fn config(&self) -> ClientConfig {
        ClientConfig {
            transport: TransportConfig::with_addrs(
                SocketAddr::new(self.server, self.request_port),
                SocketAddr::new(self.server, self.push_port),
            ),
            frames_per_second: self.fps.max(1),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let client = NetworkClient::connect(args.config(), &args.name)
        .await
        .with_context(|| format!("failed to join {}", args.server))?;

    let limit = (args.seconds > 0).then(|| Duration::from_secs(args.seconds));
    tokio::select! {
        _ = play(&client, limit) => {}
        result = tokio::signal::ctrl_c() => result?,
    }

    log::info!("{} leaving", client.player_id());
    client.close();
    Ok(())
}

/// Walk in a circle, shoot now and then, report once per second.
async fn play(client: &NetworkClient, limit: Option<Duration>) {
    let fps = client.config().frames_per_second;
    let frame_time = Duration::from_secs_f64(1.0 / f64::from(fps));
    let mut frames = tokio::time::interval(frame_time);
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let started = Instant::now();
    let mut last_frame = started;
    let mut last_report = started;
    let mut last_shot = started;
    let mut heading = 0.0f32;

    loop {
        frames.tick().await;
        let now = Instant::now();
        if limit.is_some_and(|limit| now - started >= limit) {
            return;
        }

        let dt = (now - last_frame).as_secs_f32();
        last_frame = now;
        heading += TURN_RATE * dt;

        // Hold the trigger long enough for a throttled send to carry it.
        if now - last_shot >= FIRE_EVERY {
            last_shot = now;
        }
        let fire = now - last_shot < TRIGGER_HOLD;
        let input = InputState {
            move_direction: Vec2::from_angle(heading),
            aim_angle: heading,
            fire,
            ..Default::default()
        };
        let shown = client.frame(&input, dt);

        if now - last_report >= Duration::from_secs(1) {
            last_report = now;
            let position = client.predicted_position();
            log::info!(
                "tick {} at ({:.0}, {:.0}), {} entities shown, clock offset {:.1}ms",
                client.clock().current_tick(),
                position.x,
                position.y,
                shown.len(),
                client.clock().offset_ms()
            );
        }
    }
}
