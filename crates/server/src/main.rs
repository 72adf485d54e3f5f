mod tui;

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

use tether::config::{DEFAULT_BROADCAST_INTERVAL_MS, DEFAULT_TIMESTEP_MS};
use tether::{DEFAULT_PUSH_PORT, DEFAULT_REQUEST_PORT, Timing, TransportConfig};
use tether_server::{RunningServer, ServerConfig};

const RECENT_EVENTS: usize = 64;

#[derive(Parser)]
#[command(name = "tether-server")]
#[command(about = "Authoritative Tether game server")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: IpAddr,

    #[arg(long, default_value_t = DEFAULT_REQUEST_PORT)]
    request_port: u16,

    #[arg(long, default_value_t = DEFAULT_PUSH_PORT)]
    push_port: u16,

    #[arg(long, default_value_t = DEFAULT_TIMESTEP_MS, help = "Simulation step in ms")]
    tick_ms: f64,

    #[arg(
        long,
        default_value_t = DEFAULT_BROADCAST_INTERVAL_MS,
        help = "World snapshot interval in ms"
    )]
    broadcast_ms: f64,

    #[arg(short, long, default_value_t = 32)]
    max_players: usize,

    #[arg(
        long,
        default_value_t = 5,
        help = "Seconds without input before a player is removed"
    )]
    liveness_timeout_secs: u64,

    #[arg(long)]
    headless: bool,
}

impl Args {
    fn config(&self) -> ServerConfig {
        let transport = TransportConfig::with_addrs(
            SocketAddr::new(self.bind, self.request_port),
            SocketAddr::new(self.bind, self.push_port),
        );
        ServerConfig {
            timing: Timing::new(self.tick_ms, self.broadcast_ms),
            transport,
            max_players: self.max_players,
            liveness_timeout: Duration::from_secs(self.liveness_timeout_secs),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    if args.headless {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    let server = RunningServer::start(args.config())
        .await
        .context("failed to start server")?;
    let server = Arc::new(server);

    if args.headless {
        log::info!(
            "Server started: requests on {}, pushes on {}",
            server.request_addr(),
            server.push_addr()
        );
        tokio::signal::ctrl_c().await?;
        log::info!("Server shutting down");
    } else {
        let dashboard = Arc::clone(&server);
        tokio::task::spawn_blocking(move || run_with_tui(&dashboard)).await??;
    }

    server.shutdown();
    Ok(())
}

fn run_with_tui(server: &RunningServer) -> io::Result<()> {
    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, cursor::Hide)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = dashboard_loop(&mut terminal, server);

    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)?;

    result
}

fn dashboard_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    server: &RunningServer,
) -> io::Result<()> {
    loop {
        if event::poll(Duration::from_millis(100))?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    return Ok(());
                }
                _ => {}
            }
        }

        let events = server.server().events().recent(RECENT_EVENTS);
        let dashboard = tui::Dashboard {
            stats: server.stats(),
            transport: server.transport_stats(),
            peers: server.peer_count(),
            events: &events,
        };
        terminal.draw(|frame| tui::render(frame, &dashboard))?;
    }
}
