use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph};

use tether::net::TransportStatsSnapshot;
use tether_server::{LoggedEvent, ServerStats, Severity};

pub struct Dashboard<'a> {
    pub stats: ServerStats,
    pub transport: TransportStatsSnapshot,
    pub peers: usize,
    pub events: &'a [LoggedEvent],
}

pub fn render(frame: &mut Frame, dashboard: &Dashboard<'_>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(7),
            Constraint::Min(3),
            Constraint::Length(3),
        ])
        .split(frame.area());

    render_header(frame, chunks[0], &dashboard.stats);
    render_status(frame, chunks[1], &dashboard.stats);
    render_network(frame, chunks[2], dashboard);
    render_events(frame, chunks[3], dashboard.events);
    render_help(frame, chunks[4]);
}

fn render_header(frame: &mut Frame, area: Rect, stats: &ServerStats) {
    let uptime = format_duration(stats.uptime_secs);
    let title = format!(" Tether Server - Uptime: {} ", uptime);

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let text = format!(
        "Tick: {}  |  Players: {}  |  Entities: {}",
        stats.tick, stats.player_count, stats.entity_count
    );

    let paragraph = Paragraph::new(text)
        .block(block)
        .style(Style::default().fg(Color::White));

    frame.render_widget(paragraph, area);
}

fn render_status(frame: &mut Frame, area: Rect, stats: &ServerStats) {
    let block = Block::default()
        .title(" Players ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green));

    let ratio = stats.player_count as f64 / stats.max_players.max(1) as f64;
    let gauge = Gauge::default()
        .block(block)
        .gauge_style(Style::default().fg(Color::Green))
        .ratio(ratio.min(1.0))
        .label(format!("{}/{} players", stats.player_count, stats.max_players));

    frame.render_widget(gauge, area);
}

fn stat_line(label: &str, value: String, warn: bool) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{}: ", label), Style::default().fg(Color::Gray)),
        Span::styled(
            value,
            Style::default().fg(if warn { Color::Red } else { Color::White }),
        ),
    ])
}

fn render_network(frame: &mut Frame, area: Rect, dashboard: &Dashboard<'_>) {
    let block = Block::default()
        .title(" Network ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));

    let net = &dashboard.transport;
    let lines = vec![
        stat_line("Push peers", dashboard.peers.to_string(), false),
        stat_line(
            "Frames",
            format!(
                "{} queued / {} delivered",
                net.frames_enqueued, net.frames_delivered
            ),
            false,
        ),
        stat_line("Bytes queued", format_bytes(net.bytes_enqueued), false),
        stat_line(
            "Dropped",
            format!(
                "{} frames, {} peers evicted",
                net.frames_dropped, net.peers_evicted
            ),
            net.frames_dropped > 0,
        ),
        stat_line(
            "Requests",
            format!(
                "{} handled, {} malformed",
                net.requests_handled, net.malformed_frames
            ),
            net.malformed_frames > 0,
        ),
    ];

    let paragraph = Paragraph::new(lines).block(block);
    frame.render_widget(paragraph, area);
}

fn render_events(frame: &mut Frame, area: Rect, events: &[LoggedEvent]) {
    let block = Block::default()
        .title(" Events ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue));

    let visible = area.height.saturating_sub(2) as usize;
    let skip = events.len().saturating_sub(visible);
    let lines: Vec<Line> = events
        .iter()
        .skip(skip)
        .map(|logged| {
            let color = match logged.event.severity() {
                Severity::Info => Color::White,
                Severity::Warn => Color::Yellow,
                Severity::Error => Color::Red,
            };
            Line::from(vec![
                Span::styled(
                    format!("{:>6} ", format_age(logged.at.elapsed().as_secs())),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(logged.event.describe(), Style::default().fg(color)),
            ])
        })
        .collect();

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_help(frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .title(" Controls ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    let text = Paragraph::new("Press 'q' or ESC to quit")
        .block(block)
        .style(
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        );

    frame.render_widget(text, area);
}

fn format_duration(secs: u64) -> String {
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;
    format!("{:02}:{:02}:{:02}", hours, mins, secs)
}

fn format_age(secs: u64) -> String {
    match secs {
        0..60 => format!("{}s", secs),
        60..3600 => format!("{}m", secs / 60),
        _ => format!("{}h", secs / 3600),
    }
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{}B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1}KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1}GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_sizes_and_durations() {
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(2048), "2.0KB");
        assert_eq!(format_duration(3725), "01:02:05");
        assert_eq!(format_age(125), "2m");
    }
}
