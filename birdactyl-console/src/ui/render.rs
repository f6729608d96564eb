//! Drawing the console screen
//!
//! Layout, top to bottom: header (server, status, channel), telemetry bar,
//! console pane, command input, and a footer with key hints or the last
//! message.

use std::time::Duration;

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

use birdactyl_protocol::{PowerAction, ServerStatus};

use crate::connection::ConnectionState;
use crate::session::{LogLine, LogOrigin, Session};

use super::input::InputLine;

const HINTS: &str = "^S start  ^X stop  ^R restart  ^K kill  PgUp/PgDn scroll  ^Q quit";

/// Everything the renderer needs besides the session
pub struct View<'a> {
    pub session: &'a Session,
    pub input: &'a InputLine,
    /// Lines scrolled up from the bottom
    pub scroll: usize,
    pub message: Option<&'a str>,
}

pub fn draw(frame: &mut Frame, view: &View<'_>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(frame.area());

    frame.render_widget(Paragraph::new(header_line(view.session)), chunks[0]);
    frame.render_widget(Paragraph::new(stats_line(view.session)), chunks[1]);
    draw_console(frame, chunks[2], view);
    draw_input(frame, chunks[3], view);

    let footer = match view.message {
        Some(message) => Line::from(Span::styled(
            message.to_string(),
            Style::default().fg(Color::Yellow),
        )),
        None => Line::from(Span::styled(HINTS, Style::default().fg(Color::DarkGray))),
    };
    frame.render_widget(Paragraph::new(footer), chunks[4]);
}

fn header_line(session: &Session) -> Line<'static> {
    let status = session.status();
    let power = session.power_state();
    let mut spans = vec![
        Span::styled(
            session.server().name.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw("  "),
        Span::styled(status.to_string(), status_style(status)),
    ];

    if let Some(action) = power.action_in_flight {
        let label = if power.is_escalating {
            "killing...".to_string()
        } else {
            format!("{}...", progressive(action))
        };
        spans.push(Span::raw("  "));
        spans.push(Span::styled(label, Style::default().fg(Color::Yellow)));
    }

    spans.push(Span::raw("  "));
    match session.connection_error() {
        Some(error) => spans.push(Span::styled(
            format!("console unavailable: {}", error),
            Style::default().fg(Color::White).bg(Color::Red),
        )),
        None => {
            let state = session.connection_state();
            spans.push(Span::styled(state.as_str(), connection_style(state)));
        }
    }

    Line::from(spans)
}

fn stats_line(session: &Session) -> Line<'static> {
    let tracker = session.stats_tracker();
    let Some(stats) = tracker.snapshot() else {
        return Line::from(Span::styled(
            "waiting for stats",
            Style::default().fg(Color::DarkGray),
        ));
    };
    let server = session.server();
    let memory_limit = if stats.memory_limit_bytes > 0 {
        stats.memory_limit_bytes
    } else {
        server.memory_limit_bytes()
    };

    let text = format!(
        "CPU {:.1}% ({:.0}%)  MEM {} / {} ({:.0}%)  DISK {} / {} ({:.0}%)  NET rx {} tx {}",
        stats.cpu_percent,
        tracker.cpu_percent(server),
        format_bytes(stats.memory_usage_bytes),
        format_bytes(memory_limit),
        tracker.memory_percent(server),
        format_bytes(stats.disk_usage_bytes),
        format_bytes(server.disk_limit_bytes()),
        tracker.disk_percent(server),
        format_bytes(stats.net_rx_bytes),
        format_bytes(stats.net_tx_bytes),
    );

    if !tracker.is_stale() {
        return Line::from(Span::raw(text));
    }
    let style = Style::default().fg(Color::DarkGray);
    let age = tracker.updated_at().map(|at| at.elapsed());
    Line::from(vec![
        Span::styled(text, style),
        Span::styled(stale_label(age), style),
    ])
}

/// Suffix for telemetry that stopped updating
fn stale_label(age: Option<Duration>) -> String {
    match age {
        Some(age) => format!("  (stale, {}s ago)", age.as_secs()),
        None => "  (stale)".to_string(),
    }
}

fn draw_console(frame: &mut Frame, area: Rect, view: &View<'_>) {
    let logs = view.session.logs();
    let height = area.height.saturating_sub(2) as usize;
    let (start, end) = visible_range(logs.len(), height, view.scroll);

    let lines: Vec<Line> = logs
        .iter()
        .skip(start)
        .take(end - start)
        .map(log_line)
        .collect();

    let title = if view.scroll > 0 {
        format!(" Console (+{}) ", view.scroll)
    } else {
        " Console ".to_string()
    };
    let block = Block::default().borders(Borders::ALL).title(title);
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_input(frame: &mut Frame, area: Rect, view: &View<'_>) {
    let open = view.session.connection_state() == ConnectionState::Open;
    let title = if open {
        " Command "
    } else {
        " Command (not connected) "
    };
    let style = if open {
        Style::default()
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let block = Block::default().borders(Borders::ALL).title(title);
    frame.render_widget(
        Paragraph::new(view.input.text().to_string())
            .style(style)
            .block(block),
        area,
    );

    frame.set_cursor_position((cursor_column(area, view.input.cursor()), area.y + 1));
}

/// Terminal column for the input cursor, kept inside the box border
fn cursor_column(area: Rect, cursor: usize) -> u16 {
    let offset = u16::try_from(cursor).unwrap_or(u16::MAX);
    let x = area.x.saturating_add(1).saturating_add(offset);
    let max_x = area.x.saturating_add(area.width.saturating_sub(2));
    x.min(max_x)
}

fn log_line(line: &LogLine) -> Line<'static> {
    let text_style = match line.color.as_deref().and_then(parse_color) {
        Some(color) => Style::default().fg(color),
        None => origin_style(line.origin),
    };
    Line::from(vec![
        Span::styled(
            format!("{} ", line.time),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(line.text.clone(), text_style),
    ])
}

/// Index range of the lines to show, scrolled up from the bottom
pub fn visible_range(len: usize, height: usize, scroll: usize) -> (usize, usize) {
    let end = len.saturating_sub(scroll);
    let start = end.saturating_sub(height);
    (start, end)
}

/// `#rrggbb` to a terminal color
pub fn parse_color(hex: &str) -> Option<Color> {
    let hex = hex.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    Some(Color::Rgb(channel(0)?, channel(2)?, channel(4)?))
}

/// Human-readable byte count (binary units)
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

fn progressive(action: PowerAction) -> &'static str {
    match action {
        PowerAction::Start => "starting",
        PowerAction::Stop => "stopping",
        PowerAction::Restart => "restarting",
        PowerAction::Kill => "killing",
    }
}

fn status_style(status: ServerStatus) -> Style {
    let color = match status {
        ServerStatus::Running => Color::Green,
        ServerStatus::Stopped => Color::Gray,
        ServerStatus::Suspended => Color::Magenta,
        ServerStatus::Failed => Color::Red,
        ServerStatus::Installing => Color::Yellow,
    };
    Style::default().fg(color)
}

fn connection_style(state: ConnectionState) -> Style {
    match state {
        ConnectionState::Open => Style::default().fg(Color::Green),
        ConnectionState::Connecting | ConnectionState::Reconnecting => {
            Style::default().fg(Color::Yellow)
        }
        ConnectionState::Errored => Style::default().fg(Color::Red),
        ConnectionState::Closed => Style::default().fg(Color::DarkGray),
    }
}

fn origin_style(origin: LogOrigin) -> Style {
    match origin {
        LogOrigin::Server => Style::default(),
        LogOrigin::System => Style::default().fg(Color::Yellow),
        LogOrigin::Echo => Style::default().fg(Color::Cyan),
    }
}
