//! Top bar and track details

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Padding, Paragraph},
    Frame,
};

use super::NowPlayingView;

const KEY_HELP: &str =
    "space play/pause | n/p next/prev | ←/→ seek 10s | +/- volume | r reconnect | q quit";

pub fn render_top_bar(frame: &mut Frame, area: Rect, view: &NowPlayingView) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Min(0),     // Account
            Constraint::Length(40), // Device
        ])
        .split(area);

    let account = Paragraph::new(view.account.as_str())
        .style(Style::default().fg(Color::White))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Account ")
                .padding(Padding::horizontal(1)),
        );
    frame.render_widget(account, chunks[0]);

    let device = Paragraph::new(format!("🎵 {} ({})", view.device_name, view.device_status))
        .style(Style::default().fg(Color::Cyan))
        .block(Block::default().borders(Borders::ALL).title(" Device "));
    frame.render_widget(device, chunks[1]);
}

pub fn render_track_details(frame: &mut Frame, area: Rect, view: &NowPlayingView) {
    let mut lines = match &view.track {
        Some(track) => vec![
            Line::from(Span::styled(
                track.name.clone(),
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            )),
            Line::from(track.artists_joined()),
            Line::from(Span::styled(
                track.album.clone(),
                Style::default().fg(Color::DarkGray),
            )),
        ],
        None => vec![Line::from("No track playing")],
    };
    lines.push(Line::default());
    lines.push(Line::from(Span::styled(
        KEY_HELP,
        Style::default().fg(Color::DarkGray),
    )));

    let details = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Now Playing ")
            .padding(Padding::uniform(1)),
    );
    frame.render_widget(details, area);
}
