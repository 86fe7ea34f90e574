//! Progress bar rendering

use ratatui::{
    layout::Rect,
    style::{Color, Style},
    text::Line,
    widgets::{Block, Borders, Gauge},
    Frame,
};

use super::NowPlayingView;

pub fn render_progress_bar(frame: &mut Frame, area: Rect, view: &NowPlayingView) {
    let status_text = match &view.track {
        None => " No track playing".to_string(),
        Some(track) if view.playing => format!(" ▶ {} | {}", track.name, track.artist()),
        Some(track) => format!("⏸  {} | {}", track.name, track.artist()),
    };
    let volume_text = format!(" Vol: {}% ", view.volume);

    let gauge = Gauge::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("{} ", status_text))
                .title_bottom(Line::from(volume_text).right_aligned()),
        )
        .gauge_style(Style::default().fg(Color::Green))
        .ratio(view.progress_ratio.clamp(0.0, 1.0))
        .label(view.elapsed_label.as_str());

    frame.render_widget(gauge, area);
}
