//! View module - UI rendering
//!
//! - `layout`: top bar with device and account
//! - `progress`: now-playing gauge
//! - `overlays`: status and error notification

mod layout;
mod overlays;
mod progress;

use ratatui::{
    layout::{Constraint, Direction, Layout},
    Frame,
};

use play_session::model::Track;

/// Everything one frame shows, computed from the session before drawing.
#[derive(Clone, Debug, Default)]
pub struct NowPlayingView {
    pub device_name: String,
    pub device_status: String,
    pub account: String,
    pub track: Option<Track>,
    pub playing: bool,
    pub elapsed_label: String,
    pub progress_ratio: f64,
    pub volume: i32,
    pub notice: Option<Notice>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    Info(String),
    Error(String),
}

pub struct AppView;

impl AppView {
    pub fn render(frame: &mut Frame, view: &NowPlayingView) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Device + account
                Constraint::Min(0),    // Track details and key help
                Constraint::Length(3), // Progress bar
            ])
            .split(frame.area());

        layout::render_top_bar(frame, chunks[0], view);
        layout::render_track_details(frame, chunks[1], view);
        progress::render_progress_bar(frame, chunks[2], view);

        if let Some(notice) = &view.notice {
            overlays::render_notice(frame, notice);
        }
    }
}
