//! Controller module - key handling and view state
//!
//! - `input`: key bindings
//! - `playback`: transport commands and how their outcome is reported

mod input;
mod playback;

use input::Action;

use std::sync::Arc;

use play_session::gate::StatusLineLauncher;
use play_session::player::PlayerStatus;
use play_session::session::Session;

use crate::view::{Notice, NowPlayingView};

const INITIAL_VOLUME: i32 = 50;

pub struct AppController {
    session: Arc<Session>,
    launcher: Arc<StatusLineLauncher>,
    device_name: String,
    volume: i32,
    notice: Option<Notice>,
    shown_link: Option<String>,
    should_quit: bool,
}

impl AppController {
    pub fn new(session: Arc<Session>, launcher: Arc<StatusLineLauncher>, device_name: String) -> Self {
        Self {
            session,
            launcher,
            device_name,
            volume: INITIAL_VOLUME,
            notice: None,
            shown_link: None,
            should_quit: false,
        }
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn set_notice(&mut self, notice: Notice) {
        self.notice = Some(notice);
    }

    /// Snapshot of everything the next frame shows.
    pub async fn view(&mut self) -> NowPlayingView {
        if let Some(link) = self.launcher.last_link() {
            if self.shown_link.as_deref() != Some(link.as_str()) {
                self.notice = Some(Notice::Info(format!("Open in Spotify: {link}")));
                self.shown_link = Some(link);
            }
        }

        let account = match self.session.account().await {
            Some(account) => {
                let name = account.display_name.unwrap_or_else(|| "Signed in".to_string());
                format!("{} ({:?})", name, account.tier)
            }
            None => "Signed out".to_string(),
        };
        let device_status = match self.session.player_status().await {
            PlayerStatus::Uninitialized => "not started".to_string(),
            PlayerStatus::Connecting => "connecting".to_string(),
            PlayerStatus::Ready { .. } => "ready".to_string(),
            PlayerStatus::Disconnected => "offline".to_string(),
            PlayerStatus::Error(e) => format!("error: {:?}", e.kind()),
        };

        let store = self.session.store();
        NowPlayingView {
            device_name: self.device_name.clone(),
            device_status,
            account,
            track: store.now_playing(),
            playing: store.is_playing(),
            elapsed_label: store.elapsed_label(),
            progress_ratio: store.progress_ratio(),
            volume: self.volume,
            notice: self.notice.clone(),
        }
    }
}
