//! Key event handling

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind};

use super::AppController;

const SEEK_STEP_MS: i64 = 10_000;
const VOLUME_STEP: i32 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    TogglePlay,
    Next,
    Previous,
    SeekBy(i64),
    VolumeBy(i32),
    Reconnect,
    Dismiss,
    Quit,
}

pub fn action_for(key: &KeyEvent) -> Option<Action> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    Some(match key.code {
        KeyCode::Char(' ') => Action::TogglePlay,
        KeyCode::Char('n') | KeyCode::Char('N') => Action::Next,
        KeyCode::Char('p') | KeyCode::Char('P') => Action::Previous,
        KeyCode::Left => Action::SeekBy(-SEEK_STEP_MS),
        KeyCode::Right => Action::SeekBy(SEEK_STEP_MS),
        KeyCode::Char('+') | KeyCode::Char('=') => Action::VolumeBy(VOLUME_STEP),
        KeyCode::Char('-') => Action::VolumeBy(-VOLUME_STEP),
        KeyCode::Char('r') | KeyCode::Char('R') => Action::Reconnect,
        KeyCode::Esc | KeyCode::Enter => Action::Dismiss,
        KeyCode::Char('q') | KeyCode::Char('Q') => Action::Quit,
        _ => return None,
    })
}

impl AppController {
    pub async fn handle_key_event(&mut self, key: KeyEvent) {
        let Some(action) = action_for(&key) else {
            return;
        };
        tracing::trace!(action = ?action, "Key action");

        match action {
            Action::Quit => self.should_quit = true,
            Action::Dismiss => self.notice = None,
            Action::Reconnect => self.reconnect().await,
            action => self.perform(action).await,
        }
    }
}
