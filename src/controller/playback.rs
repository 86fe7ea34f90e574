//! Playback control methods

use play_session::error::Result;
use play_session::transport::{CommandOutcome, IgnoreReason};

use super::{Action, AppController};
use crate::view::Notice;

impl AppController {
    pub(super) async fn perform(&mut self, action: Action) {
        let Some(transport) = self.session.transport().await else {
            tracing::debug!(action = ?action, "No transport, account cannot stream");
            self.notice = Some(Notice::Info(
                "In-app playback needs Spotify Premium.".to_string(),
            ));
            return;
        };

        let result = match action {
            Action::TogglePlay => transport.toggle_play().await,
            Action::Next => transport.next_track().await,
            Action::Previous => transport.previous_track().await,
            Action::SeekBy(delta) => {
                let position = i64::from(self.session.store().position_ms()) + delta;
                let position = u32::try_from(position.max(0)).unwrap_or(u32::MAX);
                transport.seek(position).await
            }
            Action::VolumeBy(delta) => {
                self.volume = (self.volume + delta).clamp(0, 100);
                transport.set_volume(self.volume).await
            }
            Action::Reconnect | Action::Dismiss | Action::Quit => return,
        };
        self.report(action, result);
    }

    pub(super) async fn reconnect(&mut self) {
        match self.session.reconnect().await {
            Ok(Some(device_id)) => {
                tracing::info!(device_id = %device_id, "Device reconnected");
                self.notice = None;
            }
            Ok(None) => {}
            Err(e) => self.notice = Some(Notice::Error(e.user_message())),
        }
    }

    fn report(&mut self, action: Action, result: Result<CommandOutcome>) {
        match result {
            Ok(CommandOutcome::Sent) => tracing::info!(action = ?action, "Command sent"),
            Ok(CommandOutcome::Ignored(IgnoreReason::NotReady)) => {
                self.notice = Some(Notice::Info(
                    "Device is not ready yet. Press r to reconnect.".to_string(),
                ));
            }
            Ok(CommandOutcome::Ignored(IgnoreReason::SessionClosed)) => {
                self.notice = Some(Notice::Info("Signed out.".to_string()));
            }
            Err(e) => {
                tracing::error!(action = ?action, error = %e, "Command failed");
                self.notice = Some(Notice::Error(e.user_message()));
            }
        }
    }
}
