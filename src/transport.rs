//! Transport controller
//!
//! Imperative playback commands routed either to the in-process device (via
//! the SDK) or to a remote Spotify Connect device (via the HTTP control API).
//! Starting playback of a URI always goes through the HTTP API, addressed to
//! the target device id.
//!
//! Commands never update local state optimistically; the store waits for the
//! provider's next snapshot. A command issued while no device is ready, or
//! after the session has been torn down, is dropped at entry and reported as
//! [`CommandOutcome::Ignored`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use crate::error::{PlayerError, Result};
use crate::model::SpotifyUri;
use crate::player::{PlaybackSdk, RemotePlayer};
use crate::web_api::{ControlApi, PlayRequest};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    /// No device is ready to take the command.
    NotReady,
    /// The owning session has been signed out.
    SessionClosed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandOutcome {
    Sent,
    Ignored(IgnoreReason),
}

impl CommandOutcome {
    pub fn was_sent(self) -> bool {
        self == CommandOutcome::Sent
    }
}

/// Device the controller currently addresses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    Local,
    Remote(String),
}

#[derive(Clone, Debug, PartialEq)]
enum Command {
    Play(PlayRequest),
    Resume,
    Pause,
    Toggle,
    Seek(u32),
    SetVolume(u8),
    Next,
    Previous,
}

impl Command {
    fn operation(&self) -> &'static str {
        match self {
            Command::Play(_) => "play",
            Command::Resume => "resume",
            Command::Pause => "pause",
            Command::Toggle => "toggle_play",
            Command::Seek(_) => "seek",
            Command::SetVolume(_) => "set_volume",
            Command::Next => "next_track",
            Command::Previous => "previous_track",
        }
    }
}

enum Route {
    Local {
        device_id: String,
        sdk: Arc<dyn PlaybackSdk>,
    },
    Remote {
        device_id: String,
    },
}

impl Route {
    fn device_id(&self) -> &str {
        match self {
            Route::Local { device_id, .. } | Route::Remote { device_id } => device_id,
        }
    }
}

pub struct TransportController {
    player: Weak<RemotePlayer>,
    api: Arc<dyn ControlApi>,
    target: Mutex<Target>,
    command_timeout: Duration,
    // Last paused flag we caused on a remote device; the local device reports
    // its own through snapshots.
    remote_paused: AtomicBool,
}

impl TransportController {
    pub fn new(
        player: &Arc<RemotePlayer>,
        api: Arc<dyn ControlApi>,
        command_timeout: Duration,
    ) -> Self {
        Self {
            player: Arc::downgrade(player),
            api,
            target: Mutex::new(Target::Local),
            command_timeout,
            remote_paused: AtomicBool::new(true),
        }
    }

    pub fn target(&self) -> Target {
        self.target
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_target(&self, target: Target) {
        tracing::info!(target = ?target, "Transport target changed");
        *self.target.lock().unwrap_or_else(PoisonError::into_inner) = target;
    }

    /// Play `uri` from `position_ms`, or resume the last context when no
    /// URI is given.
    pub async fn play(&self, uri: Option<&str>, position_ms: Option<u32>) -> Result<CommandOutcome> {
        let Some(uri) = uri else {
            return self.send(Command::Resume).await;
        };
        let uri: SpotifyUri = uri.parse()?;
        self.send(Command::Play(PlayRequest::for_uri(uri, position_ms)))
            .await
    }

    /// Play a collection starting at one of its tracks.
    pub async fn play_context(
        &self,
        context_uri: &str,
        start_track_uri: Option<&str>,
        position_ms: Option<u32>,
    ) -> Result<CommandOutcome> {
        let context: SpotifyUri = context_uri.parse()?;
        if !context.is_context() {
            return Err(PlayerError::InvalidUri(format!(
                "{context_uri} is not a playable collection"
            )));
        }
        let start_at = start_track_uri.map(str::parse).transpose()?;
        self.send(Command::Play(PlayRequest::Context {
            context,
            start_at,
            position_ms,
        }))
        .await
    }

    pub async fn pause(&self) -> Result<CommandOutcome> {
        self.send(Command::Pause).await
    }

    pub async fn resume(&self) -> Result<CommandOutcome> {
        self.send(Command::Resume).await
    }

    /// Pause or resume depending on the last known paused flag. The local
    /// device decides for itself while it has not reported any state.
    pub async fn toggle_play(&self) -> Result<CommandOutcome> {
        let command = match self.target() {
            Target::Local => match self.player.upgrade().and_then(|p| p.last_state()) {
                Some(state) if state.paused => Command::Resume,
                Some(_) => Command::Pause,
                None => Command::Toggle,
            },
            Target::Remote(_) if self.remote_paused.load(Ordering::SeqCst) => Command::Resume,
            Target::Remote(_) => Command::Pause,
        };
        self.send(command).await
    }

    /// Absolute seek. Range checking is left to the provider.
    pub async fn seek(&self, position_ms: u32) -> Result<CommandOutcome> {
        self.send(Command::Seek(position_ms)).await
    }

    /// Set the volume, clamped into `0..=100`.
    pub async fn set_volume(&self, percent: i32) -> Result<CommandOutcome> {
        let percent = percent.clamp(0, 100) as u8;
        self.send(Command::SetVolume(percent)).await
    }

    pub async fn next_track(&self) -> Result<CommandOutcome> {
        self.send(Command::Next).await
    }

    pub async fn previous_track(&self) -> Result<CommandOutcome> {
        self.send(Command::Previous).await
    }

    /// Move playback to another Connect device and address it from now on.
    pub async fn transfer_to(&self, device_id: &str) -> Result<CommandOutcome> {
        if self.player.upgrade().is_none() {
            return Ok(ignored("transfer", IgnoreReason::SessionClosed));
        }
        self.bounded("transfer", self.api.transfer(device_id, true))
            .await?;
        self.set_target(Target::Remote(device_id.to_string()));
        Ok(CommandOutcome::Sent)
    }

    /// Bring playback back to the in-process device.
    pub async fn transfer_local(&self) -> Result<CommandOutcome> {
        let Some(player) = self.player.upgrade() else {
            return Ok(ignored("transfer", IgnoreReason::SessionClosed));
        };
        let Some(device_id) = player.device_id() else {
            return Ok(ignored("transfer", IgnoreReason::NotReady));
        };
        self.bounded("transfer", self.api.transfer(&device_id, true))
            .await?;
        self.set_target(Target::Local);
        Ok(CommandOutcome::Sent)
    }

    fn route(&self) -> std::result::Result<Route, IgnoreReason> {
        let player = self.player.upgrade().ok_or(IgnoreReason::SessionClosed)?;
        match self.target() {
            Target::Local => {
                let (device_id, sdk) = player.ready_sdk().ok_or(IgnoreReason::NotReady)?;
                Ok(Route::Local { device_id, sdk })
            }
            Target::Remote(device_id) => Ok(Route::Remote { device_id }),
        }
    }

    async fn send(&self, command: Command) -> Result<CommandOutcome> {
        let operation = command.operation();
        let route = match self.route() {
            Ok(route) => route,
            Err(reason) => return Ok(ignored(operation, reason)),
        };
        tracing::debug!(operation, device_id = %route.device_id(), "Sending transport command");

        let api = &self.api;
        let dispatch = async {
            match (&route, &command) {
                (_, Command::Play(request)) => api.start_playback(route.device_id(), request).await,
                (Route::Local { sdk, .. }, Command::Resume) => sdk.resume().await,
                (Route::Local { sdk, .. }, Command::Pause) => sdk.pause().await,
                (Route::Local { sdk, .. }, Command::Toggle) => sdk.toggle_play().await,
                (Route::Local { sdk, .. }, Command::Seek(ms)) => sdk.seek(*ms).await,
                (Route::Local { sdk, .. }, Command::SetVolume(v)) => sdk.set_volume(*v).await,
                (Route::Local { sdk, .. }, Command::Next) => sdk.next_track().await,
                (Route::Local { sdk, .. }, Command::Previous) => sdk.previous_track().await,
                // A remote toggle is resolved before dispatch; the target may
                // have changed in between
                (Route::Remote { device_id }, Command::Resume | Command::Toggle) => {
                    api.resume(device_id).await
                }
                (Route::Remote { device_id }, Command::Pause) => api.pause(device_id).await,
                (Route::Remote { device_id }, Command::Seek(ms)) => api.seek(device_id, *ms).await,
                (Route::Remote { device_id }, Command::SetVolume(v)) => {
                    api.set_volume(device_id, *v).await
                }
                (Route::Remote { device_id }, Command::Next) => api.next_track(device_id).await,
                (Route::Remote { device_id }, Command::Previous) => {
                    api.previous_track(device_id).await
                }
            }
        };
        self.bounded(operation, dispatch).await?;

        match command {
            Command::Play(_) | Command::Resume | Command::Toggle => {
                self.remote_paused.store(false, Ordering::SeqCst)
            }
            Command::Pause => self.remote_paused.store(true, Ordering::SeqCst),
            _ => {}
        }
        Ok(CommandOutcome::Sent)
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        let result = match tokio::time::timeout(self.command_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(PlayerError::Timeout {
                operation,
                after: self.command_timeout,
            }),
        };
        if let Err(e) = &result {
            tracing::warn!(operation, error = %e, "Transport command failed");
        }
        result
    }
}

fn ignored(operation: &'static str, reason: IgnoreReason) -> CommandOutcome {
    tracing::debug!(operation, reason = ?reason, "Command ignored");
    CommandOutcome::Ignored(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PlaybackState, UriKind};
    use crate::testing::{player_with, settle, ApiCall, FakeControlApi, FakeSdk, SdkCommand, StaticTokens};
    use crate::player::SdkEvent;

    const TIMEOUT: Duration = Duration::from_secs(10);

    async fn ready_setup() -> (Arc<RemotePlayer>, Arc<FakeSdk>, Arc<FakeControlApi>, TransportController) {
        let sdk = FakeSdk::ready_with("D");
        let player = player_with(sdk.clone(), StaticTokens::signed_in());
        player.initialize().await.unwrap();
        let api = FakeControlApi::new();
        let transport = TransportController::new(&player, api.clone(), TIMEOUT);
        (player, sdk, api, transport)
    }

    #[tokio::test]
    async fn commands_before_ready_are_ignored_without_network_calls() {
        let sdk = FakeSdk::new();
        let player = player_with(sdk.clone(), StaticTokens::signed_in());
        let api = FakeControlApi::new();
        let transport = TransportController::new(&player, api.clone(), TIMEOUT);

        let not_ready = CommandOutcome::Ignored(IgnoreReason::NotReady);
        assert_eq!(transport.play(Some("spotify:track:abc"), None).await, Ok(not_ready));
        assert_eq!(transport.play(None, None).await, Ok(not_ready));
        assert_eq!(transport.pause().await, Ok(not_ready));
        assert_eq!(transport.resume().await, Ok(not_ready));
        assert_eq!(transport.toggle_play().await, Ok(not_ready));
        assert_eq!(transport.set_volume(50).await, Ok(not_ready));

        assert!(api.calls().is_empty());
        assert!(sdk.commands().is_empty());
    }

    #[tokio::test]
    async fn commands_after_not_ready_are_ignored_again() {
        let (_player, sdk, api, transport) = ready_setup().await;
        assert_eq!(transport.pause().await, Ok(CommandOutcome::Sent));

        sdk.emit(SdkEvent::NotReady {
            device_id: "D".into(),
        });
        settle().await;

        assert_eq!(
            transport.resume().await,
            Ok(CommandOutcome::Ignored(IgnoreReason::NotReady))
        );
        assert_eq!(sdk.commands(), vec![SdkCommand::Pause]);
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn commands_after_teardown_report_closed_session() {
        let (player, _sdk, api, transport) = ready_setup().await;
        drop(player);

        assert_eq!(
            transport.next_track().await,
            Ok(CommandOutcome::Ignored(IgnoreReason::SessionClosed))
        );
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn volume_is_clamped_before_transmission() {
        let (_player, sdk, _api, transport) = ready_setup().await;

        transport.set_volume(150).await.unwrap();
        transport.set_volume(-5).await.unwrap();
        transport.set_volume(42).await.unwrap();

        assert_eq!(
            sdk.commands(),
            vec![
                SdkCommand::SetVolume(100),
                SdkCommand::SetVolume(0),
                SdkCommand::SetVolume(42)
            ]
        );
    }

    #[tokio::test]
    async fn play_routes_tracks_and_contexts_through_the_api() {
        let (_player, _sdk, api, transport) = ready_setup().await;

        transport
            .play(Some("spotify:track:4uLU6hMCjMI75M1A2tKUQC"), Some(5_000))
            .await
            .unwrap();
        transport
            .play(Some("https://open.spotify.com/album/1DFixLWuPkv3KT3TnV35m3"), None)
            .await
            .unwrap();

        assert_eq!(
            api.calls(),
            vec![
                ApiCall::StartPlayback(
                    "D".into(),
                    PlayRequest::Tracks {
                        uris: vec![SpotifyUri::new(UriKind::Track, "4uLU6hMCjMI75M1A2tKUQC")],
                        position_ms: Some(5_000),
                    }
                ),
                ApiCall::StartPlayback(
                    "D".into(),
                    PlayRequest::Context {
                        context: SpotifyUri::new(UriKind::Album, "1DFixLWuPkv3KT3TnV35m3"),
                        start_at: None,
                        position_ms: None,
                    }
                ),
            ]
        );
    }

    #[tokio::test]
    async fn play_context_starts_at_given_track() {
        let (_player, _sdk, api, transport) = ready_setup().await;

        transport
            .play_context(
                "spotify:playlist:37i9dQZF1DXcBWIGoYBM5M",
                Some("spotify:track:4uLU6hMCjMI75M1A2tKUQC"),
                None,
            )
            .await
            .unwrap();

        assert!(matches!(
            &api.calls()[..],
            [ApiCall::StartPlayback(device, PlayRequest::Context { start_at: Some(track), .. })]
                if device == "D" && track.id == "4uLU6hMCjMI75M1A2tKUQC"
        ));
        assert!(matches!(
            transport.play_context("spotify:track:x", None, None).await,
            Err(PlayerError::InvalidUri(_))
        ));
    }

    #[tokio::test]
    async fn invalid_uri_is_an_error_not_a_silent_drop() {
        let (_player, _sdk, api, transport) = ready_setup().await;
        assert!(matches!(
            transport.play(Some("not a uri"), None).await,
            Err(PlayerError::InvalidUri(_))
        ));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn toggle_follows_last_reported_state() {
        let (_player, sdk, _api, transport) = ready_setup().await;

        // Nothing reported yet: the device toggles itself
        transport.toggle_play().await.unwrap();

        sdk.emit(SdkEvent::StateChanged(PlaybackState {
            paused: false,
            ..Default::default()
        }));
        settle().await;
        transport.toggle_play().await.unwrap();

        sdk.emit(SdkEvent::StateChanged(PlaybackState {
            paused: true,
            ..Default::default()
        }));
        settle().await;
        transport.toggle_play().await.unwrap();

        assert_eq!(
            sdk.commands(),
            vec![SdkCommand::TogglePlay, SdkCommand::Pause, SdkCommand::Resume]
        );
    }

    #[tokio::test]
    async fn remote_target_uses_http_api() {
        let (_player, sdk, api, transport) = ready_setup().await;

        transport.transfer_to("phone").await.unwrap();
        assert_eq!(transport.target(), Target::Remote("phone".into()));

        transport.seek(30_000).await.unwrap();
        transport.toggle_play().await.unwrap();
        transport.toggle_play().await.unwrap();
        transport.transfer_local().await.unwrap();

        assert_eq!(
            api.calls(),
            vec![
                ApiCall::Transfer("phone".into(), true),
                ApiCall::Seek("phone".into(), 30_000),
                ApiCall::Resume("phone".into()),
                ApiCall::Pause("phone".into()),
                ApiCall::Transfer("D".into(), true),
            ]
        );
        assert!(sdk.commands().is_empty());
        assert_eq!(transport.target(), Target::Local);
    }

    #[tokio::test]
    async fn provider_failure_keeps_its_class() {
        let (_player, _sdk, api, transport) = ready_setup().await;
        api.fail_next(PlayerError::AccountIneligible("premium required".into()));

        let err = transport
            .play(Some("spotify:track:4uLU6hMCjMI75M1A2tKUQC"), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::AccountIneligible);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_command_times_out() {
        let (_player, _sdk, api, transport) = ready_setup().await;
        api.set_delay(Duration::from_secs(60));

        let err = transport
            .play(Some("spotify:track:4uLU6hMCjMI75M1A2tKUQC"), None)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            PlayerError::Timeout {
                operation: "play",
                after: TIMEOUT
            }
        );
    }

    #[tokio::test]
    async fn toggle_uses_state_seeded_at_ready() {
        let sdk = FakeSdk::ready_with("D");
        sdk.set_state(PlaybackState {
            paused: false,
            ..Default::default()
        });
        let player = player_with(sdk.clone(), StaticTokens::signed_in());
        player.initialize().await.unwrap();
        let transport = TransportController::new(&player, FakeControlApi::new(), TIMEOUT);

        transport.toggle_play().await.unwrap();
        assert_eq!(sdk.commands(), vec![SdkCommand::Pause]);
    }
}
