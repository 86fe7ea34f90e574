//! librespot-backed playback SDK
//!
//! Loading resolves the audio sink and mixer once per process. Connecting
//! creates a librespot session, player and Spirc for the signed-in user and
//! announces the device as ready. librespot reports partial updates
//! (position only, track only); they are folded into whole snapshots here so
//! subscribers only ever see complete `PlaybackState`s.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use librespot::connect::{ConnectConfig, Spirc};
use librespot::core::authentication::Credentials;
use librespot::core::cache::Cache;
use librespot::core::config::SessionConfig;
use librespot::core::error::ErrorKind as LibrespotErrorKind;
use librespot::core::session::Session;
use librespot::metadata::audio::{AudioItem, UniqueFields};
use librespot::playback::audio_backend::{self, SinkBuilder};
use librespot::playback::config::{AudioFormat, Bitrate, PlayerConfig};
use librespot::playback::mixer::{self, Mixer, MixerConfig, NoOpVolume};
use librespot::playback::player::{Player, PlayerEvent as LibrespotEvent, PlayerEventChannel};

use super::sdk::{PlaybackSdk, SdkEvent, SdkEventSender, SdkLoader};
use crate::error::{PlayerError, Result};
use crate::model::{PlaybackState, Track};
use crate::token::AccessToken;

/// The provider keeps this many recently played tracks in a snapshot.
const PREVIOUS_TRACKS_KEPT: usize = 2;

/// Stable device id derived from the device name and the machine.
pub fn device_id_for(device_name: &str) -> String {
    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    format!("{}-{}", device_name, hostname)
}

pub struct LibrespotLoader {
    device_id: String,
    cache_dir: Option<PathBuf>,
}

impl LibrespotLoader {
    pub fn new(device_id: impl Into<String>, cache_dir: Option<PathBuf>) -> Self {
        Self {
            device_id: device_id.into(),
            cache_dir,
        }
    }
}

#[async_trait]
impl SdkLoader for LibrespotLoader {
    async fn load(&self) -> Result<Arc<dyn PlaybackSdk>> {
        let sink_builder = audio_backend::find(None)
            .ok_or_else(|| PlayerError::Initialization("no audio backend available".to_string()))?;
        let mixer_builder = mixer::find(None)
            .ok_or_else(|| PlayerError::Initialization("no mixer available".to_string()))?;
        let mixer = mixer_builder(MixerConfig::default()).map_err(classify_setup_error)?;

        let cache = match &self.cache_dir {
            Some(dir) => Some(
                Cache::new(
                    Some(dir.clone()),
                    Some(dir.clone()),
                    Some(dir.join("files")),
                    None,
                )
                .map_err(classify_setup_error)?,
            ),
            None => None,
        };

        tracing::debug!(device_id = %self.device_id, "Audio sink and mixer resolved");
        Ok(Arc::new(LibrespotSdk {
            device_id: self.device_id.clone(),
            sink_builder,
            mixer,
            cache,
            connection: tokio::sync::Mutex::new(None),
            snapshot: Arc::new(Mutex::new(None)),
        }))
    }
}

struct Connection {
    spirc: Spirc,
    session: Session,
    device_id: String,
}

pub struct LibrespotSdk {
    device_id: String,
    sink_builder: SinkBuilder,
    mixer: Arc<dyn Mixer>,
    cache: Option<Cache>,
    connection: tokio::sync::Mutex<Option<Connection>>,
    snapshot: Arc<Mutex<Option<PlaybackState>>>,
}

impl LibrespotSdk {
    async fn with_spirc<F>(&self, operation: &'static str, command: F) -> Result<()>
    where
        F: FnOnce(&Spirc) -> std::result::Result<(), librespot::core::Error>,
    {
        let guard = self.connection.lock().await;
        let connection = guard.as_ref().ok_or(PlayerError::NoActiveDevice)?;
        tracing::debug!(operation, device_id = %connection.device_id, "Spirc command");
        command(&connection.spirc)
            .map_err(|e| PlayerError::Playback(format!("{operation}: {e}")))
    }
}

#[async_trait]
impl PlaybackSdk for LibrespotSdk {
    async fn connect(
        &self,
        device_name: &str,
        token: AccessToken,
        events: SdkEventSender,
    ) -> Result<()> {
        // One device per process
        self.disconnect().await;

        tracing::info!(device_name, "Connecting librespot device");
        let session_config = SessionConfig {
            device_id: self.device_id.clone(),
            ..Default::default()
        };
        let session = Session::new(session_config, self.cache.clone());

        let player_config = PlayerConfig {
            bitrate: Bitrate::Bitrate320,
            ..Default::default()
        };
        let audio_format = AudioFormat::default();
        let sink_builder = self.sink_builder;
        let player = Player::new(
            player_config,
            session.clone(),
            Box::new(NoOpVolume),
            move || sink_builder(None, audio_format),
        );
        let player_events = player.get_player_event_channel();

        let connect_config = ConnectConfig {
            name: device_name.to_string(),
            ..Default::default()
        };
        let credentials = Credentials::with_access_token(token.secret());

        let (spirc, spirc_task) = Spirc::new(
            connect_config,
            session.clone(),
            credentials,
            player.clone(),
            self.mixer.clone(),
        )
        .await
        .map_err(classify_setup_error)?;
        spirc.activate().map_err(classify_setup_error)?;

        tokio::spawn(async move {
            spirc_task.await;
            tracing::debug!("Spirc task finished");
        });

        let device_id = session.device_id().to_string();
        tokio::spawn(pump_player_events(
            player_events,
            events.clone(),
            device_id.clone(),
            self.snapshot.clone(),
        ));

        *self.connection.lock().await = Some(Connection {
            spirc,
            session,
            device_id: device_id.clone(),
        });
        let _ = events.send(SdkEvent::Ready { device_id });
        Ok(())
    }

    async fn disconnect(&self) {
        let Some(connection) = self.connection.lock().await.take() else {
            return;
        };
        tracing::info!(device_id = %connection.device_id, "Shutting down librespot device");
        if let Err(e) = connection.spirc.shutdown() {
            tracing::warn!(error = %e, "Spirc shutdown failed");
        }
        connection.session.shutdown();
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    async fn pause(&self) -> Result<()> {
        self.with_spirc("pause", |spirc| spirc.pause()).await
    }

    async fn resume(&self) -> Result<()> {
        self.with_spirc("resume", |spirc| spirc.play()).await
    }

    async fn toggle_play(&self) -> Result<()> {
        self.with_spirc("toggle_play", |spirc| spirc.play_pause()).await
    }

    async fn seek(&self, position_ms: u32) -> Result<()> {
        self.with_spirc("seek", |spirc| spirc.set_position_ms(position_ms))
            .await
    }

    async fn set_volume(&self, percent: u8) -> Result<()> {
        let volume = percent_to_volume(percent);
        self.with_spirc("set_volume", |spirc| spirc.set_volume(volume))
            .await
    }

    async fn next_track(&self) -> Result<()> {
        self.with_spirc("next_track", |spirc| spirc.next()).await
    }

    async fn previous_track(&self) -> Result<()> {
        self.with_spirc("previous_track", |spirc| spirc.prev()).await
    }

    async fn current_state(&self) -> Option<PlaybackState> {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn classify_setup_error(error: librespot::core::Error) -> PlayerError {
    match error.kind {
        LibrespotErrorKind::Unauthenticated => PlayerError::Authentication(error.to_string()),
        LibrespotErrorKind::PermissionDenied => PlayerError::AccountIneligible(error.to_string()),
        _ => PlayerError::Initialization(error.to_string()),
    }
}

fn percent_to_volume(percent: u8) -> u16 {
    let percent = u32::from(percent.min(100));
    (percent * u32::from(u16::MAX) / 100) as u16
}

fn track_from_audio_item(audio_item: &AudioItem) -> Track {
    let (artists, album) = match &audio_item.unique_fields {
        UniqueFields::Track { artists, album, .. } => (
            artists.0.iter().map(|a| a.name.clone()).collect(),
            album.clone(),
        ),
        UniqueFields::Episode { show_name, .. } => {
            (vec![show_name.clone()], "Podcast".to_string())
        }
        UniqueFields::Local { artists, album, .. } => (
            artists.clone().into_iter().collect(),
            album.clone().unwrap_or_default(),
        ),
    };

    let uri = audio_item.track_id.to_uri().unwrap_or_default();
    let id = uri.rsplit(':').next().unwrap_or_default().to_string();

    Track {
        id,
        uri,
        name: audio_item.name.clone(),
        artists,
        album,
        artwork: audio_item.covers.iter().map(|c| c.url.clone()).collect(),
        duration_ms: audio_item.duration_ms,
    }
}

/// Partial update reported by librespot.
#[derive(Clone, Debug, PartialEq)]
enum Transition {
    Playing(u32),
    Paused(u32),
    Position(u32),
    Loading(u32),
    TrackChanged(Track),
    Stopped,
    EndOfTrack,
}

/// Folds partial updates into whole snapshots.
#[derive(Default)]
struct StateFolder {
    state: PlaybackState,
}

impl StateFolder {
    fn new() -> Self {
        Self {
            state: PlaybackState {
                paused: true,
                ..Default::default()
            },
        }
    }

    fn apply(&mut self, transition: Transition) -> Vec<SdkEvent> {
        let mut out = Vec::with_capacity(2);
        let state = &mut self.state;
        match transition {
            Transition::Playing(position_ms) => {
                state.paused = false;
                state.position_ms = position_ms;
            }
            Transition::Paused(position_ms) | Transition::Loading(position_ms) => {
                state.paused = true;
                state.position_ms = position_ms;
            }
            Transition::Position(position_ms) => state.position_ms = position_ms,
            Transition::TrackChanged(track) => {
                if let Some(previous) = state.current_track.take() {
                    if previous.uri != track.uri {
                        state.previous_tracks.push(previous);
                        let excess = state.previous_tracks.len().saturating_sub(PREVIOUS_TRACKS_KEPT);
                        state.previous_tracks.drain(..excess);
                    }
                }
                state.duration_ms = track.duration_ms;
                state.position_ms = 0;
                state.current_track = Some(track.clone());
                out.push(SdkEvent::TrackChanged(track));
            }
            Transition::Stopped => {
                state.paused = true;
                state.position_ms = 0;
            }
            Transition::EndOfTrack => {
                state.paused = true;
                state.position_ms = state.duration_ms;
            }
        }
        out.push(SdkEvent::StateChanged(state.clone()));
        out
    }
}

async fn pump_player_events(
    mut channel: PlayerEventChannel,
    events: SdkEventSender,
    device_id: String,
    snapshot: Arc<Mutex<Option<PlaybackState>>>,
) {
    let mut folder = StateFolder::new();
    tracing::info!(device_id = %device_id, "Starting librespot player event listener");

    while let Some(event) = channel.recv().await {
        let out = match event {
            LibrespotEvent::Playing { position_ms, .. } => {
                tracing::trace!(position_ms, "PlayerEvent::Playing");
                folder.apply(Transition::Playing(position_ms))
            }
            LibrespotEvent::Paused { position_ms, .. } => {
                tracing::debug!(position_ms, "PlayerEvent::Paused");
                folder.apply(Transition::Paused(position_ms))
            }
            LibrespotEvent::PositionChanged { position_ms, .. }
            | LibrespotEvent::Seeked { position_ms, .. } => {
                tracing::trace!(position_ms, "PlayerEvent position update");
                folder.apply(Transition::Position(position_ms))
            }
            LibrespotEvent::Loading { position_ms, .. } => {
                tracing::debug!(position_ms, "PlayerEvent::Loading");
                folder.apply(Transition::Loading(position_ms))
            }
            LibrespotEvent::TrackChanged { audio_item } => {
                let track = track_from_audio_item(&audio_item);
                tracing::info!(
                    track = %track.name,
                    artist = %track.artist(),
                    duration_ms = track.duration_ms,
                    uri = %track.uri,
                    "PlayerEvent::TrackChanged"
                );
                folder.apply(Transition::TrackChanged(track))
            }
            LibrespotEvent::Stopped { .. } => folder.apply(Transition::Stopped),
            LibrespotEvent::EndOfTrack { .. } => folder.apply(Transition::EndOfTrack),
            LibrespotEvent::Unavailable { .. } => vec![SdkEvent::Error(PlayerError::Playback(
                "track unavailable".to_string(),
            ))],
            LibrespotEvent::SessionConnected { .. } => vec![SdkEvent::Ready {
                device_id: device_id.clone(),
            }],
            LibrespotEvent::SessionDisconnected { .. } => vec![SdkEvent::NotReady {
                device_id: device_id.clone(),
            }],
            _ => {
                tracing::trace!("PlayerEvent: other event received");
                continue;
            }
        };

        for event in out {
            if let SdkEvent::StateChanged(state) = &event {
                *snapshot.lock().unwrap_or_else(PoisonError::into_inner) = Some(state.clone());
            }
            if events.send(event).is_err() {
                tracing::debug!("Player event listener shutting down");
                return;
            }
        }
    }
}
