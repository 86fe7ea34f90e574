//! Remote HTTP control API
//!
//! `ControlApi` is the seam the transport controller and the session talk
//! to; `WebApi` implements it over rspotify's `AuthCodeSpotify`. The bearer
//! token is taken from the token provider right before every call, so a
//! refresh done for the playback device is picked up here as well.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use rspotify::{
    model::{
        AlbumId, ArtistId, Device, EpisodeId, FullTrack, Offset, PlayContextId, PlayableId,
        PlaylistId, SearchResult, SearchType, ShowId, SubscriptionLevel, TrackId,
    },
    http::HttpError,
    prelude::*,
    AuthCodeSpotify, ClientError, Config, Token,
};

use crate::error::{PlayerError, Result};
use crate::model::{Account, AccountTier, DeviceInfo, SpotifyUri, Track, UriKind};
use crate::token::TokenProvider;

/// What to start playing on a device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlayRequest {
    Tracks {
        uris: Vec<SpotifyUri>,
        position_ms: Option<u32>,
    },
    Context {
        context: SpotifyUri,
        start_at: Option<SpotifyUri>,
        position_ms: Option<u32>,
    },
}

impl PlayRequest {
    /// Single tracks and episodes are played on their own, everything else
    /// as a context from its first item.
    pub fn for_uri(uri: SpotifyUri, position_ms: Option<u32>) -> Self {
        if uri.is_context() {
            PlayRequest::Context {
                context: uri,
                start_at: None,
                position_ms,
            }
        } else {
            PlayRequest::Tracks {
                uris: vec![uri],
                position_ms,
            }
        }
    }
}

#[async_trait]
pub trait ControlApi: Send + Sync {
    async fn start_playback(&self, device_id: &str, request: &PlayRequest) -> Result<()>;

    async fn resume(&self, device_id: &str) -> Result<()>;

    async fn pause(&self, device_id: &str) -> Result<()>;

    async fn seek(&self, device_id: &str, position_ms: u32) -> Result<()>;

    async fn set_volume(&self, device_id: &str, percent: u8) -> Result<()>;

    async fn next_track(&self, device_id: &str) -> Result<()>;

    async fn previous_track(&self, device_id: &str) -> Result<()>;

    /// Move playback to `device_id`, optionally starting it.
    async fn transfer(&self, device_id: &str, play: bool) -> Result<()>;

    async fn devices(&self) -> Result<Vec<DeviceInfo>>;

    /// Profile of the signed-in user, including the subscription tier.
    async fn account(&self) -> Result<Account>;

    async fn search_tracks(&self, query: &str, limit: u32) -> Result<Vec<Track>>;
}

pub struct WebApi {
    client: AuthCodeSpotify,
    tokens: Arc<dyn TokenProvider>,
    scopes: HashSet<String>,
}

impl WebApi {
    pub fn new(tokens: Arc<dyn TokenProvider>, scopes: &str) -> Self {
        let client = AuthCodeSpotify::with_config(
            Default::default(),
            Default::default(),
            Config {
                token_cached: false,
                token_refreshing: false,
                ..Default::default()
            },
        );
        tracing::debug!("rspotify client initialized");
        Self {
            client,
            tokens,
            scopes: scopes.split_whitespace().map(str::to_string).collect(),
        }
    }

    /// Install the provider's current token on the rspotify client.
    async fn sync_token(&self) -> Result<()> {
        let access_token = self
            .tokens
            .access_token()
            .await
            .ok_or_else(|| PlayerError::Authentication("no session token".to_string()))?;

        let expires_in = access_token.expires_at() - chrono::Utc::now();
        let token = Token {
            access_token: access_token.secret().to_string(),
            expires_in,
            expires_at: Some(access_token.expires_at()),
            scopes: self.scopes.clone(),
            refresh_token: None,
        };

        let mut guard = self
            .client
            .token
            .lock()
            .await
            .map_err(|_| PlayerError::Playback("token lock unavailable".to_string()))?;
        *guard = Some(token);
        Ok(())
    }
}

fn status_of(error: &ClientError) -> Option<u16> {
    match error {
        ClientError::Http(http) => match http.as_ref() {
            HttpError::StatusCode(response) => Some(response.status().as_u16()),
            _ => None,
        },
        _ => None,
    }
}

fn classify(operation: &'static str, error: ClientError) -> PlayerError {
    let message = error.to_string();
    let error = match status_of(&error) {
        Some(status) => PlayerError::from_http_status(status, &message),
        None => PlayerError::from_http_message(&message),
    };
    tracing::error!(operation, error = %error, "API request failed");
    error
}

fn millis(position_ms: u32) -> chrono::Duration {
    chrono::Duration::milliseconds(i64::from(position_ms))
}

fn invalid(uri: &SpotifyUri, e: impl std::fmt::Display) -> PlayerError {
    PlayerError::InvalidUri(format!("{uri}: {e}"))
}

fn playable_id(uri: &SpotifyUri) -> Result<PlayableId<'static>> {
    match uri.kind {
        UriKind::Track => TrackId::from_id(uri.id.clone())
            .map(PlayableId::Track)
            .map_err(|e| invalid(uri, e)),
        UriKind::Episode => EpisodeId::from_id(uri.id.clone())
            .map(PlayableId::Episode)
            .map_err(|e| invalid(uri, e)),
        _ => Err(invalid(uri, "not a single playable item")),
    }
}

fn context_id(uri: &SpotifyUri) -> Result<PlayContextId<'static>> {
    match uri.kind {
        UriKind::Album => AlbumId::from_id(uri.id.clone())
            .map(PlayContextId::Album)
            .map_err(|e| invalid(uri, e)),
        UriKind::Playlist => PlaylistId::from_id(uri.id.clone())
            .map(PlayContextId::Playlist)
            .map_err(|e| invalid(uri, e)),
        UriKind::Artist => ArtistId::from_id(uri.id.clone())
            .map(PlayContextId::Artist)
            .map_err(|e| invalid(uri, e)),
        UriKind::Show => ShowId::from_id(uri.id.clone())
            .map(PlayContextId::Show)
            .map_err(|e| invalid(uri, e)),
        UriKind::Track | UriKind::Episode => Err(invalid(uri, "not a playable context")),
    }
}

fn tier_of(product: Option<SubscriptionLevel>) -> AccountTier {
    match product {
        Some(SubscriptionLevel::Premium) => AccountTier::Premium,
        Some(_) => AccountTier::Free,
        None => AccountTier::Unknown,
    }
}

fn device_info(device: Device) -> DeviceInfo {
    DeviceInfo {
        id: device.id.unwrap_or_default(),
        name: device.name,
        is_active: device.is_active,
    }
}

fn track_from_full(track: FullTrack) -> Track {
    let id = track
        .id
        .as_ref()
        .map(|id| id.id().to_string())
        .unwrap_or_default();
    Track {
        // Local files have no id and no playable URI
        uri: if id.is_empty() {
            String::new()
        } else {
            format!("spotify:track:{id}")
        },
        id,
        name: track.name,
        artists: track.artists.into_iter().map(|a| a.name).collect(),
        album: track.album.name,
        artwork: track.album.images.into_iter().map(|i| i.url).collect(),
        duration_ms: u32::try_from(track.duration.num_milliseconds()).unwrap_or(0),
    }
}

#[async_trait]
impl ControlApi for WebApi {
    async fn start_playback(&self, device_id: &str, request: &PlayRequest) -> Result<()> {
        self.sync_token().await?;
        match request {
            PlayRequest::Tracks { uris, position_ms } => {
                tracing::debug!(device_id, count = uris.len(), "API: start_uris_playback");
                let ids = uris.iter().map(playable_id).collect::<Result<Vec<_>>>()?;
                self.client
                    .start_uris_playback(ids, Some(device_id), None, position_ms.map(millis))
                    .await
                    .map_err(|e| classify("start_uris_playback", e))
            }
            PlayRequest::Context {
                context,
                start_at,
                position_ms,
            } => {
                tracing::debug!(device_id, context = %context, start_at = ?start_at, "API: start_context_playback");
                let play_context = context_id(context)?;
                let offset = start_at.as_ref().map(|uri| Offset::Uri(uri.to_string()));
                self.client
                    .start_context_playback(
                        play_context,
                        Some(device_id),
                        offset,
                        position_ms.map(millis),
                    )
                    .await
                    .map_err(|e| classify("start_context_playback", e))
            }
        }
    }

    async fn resume(&self, device_id: &str) -> Result<()> {
        self.sync_token().await?;
        tracing::debug!(device_id, "API: resume_playback");
        self.client
            .resume_playback(Some(device_id), None)
            .await
            .map_err(|e| classify("resume_playback", e))
    }

    async fn pause(&self, device_id: &str) -> Result<()> {
        self.sync_token().await?;
        tracing::debug!(device_id, "API: pause_playback");
        self.client
            .pause_playback(Some(device_id))
            .await
            .map_err(|e| classify("pause_playback", e))
    }

    async fn seek(&self, device_id: &str, position_ms: u32) -> Result<()> {
        self.sync_token().await?;
        tracing::debug!(device_id, position_ms, "API: seek_track");
        self.client
            .seek_track(millis(position_ms), Some(device_id))
            .await
            .map_err(|e| classify("seek_track", e))
    }

    async fn set_volume(&self, device_id: &str, percent: u8) -> Result<()> {
        self.sync_token().await?;
        tracing::debug!(device_id, percent, "API: set_volume");
        self.client
            .volume(percent, Some(device_id))
            .await
            .map_err(|e| classify("set_volume", e))
    }

    async fn next_track(&self, device_id: &str) -> Result<()> {
        self.sync_token().await?;
        tracing::debug!(device_id, "API: next_track");
        self.client
            .next_track(Some(device_id))
            .await
            .map_err(|e| classify("next_track", e))
    }

    async fn previous_track(&self, device_id: &str) -> Result<()> {
        self.sync_token().await?;
        tracing::debug!(device_id, "API: previous_track");
        self.client
            .previous_track(Some(device_id))
            .await
            .map_err(|e| classify("previous_track", e))
    }

    async fn transfer(&self, device_id: &str, play: bool) -> Result<()> {
        self.sync_token().await?;
        tracing::debug!(device_id, play, "API: transfer_playback");
        self.client
            .transfer_playback(device_id, Some(play))
            .await
            .map_err(|e| classify("transfer_playback", e))
    }

    async fn devices(&self) -> Result<Vec<DeviceInfo>> {
        self.sync_token().await?;
        tracing::debug!("API: get_available_devices");
        let devices = self
            .client
            .device()
            .await
            .map_err(|e| classify("device", e))?;
        let device_infos: Vec<DeviceInfo> = devices.into_iter().map(device_info).collect();
        tracing::debug!(count = device_infos.len(), "Found devices");
        Ok(device_infos)
    }

    async fn account(&self) -> Result<Account> {
        self.sync_token().await?;
        let user = self.client.me().await.map_err(|e| classify("me", e))?;
        let tier = tier_of(user.product);
        tracing::info!(user_id = user.id.id(), tier = ?tier, "Resolved account");
        Ok(Account {
            authenticated: true,
            tier,
            display_name: user.display_name,
        })
    }

    async fn search_tracks(&self, query: &str, limit: u32) -> Result<Vec<Track>> {
        self.sync_token().await?;
        tracing::debug!(query, limit, "API: search");
        let result = self
            .client
            .search(query, SearchType::Track, None, None, Some(limit), None)
            .await
            .map_err(|e| classify("search", e))?;

        let SearchResult::Tracks(page) = result else {
            return Ok(Vec::new());
        };
        Ok(page.items.into_iter().map(track_from_full).collect())
    }
}
