//! Spotify URI parsing
//!
//! Accepts both `spotify:<kind>:<id>` URIs and `https://open.spotify.com/<kind>/<id>`
//! links, since share links are what users paste.

use std::fmt;
use std::str::FromStr;

use crate::error::PlayerError;

const WEB_PLAYER_BASE: &str = "https://open.spotify.com";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UriKind {
    Track,
    Episode,
    Album,
    Playlist,
    Artist,
    Show,
}

impl UriKind {
    fn as_str(self) -> &'static str {
        match self {
            UriKind::Track => "track",
            UriKind::Episode => "episode",
            UriKind::Album => "album",
            UriKind::Playlist => "playlist",
            UriKind::Artist => "artist",
            UriKind::Show => "show",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "track" => UriKind::Track,
            "episode" => UriKind::Episode,
            "album" => UriKind::Album,
            "playlist" => UriKind::Playlist,
            "artist" => UriKind::Artist,
            "show" => UriKind::Show,
            _ => return None,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SpotifyUri {
    pub kind: UriKind,
    pub id: String,
}

impl SpotifyUri {
    pub fn new(kind: UriKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }

    /// Albums, playlists, artists and shows are played as a context;
    /// tracks and episodes are played on their own.
    pub fn is_context(&self) -> bool {
        matches!(
            self.kind,
            UriKind::Album | UriKind::Playlist | UriKind::Artist | UriKind::Show
        )
    }

    /// Link to the provider's own player, used for hand-off.
    pub fn web_url(&self) -> String {
        format!("{}/{}/{}", WEB_PLAYER_BASE, self.kind.as_str(), self.id)
    }
}

impl fmt::Display for SpotifyUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "spotify:{}:{}", self.kind.as_str(), self.id)
    }
}

impl FromStr for SpotifyUri {
    type Err = PlayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PlayerError::InvalidUri(s.to_string());
        let s = s.trim();

        let (kind, id) = if let Some(rest) = s.strip_prefix("spotify:") {
            rest.split_once(':').ok_or_else(invalid)?
        } else if let Some(rest) = s.strip_prefix(WEB_PLAYER_BASE) {
            let path = rest.split(['?', '#']).next().unwrap_or_default();
            path.trim_matches('/').split_once('/').ok_or_else(invalid)?
        } else {
            return Err(invalid());
        };

        let kind = UriKind::parse(kind).ok_or_else(invalid)?;
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(invalid());
        }
        Ok(Self::new(kind, id))
    }
}
