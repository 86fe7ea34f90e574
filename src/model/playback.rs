//! Playback-related types

/// Descriptor of a playable item as reported by the provider
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Track {
    pub id: String,
    pub uri: String,
    pub name: String,
    pub artists: Vec<String>,
    pub album: String,
    pub artwork: Vec<String>,
    pub duration_ms: u32,
}

impl Track {
    /// Primary artist, or an empty string for items without one.
    pub fn artist(&self) -> &str {
        self.artists.first().map(String::as_str).unwrap_or_default()
    }

    pub fn artists_joined(&self) -> String {
        self.artists.join(", ")
    }
}

/// Snapshot of the remote player. Replaced wholesale on every provider
/// event, never patched field by field.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlaybackState {
    pub paused: bool,
    pub position_ms: u32,
    pub duration_ms: u32,
    pub current_track: Option<Track>,
    pub previous_tracks: Vec<Track>,
    pub next_tracks: Vec<Track>,
}

impl PlaybackState {
    pub fn track_uri(&self) -> Option<&str> {
        self.current_track.as_ref().map(|t| t.uri.as_str())
    }

    /// Position clamped into the track; providers may report a position
    /// slightly past the end at a track boundary.
    pub fn clamped_position_ms(&self) -> u32 {
        if self.duration_ms == 0 {
            self.position_ms
        } else {
            self.position_ms.min(self.duration_ms)
        }
    }
}

/// The in-process playback endpoint as seen by the rest of the app.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlaybackDevice {
    pub device_id: Option<String>,
    pub ready: bool,
}

pub fn format_duration(ms: u32) -> String {
    let total_seconds = ms / 1000;
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;
    format!("{}:{:02}", minutes, seconds)
}
