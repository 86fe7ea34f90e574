//! Model module - data types shared by the session core
//!
//! - `playback`: track descriptors and playback snapshots
//! - `types`: account and device descriptors
//! - `uri`: Spotify URI parsing

mod playback;
mod types;
mod uri;

pub use playback::{format_duration, PlaybackDevice, PlaybackState, Track};
pub use types::{Account, AccountTier, DeviceInfo};
pub use uri::{SpotifyUri, UriKind};
