//! Playback session core for a Spotify client.
//!
//! - `token`: short-lived bearer credentials on demand
//! - `player`: the in-process playback device and its lifecycle
//! - `transport`: play/pause/seek/volume/skip against the active device
//! - `store`: what is currently shown as playing
//! - `gate`: premium check and hand-off to Spotify's own client
//! - `session`: sign-in, sign-out and play routing

pub mod auth;
pub mod config;
pub mod error;
pub mod gate;
pub mod logging;
pub mod model;
pub mod player;
pub mod session;
pub mod store;
pub mod token;
pub mod transport;
pub mod web_api;

#[cfg(test)]
mod testing;

pub use error::{PlayerError, Result};
