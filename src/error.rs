//! Error taxonomy for the playback session core.
//!
//! Provider-sourced failures keep their class all the way to the UI, which
//! picks a different remediation for each of them:
//!
//! - `Authentication` - sign in again
//! - `AccountIneligible` - show the upgrade path
//! - `Playback` - retry
//! - `Initialization` / `Timeout` - the device could not be brought up

use std::time::Duration;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PlayerError {
    #[error("player initialization failed: {0}")]
    Initialization(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("account is not eligible for in-app playback: {0}")]
    AccountIneligible(String),

    #[error("playback failed: {0}")]
    Playback(String),

    #[error("no active device")]
    NoActiveDevice,

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("invalid Spotify URI: {0}")]
    InvalidUri(String),
}

/// Coarse classification of a [`PlayerError`], stable across messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Initialization,
    Authentication,
    AccountIneligible,
    Playback,
    NoActiveDevice,
    Timeout,
    InvalidUri,
}

/// What the UI should offer the user after an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Remediation {
    Relogin,
    Upgrade,
    Retry,
    None,
}

impl PlayerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Initialization(_) => ErrorKind::Initialization,
            Self::Authentication(_) => ErrorKind::Authentication,
            Self::AccountIneligible(_) => ErrorKind::AccountIneligible,
            Self::Playback(_) => ErrorKind::Playback,
            Self::NoActiveDevice => ErrorKind::NoActiveDevice,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::InvalidUri(_) => ErrorKind::InvalidUri,
        }
    }

    pub fn remediation(&self) -> Remediation {
        match self.kind() {
            ErrorKind::Authentication => Remediation::Relogin,
            ErrorKind::AccountIneligible => Remediation::Upgrade,
            ErrorKind::Playback | ErrorKind::Timeout | ErrorKind::NoActiveDevice => {
                Remediation::Retry
            }
            ErrorKind::Initialization | ErrorKind::InvalidUri => Remediation::None,
        }
    }

    /// Whether the device has to be torn down after this error.
    ///
    /// Transient playback failures leave a ready device usable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Initialization | ErrorKind::Authentication | ErrorKind::AccountIneligible
        )
    }

    /// Classify a remote HTTP failure by its response status.
    pub fn from_http_status(status: u16, message: &str) -> Self {
        match status {
            401 => Self::Authentication(message.to_string()),
            403 => Self::AccountIneligible(message.to_string()),
            404 => Self::NoActiveDevice,
            _ => Self::Playback(message.to_string()),
        }
    }

    /// Classify a remote HTTP failure from its text when no status is at hand.
    ///
    /// Only the code following `status code` counts; digits elsewhere in the
    /// message (ids, positions) are ignored.
    pub fn from_http_message(message: &str) -> Self {
        let status = message
            .split_once("status code")
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .and_then(|code| code.parse::<u16>().ok());
        match status {
            Some(status) => Self::from_http_status(status, message),
            None if message.to_lowercase().contains("no active device") => Self::NoActiveDevice,
            None => Self::Playback(message.to_string()),
        }
    }

    /// Short message for the status line.
    pub fn user_message(&self) -> String {
        match self.remediation() {
            Remediation::Relogin => "Authentication expired. Please sign in again.".to_string(),
            Remediation::Upgrade => "Spotify Premium is required to play here.".to_string(),
            Remediation::Retry => format!("{self}. Try again."),
            Remediation::None => format!("Error: {self}"),
        }
    }
}

pub type Result<T, E = PlayerError> = std::result::Result<T, E>;
