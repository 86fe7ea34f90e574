//! Seam to the provider's playback SDK and the process-wide load guard.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{mpsc, OnceCell};

use crate::error::Result;
use crate::model::{PlaybackState, Track};
use crate::token::AccessToken;

/// Callbacks the SDK delivers, in the order it emits them.
#[derive(Clone, Debug, PartialEq)]
pub enum SdkEvent {
    Ready { device_id: String },
    NotReady { device_id: String },
    StateChanged(PlaybackState),
    TrackChanged(Track),
    Error(crate::error::PlayerError),
}

pub type SdkEventSender = mpsc::UnboundedSender<SdkEvent>;

/// An in-process playback device as exposed by the provider SDK.
#[async_trait]
pub trait PlaybackSdk: Send + Sync {
    /// Start the device handshake. Readiness is reported later through
    /// `events`, not by this call returning.
    async fn connect(&self, device_name: &str, token: AccessToken, events: SdkEventSender)
        -> Result<()>;

    async fn disconnect(&self);

    async fn pause(&self) -> Result<()>;

    async fn resume(&self) -> Result<()>;

    async fn toggle_play(&self) -> Result<()>;

    async fn seek(&self, position_ms: u32) -> Result<()>;

    async fn set_volume(&self, percent: u8) -> Result<()>;

    async fn next_track(&self) -> Result<()>;

    async fn previous_track(&self) -> Result<()>;

    async fn current_state(&self) -> Option<PlaybackState>;
}

#[async_trait]
pub trait SdkLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn PlaybackSdk>>;
}

/// Loads the SDK at most once per process. Concurrent callers wait on the
/// same in-flight load; a failed load leaves the guard empty so a later
/// caller retries.
pub struct SdkGuard {
    loader: Box<dyn SdkLoader>,
    sdk: OnceCell<Arc<dyn PlaybackSdk>>,
    attempts: AtomicUsize,
}

impl SdkGuard {
    pub fn new(loader: impl SdkLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            sdk: OnceCell::new(),
            attempts: AtomicUsize::new(0),
        }
    }

    pub async fn get_or_load(&self) -> Result<Arc<dyn PlaybackSdk>> {
        self.sdk
            .get_or_try_init(|| async {
                let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
                tracing::info!(attempt, "Loading playback SDK");
                let sdk = self.loader.load().await;
                match &sdk {
                    Ok(_) => tracing::info!("Playback SDK loaded"),
                    Err(e) => tracing::error!(error = %e, "Playback SDK load failed"),
                }
                sdk
            })
            .await
            .cloned()
    }

    pub fn is_loaded(&self) -> bool {
        self.sdk.initialized()
    }

    /// Number of loads started so far.
    pub fn load_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}
