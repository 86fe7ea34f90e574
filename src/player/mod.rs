//! Remote player handle - lifecycle of the in-process playback device
//!
//! - `sdk`: seam to the provider SDK and the process-wide load guard
//! - `events`: events published to subscribers
//! - `librespot`: the librespot-backed SDK implementation
//!
//! Status transitions:
//!
//! ```text
//! Uninitialized -> Connecting -> Ready -> Disconnected
//!        \              \          \
//!         `--------------`----------`--> Error
//! ```

mod events;
pub mod librespot;
mod sdk;

pub use events::{EventBus, EventKind, PlayerEvent, PlayerEventChannel};
pub use sdk::{PlaybackSdk, SdkEvent, SdkEventSender, SdkGuard, SdkLoader};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::error::{PlayerError, Result};
use crate::model::{PlaybackDevice, PlaybackState};
use crate::token::TokenProvider;

#[derive(Clone, Debug, PartialEq)]
pub enum PlayerStatus {
    Uninitialized,
    Connecting,
    Ready { device_id: String },
    Disconnected,
    Error(PlayerError),
}

pub struct RemotePlayer {
    device_name: String,
    sdk_guard: Arc<SdkGuard>,
    tokens: Arc<dyn TokenProvider>,
    init_timeout: Duration,
    status: watch::Sender<PlayerStatus>,
    sdk: Mutex<Option<Arc<dyn PlaybackSdk>>>,
    last_state: Mutex<Option<PlaybackState>>,
    events: EventBus,
    // Bumped on every connect and disconnect so late callbacks from an
    // earlier connection are dropped.
    generation: AtomicU64,
}

impl RemotePlayer {
    pub fn new(
        device_name: impl Into<String>,
        sdk_guard: Arc<SdkGuard>,
        tokens: Arc<dyn TokenProvider>,
        init_timeout: Duration,
    ) -> Arc<Self> {
        let (status, _) = watch::channel(PlayerStatus::Uninitialized);
        Arc::new(Self {
            device_name: device_name.into(),
            sdk_guard,
            tokens,
            init_timeout,
            status,
            sdk: Mutex::new(None),
            last_state: Mutex::new(None),
            events: EventBus::default(),
            generation: AtomicU64::new(0),
        })
    }

    /// Bring the device up and return its id once the provider reports it
    /// ready. A caller arriving while a connect is in flight waits for that
    /// connect instead of starting another one.
    pub async fn initialize(self: &Arc<Self>) -> Result<String> {
        let deadline = Instant::now() + self.init_timeout;

        // The generation is claimed together with the status change so a
        // concurrent disconnect always invalidates it.
        let mut claimed = None;
        self.status.send_if_modified(|status| match status {
            PlayerStatus::Uninitialized | PlayerStatus::Disconnected | PlayerStatus::Error(_) => {
                *status = PlayerStatus::Connecting;
                claimed = Some(self.generation.fetch_add(1, Ordering::SeqCst) + 1);
                true
            }
            PlayerStatus::Connecting | PlayerStatus::Ready { .. } => false,
        });

        if let Some(generation) = claimed {
            tracing::info!(device_name = %self.device_name, generation, "Initializing remote player");
            let connected = match tokio::time::timeout_at(deadline, self.connect(generation)).await {
                Ok(result) => result,
                Err(_) => Err(self.timeout_error()),
            };
            if let Err(e) = connected {
                self.fail(Some(generation), e.clone()).await;
                return Err(e);
            }
        }

        let device_id = self.wait_until_settled(deadline).await?;
        self.seed_state().await;
        Ok(device_id)
    }

    async fn connect(self: &Arc<Self>, generation: u64) -> Result<()> {
        let sdk = self.sdk_guard.get_or_load().await?;
        self.ensure_current(generation)?;
        let token = self
            .tokens
            .access_token()
            .await
            .ok_or_else(|| PlayerError::Authentication("no session token".to_string()))?;
        self.ensure_current(generation)?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(Self::pump(Arc::downgrade(self), generation, rx));

        *lock(&self.sdk) = Some(sdk.clone());
        sdk.connect(&self.device_name, token, tx).await?;

        if let Err(e) = self.ensure_current(generation) {
            // Torn down while the handshake ran; the SDK only now holds a
            // connection to shut down. A newer initialize owns it otherwise.
            let superseded = matches!(
                &*self.status.borrow(),
                PlayerStatus::Connecting | PlayerStatus::Ready { .. }
            );
            if !superseded {
                tracing::info!(generation, "Player disconnected during handshake, shutting device down");
                sdk.disconnect().await;
            }
            return Err(e);
        }
        Ok(())
    }

    fn ensure_current(&self, generation: u64) -> Result<()> {
        if self.generation.load(Ordering::SeqCst) == generation {
            Ok(())
        } else {
            Err(PlayerError::Initialization(
                "player disconnected while connecting".to_string(),
            ))
        }
    }

    /// Remember the device's own view of playback if no event has reported
    /// one yet.
    async fn seed_state(&self) {
        let sdk = lock(&self.sdk).clone();
        let Some(state) = (match sdk {
            Some(sdk) => sdk.current_state().await,
            None => None,
        }) else {
            return;
        };
        if !self.is_ready() {
            return;
        }
        let mut last_state = lock(&self.last_state);
        if last_state.is_none() {
            tracing::debug!(paused = state.paused, "Seeded playback state from device");
            *last_state = Some(state);
        }
    }

    async fn wait_until_settled(&self, deadline: Instant) -> Result<String> {
        let mut rx = self.status.subscribe();
        let settled = tokio::time::timeout_at(deadline, async {
            rx.wait_for(|s| !matches!(s, PlayerStatus::Connecting))
                .await
                .map(|s| (*s).clone())
        })
        .await;

        match settled {
            Err(_) => {
                let e = self.timeout_error();
                self.fail(None, e.clone()).await;
                Err(e)
            }
            Ok(Err(_)) => Err(PlayerError::Initialization("player dropped".to_string())),
            Ok(Ok(PlayerStatus::Ready { device_id })) => Ok(device_id),
            Ok(Ok(PlayerStatus::Error(e))) => Err(e),
            Ok(Ok(status)) => Err(PlayerError::Initialization(format!(
                "device not ready: {status:?}"
            ))),
        }
    }

    fn timeout_error(&self) -> PlayerError {
        PlayerError::Timeout {
            operation: "initialize",
            after: self.init_timeout,
        }
    }

    /// Abort an in-flight connect with `error`. With a generation, only
    /// that connect is aborted.
    async fn fail(&self, generation: Option<u64>, error: PlayerError) {
        let failed = self.status.send_if_modified(|status| {
            let current = generation
                .is_none_or(|generation| self.generation.load(Ordering::SeqCst) == generation);
            if current && matches!(status, PlayerStatus::Connecting) {
                *status = PlayerStatus::Error(error.clone());
                self.generation.fetch_add(1, Ordering::SeqCst);
                true
            } else {
                false
            }
        });
        if !failed {
            return;
        }

        tracing::error!(error = %error, "Remote player initialization failed");
        let sdk = lock(&self.sdk).take();
        if let Some(sdk) = sdk {
            sdk.disconnect().await;
        }
        self.events.publish(PlayerEvent::Error(error));
    }

    /// Tear the device down. Safe to call in any state.
    pub async fn disconnect(&self) {
        let mut previous = PlayerStatus::Disconnected;
        self.status.send_modify(|status| {
            self.generation.fetch_add(1, Ordering::SeqCst);
            previous = std::mem::replace(status, PlayerStatus::Disconnected);
        });
        let sdk = lock(&self.sdk).take();
        *lock(&self.last_state) = None;

        if let Some(sdk) = sdk {
            sdk.disconnect().await;
        }

        if let PlayerStatus::Ready { device_id } = previous {
            tracing::info!(device_id = %device_id, "Remote player disconnected");
            self.events.publish(PlayerEvent::NotReady { device_id });
        }
    }

    async fn pump(player: Weak<Self>, generation: u64, mut rx: mpsc::UnboundedReceiver<SdkEvent>) {
        while let Some(event) = rx.recv().await {
            let Some(player) = player.upgrade() else {
                break;
            };
            if player.generation.load(Ordering::SeqCst) != generation {
                tracing::debug!("Dropping SDK event from a previous connection");
                continue;
            }
            player.handle_sdk_event(generation, event);
        }
        tracing::debug!(generation, "SDK event channel closed");
    }

    fn handle_sdk_event(&self, generation: u64, event: SdkEvent) {
        match event {
            SdkEvent::Ready { device_id } => {
                let became_ready = self.status.send_if_modified(|status| match status {
                    // Disconnected here means the session dropped and came
                    // back on this same connection
                    PlayerStatus::Connecting | PlayerStatus::Disconnected
                        if self.generation.load(Ordering::SeqCst) == generation =>
                    {
                        *status = PlayerStatus::Ready {
                            device_id: device_id.clone(),
                        };
                        true
                    }
                    _ => false,
                });
                if became_ready {
                    tracing::info!(device_id = %device_id, "Remote player ready");
                    self.events.publish(PlayerEvent::Ready { device_id });
                } else {
                    tracing::debug!(device_id = %device_id, "Ignoring ready callback");
                }
            }
            SdkEvent::NotReady { device_id } => {
                if self.leave_ready(PlayerStatus::Disconnected) {
                    tracing::warn!(device_id = %device_id, "Remote player went offline");
                    self.events.publish(PlayerEvent::NotReady { device_id });
                }
            }
            SdkEvent::StateChanged(state) => {
                if self.is_ready() {
                    *lock(&self.last_state) = Some(state.clone());
                    self.events.publish(PlayerEvent::StateChanged(state));
                }
            }
            SdkEvent::TrackChanged(track) => {
                if self.is_ready() {
                    self.events.publish(PlayerEvent::TrackChanged(track));
                }
            }
            SdkEvent::Error(error) => {
                tracing::warn!(error = %error, kind = ?error.kind(), "Provider reported an error");
                if error.is_fatal() {
                    let device_id = self.device_id();
                    let was_ready = self.leave_ready(PlayerStatus::Error(error.clone()));
                    self.status.send_if_modified(|status| match status {
                        PlayerStatus::Connecting | PlayerStatus::Uninitialized => {
                            *status = PlayerStatus::Error(error.clone());
                            true
                        }
                        _ => false,
                    });
                    if let (true, Some(device_id)) = (was_ready, device_id) {
                        self.events.publish(PlayerEvent::NotReady { device_id });
                    }
                }
                self.events.publish(PlayerEvent::Error(error));
            }
        }
    }

    /// Move from `Ready` to `next`. Returns whether the device was ready.
    fn leave_ready(&self, next: PlayerStatus) -> bool {
        let left = self.status.send_if_modified(|status| {
            if matches!(status, PlayerStatus::Ready { .. }) {
                *status = next;
                true
            } else {
                false
            }
        });
        if left {
            *lock(&self.last_state) = None;
        }
        left
    }

    pub fn status(&self) -> PlayerStatus {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<PlayerStatus> {
        self.status.subscribe()
    }

    pub fn device_id(&self) -> Option<String> {
        match &*self.status.borrow() {
            PlayerStatus::Ready { device_id } => Some(device_id.clone()),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(&*self.status.borrow(), PlayerStatus::Ready { .. })
    }

    pub fn device(&self) -> PlaybackDevice {
        let device_id = self.device_id();
        PlaybackDevice {
            ready: device_id.is_some(),
            device_id,
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Latest snapshot reported by the provider while ready.
    pub fn last_state(&self) -> Option<PlaybackState> {
        lock(&self.last_state).clone()
    }

    pub fn subscribe(&self) -> PlayerEventChannel {
        self.events.subscribe()
    }

    /// Device id and SDK handle, only while the device is ready.
    pub(crate) fn ready_sdk(&self) -> Option<(String, Arc<dyn PlaybackSdk>)> {
        let device_id = self.device_id()?;
        let sdk = lock(&self.sdk).clone()?;
        Some((device_id, sdk))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
