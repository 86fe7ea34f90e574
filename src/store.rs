//! Session state store
//!
//! Single source of truth for what is shown as playing. It is the only
//! consumer of the player's event channel and replaces its snapshot whole on
//! every `StateChanged`. Between events a local clock extrapolates the
//! position so the progress bar moves; every event resets that clock to the
//! provider's position.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::model::{format_duration, PlaybackState, Track};
use crate::player::{PlayerEvent, RemotePlayer};

/// Local ticking clock for the displayed position.
#[derive(Clone, Debug)]
pub struct PlaybackClock {
    position_ms: u32,
    duration_ms: u32,
    playing: bool,
    last_update: Instant,
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self {
            position_ms: 0,
            duration_ms: 0,
            playing: false,
            last_update: Instant::now(),
        }
    }
}

impl PlaybackClock {
    pub fn position_ms(&self) -> u32 {
        if !self.playing {
            return self.position_ms;
        }
        let elapsed = self.last_update.elapsed().as_millis();
        let position = u128::from(self.position_ms).saturating_add(elapsed);
        let position = u32::try_from(position).unwrap_or(u32::MAX);
        if self.duration_ms > 0 {
            position.min(self.duration_ms)
        } else {
            position
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Snap to an authoritative position.
    pub fn reset(&mut self, position_ms: u32, duration_ms: u32, playing: bool) {
        self.position_ms = if duration_ms > 0 {
            position_ms.min(duration_ms)
        } else {
            position_ms
        };
        self.duration_ms = duration_ms;
        self.playing = playing;
        self.last_update = Instant::now();
    }
}

/// What observers of the store see.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StoreView {
    pub snapshot: Option<PlaybackState>,
    pub now_playing: Option<Track>,
    /// Bumped on every applied event.
    pub seq: u64,
}

pub struct SessionStore {
    view: watch::Sender<StoreView>,
    clock: Mutex<PlaybackClock>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl SessionStore {
    pub fn new() -> Arc<Self> {
        let (view, _) = watch::channel(StoreView::default());
        Arc::new(Self {
            view,
            clock: Mutex::new(PlaybackClock::default()),
            consumer: Mutex::new(None),
        })
    }

    /// Become the consumer of `player`'s events. Replaces any earlier
    /// attachment.
    pub fn attach(self: &Arc<Self>, player: &RemotePlayer) {
        let mut events = player.subscribe();
        if let Some(state) = player.last_state() {
            self.apply(PlayerEvent::StateChanged(state));
        }

        let store = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(store) = store.upgrade() else {
                    break;
                };
                store.apply(event);
            }
            tracing::debug!("Store detached from player events");
        });

        if let Some(previous) = lock(&self.consumer).replace(handle) {
            previous.abort();
        }
        tracing::debug!(device_name = %player.device_name(), "Store attached to player");
    }

    /// Apply one event, in arrival order.
    pub fn apply(&self, event: PlayerEvent) {
        match event {
            PlayerEvent::StateChanged(state) => {
                lock(&self.clock).reset(state.position_ms, state.duration_ms, !state.paused);
                self.view.send_modify(|view| {
                    if state.current_track.is_some() {
                        view.now_playing = state.current_track.clone();
                    }
                    view.snapshot = Some(state);
                    view.seq += 1;
                });
            }
            PlayerEvent::TrackChanged(track) => {
                // The latest snapshot is authoritative for which track is
                // playing; its own StateChanged resets the clock.
                let conflicting = self
                    .view
                    .borrow()
                    .snapshot
                    .as_ref()
                    .and_then(PlaybackState::track_uri)
                    .is_some_and(|uri| uri != track.uri);
                if conflicting {
                    tracing::debug!(uri = %track.uri, "Track change superseded by snapshot");
                    return;
                }
                self.view.send_modify(|view| {
                    view.now_playing = Some(track);
                    view.seq += 1;
                });
            }
            PlayerEvent::NotReady { device_id } => {
                tracing::debug!(device_id = %device_id, "Device gone, freezing store");
                lock(&self.clock).playing = false;
                self.view.send_modify(|view| {
                    if let Some(snapshot) = view.snapshot.as_mut() {
                        snapshot.paused = true;
                    }
                    view.seq += 1;
                });
            }
            PlayerEvent::Ready { .. } | PlayerEvent::Error(_) => {}
        }
    }

    /// Reset to empty and stop consuming events.
    pub fn clear(&self) {
        if let Some(consumer) = lock(&self.consumer).take() {
            consumer.abort();
        }
        *lock(&self.clock) = PlaybackClock::default();
        self.view.send_modify(|view| {
            view.snapshot = None;
            view.now_playing = None;
            view.seq += 1;
        });
        tracing::debug!("Store cleared");
    }

    pub fn watch(&self) -> watch::Receiver<StoreView> {
        self.view.subscribe()
    }

    pub fn snapshot(&self) -> Option<PlaybackState> {
        self.view.borrow().snapshot.clone()
    }

    pub fn now_playing(&self) -> Option<Track> {
        self.view.borrow().now_playing.clone()
    }

    pub fn duration_ms(&self) -> u32 {
        lock(&self.clock).duration_ms
    }

    /// Displayed position, extrapolated since the last event.
    pub fn position_ms(&self) -> u32 {
        lock(&self.clock).position_ms()
    }

    pub fn is_playing(&self) -> bool {
        lock(&self.clock).is_playing()
    }

    pub fn progress_ratio(&self) -> f64 {
        let clock = lock(&self.clock);
        if clock.duration_ms == 0 {
            return 0.0;
        }
        (f64::from(clock.position_ms()) / f64::from(clock.duration_ms)).clamp(0.0, 1.0)
    }

    /// `m:ss / m:ss`
    pub fn elapsed_label(&self) -> String {
        let clock = lock(&self.clock);
        format!(
            "{} / {}",
            format_duration(clock.position_ms()),
            format_duration(clock.duration_ms)
        )
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        if let Some(consumer) = lock(&self.consumer).take() {
            consumer.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
