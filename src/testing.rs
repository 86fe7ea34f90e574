//! Scripted fakes shared by the unit tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{PlayerError, Result};
use crate::model::{Account, AccountTier, DeviceInfo, PlaybackState, Track};
use crate::player::{PlaybackSdk, RemotePlayer, SdkEvent, SdkEventSender, SdkGuard, SdkLoader};
use crate::token::{AccessToken, TokenProvider};
use crate::web_api::{ControlApi, PlayRequest};

/// Imperative SDK call recorded by [`FakeSdk`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SdkCommand {
    Pause,
    Resume,
    TogglePlay,
    Seek(u32),
    SetVolume(u8),
    Next,
    Previous,
}

#[derive(Default)]
struct FakeSdkState {
    events: Option<SdkEventSender>,
    connects: usize,
    disconnects: usize,
    connected: bool,
    commands: Vec<SdkCommand>,
    current: Option<PlaybackState>,
}

/// Playback SDK whose callbacks are driven by the test.
#[derive(Default)]
pub struct FakeSdk {
    auto_ready: Option<String>,
    connect_error: Option<PlayerError>,
    connect_delay: Duration,
    state: Mutex<FakeSdkState>,
}

impl FakeSdk {
    /// Connects but never reports ready on its own.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reports ready with `device_id` as part of every connect.
    pub fn ready_with(device_id: &str) -> Arc<Self> {
        Arc::new(Self {
            auto_ready: Some(device_id.to_string()),
            ..Default::default()
        })
    }

    /// Like [`FakeSdk::ready_with`], but the handshake takes `delay`.
    pub fn slow_connect(device_id: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            auto_ready: Some(device_id.to_string()),
            connect_delay: delay,
            ..Default::default()
        })
    }

    pub fn failing_connect(error: PlayerError) -> Arc<Self> {
        Arc::new(Self {
            connect_error: Some(error),
            ..Default::default()
        })
    }

    /// Deliver a callback on the latest connection.
    pub fn emit(&self, event: SdkEvent) {
        if let Some(tx) = &self.state.lock().unwrap().events {
            let _ = tx.send(event);
        }
    }

    pub fn set_state(&self, state: PlaybackState) {
        self.state.lock().unwrap().current = Some(state);
    }

    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub fn disconnects(&self) -> usize {
        self.state.lock().unwrap().disconnects
    }

    /// Whether the last connect has not been followed by a disconnect.
    pub fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    pub fn commands(&self) -> Vec<SdkCommand> {
        self.state.lock().unwrap().commands.clone()
    }

    fn record(&self, command: SdkCommand) -> Result<()> {
        self.state.lock().unwrap().commands.push(command);
        Ok(())
    }
}

#[async_trait]
impl PlaybackSdk for FakeSdk {
    async fn connect(&self, _device_name: &str, _token: AccessToken, events: SdkEventSender) -> Result<()> {
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }
        if let Some(error) = &self.connect_error {
            return Err(error.clone());
        }
        let mut state = self.state.lock().unwrap();
        state.connects += 1;
        state.connected = true;
        if let Some(device_id) = &self.auto_ready {
            let _ = events.send(SdkEvent::Ready {
                device_id: device_id.clone(),
            });
        }
        state.events = Some(events);
        Ok(())
    }

    async fn disconnect(&self) {
        let mut state = self.state.lock().unwrap();
        state.disconnects += 1;
        state.connected = false;
    }

    async fn pause(&self) -> Result<()> {
        self.record(SdkCommand::Pause)
    }

    async fn resume(&self) -> Result<()> {
        self.record(SdkCommand::Resume)
    }

    async fn toggle_play(&self) -> Result<()> {
        self.record(SdkCommand::TogglePlay)
    }

    async fn seek(&self, position_ms: u32) -> Result<()> {
        self.record(SdkCommand::Seek(position_ms))
    }

    async fn set_volume(&self, percent: u8) -> Result<()> {
        self.record(SdkCommand::SetVolume(percent))
    }

    async fn next_track(&self) -> Result<()> {
        self.record(SdkCommand::Next)
    }

    async fn previous_track(&self) -> Result<()> {
        self.record(SdkCommand::Previous)
    }

    async fn current_state(&self) -> Option<PlaybackState> {
        self.state.lock().unwrap().current.clone()
    }
}

/// Hands out a shared [`FakeSdk`] after a delay.
pub struct SlowLoader {
    sdk: Arc<FakeSdk>,
    delay: Duration,
    fail_first: Mutex<Option<PlayerError>>,
}

impl SlowLoader {
    pub fn new(sdk: Arc<FakeSdk>, delay: Duration) -> Self {
        Self {
            sdk,
            delay,
            fail_first: Mutex::new(None),
        }
    }

    pub fn failing_first(self, error: PlayerError) -> Self {
        *self.fail_first.lock().unwrap() = Some(error);
        self
    }
}

#[async_trait]
impl SdkLoader for SlowLoader {
    async fn load(&self) -> Result<Arc<dyn PlaybackSdk>> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(error) = self.fail_first.lock().unwrap().take() {
            return Err(error);
        }
        Ok(self.sdk.clone())
    }
}

/// Token provider with a fixed answer.
pub struct StaticTokens(Option<AccessToken>);

impl StaticTokens {
    pub fn signed_in() -> Arc<Self> {
        Arc::new(Self(Some(AccessToken::new(
            "test-token",
            Utc::now() + chrono::Duration::hours(1),
        ))))
    }

    pub fn signed_out() -> Arc<Self> {
        Arc::new(Self(None))
    }
}

#[async_trait]
impl TokenProvider for StaticTokens {
    async fn access_token(&self) -> Option<AccessToken> {
        self.0.clone()
    }
}

pub const TEST_INIT_TIMEOUT: Duration = Duration::from_secs(5);

pub fn player_with(sdk: Arc<FakeSdk>, tokens: Arc<StaticTokens>) -> Arc<RemotePlayer> {
    let guard = Arc::new(SdkGuard::new(SlowLoader::new(sdk, Duration::ZERO)));
    RemotePlayer::new("Test Device", guard, tokens, TEST_INIT_TIMEOUT)
}

/// Let spawned tasks drain their channels.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// HTTP control API call recorded by [`FakeControlApi`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApiCall {
    StartPlayback(String, PlayRequest),
    Resume(String),
    Pause(String),
    Seek(String, u32),
    SetVolume(String, u8),
    Next(String),
    Previous(String),
    Transfer(String, bool),
    Devices,
    Account,
    Search(String),
}

pub struct FakeControlApi {
    calls: Mutex<Vec<ApiCall>>,
    account: Mutex<Account>,
    fail_next: Mutex<Option<PlayerError>>,
    delay: Mutex<Option<Duration>>,
}

impl FakeControlApi {
    /// A premium account with no recorded calls.
    pub fn new() -> Arc<Self> {
        Self::with_account(Account {
            authenticated: true,
            tier: AccountTier::Premium,
            display_name: Some("Listener".into()),
        })
    }

    pub fn with_account(account: Account) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            account: Mutex::new(account),
            fail_next: Mutex::new(None),
            delay: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls other than the account lookup.
    pub fn playback_calls(&self) -> Vec<ApiCall> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, ApiCall::Account))
            .collect()
    }

    pub fn fail_next(&self, error: PlayerError) {
        *self.fail_next.lock().unwrap() = Some(error);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    async fn record(&self, call: ApiCall) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.fail_next.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ControlApi for FakeControlApi {
    async fn start_playback(&self, device_id: &str, request: &PlayRequest) -> Result<()> {
        self.record(ApiCall::StartPlayback(device_id.into(), request.clone()))
            .await
    }

    async fn resume(&self, device_id: &str) -> Result<()> {
        self.record(ApiCall::Resume(device_id.into())).await
    }

    async fn pause(&self, device_id: &str) -> Result<()> {
        self.record(ApiCall::Pause(device_id.into())).await
    }

    async fn seek(&self, device_id: &str, position_ms: u32) -> Result<()> {
        self.record(ApiCall::Seek(device_id.into(), position_ms))
            .await
    }

    async fn set_volume(&self, device_id: &str, percent: u8) -> Result<()> {
        self.record(ApiCall::SetVolume(device_id.into(), percent))
            .await
    }

    async fn next_track(&self, device_id: &str) -> Result<()> {
        self.record(ApiCall::Next(device_id.into())).await
    }

    async fn previous_track(&self, device_id: &str) -> Result<()> {
        self.record(ApiCall::Previous(device_id.into())).await
    }

    async fn transfer(&self, device_id: &str, play: bool) -> Result<()> {
        self.record(ApiCall::Transfer(device_id.into(), play)).await
    }

    async fn devices(&self) -> Result<Vec<DeviceInfo>> {
        self.record(ApiCall::Devices).await?;
        Ok(vec![DeviceInfo {
            id: "phone".into(),
            name: "Phone".into(),
            is_active: false,
        }])
    }

    async fn account(&self) -> Result<Account> {
        self.record(ApiCall::Account).await?;
        Ok(self.account.lock().unwrap().clone())
    }

    async fn search_tracks(&self, query: &str, _limit: u32) -> Result<Vec<Track>> {
        self.record(ApiCall::Search(query.into())).await?;
        Ok(Vec::new())
    }
}
