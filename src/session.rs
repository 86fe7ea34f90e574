//! Signed-in session
//!
//! Owns the account, the playback device (only for premium accounts), the
//! store and the transport controller. Signing out tears all of it down;
//! transport handles that outlive the session turn into no-ops.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::config::Config;
use crate::error::{ErrorKind, Result};
use crate::gate::{Capability, CapabilityGate, HandoffLauncher};
use crate::model::{Account, SpotifyUri};
use crate::player::{PlayerStatus, RemotePlayer, SdkGuard};
use crate::store::SessionStore;
use crate::token::TokenProvider;
use crate::transport::{CommandOutcome, TransportController};
use crate::web_api::ControlApi;

/// Where a play request went.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlayRoute {
    Streamed(CommandOutcome),
    HandedOff { web_url: String },
}

struct Active {
    account: Account,
    capability: Capability,
    player: Option<Arc<RemotePlayer>>,
    transport: Option<Arc<TransportController>>,
}

pub struct Session {
    device_name: String,
    init_timeout: Duration,
    command_timeout: Duration,
    tokens: Arc<dyn TokenProvider>,
    api: Arc<dyn ControlApi>,
    sdk_guard: Arc<SdkGuard>,
    launcher: Arc<dyn HandoffLauncher>,
    store: Arc<SessionStore>,
    active: RwLock<Option<Active>>,
}

impl Session {
    pub fn new(
        config: &Config,
        tokens: Arc<dyn TokenProvider>,
        api: Arc<dyn ControlApi>,
        sdk_guard: Arc<SdkGuard>,
        launcher: Arc<dyn HandoffLauncher>,
    ) -> Self {
        Self {
            device_name: config.device_name.clone(),
            init_timeout: config.init_timeout,
            command_timeout: config.command_timeout,
            tokens,
            api,
            sdk_guard,
            launcher,
            store: SessionStore::new(),
            active: RwLock::new(None),
        }
    }

    /// Resolve the account and, for premium accounts, bring the playback
    /// device up. The session stays signed in when only the device fails;
    /// [`Session::reconnect`] retries it.
    pub async fn sign_in(&self) -> Result<Capability> {
        self.teardown().await;

        let account = match self.api.account().await {
            Ok(account) => account,
            Err(e) if e.kind() == ErrorKind::Authentication => {
                tracing::warn!(error = %e, "Account lookup rejected the credential");
                Account::signed_out()
            }
            Err(e) => return Err(e),
        };
        let capability = CapabilityGate::resolve(&account);
        tracing::info!(
            user = ?account.display_name,
            can_stream = capability.can_stream,
            reason = ?capability.reason,
            "Session signed in"
        );

        let (player, transport) = if capability.can_stream {
            let player = RemotePlayer::new(
                self.device_name.clone(),
                self.sdk_guard.clone(),
                self.tokens.clone(),
                self.init_timeout,
            );
            self.store.attach(&player);
            let transport = Arc::new(TransportController::new(
                &player,
                self.api.clone(),
                self.command_timeout,
            ));
            (Some(player), Some(transport))
        } else {
            (None, None)
        };

        *self.active.write().await = Some(Active {
            account,
            capability,
            player: player.clone(),
            transport,
        });

        if let Some(player) = player {
            player.initialize().await?;
        }
        Ok(capability)
    }

    /// Retry bringing the device up after a failed or lost connection.
    pub async fn reconnect(&self) -> Result<Option<String>> {
        let player = self.player().await;
        match player {
            Some(player) => player.initialize().await.map(Some),
            None => Ok(None),
        }
    }

    /// Play `uri` in-process when the account allows it, otherwise open it
    /// in Spotify's own client. The hand-off path never touches the
    /// transport controller.
    pub async fn play_or_handoff(&self, uri: &str) -> Result<PlayRoute> {
        let uri: SpotifyUri = uri.parse()?;
        let (capability, transport) = {
            let active = self.active.read().await;
            match active.as_ref() {
                Some(active) => (active.capability, active.transport.clone()),
                None => (CapabilityGate::resolve(&Account::signed_out()), None),
            }
        };

        match transport {
            Some(transport) if capability.can_stream => {
                let outcome = transport.play(Some(&uri.to_string()), None).await?;
                Ok(PlayRoute::Streamed(outcome))
            }
            _ => {
                let web_url = uri.web_url();
                tracing::info!(uri = %uri, reason = ?capability.reason, "Playback handed off");
                self.launcher.open(&uri, &web_url);
                Ok(PlayRoute::HandedOff { web_url })
            }
        }
    }

    /// Tear the session down: disconnect the device, clear the store and
    /// drop the credential.
    pub async fn sign_out(&self) {
        if let Some(account) = self.teardown().await {
            self.tokens.clear().await;
            tracing::info!(user = ?account.display_name, "Session signed out");
        }
    }

    async fn teardown(&self) -> Option<Account> {
        let active = self.active.write().await.take()?;
        if let Some(player) = &active.player {
            player.disconnect().await;
        }
        self.store.clear();
        Some(active.account)
    }

    pub async fn is_signed_in(&self) -> bool {
        self.active.read().await.is_some()
    }

    pub async fn account(&self) -> Option<Account> {
        self.active.read().await.as_ref().map(|a| a.account.clone())
    }

    pub async fn capability(&self) -> Option<Capability> {
        self.active.read().await.as_ref().map(|a| a.capability)
    }

    pub async fn transport(&self) -> Option<Arc<TransportController>> {
        self.active
            .read()
            .await
            .as_ref()
            .and_then(|a| a.transport.clone())
    }

    pub async fn player_status(&self) -> PlayerStatus {
        match self.player().await {
            Some(player) => player.status(),
            None => PlayerStatus::Uninitialized,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn api(&self) -> &Arc<dyn ControlApi> {
        &self.api
    }

    async fn player(&self) -> Option<Arc<RemotePlayer>> {
        self.active
            .read()
            .await
            .as_ref()
            .and_then(|a| a.player.clone())
    }
}
