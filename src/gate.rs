//! Capability gate and external-app hand-off
//!
//! In-process playback needs a premium account. Everyone else is sent to
//! Spotify's own client instead; that is a separate path, not a degraded
//! mode of the local device.

use std::sync::Mutex;

use crate::model::{Account, AccountTier, SpotifyUri};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateReason {
    Premium,
    NotAuthenticated,
    NotPremium,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capability {
    pub can_stream: bool,
    pub reason: GateReason,
}

pub struct CapabilityGate;

impl CapabilityGate {
    pub fn resolve(account: &Account) -> Capability {
        let reason = if !account.authenticated {
            GateReason::NotAuthenticated
        } else if account.tier == AccountTier::Premium {
            GateReason::Premium
        } else {
            GateReason::NotPremium
        };
        let capability = Capability {
            can_stream: reason == GateReason::Premium,
            reason,
        };
        tracing::debug!(tier = ?account.tier, reason = ?capability.reason, "Capability resolved");
        capability
    }
}

/// Opens an item in Spotify's own client.
pub trait HandoffLauncher: Send + Sync {
    fn open(&self, uri: &SpotifyUri, web_url: &str);
}

/// Keeps the latest hand-off link for the terminal status line.
#[derive(Default)]
pub struct StatusLineLauncher {
    last: Mutex<Option<String>>,
}

impl StatusLineLauncher {
    pub fn last_link(&self) -> Option<String> {
        self.last
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl HandoffLauncher for StatusLineLauncher {
    fn open(&self, uri: &SpotifyUri, web_url: &str) {
        tracing::info!(uri = %uri, url = web_url, "Handing playback off to the Spotify app");
        *self
            .last
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(web_url.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UriKind;

    fn account(authenticated: bool, tier: AccountTier) -> Account {
        Account {
            authenticated,
            tier,
            display_name: None,
        }
    }

    #[test]
    fn only_authenticated_premium_can_stream() {
        assert_eq!(
            CapabilityGate::resolve(&account(true, AccountTier::Premium)),
            Capability {
                can_stream: true,
                reason: GateReason::Premium
            }
        );
        assert_eq!(
            CapabilityGate::resolve(&account(true, AccountTier::Free)).reason,
            GateReason::NotPremium
        );
        assert!(!CapabilityGate::resolve(&account(true, AccountTier::Unknown)).can_stream);
        assert_eq!(
            CapabilityGate::resolve(&account(false, AccountTier::Premium)).reason,
            GateReason::NotAuthenticated
        );
    }

    #[test]
    fn status_line_launcher_keeps_last_link() {
        let launcher = StatusLineLauncher::default();
        let uri = SpotifyUri::new(UriKind::Track, "4uLU6hMCjMI75M1A2tKUQC");
        launcher.open(&uri, &uri.web_url());
        assert_eq!(
            launcher.last_link().as_deref(),
            Some("https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC")
        );
    }
}
