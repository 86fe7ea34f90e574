//! OAuth sign-in against Spotify's accounts service.
//!
//! A refresh token from an earlier run is tried first; the browser flow is
//! the fallback. Whatever refresh token we end up with is written back to
//! the cache directory for the next start. Refresh tokens are bound to the
//! OAuth client, so a cached one issued to another client id is ignored.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use librespot_oauth::{OAuthClient, OAuthClientBuilder, OAuthToken};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::token::{AccessToken, RefreshedToken, TokenRefresher};

pub const SCOPES: &str = "streaming user-read-private user-read-playback-state user-modify-playback-state user-read-currently-playing";

const RESPONSE: &str = r#"
<!doctype html>
<html>
<head><title>Success</title></head>
<body><h1>Authentication Successful!</h1><script>window.close();</script></body>
</html>
"#;

#[derive(Debug, Serialize, Deserialize)]
struct StoredCredential {
    client_id: String,
    refresh_token: String,
}

/// Refreshes access tokens with the OAuth client and keeps the latest
/// refresh token on disk.
pub struct OAuthRefresher {
    client_id: String,
    redirect_uri: String,
    credentials_path: PathBuf,
}

impl OAuthRefresher {
    pub fn new(config: &Config) -> Self {
        Self {
            client_id: config.client_id.clone(),
            redirect_uri: config.redirect_uri.clone(),
            credentials_path: config.credentials_path(),
        }
    }

    fn client(&self, interactive: bool) -> Result<OAuthClient> {
        let builder = OAuthClientBuilder::new(
            &self.client_id,
            &self.redirect_uri,
            SCOPES.split_whitespace().collect(),
        );
        let builder = if interactive {
            builder.open_in_browser().with_custom_message(RESPONSE)
        } else {
            builder
        };
        builder.build().context("Failed to build OAuth client")
    }

    fn stored_refresh_token(&self) -> Option<String> {
        let contents = fs::read_to_string(&self.credentials_path).ok()?;
        let stored: StoredCredential = match serde_json::from_str(&contents) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable credential cache");
                return None;
            }
        };
        if stored.client_id != self.client_id {
            tracing::info!("Cached credential belongs to another client id");
            return None;
        }
        Some(stored.refresh_token.trim().to_string()).filter(|s| !s.is_empty())
    }

    fn persist(&self, refresh_token: &str) {
        let stored = StoredCredential {
            client_id: self.client_id.clone(),
            refresh_token: refresh_token.to_string(),
        };
        match write_credential(&self.credentials_path, &stored) {
            Ok(()) => tracing::debug!("Saved refresh token to disk"),
            Err(e) => tracing::warn!(error = %e, "Could not save refresh token"),
        }
    }

    /// Sign in, reusing a stored refresh token when it still works.
    pub async fn sign_in(&self) -> Result<RefreshedToken> {
        if let Some(refresh_token) = self.stored_refresh_token() {
            tracing::info!("Found cached refresh token");
            match self.refresh(&refresh_token).await {
                Ok(token) => return Ok(token),
                Err(e) => {
                    tracing::warn!(error = %e, "Cached refresh token failed, re-authenticating")
                }
            }
        } else {
            tracing::info!("No cached credentials found, starting browser authentication");
        }

        tracing::info!("Starting browser-based OAuth flow");
        let token = self
            .client(true)?
            .get_access_token_async()
            .await
            .context("Browser authentication failed")?;
        self.persist(&token.refresh_token);
        tracing::info!("Browser authentication completed successfully");
        Ok(into_refreshed(token))
    }

    /// Remove the stored refresh token so the next start asks again.
    pub fn forget(&self) {
        if let Err(e) = fs::remove_file(&self.credentials_path) {
            tracing::debug!(error = %e, "No refresh token to remove");
        }
    }
}

#[async_trait]
impl TokenRefresher for OAuthRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken> {
        let token = self
            .client(false)?
            .refresh_token_async(refresh_token)
            .await
            .context("Token refresh rejected")?;
        self.persist(&token.refresh_token);
        tracing::debug!("Token refreshed successfully");
        Ok(into_refreshed(token))
    }
}

fn into_refreshed(token: OAuthToken) -> RefreshedToken {
    let remaining = token.expires_at.saturating_duration_since(Instant::now());
    let expires_at = Utc::now()
        + chrono::Duration::from_std(remaining).unwrap_or_else(|_| chrono::Duration::hours(1));
    RefreshedToken {
        access_token: AccessToken::new(token.access_token, expires_at),
        refresh_token: token.refresh_token,
    }
}

fn write_credential(path: &Path, stored: &StoredCredential) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, serde_json::to_string_pretty(stored)?)?;
    Ok(())
}
