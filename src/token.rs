//! Token provider: short-lived bearer credentials on demand.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

/// Refresh once less than this much validity is left.
const REFRESH_MARGIN_SECS: i64 = 300;

#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    secret: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            secret: secret.into(),
            expires_at,
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    pub fn needs_refresh(&self) -> bool {
        (self.expires_at - Utc::now()).num_seconds() < REFRESH_MARGIN_SECS
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// A currently valid credential, or `None` when there is no session.
    async fn access_token(&self) -> Option<AccessToken>;

    /// Forget the session credential. Later requests yield `None`.
    async fn clear(&self) {}
}

/// Continuation-style access for callers that poll for a token right before
/// each privileged operation. The continuation runs exactly once.
pub fn get_token<F>(provider: Arc<dyn TokenProvider>, continuation: F)
where
    F: FnOnce(Option<AccessToken>) + Send + 'static,
{
    tokio::spawn(async move {
        let token = provider.access_token().await;
        if token.is_none() {
            tracing::warn!("Token requested without an active session");
        }
        continuation(token);
    });
}

/// Result of exchanging a refresh token.
#[derive(Clone, Debug)]
pub struct RefreshedToken {
    pub access_token: AccessToken,
    pub refresh_token: String,
}

#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> anyhow::Result<RefreshedToken>;
}

struct Credential {
    access_token: AccessToken,
    refresh_token: String,
}

/// Token provider backed by the signed-in session.
#[derive(Clone)]
pub struct SessionTokenProvider {
    credential: Arc<RwLock<Option<Credential>>>,
    refresher: Arc<dyn TokenRefresher>,
    /// Held for the whole exchange so concurrent callers share one refresh.
    refresh_lock: Arc<Mutex<()>>,
}

impl SessionTokenProvider {
    pub fn new(refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            credential: Arc::new(RwLock::new(None)),
            refresher,
            refresh_lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn sign_in(&self, access_token: AccessToken, refresh_token: String) {
        tracing::debug!(expires_at = %access_token.expires_at(), "Session credential stored");
        *self.credential.write().await = Some(Credential {
            access_token,
            refresh_token,
        });
    }

    pub async fn sign_out(&self) {
        if self.credential.write().await.take().is_some() {
            tracing::info!("Session credential dropped");
        }
    }

    pub async fn is_signed_in(&self) -> bool {
        self.credential.read().await.is_some()
    }

    /// Refresh the credential if it is close to expiry. Returns whether a
    /// refresh happened.
    pub async fn refresh_if_needed(&self) -> anyhow::Result<bool> {
        let _refreshing = self.refresh_lock.lock().await;
        let refresh_token = {
            let guard = self.credential.read().await;
            match guard.as_ref() {
                Some(c) if c.access_token.needs_refresh() => c.refresh_token.clone(),
                _ => return Ok(false),
            }
        };

        tracing::info!("Token expiring soon, refreshing...");
        let refreshed = self.refresher.refresh(&refresh_token).await?;

        let mut guard = self.credential.write().await;
        // Signed out or signed in again while the refresh was in flight
        let Some(credential) = guard
            .as_mut()
            .filter(|c| c.refresh_token == refresh_token)
        else {
            return Ok(false);
        };
        credential.access_token = refreshed.access_token;
        credential.refresh_token = refreshed.refresh_token;
        tracing::info!("Token refreshed successfully");
        Ok(true)
    }
}

#[async_trait]
impl TokenProvider for SessionTokenProvider {
    async fn access_token(&self) -> Option<AccessToken> {
        if let Err(e) = self.refresh_if_needed().await {
            tracing::warn!(error = %e, "Token refresh failed");
        }

        let guard = self.credential.read().await;
        let credential = guard.as_ref()?;
        if credential.access_token.is_expired() {
            tracing::warn!("Session credential expired");
            return None;
        }
        Some(credential.access_token.clone())
    }

    async fn clear(&self) {
        self.sign_out().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    struct CountingRefresher {
        calls: AtomicUsize,
        fail: bool,
        delay: std::time::Duration,
    }

    #[async_trait]
    impl TokenRefresher for CountingRefresher {
        async fn refresh(&self, refresh_token: &str) -> anyhow::Result<RefreshedToken> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                anyhow::bail!("refresh rejected");
            }
            Ok(RefreshedToken {
                access_token: AccessToken::new("fresh", Utc::now() + chrono::Duration::hours(1)),
                refresh_token: format!("{refresh_token}-next"),
            })
        }
    }

    fn provider(fail: bool) -> (SessionTokenProvider, Arc<CountingRefresher>) {
        slow_provider(fail, std::time::Duration::ZERO)
    }

    fn slow_provider(
        fail: bool,
        delay: std::time::Duration,
    ) -> (SessionTokenProvider, Arc<CountingRefresher>) {
        let refresher = Arc::new(CountingRefresher {
            calls: AtomicUsize::new(0),
            fail,
            delay,
        });
        (SessionTokenProvider::new(refresher.clone()), refresher)
    }

    #[tokio::test]
    async fn no_session_yields_none() {
        let (tokens, refresher) = provider(false);
        assert!(tokens.access_token().await.is_none());
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fresh_token_is_returned_without_refresh() {
        let (tokens, refresher) = provider(false);
        tokens
            .sign_in(
                AccessToken::new("abc", Utc::now() + chrono::Duration::hours(1)),
                "r1".into(),
            )
            .await;
        assert_eq!(tokens.access_token().await.unwrap().secret(), "abc");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn expiring_token_is_refreshed() {
        let (tokens, refresher) = provider(false);
        tokens
            .sign_in(
                AccessToken::new("old", Utc::now() + chrono::Duration::seconds(30)),
                "r1".into(),
            )
            .await;
        assert_eq!(tokens.access_token().await.unwrap().secret(), "fresh");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_refresh() {
        let (tokens, refresher) = slow_provider(false, std::time::Duration::from_millis(200));
        tokens
            .sign_in(
                AccessToken::new("old", Utc::now() + chrono::Duration::seconds(30)),
                "r1".into(),
            )
            .await;

        let (a, b, c) = tokio::join!(
            tokens.access_token(),
            tokens.access_token(),
            tokens.access_token()
        );

        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        for token in [a, b, c] {
            assert_eq!(token.unwrap().secret(), "fresh");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_does_not_overwrite_newer_sign_in() {
        let (tokens, _) = slow_provider(false, std::time::Duration::from_millis(200));
        tokens
            .sign_in(
                AccessToken::new("old", Utc::now() + chrono::Duration::seconds(30)),
                "r1".into(),
            )
            .await;

        let refresh = tokens.refresh_if_needed();
        let sign_in = async {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            tokens
                .sign_in(
                    AccessToken::new("relogin", Utc::now() + chrono::Duration::hours(1)),
                    "r2".into(),
                )
                .await;
        };
        let (refreshed, ()) = tokio::join!(refresh, sign_in);

        assert!(!refreshed.unwrap());
        assert_eq!(tokens.access_token().await.unwrap().secret(), "relogin");
    }

    #[tokio::test]
    async fn failed_refresh_keeps_unexpired_token() {
        let (tokens, _) = provider(true);
        tokens
            .sign_in(
                AccessToken::new("old", Utc::now() + chrono::Duration::seconds(30)),
                "r1".into(),
            )
            .await;
        assert_eq!(tokens.access_token().await.unwrap().secret(), "old");
    }

    #[tokio::test]
    async fn failed_refresh_of_expired_token_yields_none() {
        let (tokens, _) = provider(true);
        tokens
            .sign_in(
                AccessToken::new("old", Utc::now() - chrono::Duration::seconds(1)),
                "r1".into(),
            )
            .await;
        assert!(tokens.access_token().await.is_none());
    }

    #[tokio::test]
    async fn sign_out_drops_credential() {
        let (tokens, _) = provider(false);
        tokens
            .sign_in(
                AccessToken::new("abc", Utc::now() + chrono::Duration::hours(1)),
                "r1".into(),
            )
            .await;
        tokens.sign_out().await;
        assert!(!tokens.is_signed_in().await);
        assert!(tokens.access_token().await.is_none());
    }

    #[tokio::test]
    async fn continuation_receives_none_without_session() {
        let (tokens, _) = provider(false);
        let (tx, rx) = oneshot::channel();
        get_token(Arc::new(tokens), move |token| {
            let _ = tx.send(token);
        });
        assert!(rx.await.unwrap().is_none());
    }

    #[test]
    fn debug_output_redacts_secret() {
        let token = AccessToken::new("super-secret", Utc::now());
        assert!(!format!("{token:?}").contains("super-secret"));
    }
}
