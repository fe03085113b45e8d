use chrono::{DateTime, Duration, Utc};
use veil::Redact;

/// OAuth2 bearer token obtained from a cloud identity endpoint.
#[derive(Redact, Clone, PartialEq, Eq)]
pub struct AccessToken {
    #[redact(partial)]
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    #[must_use]
    pub fn new(token: impl Into<String>, expires_in_seconds: i64) -> Self {
        Self {
            token: token.into(),
            expires_at: Utc::now() + Duration::seconds(expires_in_seconds),
        }
    }

    /// Tokens are refreshed one minute before they expire.
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.expires_at - Duration::seconds(60) > Utc::now()
    }
}

/// Token endpoint response shared by Azure AD and Google OAuth.
#[derive(Debug, serde::Deserialize)]
pub(crate) struct TokenResponse {
    pub(crate) access_token: String,
    #[serde(default = "default_expires_in")]
    pub(crate) expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

/// Cache for a single token, refreshed on demand.
#[derive(Debug, Default, Clone)]
pub(crate) struct TokenCache {
    inner: std::sync::Arc<tokio::sync::Mutex<Option<AccessToken>>>,
}

impl TokenCache {
    pub(crate) async fn get_or_refresh<F, Fut>(
        &self,
        refresh: F,
    ) -> Result<AccessToken, crate::IoError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<AccessToken, crate::IoError>>,
    {
        let mut guard = self.inner.lock().await;
        if let Some(token) = guard.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.clone());
        }
        let token = refresh().await?;
        *guard = Some(token.clone());
        Ok(token)
    }
}
