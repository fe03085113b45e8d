//! Bearer token authentication via OAuth2 token introspection (RFC 7662).
use std::{
    fmt::Formatter,
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use http::StatusCode;
use icehouse_ext::catalog::rest::{ErrorModel, IcebergErrorResponse};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::AuthnConfig;

const INTROSPECTION_CACHE_CAPACITY: u64 = 10_000;

/// Subject of a validated token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
pub struct UserId(String);

impl UserId {
    /// # Errors
    /// Fails if the id is empty or contains control characters.
    pub fn try_new(id: impl Into<String>) -> Result<Self, ErrorModel> {
        let id = id.into();
        if id.is_empty() || id.chars().any(char::is_control) {
            return Err(ErrorModel::bad_request(
                format!("Invalid user id `{id}`"),
                "InvalidUserId",
                None,
            ));
        }
        Ok(Self(id))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for UserId {
    type Err = ErrorModel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_new(s)
    }
}

/// Who is calling.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "user-id", rename_all = "kebab-case")]
pub enum Actor {
    Anonymous,
    Principal(UserId),
}

impl Actor {
    #[must_use]
    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Actor::Anonymous => None,
            Actor::Principal(user_id) => Some(user_id),
        }
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Actor::Anonymous => write!(f, "anonymous"),
            Actor::Principal(user_id) => write!(f, "principal:{user_id}"),
        }
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    /// Expiry of the presented token, if the identity provider reported one.
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(thiserror::Error, Debug)]
pub enum AuthnError {
    #[error("Missing `Authorization: Bearer` header")]
    MissingToken,
    #[error("Bearer token is invalid or expired")]
    InvalidToken,
    #[error("Identity provider did not answer within {0:?}")]
    Timeout(Duration),
    #[error("Identity provider is unavailable")]
    Unavailable(#[source] reqwest::Error),
    #[error("Identity provider returned an unexpected response")]
    UnexpectedResponse(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl From<AuthnError> for ErrorModel {
    fn from(err: AuthnError) -> Self {
        let message = err.to_string();
        match err {
            AuthnError::MissingToken => ErrorModel::unauthorized(message, "MissingBearerToken", None),
            AuthnError::InvalidToken => ErrorModel::unauthorized(message, "InvalidBearerToken", None),
            AuthnError::Timeout(_) => {
                ErrorModel::service_unavailable(message, "IdentityProviderTimeout", None)
            }
            AuthnError::Unavailable(e) => ErrorModel::service_unavailable(
                message,
                "IdentityProviderUnavailable",
                Some(Box::new(e)),
            ),
            AuthnError::UnexpectedResponse(e) => {
                ErrorModel::bad_gateway(message, "IdentityProviderError", Some(e))
            }
        }
    }
}

impl From<AuthnError> for IcebergErrorResponse {
    fn from(err: AuthnError) -> Self {
        ErrorModel::from(err).into()
    }
}

#[async_trait::async_trait]
pub trait Authenticator: Send + Sync + Clone + std::fmt::Debug + 'static {
    async fn authenticate(&self, token: &str) -> Result<Principal, AuthnError>;
}

#[derive(Debug, Deserialize)]
struct IntrospectionResponse {
    active: bool,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    exp: Option<i64>,
}

#[derive(Debug, Clone)]
struct CachedPrincipal {
    principal: Principal,
    valid_until: Instant,
}

struct CacheExpiry;

impl moka::Expiry<[u8; 32], CachedPrincipal> for CacheExpiry {
    fn expire_after_create(
        &self,
        _key: &[u8; 32],
        value: &CachedPrincipal,
        created_at: Instant,
    ) -> Option<Duration> {
        Some(
            value
                .valid_until
                .checked_duration_since(created_at)
                .unwrap_or_default(),
        )
    }
}

/// Validates bearer tokens against an introspection endpoint. Results are cached
/// until the token expires or `cache-ttl` passes, whichever is first.
#[derive(Clone)]
pub struct IntrospectionAuthenticator {
    http: reqwest::Client,
    config: Arc<AuthnConfig>,
    cache: moka::future::Cache<[u8; 32], CachedPrincipal>,
}

impl std::fmt::Debug for IntrospectionAuthenticator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntrospectionAuthenticator")
            .field("config", &self.config)
            .field("cached_tokens", &self.cache.entry_count())
            .finish_non_exhaustive()
    }
}

impl IntrospectionAuthenticator {
    #[must_use]
    pub fn new(http: reqwest::Client, config: AuthnConfig) -> Self {
        Self {
            http,
            config: Arc::new(config),
            cache: moka::future::Cache::builder()
                .max_capacity(INTROSPECTION_CACHE_CAPACITY)
                .expire_after(CacheExpiry)
                .build(),
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout)
    }

    async fn introspect(&self, token: &str) -> Result<Principal, AuthnError> {
        let request = self
            .http
            .post(self.config.introspection_url.clone())
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("token", token), ("token_type_hint", "access_token")])
            .send();

        let response = tokio::time::timeout(self.timeout(), request)
            .await
            .map_err(|_| AuthnError::Timeout(self.timeout()))?
            .map_err(AuthnError::Unavailable)?;

        let status = response.status();
        if status.is_server_error() {
            return Err(AuthnError::UnexpectedResponse(
                format!("Introspection endpoint returned {status}").into(),
            ));
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            tracing::error!(%status, "Icehouse is not allowed to introspect tokens");
            return Err(AuthnError::UnexpectedResponse(
                format!("Introspection endpoint rejected the catalog client with {status}").into(),
            ));
        }

        let body: IntrospectionResponse = tokio::time::timeout(self.timeout(), response.json())
            .await
            .map_err(|_| AuthnError::Timeout(self.timeout()))?
            .map_err(|e| AuthnError::UnexpectedResponse(Box::new(e)))?;

        principal_from_introspection(body, Utc::now())
    }
}

fn principal_from_introspection(
    body: IntrospectionResponse,
    now: DateTime<Utc>,
) -> Result<Principal, AuthnError> {
    if !body.active {
        return Err(AuthnError::InvalidToken);
    }
    let expires_at = body.exp.and_then(|exp| DateTime::from_timestamp(exp, 0));
    if expires_at.is_some_and(|e| e <= now) {
        return Err(AuthnError::InvalidToken);
    }
    let subject = body
        .sub
        .or(body.client_id)
        .or(body.username)
        .ok_or(AuthnError::InvalidToken)?;
    let user_id = UserId::try_new(subject).map_err(|_| AuthnError::InvalidToken)?;
    Ok(Principal {
        user_id,
        expires_at,
    })
}

#[async_trait::async_trait]
impl Authenticator for IntrospectionAuthenticator {
    #[tracing::instrument(skip_all)]
    async fn authenticate(&self, token: &str) -> Result<Principal, AuthnError> {
        let key: [u8; 32] = Sha256::digest(token.as_bytes()).into();
        if let Some(cached) = self.cache.get(&key).await {
            return Ok(cached.principal);
        }

        let principal = self.introspect(token).await?;

        let mut valid_for = Duration::from_secs(self.config.cache_ttl);
        if let Some(expires_at) = principal.expires_at {
            let remaining = (expires_at - Utc::now()).to_std().unwrap_or_default();
            valid_for = valid_for.min(remaining);
        }
        self.cache
            .insert(key, CachedPrincipal {
                principal: principal.clone(),
                valid_until: Instant::now() + valid_for,
            })
            .await;
        tracing::debug!(user_id = %principal.user_id, "Authenticated principal");
        Ok(principal)
    }
}

#[cfg(feature = "router")]
pub(crate) mod middleware {
    use axum::{
        extract::{Request, State},
        middleware::Next,
        response::{IntoResponse, Response},
    };
    use http::header::AUTHORIZATION;

    use super::{Authenticator, AuthnError};
    use crate::request_metadata::RequestMetadata;

    #[derive(Debug, Clone)]
    pub(crate) struct AuthMiddlewareState<T: Authenticator> {
        pub(crate) authenticator: T,
    }

    fn bearer_token(request: &Request) -> Option<&str> {
        let value = request.headers().get(AUTHORIZATION)?.to_str().ok()?;
        let (scheme, token) = value.split_once(' ')?;
        let token = token.trim();
        (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
    }

    pub(crate) async fn auth_middleware_fn<T: Authenticator>(
        State(state): State<AuthMiddlewareState<T>>,
        mut request: Request,
        next: Next,
    ) -> Response {
        let Some(token) = bearer_token(&request).map(ToString::to_string) else {
            return crate::api::IcebergErrorResponse::from(AuthnError::MissingToken)
                .into_response();
        };

        let principal = match state.authenticator.authenticate(&token).await {
            Ok(principal) => principal,
            Err(e) => return crate::api::IcebergErrorResponse::from(e).into_response(),
        };

        if let Some(metadata) = request.extensions_mut().get_mut::<RequestMetadata>() {
            metadata.set_principal(principal);
        } else {
            let mut metadata = RequestMetadata::new_unauthenticated();
            metadata.set_principal(principal);
            request.extensions_mut().insert(metadata);
        }
        next.run(request).await
    }
}
