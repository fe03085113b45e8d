use chrono::{DateTime, Utc};
use http::{HeaderMap, Method};
use url::Url;
use uuid::Uuid;

use crate::service::authn::{Actor, Principal, UserId};

pub const X_REQUEST_ID_HEADER: &str = "x-request-id";
pub const X_FORWARDED_HOST_HEADER: &str = "x-forwarded-host";
pub const X_FORWARDED_PROTO_HEADER: &str = "x-forwarded-proto";
pub const X_FORWARDED_PORT_HEADER: &str = "x-forwarded-port";
pub const X_FORWARDED_PREFIX_HEADER: &str = "x-forwarded-prefix";

/// Metadata of a request, available to every handler as an extension.
#[derive(Debug, Clone)]
pub struct RequestMetadata {
    request_id: Uuid,
    actor: Actor,
    token_expires_at: Option<DateTime<Utc>>,
    base_uri: String,
    request_method: Method,
}

impl RequestMetadata {
    #[must_use]
    pub fn new_unauthenticated() -> Self {
        Self {
            request_id: Uuid::now_v7(),
            actor: Actor::Anonymous,
            token_expires_at: None,
            base_uri: "http://localhost:8181".to_string(),
            request_method: Method::GET,
        }
    }

    #[cfg(any(test, feature = "test-utils"))]
    #[must_use]
    pub fn new_principal(user_id: &str) -> Self {
        let mut metadata = Self::new_unauthenticated();
        metadata.set_principal(Principal {
            user_id: UserId::try_new(user_id).unwrap(),
            expires_at: None,
        });
        metadata
    }

    pub(crate) fn set_principal(&mut self, principal: Principal) {
        self.actor = Actor::Principal(principal.user_id);
        self.token_expires_at = principal.expires_at;
    }

    #[cfg(test)]
    pub(crate) fn set_token_expiry(&mut self, expires_at: Option<DateTime<Utc>>) {
        self.token_expires_at = expires_at;
    }

    #[must_use]
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    #[must_use]
    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    #[must_use]
    pub fn user_id(&self) -> Option<&UserId> {
        self.actor.user_id()
    }

    /// Expiry of the bearer token. Vended credentials must not outlive it.
    #[must_use]
    pub fn token_expires_at(&self) -> Option<DateTime<Utc>> {
        self.token_expires_at
    }

    /// Public URI of the catalog as seen by the client, without trailing slash.
    #[must_use]
    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    #[must_use]
    pub fn request_method(&self) -> &Method {
        &self.request_method
    }

    /// Name of the provider session for credentials vended on behalf of this request.
    #[must_use]
    pub fn session_name(&self) -> String {
        let who = match &self.actor {
            Actor::Anonymous => "anonymous".to_string(),
            Actor::Principal(user_id) => user_id
                .as_str()
                .chars()
                .filter(|c| c.is_ascii_alphanumeric() || "=,.@-".contains(*c))
                .take(40)
                .collect(),
        };
        format!("icehouse-{who}")
    }
}

/// Base URI derived from `X-Forwarded-*` headers, if a proxy set them.
#[must_use]
pub fn determine_base_uri(headers: &HeaderMap) -> Option<String> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let host = header(X_FORWARDED_HOST_HEADER)?;
    let proto = header(X_FORWARDED_PROTO_HEADER).unwrap_or("http");
    let port = header(X_FORWARDED_PORT_HEADER)
        .filter(|port| !host.contains(':') && !matches!((proto, *port), ("http", "80") | ("https", "443")));
    let prefix = determine_forwarded_prefix(headers).unwrap_or_default();

    Some(match port {
        Some(port) => format!("{proto}://{host}:{port}{prefix}"),
        None => format!("{proto}://{host}{prefix}"),
    })
}

/// `X-Forwarded-Prefix` with a leading and without a trailing slash.
#[must_use]
pub fn determine_forwarded_prefix(headers: &HeaderMap) -> Option<String> {
    let prefix = headers
        .get(X_FORWARDED_PREFIX_HEADER)?
        .to_str()
        .ok()?
        .trim_matches('/');
    (!prefix.is_empty()).then(|| format!("/{prefix}"))
}

#[cfg(feature = "router")]
pub(crate) async fn create_request_metadata_with_trace_id_fn(
    axum::extract::State(base_uri): axum::extract::State<Url>,
    headers: HeaderMap,
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let request_id = headers
        .get(X_REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
        .unwrap_or_else(Uuid::now_v7);

    let base_uri = determine_base_uri(&headers)
        .unwrap_or_else(|| base_uri.as_str().trim_end_matches('/').to_string());

    let request_method = request.method().clone();
    request.extensions_mut().insert(RequestMetadata {
        request_id,
        actor: Actor::Anonymous,
        token_expires_at: None,
        base_uri,
        request_method,
    });
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    #[test]
    fn test_base_uri_from_forwarded_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(determine_base_uri(&headers), None);

        headers.insert(X_FORWARDED_HOST_HEADER, HeaderValue::from_static("catalog.example.com"));
        headers.insert(X_FORWARDED_PROTO_HEADER, HeaderValue::from_static("https"));
        headers.insert(X_FORWARDED_PORT_HEADER, HeaderValue::from_static("443"));
        assert_eq!(
            determine_base_uri(&headers).as_deref(),
            Some("https://catalog.example.com")
        );

        headers.insert(X_FORWARDED_PORT_HEADER, HeaderValue::from_static("8443"));
        headers.insert(X_FORWARDED_PREFIX_HEADER, HeaderValue::from_static("/icehouse/"));
        assert_eq!(
            determine_base_uri(&headers).as_deref(),
            Some("https://catalog.example.com:8443/icehouse")
        );
    }

    #[test]
    fn test_session_name_is_sanitized() {
        let metadata = RequestMetadata::new_principal("alice smith/admin");
        assert_eq!(metadata.session_name(), "icehouse-alicesmithadmin");
        assert_eq!(
            RequestMetadata::new_unauthenticated().session_name(),
            "icehouse-anonymous"
        );
    }
}
