use http::Request;
use tower_http::{
    request_id::{MakeRequestId, RequestId},
    trace::MakeSpan,
};
use tracing::{Level, Span};
use uuid::Uuid;

use crate::request_metadata::{
    X_FORWARDED_HOST_HEADER, X_FORWARDED_PROTO_HEADER, X_REQUEST_ID_HEADER,
};

/// A `MakeSpan` implementation that attaches the `request_id` to the span.
#[derive(Debug, Clone)]
pub struct RestMakeSpan {
    level: Level,
}

impl RestMakeSpan {
    /// Create a [tracing span] with a certain [`Level`].
    ///
    /// [tracing span]: https://docs.rs/tracing/latest/tracing/#spans
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }
}

fn header_or_unset<'a, B>(request: &'a Request<B>, name: &str) -> &'a str {
    request
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("not set")
}

/// tower-http's `MakeSpan` implementation does not attach a `request_id` to the span. The impl below
/// does.
impl<B> MakeSpan<B> for RestMakeSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        // `tracing::span!` needs a static level.
        macro_rules! make_span {
            ($level:expr) => {
                tracing::span!(
                    $level,
                    "request",
                    method = %request.method(),
                    host = %header_or_unset(request, "host"),
                    "x-forwarded-host" = %header_or_unset(request, X_FORWARDED_HOST_HEADER),
                    "x-forwarded-proto" = %header_or_unset(request, X_FORWARDED_PROTO_HEADER),
                    uri = %request.uri(),
                    version = ?request.version(),
                    request_id = %request
                                .headers()
                                .get(X_REQUEST_ID_HEADER)
                                .and_then(|v| v.to_str().ok())
                                .unwrap_or("MISSING-REQUEST-ID"),
                )
            }
        }

        match self.level {
            Level::TRACE => make_span!(Level::TRACE),
            Level::DEBUG => make_span!(Level::DEBUG),
            Level::INFO => make_span!(Level::INFO),
            Level::WARN => make_span!(Level::WARN),
            Level::ERROR => make_span!(Level::ERROR),
        }
    }
}

/// A [`MakeRequestId`] that generates `UUIDv7`s.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid7;

impl MakeRequestId for MakeRequestUuid7 {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let request_id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(request_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_ids_are_v7() {
        let request = Request::builder().body(()).unwrap();
        let id = MakeRequestUuid7.make_request_id(&request).unwrap();
        let id = Uuid::parse_str(id.header_value().to_str().unwrap()).unwrap();
        assert_eq!(id.get_version_num(), 7);
    }
}
