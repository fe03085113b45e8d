use std::{
    error::Error as StdError,
    fmt::{Display, Formatter},
};

use http::StatusCode;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uuid::Uuid;
use valuable::Valuable;

pub type BoxedSource = Box<dyn StdError + Send + Sync + 'static>;

#[cfg(feature = "axum")]
macro_rules! impl_into_response {
    ($type:ty) => {
        impl axum::response::IntoResponse for $type {
            fn into_response(self) -> axum::http::Response<axum::body::Body> {
                axum::Json(self).into_response()
            }
        }
    };
}

#[cfg(feature = "axum")]
pub(crate) use impl_into_response;

/// JSON wrapper for all error responses (non-2xx)
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct IcebergErrorResponse {
    pub error: ErrorModel,
}

/// JSON error payload returned in a response with further details on the error
#[derive(Default, Debug, TypedBuilder, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ErrorModel {
    /// Human-readable error message
    #[builder(setter(into))]
    pub message: String,
    /// Internal type definition of the error
    #[builder(setter(into))]
    pub r#type: String,
    /// HTTP response code
    pub code: u16,
    #[serde(skip)]
    #[builder(default)]
    pub source: Option<BoxedSource>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    #[builder(default)]
    pub stack: Vec<String>,
    #[serde(skip)]
    #[builder(default)]
    pub skip_log: bool,
    #[serde(skip)]
    #[builder(default = Uuid::now_v7())]
    pub error_id: Uuid,
}

impl From<ErrorModel> for IcebergErrorResponse {
    fn from(value: ErrorModel) -> Self {
        IcebergErrorResponse { error: value }
    }
}

impl From<IcebergErrorResponse> for ErrorModel {
    fn from(value: IcebergErrorResponse) -> Self {
        value.error
    }
}

impl Display for IcebergErrorResponse {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl StdError for ErrorModel {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl Display for ErrorModel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{} ({}): {}", self.r#type, self.code, self.message)?;

        if !self.stack.is_empty() {
            writeln!(f, "Stack:")?;
            for detail in &self.stack {
                writeln!(f, "  {detail}")?;
            }
        }

        if let Some(source) = self.source.as_ref() {
            writeln!(f, "Caused by:")?;
            writeln!(f, "{source}\n")?;
            let mut current = source.source();
            while let Some(cause) = current {
                writeln!(f, "Caused by:\n\t{cause}")?;
                current = cause.source();
            }
        }

        Ok(())
    }
}

fn error_chain_vec(e: &(dyn StdError + Send + Sync + 'static)) -> Vec<String> {
    let mut details = Vec::new();
    let mut current = Some(e as &(dyn StdError + 'static));
    while let Some(cause) = current {
        details.push(cause.to_string());
        current = cause.source();
    }
    details
}

macro_rules! status_constructors {
    ($($fn_name:ident => $status:ident),* $(,)?) => {
        impl ErrorModel {
            $(
                pub fn $fn_name(
                    message: impl Into<String>,
                    r#type: impl Into<String>,
                    source: Option<BoxedSource>,
                ) -> Self {
                    Self::new(message, r#type, StatusCode::$status.as_u16(), source)
                }
            )*
        }
    };
}

status_constructors!(
    bad_request => BAD_REQUEST,
    unauthorized => UNAUTHORIZED,
    forbidden => FORBIDDEN,
    not_found => NOT_FOUND,
    not_allowed => METHOD_NOT_ALLOWED,
    conflict => CONFLICT,
    precondition_failed => PRECONDITION_FAILED,
    internal => INTERNAL_SERVER_ERROR,
    not_implemented => NOT_IMPLEMENTED,
    bad_gateway => BAD_GATEWAY,
    service_unavailable => SERVICE_UNAVAILABLE,
);

impl ErrorModel {
    pub fn new(
        message: impl Into<String>,
        r#type: impl Into<String>,
        code: u16,
        source: Option<BoxedSource>,
    ) -> Self {
        Self::builder()
            .message(message)
            .r#type(r#type)
            .code(code)
            .source(source)
            .build()
    }

    #[must_use]
    pub fn append_details(mut self, details: impl IntoIterator<Item = String>) -> Self {
        self.stack.extend(details);
        self
    }

    #[must_use]
    pub fn append_detail(mut self, detail: impl Into<String>) -> Self {
        self.stack.push(detail.into());
        self
    }

    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.code >= 500
    }

    /// Storage errors surface as provider failures: unavailable backends map to 503,
    /// everything else the backend rejects to 502.
    #[must_use]
    pub fn from_io_error(io_error: icehouse_io::IoError, detail: &str) -> Self {
        use icehouse_io::ErrorKind;

        let (code, r#type) = match io_error.kind() {
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, "StorageObjectNotFound"),
            ErrorKind::RequestTimeout
            | ErrorKind::ServiceUnavailable
            | ErrorKind::RateLimited => (StatusCode::SERVICE_UNAVAILABLE, "ProviderUnavailable"),
            ErrorKind::Unexpected
            | ErrorKind::PermissionDenied
            | ErrorKind::ConfigInvalid
            | ErrorKind::CredentialsExpired
            | ErrorKind::ConditionNotMatch => (StatusCode::BAD_GATEWAY, "ProviderError"),
        };
        let message = match io_error.location() {
            Some(location) => format!(
                "Storage {} at `{location}`: {}",
                io_error.kind(),
                io_error.reason()
            ),
            None => format!("Storage {}: {}", io_error.kind(), io_error.reason()),
        };
        let stack = io_error
            .context()
            .iter()
            .cloned()
            .chain(std::iter::once(detail.to_string()))
            .collect();

        Self::builder()
            .message(message)
            .r#type(r#type)
            .code(code.as_u16())
            .stack(stack)
            .source(io_error.into_source())
            .build()
    }
}

impl From<crate::spec::SpecError> for ErrorModel {
    fn from(err: crate::spec::SpecError) -> Self {
        ErrorModel::bad_request(err.to_string(), "BadRequestException", Some(Box::new(err)))
    }
}

impl From<crate::spec::SpecError> for IcebergErrorResponse {
    fn from(err: crate::spec::SpecError) -> Self {
        ErrorModel::from(err).into()
    }
}

/// A failed requirement means the client worked on stale metadata.
impl From<crate::spec::RequirementFailed> for ErrorModel {
    fn from(err: crate::spec::RequirementFailed) -> Self {
        ErrorModel::conflict(err.to_string(), "CommitFailedException", None)
    }
}

impl From<crate::spec::RequirementFailed> for IcebergErrorResponse {
    fn from(err: crate::spec::RequirementFailed) -> Self {
        ErrorModel::from(err).into()
    }
}

impl IcebergErrorResponse {
    #[must_use]
    pub fn append_detail(mut self, detail: impl Into<String>) -> Self {
        self.error.stack.push(detail.into());
        self
    }
}

#[derive(Debug)]
struct TracedResponseError<'a> {
    r#type: &'a str,
    code: u16,
    message: &'a str,
    stack: &'a [String],
    error_id: String,
    source: &'a [String],
}

#[cfg(tracing_unstable)]
fn log_error_response(traced: &TracedResponseError<'_>, internal: bool) {
    if internal {
        tracing::error!(
            event_source = "error_response",
            error = tracing::field::valuable(&traced.as_value()),
            "Internal server error response"
        );
    } else {
        tracing::info!(
            event_source = "error_response",
            error = tracing::field::valuable(&traced.as_value()),
            "Error response"
        );
    }
}

#[cfg(not(tracing_unstable))]
fn log_error_response(traced: &TracedResponseError<'_>, internal: bool) {
    if internal {
        tracing::error!(event_source = "error_response", error = ?traced, "Internal server error response");
    } else {
        tracing::info!(event_source = "error_response", error = ?traced, "Error response");
    }
}

impl valuable::Valuable for TracedResponseError<'_> {
    fn as_value(&self) -> valuable::Value<'_> {
        valuable::Value::Mappable(self)
    }

    fn visit(&self, visit: &mut dyn valuable::Visit) {
        visit.visit_entry(
            valuable::Value::String("type"),
            valuable::Value::String(self.r#type),
        );
        visit.visit_entry(
            valuable::Value::String("code"),
            valuable::Value::U16(self.code),
        );
        visit.visit_entry(
            valuable::Value::String("message"),
            valuable::Value::String(self.message),
        );
        if !self.stack.is_empty() {
            visit.visit_entry(valuable::Value::String("stack"), self.stack.as_value());
        }
        visit.visit_entry(
            valuable::Value::String("error_id"),
            valuable::Value::String(&self.error_id),
        );
        if !self.source.is_empty() {
            visit.visit_entry(valuable::Value::String("source"), self.source.as_value());
        }
    }
}

impl valuable::Mappable for TracedResponseError<'_> {
    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = 4 + usize::from(!self.stack.is_empty()) + usize::from(!self.source.is_empty());
        (len, Some(len))
    }
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for ErrorModel {
    fn into_response(self) -> axum::http::Response<axum::body::Body> {
        IcebergErrorResponse { error: self }.into_response()
    }
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for IcebergErrorResponse {
    fn into_response(self) -> axum::http::Response<axum::body::Body> {
        let ErrorModel {
            message,
            r#type,
            code,
            source,
            stack,
            skip_log,
            error_id,
        } = self.error;
        let source = source.map(|e| error_chain_vec(&*e)).unwrap_or_default();

        let traced = TracedResponseError {
            r#type: &r#type,
            code,
            message: &message,
            stack: &stack,
            error_id: error_id.to_string(),
            source: &source,
        };

        // Server errors keep their stack internal.
        let visible_stack = if code >= 500 {
            if !skip_log {
                log_error_response(&traced, true);
            }
            vec![format!("Error ID: {error_id}")]
        } else {
            if !skip_log {
                log_error_response(&traced, false);
            }
            let mut stack = stack;
            stack.push(format!("Error ID: {error_id}"));
            stack
        };

        let mut response = axum::Json(IcebergErrorResponse {
            error: ErrorModel {
                message,
                r#type,
                code,
                source: None,
                stack: visible_stack,
                skip_log,
                error_id,
            },
        })
        .into_response();

        *response.status_mut() =
            StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        response
    }
}
