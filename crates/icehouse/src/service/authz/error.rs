use std::{
    error::Error as StdError,
    fmt::{Display, Formatter},
};

use http::StatusCode;
use icehouse_ext::catalog::rest::{ErrorModel, IcebergErrorResponse};

use crate::service::{error_chain_fmt, impl_error_stack_methods};

#[derive(Debug, PartialEq, derive_more::From)]
pub enum BackendUnavailableOrCountMismatch {
    AuthorizationCountMismatch(AuthorizationCountMismatch),
    AuthorizationBackendUnavailable(AuthorizationBackendUnavailable),
}

impl From<BackendUnavailableOrCountMismatch> for ErrorModel {
    fn from(err: BackendUnavailableOrCountMismatch) -> Self {
        match err {
            BackendUnavailableOrCountMismatch::AuthorizationCountMismatch(e) => e.into(),
            BackendUnavailableOrCountMismatch::AuthorizationBackendUnavailable(e) => e.into(),
        }
    }
}

impl From<BackendUnavailableOrCountMismatch> for IcebergErrorResponse {
    fn from(err: BackendUnavailableOrCountMismatch) -> Self {
        ErrorModel::from(err).into()
    }
}

/// A batch check returned a different number of decisions than it was asked for.
#[derive(Debug, PartialEq)]
pub struct AuthorizationCountMismatch {
    pub expected_authorizations: usize,
    pub actual_authorizations: usize,
    pub type_name: String,
}

impl AuthorizationCountMismatch {
    #[must_use]
    pub fn new(
        expected_authorizations: usize,
        actual_authorizations: usize,
        type_name: &str,
    ) -> Self {
        Self {
            expected_authorizations,
            actual_authorizations,
            type_name: type_name.to_string(),
        }
    }
}

impl From<AuthorizationCountMismatch> for ErrorModel {
    fn from(err: AuthorizationCountMismatch) -> Self {
        let AuthorizationCountMismatch {
            expected_authorizations,
            actual_authorizations,
            type_name,
        } = err;

        ErrorModel::builder()
            .r#type("AuthorizationCountMismatch")
            .code(StatusCode::INTERNAL_SERVER_ERROR.as_u16())
            .message("Authorization service returned invalid response")
            .stack(vec![format!(
                "Authorization count mismatch for {type_name} batch check: expected {expected_authorizations}, got {actual_authorizations}."
            )])
            .build()
    }
}

#[derive(Debug)]
pub struct AuthorizationBackendUnavailable {
    pub stack: Vec<String>,
    pub source: Box<dyn std::error::Error + Send + Sync + 'static>,
}

impl_error_stack_methods!(AuthorizationBackendUnavailable);

impl PartialEq for AuthorizationBackendUnavailable {
    fn eq(&self, other: &Self) -> bool {
        self.stack == other.stack && self.source.to_string() == other.source.to_string()
    }
}

impl AuthorizationBackendUnavailable {
    pub fn new<E>(source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            stack: Vec::new(),
            source: Box::new(source),
        }
    }
}

impl StdError for AuthorizationBackendUnavailable {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&*self.source as &(dyn StdError + 'static))
    }
}

impl Display for AuthorizationBackendUnavailable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "AuthorizationBackendError: {}", self.source)?;

        if !self.stack.is_empty() {
            writeln!(f, "Stack:")?;
            for detail in &self.stack {
                writeln!(f, "  {detail}")?;
            }
        }

        if let Some(source) = self.source.source() {
            writeln!(f, "Caused by:")?;
            error_chain_fmt(source, f)?;
        }

        Ok(())
    }
}

impl From<AuthorizationBackendUnavailable> for ErrorModel {
    fn from(err: AuthorizationBackendUnavailable) -> Self {
        ErrorModel::builder()
            .r#type("AuthorizationBackendError")
            .code(StatusCode::SERVICE_UNAVAILABLE.as_u16())
            .message("Authorization service is unavailable")
            .stack(err.stack)
            .source(Some(err.source))
            .build()
    }
}

impl From<AuthorizationBackendUnavailable> for IcebergErrorResponse {
    fn from(err: AuthorizationBackendUnavailable) -> Self {
        ErrorModel::from(err).into()
    }
}

/// Generates the `Require<Entity>ActionError` enum: either the caller may not see the
/// object (answered like a missing object), may see it but not act on it (403), or the
/// check itself failed.
macro_rules! define_require_action_error {
    ($error_name:ident { $($variant:ident),* $(,)? }) => {
        #[derive(Debug, derive_more::From)]
        pub enum $error_name {
            $($variant($variant),)*
            AuthorizationBackendUnavailable(
                crate::service::authz::AuthorizationBackendUnavailable,
            ),
            AuthorizationCountMismatch(crate::service::authz::AuthorizationCountMismatch),
            CatalogBackendError(crate::service::CatalogBackendError),
        }

        impl From<crate::service::authz::BackendUnavailableOrCountMismatch> for $error_name {
            fn from(err: crate::service::authz::BackendUnavailableOrCountMismatch) -> Self {
                match err {
                    crate::service::authz::BackendUnavailableOrCountMismatch::AuthorizationBackendUnavailable(e) => e.into(),
                    crate::service::authz::BackendUnavailableOrCountMismatch::AuthorizationCountMismatch(e) => e.into(),
                }
            }
        }

        impl From<$error_name> for icehouse_ext::catalog::rest::ErrorModel {
            fn from(err: $error_name) -> Self {
                match err {
                    $($error_name::$variant(e) => e.into(),)*
                    $error_name::AuthorizationBackendUnavailable(e) => e.into(),
                    $error_name::AuthorizationCountMismatch(e) => e.into(),
                    $error_name::CatalogBackendError(e) => e.into(),
                }
            }
        }

        impl From<$error_name> for icehouse_ext::catalog::rest::IcebergErrorResponse {
            fn from(err: $error_name) -> Self {
                icehouse_ext::catalog::rest::ErrorModel::from(err).into()
            }
        }
    };
}

pub(crate) use define_require_action_error;

/// A visible object on which the caller lacks the permission.
macro_rules! define_action_forbidden {
    ($error_name:ident, $entity:literal, $err_type:literal, $object:ty) => {
        #[derive(Debug, PartialEq, Eq)]
        pub struct $error_name {
            object: String,
            action: String,
            actor: crate::service::Actor,
        }

        impl $error_name {
            #[must_use]
            pub fn new(
                object: $object,
                action: impl std::fmt::Display,
                actor: crate::service::Actor,
            ) -> Self {
                Self {
                    object: object.to_string(),
                    action: action.to_string(),
                    actor,
                }
            }
        }

        impl From<$error_name> for icehouse_ext::catalog::rest::ErrorModel {
            fn from(err: $error_name) -> Self {
                let $error_name {
                    object,
                    action,
                    actor,
                } = err;
                icehouse_ext::catalog::rest::ErrorModel::forbidden(
                    format!(
                        concat!($entity, " action `{}` forbidden for `{}` on ", $entity, " `{}`"),
                        action, actor, object
                    ),
                    $err_type,
                    None,
                )
            }
        }

        impl From<$error_name> for icehouse_ext::catalog::rest::IcebergErrorResponse {
            fn from(err: $error_name) -> Self {
                icehouse_ext::catalog::rest::ErrorModel::from(err).into()
            }
        }
    };
}

pub(crate) use define_action_forbidden;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_unavailable_is_503() {
        let err = AuthorizationBackendUnavailable::new(std::io::Error::other("connection reset"))
            .append_detail("checking warehouse");
        let model = ErrorModel::from(err);
        assert_eq!(model.code, 503);
        assert_eq!(model.stack, vec!["checking warehouse"]);
    }

    #[test]
    fn test_count_mismatch_is_internal() {
        let model = ErrorModel::from(AuthorizationCountMismatch::new(2, 1, "table"));
        assert_eq!(model.code, 500);
        assert_eq!(model.r#type, "AuthorizationCountMismatch");
    }
}
