use std::{
    error::Error as StdError,
    fmt::{Display, Formatter},
};

use http::StatusCode;
use icehouse_ext::catalog::rest::{ErrorModel, IcebergErrorResponse};

macro_rules! impl_error_stack_methods {
    ($error_type:ty) => {
        impl $error_type {
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

            pub fn append_detail_mut(&mut self, detail: impl Into<String>) {
                self.stack.push(detail.into());
            }
        }
    };
}

macro_rules! impl_from_with_detail {
    ($from_type:ty => $to_type:ident::$variant:ident, $detail:expr) => {
        impl From<$from_type> for $to_type {
            fn from(err: $from_type) -> Self {
                $to_type::$variant(err.append_detail($detail))
            }
        }
    };
}

/// Defines a fully transparent error enum with automatic conversion implementations.
///
/// This macro generates:
/// - An enum with all variants marked as `#[error(transparent)]`
/// - `impl_from_with_detail!` for each variant to add stack context
/// - `From<ErrorType> for ErrorModel` that delegates to variant conversions
/// - `From<ErrorType> for IcebergErrorResponse` via `ErrorModel`
macro_rules! define_transparent_error {
    (
        $(#[$meta:meta])*
        $vis:vis enum $error_name:ident,
        stack_message: $stack_msg:expr,
        variants: [
            $($variant:ident),* $(,)?
        ]
    ) => {
        $(#[$meta])*
        #[derive(thiserror::Error, Debug)]
        $vis enum $error_name {
            $(
                #[error(transparent)]
                $variant($variant),
            )*
        }

        pastey::paste! {
            const [<$error_name:snake:upper _STACK>]: &str = $stack_msg;

            $(
                impl_from_with_detail!($variant => $error_name::$variant, [<$error_name:snake:upper _STACK>]);
            )*

            impl $error_name {
                #[must_use]
                pub fn append_detail(mut self, detail: impl Into<String>) -> Self {
                    match &mut self {
                        $(
                            $error_name::$variant(e) => {
                                e.append_detail_mut(detail);
                            }
                        )*
                    }
                    self
                }
            }

            impl From<$error_name> for ErrorModel {
                fn from(err: $error_name) -> Self {
                    match err {
                        $(
                            $error_name::$variant(e) => e.into(),
                        )*
                    }
                }
            }

            impl From<$error_name> for IcebergErrorResponse {
                fn from(err: $error_name) -> Self {
                    ErrorModel::from(err).into()
                }
            }
        }
    };
}

pub(crate) use define_transparent_error;
pub(crate) use impl_error_stack_methods;
pub(crate) use impl_from_with_detail;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum CatalogBackendErrorType {
    Unexpected,
    Persistence,
}

/// The store itself failed, independent of the request.
#[derive(Debug)]
pub struct CatalogBackendError {
    pub r#type: CatalogBackendErrorType,
    pub stack: Vec<String>,
    pub source: Box<dyn std::error::Error + Send + Sync + 'static>,
}

impl_error_stack_methods!(CatalogBackendError);

impl CatalogBackendError {
    pub fn new<E>(source: E, r#type: CatalogBackendErrorType) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            r#type,
            stack: Vec::new(),
            source: Box::new(source),
        }
    }

    pub fn new_unexpected<E>(source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::new(source, CatalogBackendErrorType::Unexpected)
    }
}

impl StdError for CatalogBackendError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&*self.source as &(dyn StdError + 'static))
    }
}

impl Display for CatalogBackendError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "CatalogBackendError ({}): {}", self.r#type, self.source)?;

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

pub(crate) fn error_chain_fmt(
    e: impl StdError,
    f: &mut std::fmt::Formatter<'_>,
) -> std::fmt::Result {
    writeln!(f, "{e}\n")?;
    let mut current = e.source();
    while let Some(cause) = current {
        writeln!(f, "Caused by:\n\t{cause}")?;
        current = cause.source();
    }
    Ok(())
}

impl From<CatalogBackendError> for ErrorModel {
    fn from(err: CatalogBackendError) -> Self {
        let CatalogBackendError {
            r#type,
            stack,
            source,
        } = err;

        ErrorModel::builder()
            .r#type("CatalogBackendError")
            .code(StatusCode::INTERNAL_SERVER_ERROR.as_u16())
            .message(format!("Catalog backend error ({type}): {source}"))
            .stack(stack)
            .source(Some(source))
            .build()
    }
}

impl From<CatalogBackendError> for IcebergErrorResponse {
    fn from(err: CatalogBackendError) -> Self {
        ErrorModel::from(err).into()
    }
}

/// A stored record violates an invariant of the store.
#[derive(thiserror::Error, Debug, PartialEq)]
#[error("Catalog integrity error: {message}")]
pub struct CatalogIntegrityError {
    pub message: String,
    pub stack: Vec<String>,
}

impl_error_stack_methods!(CatalogIntegrityError);

impl CatalogIntegrityError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: Vec::new(),
        }
    }
}

impl From<CatalogIntegrityError> for ErrorModel {
    fn from(err: CatalogIntegrityError) -> Self {
        ErrorModel::builder()
            .r#type("CatalogIntegrityError")
            .code(StatusCode::INTERNAL_SERVER_ERROR.as_u16())
            .message(err.to_string())
            .stack(err.stack)
            .build()
    }
}

impl From<CatalogIntegrityError> for IcebergErrorResponse {
    fn from(err: CatalogIntegrityError) -> Self {
        ErrorModel::from(err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(thiserror::Error, Debug, PartialEq, Default)]
    #[error("Something conflicts")]
    pub struct ExampleConflict {
        pub stack: Vec<String>,
    }
    impl_error_stack_methods!(ExampleConflict);
    impl From<ExampleConflict> for ErrorModel {
        fn from(err: ExampleConflict) -> Self {
            ErrorModel::conflict(err.to_string(), "ExampleConflict", None).append_details(err.stack)
        }
    }

    #[derive(thiserror::Error, Debug, PartialEq)]
    #[error("Other failure")]
    pub struct OtherFailure {
        pub stack: Vec<String>,
    }
    impl_error_stack_methods!(OtherFailure);
    impl From<OtherFailure> for ErrorModel {
        fn from(err: OtherFailure) -> Self {
            ErrorModel::internal(err.to_string(), "OtherFailure", None).append_details(err.stack)
        }
    }

    define_transparent_error! {
        pub enum ExampleError,
        stack_message: "Error in example operation",
        variants: [ExampleConflict, OtherFailure]
    }

    #[test]
    fn test_transparent_error_adds_stack_and_keeps_status() {
        let err: ExampleError = ExampleConflict::default().into();
        let model = ErrorModel::from(err.append_detail("more"));
        assert_eq!(model.code, 409);
        assert_eq!(model.r#type, "ExampleConflict");
        assert_eq!(model.stack, vec!["Error in example operation", "more"]);
    }

    #[test]
    fn test_backend_error_is_internal() {
        let err = CatalogBackendError::new(
            std::io::Error::other("disk full"),
            CatalogBackendErrorType::Persistence,
        );
        let model = ErrorModel::from(err);
        assert_eq!(model.code, 500);
        assert!(model.message.contains("disk full"));
    }
}
