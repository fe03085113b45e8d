use std::collections::HashMap;

use chrono::{DateTime, Utc};
use http::StatusCode;
use icehouse_ext::{
    NamespaceIdent,
    catalog::rest::{ErrorModel, IcebergErrorResponse},
};

use super::{
    CatalogBackendError, WarehouseIdNotFound, define_transparent_error, define_version_newtype,
    impl_error_stack_methods, impl_from_with_detail,
};
use crate::{WarehouseId, service::NamespaceId};

define_version_newtype!(NamespaceVersion);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceInfo {
    pub namespace_id: NamespaceId,
    pub warehouse_id: WarehouseId,
    pub namespace_ident: NamespaceIdent,
    pub properties: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: NamespaceVersion,
}

impl NamespaceInfo {
    #[must_use]
    pub fn parent(&self) -> Option<NamespaceIdent> {
        self.namespace_ident.parent()
    }
}

/// Either the name or the id of a namespace, for error messages.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::From)]
pub enum NamespaceIdentOrId {
    Ident(NamespaceIdent),
    Id(NamespaceId),
}

impl std::fmt::Display for NamespaceIdentOrId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NamespaceIdentOrId::Ident(ident) => write!(f, "'{ident}'"),
            NamespaceIdentOrId::Id(id) => write!(f, "with id '{id}'"),
        }
    }
}

macro_rules! define_simple_namespace_err {
    ($error_name:ident, $error_message:literal, $status:ident, $err_type:literal) => {
        #[derive(thiserror::Error, Debug, PartialEq)]
        #[error($error_message)]
        pub struct $error_name {
            pub warehouse_id: WarehouseId,
            pub namespace: NamespaceIdentOrId,
            pub stack: Vec<String>,
        }

        impl $error_name {
            #[must_use]
            pub fn new(warehouse_id: WarehouseId, namespace: impl Into<NamespaceIdentOrId>) -> Self {
                Self {
                    warehouse_id,
                    namespace: namespace.into(),
                    stack: Vec::new(),
                }
            }
        }

        impl_error_stack_methods!($error_name);

        impl From<$error_name> for ErrorModel {
            fn from(err: $error_name) -> Self {
                ErrorModel::builder()
                    .r#type($err_type)
                    .code(StatusCode::$status.as_u16())
                    .message(err.to_string())
                    .stack(err.stack)
                    .build()
            }
        }

        impl From<$error_name> for IcebergErrorResponse {
            fn from(err: $error_name) -> Self {
                ErrorModel::from(err).into()
            }
        }
    };
}

// --------------------------- GENERAL ERROR ---------------------------
define_simple_namespace_err!(
    NamespaceNotFound,
    "Namespace {namespace} does not exist in warehouse '{warehouse_id}'",
    NOT_FOUND,
    "NoSuchNamespaceException"
);

define_simple_namespace_err!(
    NamespaceAlreadyExists,
    "Namespace {namespace} already exists in warehouse '{warehouse_id}'",
    CONFLICT,
    "AlreadyExistsException"
);

define_simple_namespace_err!(
    NamespaceParentNotFound,
    "Parent of namespace {namespace} does not exist in warehouse '{warehouse_id}'",
    NOT_FOUND,
    "NoSuchNamespaceException"
);

/// Nested namespaces as well as live or soft-deleted tables and views count as content.
#[derive(thiserror::Error, Debug, PartialEq)]
#[error(
    "Namespace {namespace} is not empty: it contains {child_namespaces} namespace(s) and {tabulars} table(s) or view(s)"
)]
pub struct NamespaceNotEmpty {
    pub namespace: NamespaceIdent,
    pub child_namespaces: usize,
    pub tabulars: usize,
    pub stack: Vec<String>,
}

impl NamespaceNotEmpty {
    #[must_use]
    pub fn new(namespace: NamespaceIdent, child_namespaces: usize, tabulars: usize) -> Self {
        Self {
            namespace,
            child_namespaces,
            tabulars,
            stack: Vec::new(),
        }
    }
}
impl_error_stack_methods!(NamespaceNotEmpty);

impl From<NamespaceNotEmpty> for ErrorModel {
    fn from(err: NamespaceNotEmpty) -> Self {
        ErrorModel::builder()
            .r#type("NamespaceNotEmptyException")
            .code(StatusCode::CONFLICT.as_u16())
            .message(err.to_string())
            .stack(err.stack)
            .build()
    }
}

// --------------------------- LIST ERROR ---------------------------
define_transparent_error! {
    pub enum ListNamespacesError,
    stack_message: "Error listing namespaces",
    variants: [
        CatalogBackendError,
        WarehouseIdNotFound,
        NamespaceNotFound,
    ]
}

// --------------------------- CREATE ERROR ---------------------------
define_transparent_error! {
    pub enum CreateNamespaceError,
    stack_message: "Error creating namespace",
    variants: [
        CatalogBackendError,
        WarehouseIdNotFound,
        NamespaceAlreadyExists,
        NamespaceParentNotFound,
    ]
}

// --------------------------- DROP ERROR ---------------------------
define_transparent_error! {
    pub enum DropNamespaceError,
    stack_message: "Error dropping namespace",
    variants: [
        CatalogBackendError,
        WarehouseIdNotFound,
        NamespaceNotFound,
        NamespaceNotEmpty,
    ]
}

// --------------------------- UPDATE PROPERTIES ERROR ---------------------------
define_transparent_error! {
    pub enum UpdateNamespacePropertiesError,
    stack_message: "Error updating namespace properties",
    variants: [
        CatalogBackendError,
        WarehouseIdNotFound,
        NamespaceNotFound,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_iceberg_exception() {
        let ns = NamespaceIdent::from_vec(vec!["a".to_string(), "b".to_string()]).unwrap();
        let err: DropNamespaceError =
            NamespaceNotFound::new(WarehouseId::new_random(), ns).into();
        let model = ErrorModel::from(err);
        assert_eq!(model.code, 404);
        assert_eq!(model.r#type, "NoSuchNamespaceException");
        assert!(model.message.contains("'a.b'"));
    }

    #[test]
    fn test_not_empty_is_conflict() {
        let err = NamespaceNotEmpty::new(NamespaceIdent::new("a").unwrap(), 1, 2);
        let model = ErrorModel::from(err);
        assert_eq!(model.code, 409);
        assert!(model.message.contains("1 namespace(s) and 2 table(s)"));
    }
}
