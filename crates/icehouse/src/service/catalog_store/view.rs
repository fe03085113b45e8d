use icehouse_ext::{
    TableIdent,
    catalog::rest::{ErrorModel, IcebergErrorResponse},
    spec::ViewMetadata,
};

use super::{
    CatalogBackendError, CommitConflict, NamespaceNotFound, TabularAlreadyExists, TabularInfo,
    TabularNotFound, WarehouseIdNotFound, define_transparent_error, impl_from_with_detail,
};
use crate::{
    WarehouseId,
    service::{NamespaceId, ViewId},
};

#[derive(Debug, Clone, PartialEq)]
pub struct ViewInfo {
    pub view_id: ViewId,
    pub tabular: TabularInfo,
    pub metadata: ViewMetadata,
}

impl ViewInfo {
    #[must_use]
    pub fn view_ident(&self) -> &TableIdent {
        &self.tabular.tabular_ident
    }

    /// Views are never staged, so the pointer is always set.
    #[must_use]
    pub fn metadata_location(&self) -> &str {
        self.tabular.metadata_location.as_deref().unwrap_or_default()
    }
}

impl AsRef<TabularInfo> for ViewInfo {
    fn as_ref(&self) -> &TabularInfo {
        &self.tabular
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewCreation {
    pub warehouse_id: WarehouseId,
    pub namespace_id: NamespaceId,
    pub view_id: ViewId,
    pub view_ident: TableIdent,
    pub metadata: ViewMetadata,
    pub metadata_location: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewCommit {
    pub view_id: ViewId,
    pub previous_metadata_location: String,
    pub new_metadata: ViewMetadata,
    pub new_metadata_location: String,
}

// --------------------------- CREATE ERROR ---------------------------
define_transparent_error! {
    pub enum CreateViewError,
    stack_message: "Error creating view",
    variants: [
        CatalogBackendError,
        WarehouseIdNotFound,
        NamespaceNotFound,
        TabularAlreadyExists,
        TabularNotFound,
    ]
}

// --------------------------- COMMIT ERROR ---------------------------
define_transparent_error! {
    pub enum CommitViewError,
    stack_message: "Error committing view changes",
    variants: [
        CatalogBackendError,
        WarehouseIdNotFound,
        TabularNotFound,
        CommitConflict,
    ]
}
