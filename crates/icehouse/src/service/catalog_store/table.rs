use icehouse_ext::{
    TableIdent,
    catalog::rest::{ErrorModel, IcebergErrorResponse},
    spec::TableMetadata,
};

use super::{
    CatalogBackendError, CommitConflict, NamespaceNotFound, TabularAlreadyExists, TabularInfo,
    TabularNotFound, WarehouseIdNotFound, define_transparent_error, impl_from_with_detail,
};
use crate::{
    WarehouseId,
    service::{NamespaceId, TableId},
};

#[derive(Debug, Clone, PartialEq)]
pub struct TableInfo {
    pub table_id: TableId,
    pub tabular: TabularInfo,
    pub metadata: TableMetadata,
}

impl TableInfo {
    #[must_use]
    pub fn table_ident(&self) -> &TableIdent {
        &self.tabular.tabular_ident
    }

    #[must_use]
    pub fn metadata_location(&self) -> Option<&str> {
        self.tabular.metadata_location.as_deref()
    }
}

impl AsRef<TabularInfo> for TableInfo {
    fn as_ref(&self) -> &TabularInfo {
        &self.tabular
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableCreation {
    pub warehouse_id: WarehouseId,
    pub namespace_id: NamespaceId,
    pub table_id: TableId,
    pub table_ident: TableIdent,
    pub metadata: TableMetadata,
    /// `None` creates a staged table that only becomes visible with its first commit.
    pub metadata_location: Option<String>,
}

/// Swap of the metadata pointer of a table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableCommit {
    pub table_id: TableId,
    /// Pointer the new metadata was derived from. `None` for a staged table.
    pub previous_metadata_location: Option<String>,
    pub new_metadata: TableMetadata,
    pub new_metadata_location: String,
}

// --------------------------- CREATE ERROR ---------------------------
define_transparent_error! {
    pub enum CreateTableError,
    stack_message: "Error creating table",
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
    pub enum CommitTableError,
    stack_message: "Error committing table changes",
    variants: [
        CatalogBackendError,
        WarehouseIdNotFound,
        TabularNotFound,
        CommitConflict,
    ]
}
