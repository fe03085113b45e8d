use chrono::{DateTime, Utc};
use http::StatusCode;
use icehouse_ext::{
    TableIdent,
    catalog::rest::{ErrorModel, IcebergErrorResponse},
};
use serde::{Deserialize, Serialize};

use super::{
    CatalogBackendError, DeletionInfo, NamespaceNotFound, WarehouseIdNotFound,
    define_transparent_error, impl_error_stack_methods, impl_from_with_detail,
};
use crate::{
    WarehouseId,
    service::{NamespaceId, TabularId},
};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
pub enum TabularType {
    Table,
    View,
}

impl From<TabularId> for TabularType {
    fn from(id: TabularId) -> Self {
        match id {
            TabularId::Table(_) => TabularType::Table,
            TabularId::View(_) => TabularType::View,
        }
    }
}

/// Fields shared by tables and views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabularInfo {
    pub tabular_id: TabularId,
    pub warehouse_id: WarehouseId,
    pub namespace_id: NamespaceId,
    pub tabular_ident: TableIdent,
    pub location: String,
    /// `None` for staged tables.
    pub metadata_location: Option<String>,
    pub deletion: Option<DeletionInfo>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TabularInfo {
    #[must_use]
    pub fn is_staged(&self) -> bool {
        self.metadata_location.is_none()
    }

    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deletion.is_some()
    }
}

impl AsRef<TabularInfo> for TabularInfo {
    fn as_ref(&self) -> &TabularInfo {
        self
    }
}

/// Which tabulars a listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct TabularListFlags {
    pub include_active: bool,
    pub include_staged: bool,
    pub include_deleted: bool,
}

impl TabularListFlags {
    #[must_use]
    pub fn active() -> Self {
        Self {
            include_active: true,
            include_staged: false,
            include_deleted: false,
        }
    }

    #[must_use]
    pub fn only_deleted() -> Self {
        Self {
            include_active: false,
            include_staged: false,
            include_deleted: true,
        }
    }

    #[must_use]
    pub fn matches(&self, info: &TabularInfo) -> bool {
        if info.is_deleted() {
            self.include_deleted
        } else if info.is_staged() {
            self.include_staged
        } else {
            self.include_active
        }
    }
}

/// How a table or view is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropMode {
    /// Keep the tabular restorable until `expires_at`.
    Soft {
        deleted_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        purge_requested: bool,
    },
    /// Remove the metadata now.
    Hard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedTabular {
    pub info: TabularInfo,
    /// The metadata is gone. Storage is left to the caller.
    pub purged: bool,
}

// --------------------------- GENERAL ERROR ---------------------------
#[derive(thiserror::Error, Debug, PartialEq)]
#[error("{kind} {tabular} does not exist in warehouse '{warehouse_id}'")]
pub struct TabularNotFound {
    pub warehouse_id: WarehouseId,
    pub kind: TabularType,
    pub tabular: String,
    pub stack: Vec<String>,
}

impl TabularNotFound {
    #[must_use]
    pub fn new(warehouse_id: WarehouseId, kind: TabularType, tabular: impl ToString) -> Self {
        Self {
            warehouse_id,
            kind,
            tabular: tabular.to_string(),
            stack: Vec::new(),
        }
    }

    #[must_use]
    pub fn for_id(warehouse_id: WarehouseId, tabular_id: TabularId) -> Self {
        Self::new(warehouse_id, tabular_id.into(), tabular_id.uuid())
    }
}
impl_error_stack_methods!(TabularNotFound);

impl From<TabularNotFound> for ErrorModel {
    fn from(err: TabularNotFound) -> Self {
        let r#type = match err.kind {
            TabularType::Table => "NoSuchTableException",
            TabularType::View => "NoSuchViewException",
        };
        ErrorModel::builder()
            .r#type(r#type)
            .code(StatusCode::NOT_FOUND.as_u16())
            .message(err.to_string())
            .stack(err.stack)
            .build()
    }
}

impl From<TabularNotFound> for IcebergErrorResponse {
    fn from(err: TabularNotFound) -> Self {
        ErrorModel::from(err).into()
    }
}

/// Tables and views share one name space within a namespace.
#[derive(thiserror::Error, Debug, PartialEq)]
#[error("A table or view named {tabular_ident} already exists")]
pub struct TabularAlreadyExists {
    pub tabular_ident: TableIdent,
    pub stack: Vec<String>,
}

impl TabularAlreadyExists {
    #[must_use]
    pub fn new(tabular_ident: TableIdent) -> Self {
        Self {
            tabular_ident,
            stack: Vec::new(),
        }
    }
}
impl_error_stack_methods!(TabularAlreadyExists);

impl From<TabularAlreadyExists> for ErrorModel {
    fn from(err: TabularAlreadyExists) -> Self {
        ErrorModel::builder()
            .r#type("AlreadyExistsException")
            .code(StatusCode::CONFLICT.as_u16())
            .message(err.to_string())
            .stack(err.stack)
            .build()
    }
}

/// The metadata pointer moved since the caller loaded it.
#[derive(thiserror::Error, Debug, PartialEq)]
#[error(
    "Concurrent update of {tabular_id}: expected metadata location {expected:?} but found {found:?}"
)]
pub struct CommitConflict {
    pub tabular_id: TabularId,
    pub expected: Option<String>,
    pub found: Option<String>,
    pub stack: Vec<String>,
}

impl CommitConflict {
    #[must_use]
    pub fn new(tabular_id: TabularId, expected: Option<String>, found: Option<String>) -> Self {
        Self {
            tabular_id,
            expected,
            found,
            stack: Vec::new(),
        }
    }
}
impl_error_stack_methods!(CommitConflict);

impl From<CommitConflict> for ErrorModel {
    fn from(err: CommitConflict) -> Self {
        ErrorModel::builder()
            .r#type("CommitFailedException")
            .code(StatusCode::CONFLICT.as_u16())
            .message(err.to_string())
            .stack(err.stack)
            .build()
    }
}

impl From<CommitConflict> for IcebergErrorResponse {
    fn from(err: CommitConflict) -> Self {
        ErrorModel::from(err).into()
    }
}

// --------------------------- RENAME ERROR ---------------------------
define_transparent_error! {
    pub enum RenameTabularError,
    stack_message: "Error renaming table or view",
    variants: [
        CatalogBackendError,
        WarehouseIdNotFound,
        NamespaceNotFound,
        TabularNotFound,
        TabularAlreadyExists,
    ]
}

// --------------------------- DROP ERROR ---------------------------
define_transparent_error! {
    pub enum DropTabularError,
    stack_message: "Error dropping table or view",
    variants: [
        CatalogBackendError,
        WarehouseIdNotFound,
        TabularNotFound,
    ]
}

// --------------------------- UNDROP ERROR ---------------------------
define_transparent_error! {
    pub enum UndropTabularError,
    stack_message: "Error restoring table or view",
    variants: [
        CatalogBackendError,
        WarehouseIdNotFound,
        TabularNotFound,
        TabularAlreadyExists,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{TableId, ViewId};

    #[test]
    fn test_not_found_type_follows_tabular() {
        let warehouse_id = WarehouseId::new_random();
        let model = ErrorModel::from(TabularNotFound::for_id(
            warehouse_id,
            ViewId::new_random().into(),
        ));
        assert_eq!(model.r#type, "NoSuchViewException");
        let model = ErrorModel::from(TabularNotFound::for_id(
            warehouse_id,
            TableId::new_random().into(),
        ));
        assert_eq!(model.r#type, "NoSuchTableException");
        assert!(model.message.starts_with("table "));
    }

    #[test]
    fn test_commit_conflict_is_commit_failed() {
        let model = ErrorModel::from(CommitConflict::new(
            TableId::new_random().into(),
            Some("a".to_string()),
            Some("b".to_string()),
        ));
        assert_eq!(model.code, 409);
        assert_eq!(model.r#type, "CommitFailedException");
    }
}
