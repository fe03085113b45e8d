use icehouse::service::authz::{
    CatalogNamespaceAction, CatalogProjectAction, CatalogServerAction, CatalogTableAction,
    CatalogViewAction, CatalogWarehouseAction,
};
use serde::{Deserialize, Serialize};

/// Relation linking an object to the object directly above it.
pub(crate) const PARENT_RELATION: &str = "parent";

/// Roles that can be granted on any object. Each role implies all roles
/// declared before it.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    /// See that the object exists and read its metadata.
    Describe,
    /// Read data.
    Select,
    /// Create, change and drop children; write data.
    Modify,
    /// Everything, including managing grants.
    Ownership,
}

impl Role {
    #[must_use]
    pub fn implies(self, other: Role) -> bool {
        self >= other
    }
}

/// Minimum role an action requires on the object it targets.
pub(crate) trait RequiredRole {
    fn required_role(&self) -> Role;
}

impl RequiredRole for CatalogServerAction {
    fn required_role(&self) -> Role {
        match self {
            CatalogServerAction::CanCreateProject => Role::Modify,
            CatalogServerAction::CanListAllProjects => Role::Ownership,
        }
    }
}

impl RequiredRole for CatalogProjectAction {
    fn required_role(&self) -> Role {
        match self {
            CatalogProjectAction::CanGetMetadata
            | CatalogProjectAction::CanListWarehouses
            | CatalogProjectAction::CanIncludeInList => Role::Describe,
            CatalogProjectAction::CanCreateWarehouse => Role::Modify,
            CatalogProjectAction::CanDelete | CatalogProjectAction::CanRename => Role::Ownership,
        }
    }
}

impl RequiredRole for CatalogWarehouseAction {
    fn required_role(&self) -> Role {
        match self {
            CatalogWarehouseAction::CanGetMetadata
            | CatalogWarehouseAction::CanGetConfig
            | CatalogWarehouseAction::CanListNamespaces
            | CatalogWarehouseAction::CanUse
            | CatalogWarehouseAction::CanIncludeInList => Role::Describe,
            CatalogWarehouseAction::CanCreateNamespace
            | CatalogWarehouseAction::CanListDeletedTabulars => Role::Modify,
            CatalogWarehouseAction::CanDelete
            | CatalogWarehouseAction::CanUpdateStorage
            | CatalogWarehouseAction::CanUpdateStorageCredential
            | CatalogWarehouseAction::CanRename
            | CatalogWarehouseAction::CanModifySoftDeletion
            | CatalogWarehouseAction::CanRestore => Role::Ownership,
        }
    }
}

impl RequiredRole for CatalogNamespaceAction {
    fn required_role(&self) -> Role {
        match self {
            CatalogNamespaceAction::CanGetMetadata
            | CatalogNamespaceAction::CanListTables
            | CatalogNamespaceAction::CanListViews
            | CatalogNamespaceAction::CanListNamespaces
            | CatalogNamespaceAction::CanIncludeInList => Role::Describe,
            CatalogNamespaceAction::CanCreateTable
            | CatalogNamespaceAction::CanCreateView
            | CatalogNamespaceAction::CanCreateNamespace
            | CatalogNamespaceAction::CanDelete
            | CatalogNamespaceAction::CanUpdateProperties => Role::Modify,
        }
    }
}

impl RequiredRole for CatalogTableAction {
    fn required_role(&self) -> Role {
        match self {
            CatalogTableAction::CanGetMetadata | CatalogTableAction::CanIncludeInList => {
                Role::Describe
            }
            CatalogTableAction::CanReadData => Role::Select,
            CatalogTableAction::CanWriteData
            | CatalogTableAction::CanCommit
            | CatalogTableAction::CanDrop
            | CatalogTableAction::CanRename
            | CatalogTableAction::CanUndrop => Role::Modify,
        }
    }
}

impl RequiredRole for CatalogViewAction {
    fn required_role(&self) -> Role {
        match self {
            CatalogViewAction::CanGetMetadata | CatalogViewAction::CanIncludeInList => {
                Role::Describe
            }
            CatalogViewAction::CanCommit
            | CatalogViewAction::CanDrop
            | CatalogViewAction::CanRename
            | CatalogViewAction::CanUndrop => Role::Modify,
        }
    }
}
