use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use icehouse_ext::{
    NamespaceIdent, TableIdent,
    spec::{TableMetadata, ViewMetadata},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    ProjectId, SecretId, WarehouseId,
    service::{
        DeleteProfile, DeletionInfo, GetProjectResponse, NamespaceId, NamespaceInfo,
        NamespaceVersion, ResolvedWarehouse, ServerId, TableId, TableInfo, TabularId, TabularInfo,
        TabularType, ViewId, ViewInfo, WarehouseStatus, WarehouseVersion,
        storage::StorageProfile,
    },
};

/// Everything the memory store knows. Cloned for every write transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CatalogData {
    pub(super) server_id: ServerId,
    #[serde(default)]
    pub(super) terms_accepted: bool,
    #[serde(default)]
    pub(super) projects: BTreeMap<ProjectId, ProjectRecord>,
    #[serde(default)]
    pub(super) warehouses: BTreeMap<WarehouseId, WarehouseRecord>,
    #[serde(default)]
    pub(super) namespaces: BTreeMap<NamespaceId, NamespaceRecord>,
    #[serde(default)]
    pub(super) tabulars: BTreeMap<Uuid, TabularRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(super) struct ProjectRecord {
    pub(super) name: String,
    pub(super) created_at: DateTime<Utc>,
    pub(super) updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(super) struct WarehouseRecord {
    pub(super) name: String,
    pub(super) project_id: ProjectId,
    pub(super) storage_profile: StorageProfile,
    pub(super) storage_secret_id: Option<SecretId>,
    pub(super) status: WarehouseStatus,
    pub(super) delete_profile: DeleteProfile,
    pub(super) deletion: Option<DeletionInfo>,
    pub(super) created_at: DateTime<Utc>,
    pub(super) updated_at: Option<DateTime<Utc>>,
    pub(super) version: WarehouseVersion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(super) struct NamespaceRecord {
    pub(super) warehouse_id: WarehouseId,
    pub(super) ident: NamespaceIdent,
    pub(super) properties: HashMap<String, String>,
    pub(super) created_at: DateTime<Utc>,
    pub(super) updated_at: Option<DateTime<Utc>>,
    pub(super) version: NamespaceVersion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "metadata", rename_all = "kebab-case")]
pub(super) enum TabularMetadata {
    Table(TableMetadata),
    View(ViewMetadata),
}

/// A table or view. The identifier is stored with the record; namespaces cannot be
/// renamed, so it stays in sync with `namespace_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(super) struct TabularRecord {
    pub(super) warehouse_id: WarehouseId,
    pub(super) namespace_id: NamespaceId,
    pub(super) ident: TableIdent,
    pub(super) location: String,
    pub(super) metadata_location: Option<String>,
    pub(super) deletion: Option<DeletionInfo>,
    pub(super) created_at: DateTime<Utc>,
    pub(super) updated_at: Option<DateTime<Utc>>,
    pub(super) metadata: TabularMetadata,
}

impl CatalogData {
    pub(crate) fn new() -> Self {
        Self {
            server_id: ServerId::new_random(),
            terms_accepted: false,
            projects: BTreeMap::new(),
            warehouses: BTreeMap::new(),
            namespaces: BTreeMap::new(),
            tabulars: BTreeMap::new(),
        }
    }

    pub(crate) fn project_count(&self) -> usize {
        self.projects.len()
    }

    pub(crate) fn warehouse_count(&self) -> usize {
        self.warehouses.len()
    }

    pub(super) fn active_warehouse(&self, warehouse_id: WarehouseId) -> Option<&WarehouseRecord> {
        self.warehouses
            .get(&warehouse_id)
            .filter(|w| w.status == WarehouseStatus::Active)
    }

    pub(super) fn active_warehouse_mut(
        &mut self,
        warehouse_id: WarehouseId,
    ) -> Option<&mut WarehouseRecord> {
        self.warehouses
            .get_mut(&warehouse_id)
            .filter(|w| w.status == WarehouseStatus::Active)
    }

    /// Active warehouse of `project_id` named `name`, other than `except`.
    pub(super) fn active_warehouse_named(
        &self,
        project_id: &ProjectId,
        name: &str,
        except: Option<WarehouseId>,
    ) -> Option<WarehouseId> {
        self.warehouses
            .iter()
            .find(|(id, w)| {
                Some(**id) != except
                    && w.status == WarehouseStatus::Active
                    && &w.project_id == project_id
                    && w.name == name
            })
            .map(|(id, _)| *id)
    }

    pub(super) fn namespace_id(
        &self,
        warehouse_id: WarehouseId,
        ident: &NamespaceIdent,
    ) -> Option<NamespaceId> {
        self.namespaces
            .iter()
            .find(|(_, ns)| ns.warehouse_id == warehouse_id && &ns.ident == ident)
            .map(|(id, _)| *id)
    }

    pub(super) fn namespace_info(&self, namespace_id: NamespaceId) -> Option<NamespaceInfo> {
        self.namespaces
            .get(&namespace_id)
            .map(|ns| ns.to_info(namespace_id))
    }

    /// The table or view currently holding `ident`. Soft-deleted ones do not hold a name.
    pub(super) fn live_tabular_named(
        &self,
        warehouse_id: WarehouseId,
        ident: &TableIdent,
    ) -> Option<(Uuid, &TabularRecord)> {
        self.tabulars
            .iter()
            .find(|(_, t)| t.warehouse_id == warehouse_id && t.deletion.is_none() && &t.ident == ident)
            .map(|(id, t)| (*id, t))
    }

    /// Tabular `tabular_id` of `warehouse_id` with a matching kind.
    pub(super) fn tabular(
        &self,
        warehouse_id: WarehouseId,
        tabular_id: TabularId,
    ) -> Option<&TabularRecord> {
        self.tabulars
            .get(&tabular_id.uuid())
            .filter(|t| t.warehouse_id == warehouse_id && t.tabular_type() == TabularType::from(tabular_id))
    }

    pub(super) fn tabular_mut(
        &mut self,
        warehouse_id: WarehouseId,
        tabular_id: TabularId,
    ) -> Option<&mut TabularRecord> {
        self.tabulars
            .get_mut(&tabular_id.uuid())
            .filter(|t| t.warehouse_id == warehouse_id && t.tabular_type() == TabularType::from(tabular_id))
    }

    /// Remove a warehouse together with its namespaces and tabulars.
    pub(super) fn remove_warehouse_tree(&mut self, warehouse_id: WarehouseId) -> Option<WarehouseRecord> {
        self.namespaces.retain(|_, ns| ns.warehouse_id != warehouse_id);
        self.tabulars.retain(|_, t| t.warehouse_id != warehouse_id);
        self.warehouses.remove(&warehouse_id)
    }
}

impl ProjectRecord {
    pub(super) fn to_response(&self, project_id: &ProjectId) -> GetProjectResponse {
        GetProjectResponse {
            project_id: project_id.clone(),
            name: self.name.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl WarehouseRecord {
    pub(super) fn resolve(&self, warehouse_id: WarehouseId) -> ResolvedWarehouse {
        ResolvedWarehouse {
            warehouse_id,
            name: self.name.clone(),
            project_id: self.project_id.clone(),
            storage_profile: self.storage_profile.clone(),
            storage_secret_id: self.storage_secret_id,
            status: self.status,
            delete_profile: self.delete_profile,
            deletion: self.deletion,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        }
    }

    pub(super) fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = Some(now);
        self.version = self.version.next();
    }
}

impl NamespaceRecord {
    pub(super) fn to_info(&self, namespace_id: NamespaceId) -> NamespaceInfo {
        NamespaceInfo {
            namespace_id,
            warehouse_id: self.warehouse_id,
            namespace_ident: self.ident.clone(),
            properties: self.properties.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        }
    }
}

impl TabularRecord {
    pub(super) fn tabular_type(&self) -> TabularType {
        match self.metadata {
            TabularMetadata::Table(_) => TabularType::Table,
            TabularMetadata::View(_) => TabularType::View,
        }
    }

    pub(super) fn tabular_id(&self, id: Uuid) -> TabularId {
        match self.metadata {
            TabularMetadata::Table(_) => TableId::new(id).into(),
            TabularMetadata::View(_) => ViewId::new(id).into(),
        }
    }

    pub(super) fn to_info(&self, id: Uuid) -> TabularInfo {
        TabularInfo {
            tabular_id: self.tabular_id(id),
            warehouse_id: self.warehouse_id,
            namespace_id: self.namespace_id,
            tabular_ident: self.ident.clone(),
            location: self.location.clone(),
            metadata_location: self.metadata_location.clone(),
            deletion: self.deletion,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub(super) fn to_table_info(&self, id: Uuid) -> Option<TableInfo> {
        match &self.metadata {
            TabularMetadata::Table(metadata) => Some(TableInfo {
                table_id: TableId::new(id),
                tabular: self.to_info(id),
                metadata: metadata.clone(),
            }),
            TabularMetadata::View(_) => None,
        }
    }

    pub(super) fn to_view_info(&self, id: Uuid) -> Option<ViewInfo> {
        match &self.metadata {
            TabularMetadata::View(metadata) => Some(ViewInfo {
                view_id: ViewId::new(id),
                tabular: self.to_info(id),
                metadata: metadata.clone(),
            }),
            TabularMetadata::Table(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trips_through_json() {
        let mut data = CatalogData::new();
        data.projects.insert(
            ProjectId::new_random(),
            ProjectRecord {
                name: "p".to_string(),
                created_at: Utc::now(),
                updated_at: None,
            },
        );
        let json = serde_json::to_string(&data).unwrap();
        let parsed: CatalogData = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, data);
    }
}
