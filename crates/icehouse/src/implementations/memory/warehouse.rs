use std::collections::HashSet;

use chrono::{DateTime, Utc};

use super::{
    CatalogData,
    data::{ProjectRecord, WarehouseRecord},
};
use crate::{
    ProjectId, SecretId, WarehouseId,
    service::{
        CreateProjectError, CreateWarehouseError, DeleteProfile, DeleteProjectError,
        DeleteWarehouseError, DeletionInfo, GetProjectResponse, ProjectIdAlreadyExists,
        ProjectIdNotFound, ProjectNotEmpty, RenameProjectError, RenameWarehouseError,
        ResolvedWarehouse, RestoreWarehouseError, UpdateWarehouseError, WarehouseAlreadyExists,
        WarehouseDeletion, WarehouseIdNotFound, WarehouseNotEmpty, WarehouseStatus,
        WarehouseVersion, storage::StorageProfile,
    },
};

// ---------------- Projects ----------------

pub(super) fn create_project(
    project_id: &ProjectId,
    project_name: String,
    data: &mut CatalogData,
) -> Result<GetProjectResponse, CreateProjectError> {
    if data.projects.contains_key(project_id) {
        return Err(ProjectIdAlreadyExists::new(project_id.clone()).into());
    }
    let record = ProjectRecord {
        name: project_name,
        created_at: Utc::now(),
        updated_at: None,
    };
    let response = record.to_response(project_id);
    data.projects.insert(project_id.clone(), record);
    Ok(response)
}

pub(super) fn get_project(project_id: &ProjectId, data: &CatalogData) -> Option<GetProjectResponse> {
    data.projects
        .get(project_id)
        .map(|p| p.to_response(project_id))
}

pub(super) fn list_projects(
    project_ids: Option<&HashSet<ProjectId>>,
    data: &CatalogData,
) -> Vec<GetProjectResponse> {
    data.projects
        .iter()
        .filter(|(id, _)| project_ids.is_none_or(|ids| ids.contains(*id)))
        .map(|(id, p)| p.to_response(id))
        .collect()
}

pub(super) fn rename_project(
    project_id: &ProjectId,
    new_name: &str,
    data: &mut CatalogData,
) -> Result<(), RenameProjectError> {
    let project = data
        .projects
        .get_mut(project_id)
        .ok_or_else(|| ProjectIdNotFound::new(project_id.clone()))?;
    new_name.clone_into(&mut project.name);
    project.updated_at = Some(Utc::now());
    Ok(())
}

pub(super) fn delete_project(
    project_id: &ProjectId,
    data: &mut CatalogData,
) -> Result<(), DeleteProjectError> {
    if !data.projects.contains_key(project_id) {
        return Err(ProjectIdNotFound::new(project_id.clone()).into());
    }
    let warehouse_count = data
        .warehouses
        .values()
        .filter(|w| &w.project_id == project_id)
        .count();
    if warehouse_count > 0 {
        return Err(ProjectNotEmpty::new(project_id.clone(), warehouse_count).into());
    }
    data.projects.remove(project_id);
    Ok(())
}

// ---------------- Warehouses ----------------

pub(super) fn create_warehouse(
    warehouse_name: String,
    project_id: &ProjectId,
    storage_profile: StorageProfile,
    delete_profile: DeleteProfile,
    storage_secret_id: Option<SecretId>,
    data: &mut CatalogData,
) -> Result<ResolvedWarehouse, CreateWarehouseError> {
    if !data.projects.contains_key(project_id) {
        return Err(ProjectIdNotFound::new(project_id.clone()).into());
    }
    if data
        .active_warehouse_named(project_id, &warehouse_name, None)
        .is_some()
    {
        return Err(WarehouseAlreadyExists::new(warehouse_name, project_id.clone()).into());
    }

    let warehouse_id = WarehouseId::new_random();
    let record = WarehouseRecord {
        name: warehouse_name,
        project_id: project_id.clone(),
        storage_profile,
        storage_secret_id,
        status: WarehouseStatus::Active,
        delete_profile,
        deletion: None,
        created_at: Utc::now(),
        updated_at: None,
        version: WarehouseVersion::new(0),
    };
    let resolved = record.resolve(warehouse_id);
    data.warehouses.insert(warehouse_id, record);
    Ok(resolved)
}

pub(super) fn get_warehouse(warehouse_id: WarehouseId, data: &CatalogData) -> Option<ResolvedWarehouse> {
    data.warehouses
        .get(&warehouse_id)
        .map(|w| w.resolve(warehouse_id))
}

pub(super) fn get_warehouse_by_name(
    warehouse_name: &str,
    project_id: &ProjectId,
    data: &CatalogData,
) -> Option<ResolvedWarehouse> {
    data.active_warehouse_named(project_id, warehouse_name, None)
        .and_then(|id| get_warehouse(id, data))
}

pub(super) fn list_warehouses(
    project_id: &ProjectId,
    status_filter: Option<&[WarehouseStatus]>,
    data: &CatalogData,
) -> Vec<ResolvedWarehouse> {
    let status_filter = status_filter.unwrap_or(&[WarehouseStatus::Active]);
    let mut warehouses: Vec<_> = data
        .warehouses
        .iter()
        .filter(|(_, w)| &w.project_id == project_id && status_filter.contains(&w.status))
        .map(|(id, w)| w.resolve(*id))
        .collect();
    warehouses.sort_by(|a, b| a.name.cmp(&b.name).then(a.warehouse_id.cmp(&b.warehouse_id)));
    warehouses
}

pub(super) fn rename_warehouse(
    warehouse_id: WarehouseId,
    new_name: &str,
    data: &mut CatalogData,
) -> Result<ResolvedWarehouse, RenameWarehouseError> {
    let project_id = data
        .active_warehouse(warehouse_id)
        .map(|w| w.project_id.clone())
        .ok_or_else(|| WarehouseIdNotFound::new(warehouse_id))?;
    if data
        .active_warehouse_named(&project_id, new_name, Some(warehouse_id))
        .is_some()
    {
        return Err(WarehouseAlreadyExists::new(new_name, project_id).into());
    }

    let warehouse = data
        .active_warehouse_mut(warehouse_id)
        .ok_or_else(|| WarehouseIdNotFound::new(warehouse_id))?;
    new_name.clone_into(&mut warehouse.name);
    warehouse.touch(Utc::now());
    Ok(warehouse.resolve(warehouse_id))
}

pub(super) fn set_warehouse_delete_profile(
    warehouse_id: WarehouseId,
    delete_profile: DeleteProfile,
    data: &mut CatalogData,
) -> Result<ResolvedWarehouse, UpdateWarehouseError> {
    let warehouse = data
        .active_warehouse_mut(warehouse_id)
        .ok_or_else(|| WarehouseIdNotFound::new(warehouse_id))?;
    warehouse.delete_profile = delete_profile;
    warehouse.touch(Utc::now());
    Ok(warehouse.resolve(warehouse_id))
}

pub(super) fn update_warehouse_storage(
    warehouse_id: WarehouseId,
    storage_profile: StorageProfile,
    storage_secret_id: Option<SecretId>,
    data: &mut CatalogData,
) -> Result<ResolvedWarehouse, UpdateWarehouseError> {
    let warehouse = data
        .active_warehouse_mut(warehouse_id)
        .ok_or_else(|| WarehouseIdNotFound::new(warehouse_id))?;
    warehouse.storage_profile = storage_profile;
    warehouse.storage_secret_id = storage_secret_id;
    warehouse.touch(Utc::now());
    Ok(warehouse.resolve(warehouse_id))
}

pub(super) fn delete_warehouse(
    warehouse_id: WarehouseId,
    force: bool,
    now: DateTime<Utc>,
    data: &mut CatalogData,
) -> Result<WarehouseDeletion, DeleteWarehouseError> {
    let delete_profile = data
        .active_warehouse(warehouse_id)
        .map(|w| w.delete_profile)
        .ok_or_else(|| WarehouseIdNotFound::new(warehouse_id))?;

    let has_namespaces = data
        .namespaces
        .values()
        .any(|ns| ns.warehouse_id == warehouse_id);
    let has_live_tabulars = data
        .tabulars
        .values()
        .any(|t| t.warehouse_id == warehouse_id && t.deletion.is_none());
    if !force && (has_namespaces || has_live_tabulars) {
        return Err(WarehouseNotEmpty::new(warehouse_id).into());
    }

    match delete_profile.expires_at(now) {
        Some(expires_at) => {
            let warehouse = data
                .active_warehouse_mut(warehouse_id)
                .ok_or_else(|| WarehouseIdNotFound::new(warehouse_id))?;
            warehouse.status = WarehouseStatus::Deleted;
            warehouse.deletion = Some(DeletionInfo {
                deleted_at: now,
                expires_at,
                purge_requested: true,
            });
            warehouse.touch(now);
            tracing::info!(%warehouse_id, %expires_at, "Soft-deleted warehouse");
            Ok(WarehouseDeletion::SoftDeleted(warehouse.resolve(warehouse_id)))
        }
        None => {
            let warehouse = data
                .remove_warehouse_tree(warehouse_id)
                .ok_or_else(|| WarehouseIdNotFound::new(warehouse_id))?;
            tracing::info!(%warehouse_id, "Purged warehouse");
            Ok(WarehouseDeletion::Purged(warehouse.resolve(warehouse_id)))
        }
    }
}

pub(super) fn restore_warehouse(
    warehouse_id: WarehouseId,
    now: DateTime<Utc>,
    data: &mut CatalogData,
) -> Result<ResolvedWarehouse, RestoreWarehouseError> {
    let (name, project_id) = data
        .warehouses
        .get(&warehouse_id)
        .filter(|w| {
            w.status == WarehouseStatus::Deleted
                && w.deletion.is_some_and(|d| !d.is_expired(now))
        })
        .map(|w| (w.name.clone(), w.project_id.clone()))
        .ok_or_else(|| WarehouseIdNotFound::new(warehouse_id))?;
    if data
        .active_warehouse_named(&project_id, &name, Some(warehouse_id))
        .is_some()
    {
        return Err(WarehouseAlreadyExists::new(name, project_id).into());
    }

    let warehouse = data
        .warehouses
        .get_mut(&warehouse_id)
        .ok_or_else(|| WarehouseIdNotFound::new(warehouse_id))?;
    warehouse.status = WarehouseStatus::Active;
    warehouse.deletion = None;
    warehouse.touch(now);
    tracing::info!(%warehouse_id, "Restored warehouse");
    Ok(warehouse.resolve(warehouse_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{
        NamespaceId,
        storage::{MemoryProfile, StorageProfile},
    };

    fn soft(seconds: u64) -> DeleteProfile {
        DeleteProfile::Soft {
            expiration_seconds: seconds,
        }
    }

    fn setup(delete_profile: DeleteProfile) -> (CatalogData, ProjectId, ResolvedWarehouse) {
        let mut data = CatalogData::new();
        let project_id = ProjectId::new_random();
        create_project(&project_id, "project".to_string(), &mut data).unwrap();
        let warehouse = create_warehouse(
            "wh".to_string(),
            &project_id,
            StorageProfile::Memory(MemoryProfile::default()),
            delete_profile,
            None,
            &mut data,
        )
        .unwrap();
        (data, project_id, warehouse)
    }

    fn add_namespace(data: &mut CatalogData, warehouse_id: WarehouseId) {
        super::super::namespace::create_namespace(
            warehouse_id,
            NamespaceId::new_random(),
            icehouse_ext::NamespaceIdent::new("ns").unwrap(),
            std::collections::HashMap::new(),
            data,
        )
        .unwrap();
    }

    #[test]
    fn test_names_unique_per_project() {
        let (mut data, project_id, _) = setup(DeleteProfile::Hard);
        let err = create_warehouse(
            "wh".to_string(),
            &project_id,
            StorageProfile::Memory(MemoryProfile::default()),
            DeleteProfile::Hard,
            None,
            &mut data,
        )
        .unwrap_err();
        assert!(matches!(err, CreateWarehouseError::WarehouseAlreadyExists(_)));

        let other = ProjectId::new_random();
        create_project(&other, "other".to_string(), &mut data).unwrap();
        create_warehouse(
            "wh".to_string(),
            &other,
            StorageProfile::Memory(MemoryProfile::default()),
            DeleteProfile::Hard,
            None,
            &mut data,
        )
        .unwrap();
    }

    #[test]
    fn test_unknown_project() {
        let mut data = CatalogData::new();
        let err = create_warehouse(
            "wh".to_string(),
            &ProjectId::new_random(),
            StorageProfile::Memory(MemoryProfile::default()),
            DeleteProfile::Hard,
            None,
            &mut data,
        )
        .unwrap_err();
        assert!(matches!(err, CreateWarehouseError::ProjectIdNotFound(_)));
    }

    #[test]
    fn test_project_with_deleted_warehouse_is_not_empty() {
        let (mut data, project_id, warehouse) = setup(soft(60));
        delete_warehouse(warehouse.warehouse_id, false, Utc::now(), &mut data).unwrap();
        let err = delete_project(&project_id, &mut data).unwrap_err();
        assert!(matches!(err, DeleteProjectError::ProjectNotEmpty(_)));
    }

    #[test]
    fn test_delete_requires_force_when_not_empty() {
        let (mut data, _, warehouse) = setup(DeleteProfile::Hard);
        add_namespace(&mut data, warehouse.warehouse_id);
        let err = delete_warehouse(warehouse.warehouse_id, false, Utc::now(), &mut data)
            .unwrap_err();
        assert!(matches!(err, DeleteWarehouseError::WarehouseNotEmpty(_)));

        let deletion =
            delete_warehouse(warehouse.warehouse_id, true, Utc::now(), &mut data).unwrap();
        assert!(matches!(deletion, WarehouseDeletion::Purged(_)));
        assert!(data.namespaces.is_empty());
        assert!(get_warehouse(warehouse.warehouse_id, &data).is_none());
    }

    #[test]
    fn test_soft_delete_and_restore() {
        let (mut data, project_id, warehouse) = setup(soft(60));
        let now = Utc::now();
        let deletion = delete_warehouse(warehouse.warehouse_id, false, now, &mut data).unwrap();
        let WarehouseDeletion::SoftDeleted(deleted) = deletion else {
            panic!("expected soft deletion");
        };
        assert_eq!(deleted.status, WarehouseStatus::Deleted);
        assert_eq!(
            deleted.deletion.unwrap().expires_at,
            now + chrono::Duration::seconds(60)
        );
        assert!(get_warehouse_by_name("wh", &project_id, &data).is_none());
        assert_eq!(
            list_warehouses(&project_id, Some(&[WarehouseStatus::Deleted]), &data).len(),
            1
        );
        assert!(list_warehouses(&project_id, None, &data).is_empty());

        let restored = restore_warehouse(warehouse.warehouse_id, now, &mut data).unwrap();
        assert!(restored.is_active());
        assert!(restored.deletion.is_none());
    }

    #[test]
    fn test_restore_after_expiry_is_not_found() {
        let (mut data, _, warehouse) = setup(soft(1));
        let now = Utc::now();
        delete_warehouse(warehouse.warehouse_id, false, now, &mut data).unwrap();
        let err = restore_warehouse(
            warehouse.warehouse_id,
            now + chrono::Duration::seconds(1),
            &mut data,
        )
        .unwrap_err();
        assert!(matches!(err, RestoreWarehouseError::WarehouseIdNotFound(_)));
    }

    #[test]
    fn test_restore_conflicts_with_retaken_name() {
        let (mut data, project_id, warehouse) = setup(soft(60));
        let now = Utc::now();
        delete_warehouse(warehouse.warehouse_id, false, now, &mut data).unwrap();
        create_warehouse(
            "wh".to_string(),
            &project_id,
            StorageProfile::Memory(MemoryProfile::default()),
            DeleteProfile::Hard,
            None,
            &mut data,
        )
        .unwrap();
        let err = restore_warehouse(warehouse.warehouse_id, now, &mut data).unwrap_err();
        assert!(matches!(err, RestoreWarehouseError::WarehouseAlreadyExists(_)));
    }

    #[test]
    fn test_rename_bumps_version() {
        let (mut data, project_id, warehouse) = setup(DeleteProfile::Hard);
        let renamed = rename_warehouse(warehouse.warehouse_id, "new", &mut data).unwrap();
        assert_eq!(renamed.name, "new");
        assert_eq!(renamed.version, warehouse.version.next());
        assert!(get_warehouse_by_name("new", &project_id, &data).is_some());
        assert!(get_warehouse_by_name("wh", &project_id, &data).is_none());
    }
}
