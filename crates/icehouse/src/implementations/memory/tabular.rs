use chrono::{DateTime, Utc};
use icehouse_ext::TableIdent;
use uuid::Uuid;

use super::{
    CatalogData,
    data::{TabularMetadata, TabularRecord},
};
use crate::{
    WarehouseId,
    service::{
        CommitConflict, CommitTableError, CommitViewError, CreateTableError, CreateViewError,
        DeletionInfo, DropMode, DropTabularError, DroppedTabular, NamespaceId, NamespaceNotFound,
        RenameTabularError, TableCommit, TableCreation, TableId, TableInfo, TabularAlreadyExists,
        TabularId, TabularInfo, TabularListFlags, TabularNotFound, TabularType,
        UndropTabularError, ViewCommit, ViewCreation, ViewId, ViewInfo, WarehouseIdNotFound,
    },
};

pub(super) fn list_tabulars(
    warehouse_id: WarehouseId,
    namespace_id: Option<NamespaceId>,
    typ: Option<TabularType>,
    flags: TabularListFlags,
    data: &CatalogData,
) -> Vec<TabularInfo> {
    if data.active_warehouse(warehouse_id).is_none() {
        return Vec::new();
    }
    let mut tabulars: Vec<_> = data
        .tabulars
        .iter()
        .filter(|(_, t)| {
            t.warehouse_id == warehouse_id
                && namespace_id.is_none_or(|ns| ns == t.namespace_id)
                && typ.is_none_or(|typ| typ == t.tabular_type())
        })
        .map(|(id, t)| t.to_info(*id))
        .filter(|info| flags.matches(info))
        .collect();
    tabulars.sort_by(|a, b| {
        a.tabular_ident
            .cmp(&b.tabular_ident)
            .then(a.tabular_id.cmp(&b.tabular_id))
    });
    tabulars
}

pub(super) fn get_tabular_by_id(
    warehouse_id: WarehouseId,
    tabular_id: TabularId,
    flags: TabularListFlags,
    data: &CatalogData,
) -> Option<TabularInfo> {
    data.active_warehouse(warehouse_id)?;
    data.tabular(warehouse_id, tabular_id)
        .map(|t| t.to_info(tabular_id.uuid()))
        .filter(|info| flags.matches(info))
}

pub(super) fn rename_tabular(
    warehouse_id: WarehouseId,
    tabular_id: TabularId,
    destination: &TableIdent,
    data: &mut CatalogData,
) -> Result<TabularInfo, RenameTabularError> {
    if data.active_warehouse(warehouse_id).is_none() {
        return Err(WarehouseIdNotFound::new(warehouse_id).into());
    }
    let source = data
        .tabular(warehouse_id, tabular_id)
        .filter(|t| t.deletion.is_none() && t.metadata_location.is_some())
        .ok_or_else(|| TabularNotFound::for_id(warehouse_id, tabular_id))?;
    if &source.ident == destination {
        return Ok(source.to_info(tabular_id.uuid()));
    }

    let namespace_id = data
        .namespace_id(warehouse_id, &destination.namespace)
        .ok_or_else(|| NamespaceNotFound::new(warehouse_id, destination.namespace.clone()))?;
    if data.live_tabular_named(warehouse_id, destination).is_some() {
        return Err(TabularAlreadyExists::new(destination.clone()).into());
    }

    let record = data
        .tabular_mut(warehouse_id, tabular_id)
        .ok_or_else(|| TabularNotFound::for_id(warehouse_id, tabular_id))?;
    record.namespace_id = namespace_id;
    record.ident = destination.clone();
    record.updated_at = Some(Utc::now());
    Ok(record.to_info(tabular_id.uuid()))
}

pub(super) fn drop_tabular(
    warehouse_id: WarehouseId,
    tabular_id: TabularId,
    mode: DropMode,
    data: &mut CatalogData,
) -> Result<DroppedTabular, DropTabularError> {
    if data.active_warehouse(warehouse_id).is_none() {
        return Err(WarehouseIdNotFound::new(warehouse_id).into());
    }
    let record = data
        .tabular_mut(warehouse_id, tabular_id)
        .filter(|t| t.deletion.is_none())
        .ok_or_else(|| TabularNotFound::for_id(warehouse_id, tabular_id))?;

    match mode {
        DropMode::Soft {
            deleted_at,
            expires_at,
            purge_requested,
        } if record.metadata_location.is_some() => {
            record.deletion = Some(DeletionInfo {
                deleted_at,
                expires_at,
                purge_requested,
            });
            record.updated_at = Some(deleted_at);
            Ok(DroppedTabular {
                info: record.to_info(tabular_id.uuid()),
                purged: false,
            })
        }
        _ => {
            let record = data
                .tabulars
                .remove(&tabular_id.uuid())
                .ok_or_else(|| TabularNotFound::for_id(warehouse_id, tabular_id))?;
            Ok(DroppedTabular {
                info: record.to_info(tabular_id.uuid()),
                purged: true,
            })
        }
    }
}

pub(super) fn undrop_tabulars(
    warehouse_id: WarehouseId,
    tabular_ids: &[TabularId],
    now: DateTime<Utc>,
    data: &mut CatalogData,
) -> Result<Vec<TabularInfo>, UndropTabularError> {
    if data.active_warehouse(warehouse_id).is_none() {
        return Err(WarehouseIdNotFound::new(warehouse_id).into());
    }

    let mut restored = Vec::with_capacity(tabular_ids.len());
    for tabular_id in tabular_ids {
        let ident = data
            .tabular(warehouse_id, *tabular_id)
            .filter(|t| t.deletion.is_some_and(|d| !d.is_expired(now)))
            .map(|t| t.ident.clone())
            .ok_or_else(|| TabularNotFound::for_id(warehouse_id, *tabular_id))?;
        if data.live_tabular_named(warehouse_id, &ident).is_some() {
            return Err(TabularAlreadyExists::new(ident).into());
        }
        let record = data
            .tabular_mut(warehouse_id, *tabular_id)
            .ok_or_else(|| TabularNotFound::for_id(warehouse_id, *tabular_id))?;
        record.deletion = None;
        record.updated_at = Some(now);
        restored.push(record.to_info(tabular_id.uuid()));
    }
    Ok(restored)
}

// ---------------- Tables ----------------

pub(super) fn create_table(
    creation: TableCreation,
    data: &mut CatalogData,
) -> Result<TableInfo, CreateTableError> {
    let TableCreation {
        warehouse_id,
        namespace_id,
        table_id,
        table_ident,
        metadata,
        metadata_location,
    } = creation;

    if data.active_warehouse(warehouse_id).is_none() {
        return Err(WarehouseIdNotFound::new(warehouse_id).into());
    }
    if !data
        .namespaces
        .get(&namespace_id)
        .is_some_and(|ns| ns.warehouse_id == warehouse_id)
    {
        return Err(NamespaceNotFound::new(warehouse_id, namespace_id).into());
    }
    if let Some((existing, record)) = data.live_tabular_named(warehouse_id, &table_ident) {
        let staged_table =
            record.tabular_type() == TabularType::Table && record.metadata_location.is_none();
        if !staged_table {
            return Err(TabularAlreadyExists::new(table_ident).into());
        }
        data.tabulars.remove(&existing);
    }
    if data.tabulars.contains_key(&*table_id) {
        return Err(TabularAlreadyExists::new(table_ident).into());
    }

    let record = TabularRecord {
        warehouse_id,
        namespace_id,
        ident: table_ident,
        location: metadata.location.clone(),
        metadata_location,
        deletion: None,
        created_at: Utc::now(),
        updated_at: None,
        metadata: TabularMetadata::Table(metadata),
    };
    let info = record.to_table_info(*table_id);
    data.tabulars.insert(*table_id, record);
    info.ok_or_else(|| TabularNotFound::for_id(warehouse_id, table_id.into()).into())
}

pub(super) fn get_table(
    warehouse_id: WarehouseId,
    table: &TableIdent,
    include_staged: bool,
    data: &CatalogData,
) -> Option<TableInfo> {
    data.active_warehouse(warehouse_id)?;
    let (id, record) = data.live_tabular_named(warehouse_id, table)?;
    if record.metadata_location.is_none() && !include_staged {
        return None;
    }
    record.to_table_info(id)
}

pub(super) fn get_table_by_id(
    warehouse_id: WarehouseId,
    table_id: TableId,
    flags: TabularListFlags,
    data: &CatalogData,
) -> Option<TableInfo> {
    data.active_warehouse(warehouse_id)?;
    data.tabular(warehouse_id, table_id.into())
        .and_then(|t| t.to_table_info(*table_id))
        .filter(|info| flags.matches(&info.tabular))
}

/// All commits are checked before any is applied.
pub(super) fn commit_tables(
    warehouse_id: WarehouseId,
    commits: Vec<TableCommit>,
    data: &mut CatalogData,
) -> Result<Vec<TableInfo>, CommitTableError> {
    if data.active_warehouse(warehouse_id).is_none() {
        return Err(WarehouseIdNotFound::new(warehouse_id).into());
    }
    for commit in &commits {
        let tabular_id = TabularId::from(commit.table_id);
        let record = data
            .tabular(warehouse_id, tabular_id)
            .filter(|t| t.deletion.is_none())
            .ok_or_else(|| TabularNotFound::for_id(warehouse_id, tabular_id))?;
        if record.metadata_location != commit.previous_metadata_location {
            return Err(CommitConflict::new(
                tabular_id,
                commit.previous_metadata_location.clone(),
                record.metadata_location.clone(),
            )
            .into());
        }
    }

    let now = Utc::now();
    let mut committed = Vec::with_capacity(commits.len());
    for commit in commits {
        let tabular_id = TabularId::from(commit.table_id);
        let record = data
            .tabular_mut(warehouse_id, tabular_id)
            .ok_or_else(|| TabularNotFound::for_id(warehouse_id, tabular_id))?;
        record.location.clone_from(&commit.new_metadata.location);
        record.metadata_location = Some(commit.new_metadata_location);
        record.metadata = TabularMetadata::Table(commit.new_metadata);
        record.updated_at = Some(now);
        if let Some(info) = record.to_table_info(*commit.table_id) {
            committed.push(info);
        }
    }
    Ok(committed)
}

// ---------------- Views ----------------

pub(super) fn create_view(
    creation: ViewCreation,
    data: &mut CatalogData,
) -> Result<ViewInfo, CreateViewError> {
    let ViewCreation {
        warehouse_id,
        namespace_id,
        view_id,
        view_ident,
        metadata,
        metadata_location,
    } = creation;

    if data.active_warehouse(warehouse_id).is_none() {
        return Err(WarehouseIdNotFound::new(warehouse_id).into());
    }
    if !data
        .namespaces
        .get(&namespace_id)
        .is_some_and(|ns| ns.warehouse_id == warehouse_id)
    {
        return Err(NamespaceNotFound::new(warehouse_id, namespace_id).into());
    }
    if data.live_tabular_named(warehouse_id, &view_ident).is_some()
        || data.tabulars.contains_key(&*view_id)
    {
        return Err(TabularAlreadyExists::new(view_ident).into());
    }

    let record = TabularRecord {
        warehouse_id,
        namespace_id,
        ident: view_ident,
        location: metadata.location.clone(),
        metadata_location: Some(metadata_location),
        deletion: None,
        created_at: Utc::now(),
        updated_at: None,
        metadata: TabularMetadata::View(metadata),
    };
    let info = record.to_view_info(*view_id);
    data.tabulars.insert(*view_id, record);
    info.ok_or_else(|| TabularNotFound::for_id(warehouse_id, view_id.into()).into())
}

pub(super) fn get_view(
    warehouse_id: WarehouseId,
    view: &TableIdent,
    data: &CatalogData,
) -> Option<ViewInfo> {
    data.active_warehouse(warehouse_id)?;
    let (id, record) = data.live_tabular_named(warehouse_id, view)?;
    record.to_view_info(id)
}

pub(super) fn get_view_by_id(
    warehouse_id: WarehouseId,
    view_id: ViewId,
    flags: TabularListFlags,
    data: &CatalogData,
) -> Option<ViewInfo> {
    data.active_warehouse(warehouse_id)?;
    data.tabular(warehouse_id, view_id.into())
        .and_then(|t| t.to_view_info(*view_id))
        .filter(|info| flags.matches(&info.tabular))
}

pub(super) fn commit_view(
    warehouse_id: WarehouseId,
    commit: ViewCommit,
    data: &mut CatalogData,
) -> Result<ViewInfo, CommitViewError> {
    if data.active_warehouse(warehouse_id).is_none() {
        return Err(WarehouseIdNotFound::new(warehouse_id).into());
    }
    let tabular_id = TabularId::from(commit.view_id);
    let record = data
        .tabular_mut(warehouse_id, tabular_id)
        .filter(|t| t.deletion.is_none())
        .ok_or_else(|| TabularNotFound::for_id(warehouse_id, tabular_id))?;
    if record.metadata_location.as_deref() != Some(commit.previous_metadata_location.as_str()) {
        return Err(CommitConflict::new(
            tabular_id,
            Some(commit.previous_metadata_location),
            record.metadata_location.clone(),
        )
        .into());
    }

    record.location.clone_from(&commit.new_metadata.location);
    record.metadata_location = Some(commit.new_metadata_location);
    record.metadata = TabularMetadata::View(commit.new_metadata);
    record.updated_at = Some(Utc::now());
    record
        .to_view_info(*commit.view_id)
        .ok_or_else(|| TabularNotFound::for_id(warehouse_id, tabular_id).into())
}

/// Soft-deleted tabulars of active warehouses whose expiry passed at `now`.
pub(super) fn expired_tabulars(data: &CatalogData, now: DateTime<Utc>) -> Vec<Uuid> {
    data.tabulars
        .iter()
        .filter(|(_, t)| {
            t.deletion.is_some_and(|d| d.is_expired(now))
                && data.active_warehouse(t.warehouse_id).is_some()
        })
        .map(|(id, _)| *id)
        .collect()
}
