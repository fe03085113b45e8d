use std::collections::HashMap;

use chrono::Utc;
use icehouse_ext::NamespaceIdent;

use super::{CatalogData, data::NamespaceRecord};
use crate::{
    WarehouseId,
    service::{
        CreateNamespaceError, DropNamespaceError, ListNamespacesError, NamespaceAlreadyExists,
        NamespaceId, NamespaceInfo, NamespaceNotEmpty, NamespaceNotFound, NamespaceParentNotFound,
        NamespaceVersion, UpdateNamespacePropertiesError, WarehouseIdNotFound,
    },
};

pub(super) fn list_namespaces(
    warehouse_id: WarehouseId,
    parent: Option<&NamespaceIdent>,
    data: &CatalogData,
) -> Result<Vec<NamespaceInfo>, ListNamespacesError> {
    if data.active_warehouse(warehouse_id).is_none() {
        return Err(WarehouseIdNotFound::new(warehouse_id).into());
    }
    if let Some(parent) = parent {
        if data.namespace_id(warehouse_id, parent).is_none() {
            return Err(NamespaceNotFound::new(warehouse_id, parent.clone()).into());
        }
    }

    let mut namespaces: Vec<_> = data
        .namespaces
        .iter()
        .filter(|(_, ns)| ns.warehouse_id == warehouse_id && ns.ident.is_direct_child_of(parent))
        .map(|(id, ns)| ns.to_info(*id))
        .collect();
    namespaces.sort_by(|a, b| a.namespace_ident.cmp(&b.namespace_ident));
    Ok(namespaces)
}

pub(super) fn get_namespace(
    warehouse_id: WarehouseId,
    namespace: &NamespaceIdent,
    data: &CatalogData,
) -> Option<NamespaceInfo> {
    data.active_warehouse(warehouse_id)?;
    data.namespace_id(warehouse_id, namespace)
        .and_then(|id| data.namespace_info(id))
}

pub(super) fn create_namespace(
    warehouse_id: WarehouseId,
    namespace_id: NamespaceId,
    namespace: NamespaceIdent,
    properties: HashMap<String, String>,
    data: &mut CatalogData,
) -> Result<NamespaceInfo, CreateNamespaceError> {
    if data.active_warehouse(warehouse_id).is_none() {
        return Err(WarehouseIdNotFound::new(warehouse_id).into());
    }
    if data.namespace_id(warehouse_id, &namespace).is_some() {
        return Err(NamespaceAlreadyExists::new(warehouse_id, namespace).into());
    }
    if let Some(parent) = namespace.parent() {
        if data.namespace_id(warehouse_id, &parent).is_none() {
            return Err(NamespaceParentNotFound::new(warehouse_id, namespace).into());
        }
    }

    let record = NamespaceRecord {
        warehouse_id,
        ident: namespace,
        properties,
        created_at: Utc::now(),
        updated_at: None,
        version: NamespaceVersion::new(0),
    };
    let info = record.to_info(namespace_id);
    data.namespaces.insert(namespace_id, record);
    Ok(info)
}

pub(super) fn drop_namespace(
    warehouse_id: WarehouseId,
    namespace_id: NamespaceId,
    data: &mut CatalogData,
) -> Result<NamespaceInfo, DropNamespaceError> {
    if data.active_warehouse(warehouse_id).is_none() {
        return Err(WarehouseIdNotFound::new(warehouse_id).into());
    }
    let ident = data
        .namespaces
        .get(&namespace_id)
        .filter(|ns| ns.warehouse_id == warehouse_id)
        .map(|ns| ns.ident.clone())
        .ok_or_else(|| NamespaceNotFound::new(warehouse_id, namespace_id))?;

    let child_namespaces = data
        .namespaces
        .values()
        .filter(|ns| ns.warehouse_id == warehouse_id && ns.ident.is_direct_child_of(Some(&ident)))
        .count();
    let tabulars = data
        .tabulars
        .values()
        .filter(|t| t.namespace_id == namespace_id)
        .count();
    if child_namespaces > 0 || tabulars > 0 {
        return Err(NamespaceNotEmpty::new(ident, child_namespaces, tabulars).into());
    }

    let record = data
        .namespaces
        .remove(&namespace_id)
        .ok_or_else(|| NamespaceNotFound::new(warehouse_id, namespace_id))?;
    Ok(record.to_info(namespace_id))
}

pub(super) fn update_namespace_properties(
    warehouse_id: WarehouseId,
    namespace_id: NamespaceId,
    properties: HashMap<String, String>,
    data: &mut CatalogData,
) -> Result<NamespaceInfo, UpdateNamespacePropertiesError> {
    if data.active_warehouse(warehouse_id).is_none() {
        return Err(WarehouseIdNotFound::new(warehouse_id).into());
    }
    let namespace = data
        .namespaces
        .get_mut(&namespace_id)
        .filter(|ns| ns.warehouse_id == warehouse_id)
        .ok_or_else(|| NamespaceNotFound::new(warehouse_id, namespace_id))?;
    namespace.properties = properties;
    namespace.updated_at = Some(Utc::now());
    namespace.version = namespace.version.next();
    Ok(namespace.to_info(namespace_id))
}

#[cfg(test)]
mod tests {
    use maplit::hashmap;

    use super::*;
    use crate::{
        ProjectId,
        service::{
            DeleteProfile,
            storage::{MemoryProfile, StorageProfile},
        },
    };

    fn ns(levels: &[&str]) -> NamespaceIdent {
        NamespaceIdent::from_vec(levels.iter().map(ToString::to_string).collect()).unwrap()
    }

    fn setup() -> (CatalogData, WarehouseId) {
        let mut data = CatalogData::new();
        let project_id = ProjectId::new_random();
        super::super::warehouse::create_project(&project_id, "p".to_string(), &mut data).unwrap();
        let warehouse = super::super::warehouse::create_warehouse(
            "wh".to_string(),
            &project_id,
            StorageProfile::Memory(MemoryProfile::default()),
            DeleteProfile::Hard,
            None,
            &mut data,
        )
        .unwrap();
        (data, warehouse.warehouse_id)
    }

    fn create(data: &mut CatalogData, warehouse_id: WarehouseId, levels: &[&str]) -> NamespaceInfo {
        create_namespace(
            warehouse_id,
            NamespaceId::new_random(),
            ns(levels),
            HashMap::new(),
            data,
        )
        .unwrap()
    }

    #[test]
    fn test_list_direct_children_sorted() {
        let (mut data, warehouse_id) = setup();
        create(&mut data, warehouse_id, &["b"]);
        create(&mut data, warehouse_id, &["a"]);
        create(&mut data, warehouse_id, &["a", "y"]);
        create(&mut data, warehouse_id, &["a", "x"]);
        create(&mut data, warehouse_id, &["a", "x", "deep"]);

        let top: Vec<_> = list_namespaces(warehouse_id, None, &data)
            .unwrap()
            .into_iter()
            .map(|n| n.namespace_ident)
            .collect();
        assert_eq!(top, vec![ns(&["a"]), ns(&["b"])]);

        let children: Vec<_> = list_namespaces(warehouse_id, Some(&ns(&["a"])), &data)
            .unwrap()
            .into_iter()
            .map(|n| n.namespace_ident)
            .collect();
        assert_eq!(children, vec![ns(&["a", "x"]), ns(&["a", "y"])]);

        let err = list_namespaces(warehouse_id, Some(&ns(&["missing"])), &data).unwrap_err();
        assert!(matches!(err, ListNamespacesError::NamespaceNotFound(_)));
    }

    #[test]
    fn test_create_requires_parent_and_unique_name() {
        let (mut data, warehouse_id) = setup();
        let err = create_namespace(
            warehouse_id,
            NamespaceId::new_random(),
            ns(&["a", "b"]),
            HashMap::new(),
            &mut data,
        )
        .unwrap_err();
        assert!(matches!(err, CreateNamespaceError::NamespaceParentNotFound(_)));

        create(&mut data, warehouse_id, &["a"]);
        let err = create_namespace(
            warehouse_id,
            NamespaceId::new_random(),
            ns(&["a"]),
            HashMap::new(),
            &mut data,
        )
        .unwrap_err();
        assert!(matches!(err, CreateNamespaceError::NamespaceAlreadyExists(_)));
    }

    #[test]
    fn test_drop_requires_empty() {
        let (mut data, warehouse_id) = setup();
        let parent = create(&mut data, warehouse_id, &["a"]);
        let child = create(&mut data, warehouse_id, &["a", "b"]);

        let err = drop_namespace(warehouse_id, parent.namespace_id, &mut data).unwrap_err();
        let DropNamespaceError::NamespaceNotEmpty(err) = err else {
            panic!("expected NamespaceNotEmpty");
        };
        assert_eq!(err.child_namespaces, 1);

        drop_namespace(warehouse_id, child.namespace_id, &mut data).unwrap();
        drop_namespace(warehouse_id, parent.namespace_id, &mut data).unwrap();
        assert!(list_namespaces(warehouse_id, None, &data).unwrap().is_empty());
    }

    #[test]
    fn test_update_properties_replaces() {
        let (mut data, warehouse_id) = setup();
        let info = create_namespace(
            warehouse_id,
            NamespaceId::new_random(),
            ns(&["a"]),
            hashmap! {"k1".to_string() => "v1".to_string()},
            &mut data,
        )
        .unwrap();
        let updated = update_namespace_properties(
            warehouse_id,
            info.namespace_id,
            hashmap! {"k2".to_string() => "v2".to_string()},
            &mut data,
        )
        .unwrap();
        assert_eq!(
            updated.properties,
            hashmap! {"k2".to_string() => "v2".to_string()}
        );
        assert_eq!(updated.version, info.version.next());
    }
}
