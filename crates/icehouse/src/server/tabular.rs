//! Shared steps of table and view handlers.
use std::str::FromStr;

use chrono::Utc;
use icehouse_ext::TableIdent;
use icehouse_io::Location;

use super::namespace::NAMESPACE_LOCATION_PROPERTY;
use crate::{
    api::{ErrorModel, Result},
    service::{
        DeleteProfile, DropMode, DroppedTabular, NamespaceInfo, ResolvedWarehouse, SecretStore,
        TabularId,
        authz::Authorizer,
        expiration::cleanup_location,
        storage::{StorageFactory, StorageProfile, tabular_location},
    },
};

/// Soft drop under a `soft` delete profile, hard drop otherwise.
pub(crate) fn drop_mode(delete_profile: DeleteProfile, purge_requested: bool) -> DropMode {
    let now = Utc::now();
    match delete_profile.expires_at(now) {
        Some(expires_at) => DropMode::Soft {
            deleted_at: now,
            expires_at,
            purge_requested,
        },
        None => DropMode::Hard,
    }
}

/// Run the authorizer hook of a purged tabular and remove its data if requested.
/// Storage failures are logged and do not fail the drop.
pub(crate) async fn finish_drop<A: Authorizer, S: SecretStore>(
    authorizer: &A,
    storage: &StorageFactory,
    secrets: &S,
    warehouse: &ResolvedWarehouse,
    dropped: &DroppedTabular,
    purge_requested: bool,
) -> Result<()> {
    if !dropped.purged {
        tracing::debug!(
            tabular_id = %dropped.info.tabular_id,
            "Tabular soft-deleted"
        );
        return Ok(());
    }

    match dropped.info.tabular_id {
        TabularId::Table(id) => authorizer.delete_table(warehouse.warehouse_id, id).await?,
        TabularId::View(id) => authorizer.delete_view(warehouse.warehouse_id, id).await?,
    }

    if purge_requested {
        let location = Location::from_str(&dropped.info.location).map_err(|e| e.to_string());
        // Failures are logged by the cleanup.
        let cleaned = cleanup_location(storage, secrets, warehouse, location)
            .await
            .is_ok();
        tracing::debug!(
            tabular_id = %dropped.info.tabular_id,
            storage_cleaned = cleaned,
            "Tabular purged"
        );
    }
    Ok(())
}

/// Location of a new table or view. A client supplied location must lie within the
/// warehouse. Otherwise the tabular is placed below the location of its namespace.
pub(crate) fn determine_tabular_location(
    profile: &StorageProfile,
    requested: Option<&str>,
    namespace: &NamespaceInfo,
    tabular_id: TabularId,
) -> Result<String> {
    let mut location = match (
        requested,
        namespace.properties.get(NAMESPACE_LOCATION_PROPERTY),
    ) {
        (Some(requested), _) => profile.require_location_within(requested)?,
        (None, Some(namespace_location)) => {
            let mut location = profile.require_location_within(namespace_location)?;
            location.push(&tabular_id.uuid().to_string());
            location
        }
        (None, None) => tabular_location(profile, namespace.namespace_id, tabular_id)?,
    };
    Ok(location.without_trailing_slash().to_string())
}

/// Tabular names must be non-empty and must not contain path separators.
pub(crate) fn validate_tabular_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') || name.chars().any(char::is_control) {
        return Err(ErrorModel::bad_request(
            format!("Invalid table or view name `{name}`"),
            "InvalidTabularName",
            None,
        )
        .into());
    }
    Ok(())
}

/// Renames must stay within the warehouse addressed by the prefix.
pub(crate) fn validate_rename(source: &TableIdent, destination: &TableIdent) -> Result<()> {
    validate_tabular_name(&destination.name)?;
    if source == destination {
        return Err(ErrorModel::bad_request(
            format!("Source and destination of rename are both `{source}`"),
            "RenameSourceEqualsDestination",
            None,
        )
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use icehouse_ext::NamespaceIdent;

    use super::*;
    use crate::service::{NamespaceId, TableId, WarehouseId, storage::MemoryProfile};

    #[test]
    fn test_drop_mode_follows_profile() {
        assert_eq!(drop_mode(DeleteProfile::Hard, true), DropMode::Hard);
        let DropMode::Soft {
            deleted_at,
            expires_at,
            purge_requested,
        } = drop_mode(
            DeleteProfile::Soft {
                expiration_seconds: 60,
            },
            true,
        )
        else {
            panic!("expected soft drop");
        };
        assert!(purge_requested);
        assert_eq!((expires_at - deleted_at).num_seconds(), 60);
    }

    #[test]
    fn test_tabular_location_defaults_below_namespace() {
        let profile = StorageProfile::Memory(MemoryProfile {
            key_prefix: Some("wh".to_string()),
        });
        let namespace_id = NamespaceId::new_random();
        let mut namespace = NamespaceInfo {
            namespace_id,
            warehouse_id: WarehouseId::new_random(),
            namespace_ident: NamespaceIdent::new("ns").unwrap(),
            properties: HashMap::new(),
            created_at: Utc::now(),
            updated_at: None,
            version: 0.into(),
        };
        let table_id = TableId::new_random();
        let location =
            determine_tabular_location(&profile, None, &namespace, table_id.into()).unwrap();
        assert_eq!(
            location,
            format!("memory://icehouse/wh/{namespace_id}/{table_id}")
        );

        namespace.properties.insert(
            NAMESPACE_LOCATION_PROPERTY.to_string(),
            "memory://icehouse/wh/custom".to_string(),
        );
        let location =
            determine_tabular_location(&profile, None, &namespace, table_id.into()).unwrap();
        assert_eq!(location, format!("memory://icehouse/wh/custom/{table_id}"));

        let err = determine_tabular_location(
            &profile,
            Some("memory://icehouse/other/t"),
            &namespace,
            table_id.into(),
        )
        .unwrap_err();
        assert_eq!(err.error.code, 400);
    }

    #[test]
    fn test_tabular_names() {
        assert!(validate_tabular_name("orders").is_ok());
        assert!(validate_tabular_name("").is_err());
        assert!(validate_tabular_name("a/b").is_err());
    }
}
