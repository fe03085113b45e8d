use std::collections::{HashMap, HashSet};

use icehouse_ext::{NamespaceIdent, catalog::InvalidNamespaceIdent};

use super::{CatalogServer, require_active_warehouse, require_warehouse_id};
use crate::{
    api::{
        ApiContext, CreateNamespaceRequest, CreateNamespaceResponse, ErrorModel,
        GetNamespaceResponse, ListNamespacesQuery, ListNamespacesResponse, Result,
        UpdateNamespacePropertiesRequest, UpdateNamespacePropertiesResponse,
        iceberg::{
            types::{PaginationQuery, Prefix, paginate},
            v1::{namespace::NamespaceService, NamespaceParameters},
        },
    },
    request_metadata::RequestMetadata,
    service::{
        CatalogStore, NamespaceId, NamespaceInfo, ResolvedWarehouse, SecretStore, State,
        Transaction,
        authz::{
            AuthZNamespaceOps, Authorizer, CatalogNamespaceAction, CatalogWarehouseAction,
            NamespaceParent,
        },
        storage::namespace_location,
    },
};

/// Property holding the storage location of a namespace.
pub const NAMESPACE_LOCATION_PROPERTY: &str = "location";

fn invalid_namespace(e: InvalidNamespaceIdent) -> ErrorModel {
    ErrorModel::bad_request(e.to_string(), "InvalidNamespaceIdentifier", Some(Box::new(e)))
}

/// Resolve a namespace inside an authorized warehouse and check `action` on it.
pub(crate) async fn authorized_namespace<C: CatalogStore, A: Authorizer>(
    authorizer: &A,
    metadata: &RequestMetadata,
    warehouse: &ResolvedWarehouse,
    namespace: &NamespaceIdent,
    catalog_state: C::State,
    action: CatalogNamespaceAction,
) -> Result<NamespaceInfo> {
    let info = C::get_namespace(warehouse.warehouse_id, namespace, catalog_state).await;
    Ok(authorizer
        .require_namespace_action(metadata, warehouse, namespace.clone(), info, action)
        .await?)
}

#[async_trait::async_trait]
impl<C: CatalogStore, A: Authorizer + Clone, S: SecretStore> NamespaceService<State<A, C, S>>
    for CatalogServer<C, A, S>
{
    async fn list_namespaces(
        prefix: Option<Prefix>,
        query: ListNamespacesQuery,
        state: ApiContext<State<A, C, S>>,
        request_metadata: RequestMetadata,
    ) -> Result<ListNamespacesResponse> {
        // ------------------- VALIDATIONS -------------------
        let warehouse_id = require_warehouse_id(prefix.as_ref())?;
        let parent = query
            .parent
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(NamespaceIdent::from_url_segment)
            .transpose()
            .map_err(invalid_namespace)?;

        // ------------------- AUTHZ -------------------
        let authorizer = state.v1_state.authz;
        let catalog = state.v1_state.catalog;
        let warehouse_action = if parent.is_some() {
            CatalogWarehouseAction::CanUse
        } else {
            CatalogWarehouseAction::CanListNamespaces
        };
        let warehouse = require_active_warehouse::<C, A>(
            &authorizer,
            &request_metadata,
            warehouse_id,
            catalog.clone(),
            warehouse_action,
        )
        .await?;
        if let Some(parent) = &parent {
            authorized_namespace::<C, A>(
                &authorizer,
                &request_metadata,
                &warehouse,
                parent,
                catalog.clone(),
                CatalogNamespaceAction::CanListNamespaces,
            )
            .await?;
        }

        // ------------------- BUSINESS LOGIC -------------------
        let namespaces = C::list_namespaces(warehouse_id, parent.as_ref(), catalog).await?;
        let checks = namespaces
            .iter()
            .map(|n| (n, CatalogNamespaceAction::CanIncludeInList))
            .collect::<Vec<_>>();
        let masks = authorizer
            .are_allowed_namespace_actions_vec(&request_metadata, &warehouse, &checks)
            .await?
            .into_inner();
        let visible = namespaces
            .into_iter()
            .zip(masks)
            .filter_map(|(n, allowed)| allowed.then_some(n.namespace_ident))
            .collect::<Vec<_>>();

        let (namespaces, next_page_token) = paginate(
            visible,
            NamespaceIdent::to_url_string,
            &PaginationQuery {
                page_token: query.page_token,
                page_size: query.page_size,
            },
        )?;
        Ok(ListNamespacesResponse {
            next_page_token,
            namespaces,
        })
    }

    async fn create_namespace(
        prefix: Option<Prefix>,
        request: CreateNamespaceRequest,
        state: ApiContext<State<A, C, S>>,
        request_metadata: RequestMetadata,
    ) -> Result<CreateNamespaceResponse> {
        // ------------------- VALIDATIONS -------------------
        let warehouse_id = require_warehouse_id(prefix.as_ref())?;
        let CreateNamespaceRequest {
            namespace,
            properties,
        } = request;
        let mut properties = properties.unwrap_or_default();

        // ------------------- AUTHZ -------------------
        let authorizer = state.v1_state.authz;
        let catalog = state.v1_state.catalog;
        let warehouse = require_active_warehouse::<C, A>(
            &authorizer,
            &request_metadata,
            warehouse_id,
            catalog.clone(),
            CatalogWarehouseAction::CanUse,
        )
        .await?;
        let parent = if let Some(parent_ident) = namespace.parent() {
            let parent = authorized_namespace::<C, A>(
                &authorizer,
                &request_metadata,
                &warehouse,
                &parent_ident,
                catalog.clone(),
                CatalogNamespaceAction::CanCreateNamespace,
            )
            .await?;
            NamespaceParent::Namespace(parent.namespace_id)
        } else {
            let warehouse = require_active_warehouse::<C, A>(
                &authorizer,
                &request_metadata,
                warehouse_id,
                catalog.clone(),
                CatalogWarehouseAction::CanCreateNamespace,
            )
            .await?;
            NamespaceParent::Warehouse(warehouse.warehouse_id)
        };

        // ------------------- BUSINESS LOGIC -------------------
        let namespace_id = NamespaceId::new_random();
        let location = match properties.get(NAMESPACE_LOCATION_PROPERTY) {
            Some(requested) => warehouse
                .storage_profile
                .require_location_within(requested)?,
            None => namespace_location(&warehouse.storage_profile, namespace_id)?,
        };
        properties.insert(
            NAMESPACE_LOCATION_PROPERTY.to_string(),
            location.to_string(),
        );

        let mut t = C::Transaction::begin_write(catalog).await?;
        let info = C::create_namespace(
            warehouse_id,
            namespace_id,
            namespace,
            properties,
            t.transaction(),
        )
        .await?;
        t.commit().await?;

        authorizer
            .create_namespace(&request_metadata, namespace_id, parent)
            .await?;

        tracing::info!(
            %warehouse_id,
            %namespace_id,
            namespace = %info.namespace_ident,
            "Created namespace"
        );
        Ok(CreateNamespaceResponse {
            namespace: info.namespace_ident,
            properties: Some(info.properties),
        })
    }

    async fn load_namespace_metadata(
        parameters: NamespaceParameters,
        state: ApiContext<State<A, C, S>>,
        request_metadata: RequestMetadata,
    ) -> Result<GetNamespaceResponse> {
        let warehouse_id = require_warehouse_id(parameters.prefix.as_ref())?;
        let authorizer = state.v1_state.authz;
        let catalog = state.v1_state.catalog;
        let warehouse = require_active_warehouse::<C, A>(
            &authorizer,
            &request_metadata,
            warehouse_id,
            catalog.clone(),
            CatalogWarehouseAction::CanUse,
        )
        .await?;
        let info = authorized_namespace::<C, A>(
            &authorizer,
            &request_metadata,
            &warehouse,
            &parameters.namespace,
            catalog,
            CatalogNamespaceAction::CanGetMetadata,
        )
        .await?;

        Ok(GetNamespaceResponse {
            namespace: info.namespace_ident,
            properties: Some(info.properties),
        })
    }

    async fn namespace_exists(
        parameters: NamespaceParameters,
        state: ApiContext<State<A, C, S>>,
        request_metadata: RequestMetadata,
    ) -> Result<()> {
        Self::load_namespace_metadata(parameters, state, request_metadata)
            .await
            .map(|_| ())
    }

    async fn drop_namespace(
        parameters: NamespaceParameters,
        state: ApiContext<State<A, C, S>>,
        request_metadata: RequestMetadata,
    ) -> Result<()> {
        let warehouse_id = require_warehouse_id(parameters.prefix.as_ref())?;
        let authorizer = state.v1_state.authz;
        let catalog = state.v1_state.catalog;
        let warehouse = require_active_warehouse::<C, A>(
            &authorizer,
            &request_metadata,
            warehouse_id,
            catalog.clone(),
            CatalogWarehouseAction::CanUse,
        )
        .await?;
        let info = authorized_namespace::<C, A>(
            &authorizer,
            &request_metadata,
            &warehouse,
            &parameters.namespace,
            catalog.clone(),
            CatalogNamespaceAction::CanDelete,
        )
        .await?;

        let mut t = C::Transaction::begin_write(catalog).await?;
        let dropped = C::drop_namespace(warehouse_id, info.namespace_id, t.transaction()).await?;
        t.commit().await?;

        authorizer.delete_namespace(dropped.namespace_id).await?;
        tracing::info!(
            %warehouse_id,
            namespace_id = %dropped.namespace_id,
            namespace = %dropped.namespace_ident,
            "Dropped namespace"
        );
        Ok(())
    }

    async fn update_namespace_properties(
        parameters: NamespaceParameters,
        request: UpdateNamespacePropertiesRequest,
        state: ApiContext<State<A, C, S>>,
        request_metadata: RequestMetadata,
    ) -> Result<UpdateNamespacePropertiesResponse> {
        // ------------------- VALIDATIONS -------------------
        let warehouse_id = require_warehouse_id(parameters.prefix.as_ref())?;
        let UpdateNamespacePropertiesRequest { removals, updates } = request;
        let removals = removals.unwrap_or_default();
        let updates = updates.unwrap_or_default();
        validate_property_changes(&removals, &updates)?;

        // ------------------- AUTHZ -------------------
        let authorizer = state.v1_state.authz;
        let catalog = state.v1_state.catalog;
        let warehouse = require_active_warehouse::<C, A>(
            &authorizer,
            &request_metadata,
            warehouse_id,
            catalog.clone(),
            CatalogWarehouseAction::CanUse,
        )
        .await?;
        let info = authorized_namespace::<C, A>(
            &authorizer,
            &request_metadata,
            &warehouse,
            &parameters.namespace,
            catalog.clone(),
            CatalogNamespaceAction::CanUpdateProperties,
        )
        .await?;

        // ------------------- BUSINESS LOGIC -------------------
        let (properties, response) = apply_property_changes(info.properties, removals, updates);
        let mut t = C::Transaction::begin_write(catalog).await?;
        C::update_namespace_properties(warehouse_id, info.namespace_id, properties, t.transaction())
            .await?;
        t.commit().await?;
        Ok(response)
    }
}

fn validate_property_changes(removals: &[String], updates: &HashMap<String, String>) -> Result<()> {
    let overlap = removals
        .iter()
        .filter(|key| updates.contains_key(*key))
        .cloned()
        .collect::<Vec<_>>();
    if overlap.is_empty() {
        return Ok(());
    }
    Err(ErrorModel::bad_request(
        format!(
            "Properties may not be updated and removed at once: {}",
            overlap.join(", ")
        ),
        "ConflictingPropertyUpdate",
        None,
    )
    .into())
}

fn apply_property_changes(
    mut properties: HashMap<String, String>,
    removals: Vec<String>,
    updates: HashMap<String, String>,
) -> (HashMap<String, String>, UpdateNamespacePropertiesResponse) {
    let mut removed = vec![];
    let mut missing = vec![];
    for key in removals.into_iter().collect::<HashSet<_>>() {
        if properties.remove(&key).is_some() {
            removed.push(key);
        } else {
            missing.push(key);
        }
    }
    let mut updated = updates.keys().cloned().collect::<Vec<_>>();
    properties.extend(updates);

    removed.sort();
    missing.sort();
    updated.sort();
    (
        properties,
        UpdateNamespacePropertiesResponse {
            updated,
            removed,
            missing: (!missing.is_empty()).then_some(missing),
        },
    )
}

#[cfg(test)]
mod tests {
    use maplit::hashmap;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_property_changes() {
        let (properties, response) = apply_property_changes(
            hashmap! {
                "a".to_string() => "1".to_string(),
                "b".to_string() => "2".to_string(),
            },
            vec!["a".to_string(), "z".to_string()],
            hashmap! { "c".to_string() => "3".to_string() },
        );
        assert_eq!(
            properties,
            hashmap! {
                "b".to_string() => "2".to_string(),
                "c".to_string() => "3".to_string(),
            }
        );
        assert_eq!(response.updated, vec!["c".to_string()]);
        assert_eq!(response.removed, vec!["a".to_string()]);
        assert_eq!(response.missing, Some(vec!["z".to_string()]));
    }

    #[test]
    fn test_overlapping_changes_are_rejected() {
        let err = validate_property_changes(
            &["a".to_string()],
            &hashmap! { "a".to_string() => "1".to_string() },
        )
        .unwrap_err();
        assert_eq!(err.error.code, 400);
        assert!(validate_property_changes(&[], &HashMap::new()).is_ok());
    }
}
