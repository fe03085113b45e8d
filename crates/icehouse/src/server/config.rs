use std::{collections::HashMap, str::FromStr};

use icehouse_ext::catalog::rest::GetConfigQueryParams;

use super::CatalogServer;
use crate::{
    ProjectId,
    api::{
        ApiContext, CatalogConfig, ErrorModel, Result,
        iceberg::{supported_endpoints, v1::config::ConfigService},
    },
    request_metadata::RequestMetadata,
    service::{
        CatalogStore, SecretStore, State, WarehouseNameNotFound,
        authz::{Authorizer, AuthzWarehouseOps, CatalogWarehouseAction},
    },
};

#[async_trait::async_trait]
impl<C: CatalogStore, A: Authorizer + Clone, S: SecretStore> ConfigService<State<A, C, S>>
    for CatalogServer<C, A, S>
{
    async fn get_config(
        query: GetConfigQueryParams,
        api_context: ApiContext<State<A, C, S>>,
        request_metadata: RequestMetadata,
    ) -> Result<CatalogConfig> {
        let state = api_context.v1_state;
        let warehouse_arg = query.warehouse.filter(|w| !w.is_empty()).ok_or_else(|| {
            ErrorModel::bad_request(
                "Query parameter `warehouse` is required",
                "WarehouseMissing",
                None,
            )
        })?;
        let (project_id, warehouse_name) = parse_warehouse_arg(&warehouse_arg);
        let project_id = project_id
            .or_else(|| state.config.default_project_id.clone())
            .ok_or_else(|| {
                ErrorModel::bad_request(
                    "No project specified. Use `<project-id>/<warehouse-name>` as warehouse.",
                    "ProjectIdMissing",
                    None,
                )
            })?;

        let warehouse = C::get_warehouse_by_name(&warehouse_name, &project_id, state.catalog)
            .await?
            .ok_or_else(|| WarehouseNameNotFound::new(warehouse_name.clone()))?;
        let warehouse = state
            .authz
            .require_warehouse_action(
                &request_metadata,
                warehouse.warehouse_id,
                Ok(Some(warehouse)),
                CatalogWarehouseAction::CanGetConfig,
            )
            .await?;

        let overrides = HashMap::from([
            ("prefix".to_string(), warehouse.warehouse_id.to_string()),
            (
                "uri".to_string(),
                format!("{}/catalog", request_metadata.base_uri()),
            ),
        ]);

        Ok(CatalogConfig {
            defaults: warehouse.storage_profile.table_config(),
            overrides,
            endpoints: supported_endpoints().to_vec(),
        })
    }
}

/// `<project-id>/<warehouse-name>` or `<warehouse-name>`. Warehouse names cannot contain
/// `/`, so a first segment that is not a valid project id belongs to the name.
fn parse_warehouse_arg(arg: &str) -> (Option<ProjectId>, String) {
    match arg.split_once('/') {
        None => (None, arg.to_string()),
        Some((project, name)) => match ProjectId::from_str(project) {
            Ok(project_id) => (Some(project_id), name.to_string()),
            Err(_) => (None, arg.to_string()),
        },
    }
}
