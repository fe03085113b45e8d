use serde::Deserialize;

use crate::{
    api,
    request_metadata::RequestMetadata,
    service::{
        CatalogStore, ResolvedWarehouse, TabularId, TabularListFlags,
        authz::{AuthZTableOps, AuthZViewOps, Authorizer, CatalogTableAction, CatalogViewAction},
    },
};

#[derive(Debug, Deserialize)]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
#[serde(rename_all = "kebab-case")]
pub struct UndropTabularsRequest {
    /// Soft-deleted tables and views to restore.
    #[cfg_attr(feature = "open-api", schema(value_type = Vec<Object>))]
    pub targets: Vec<TabularId>,
}

/// Every target must be soft-deleted and restorable by the caller.
/// Targets the caller cannot see are reported as missing.
pub(crate) async fn require_undrop_permissions<A: Authorizer, C: CatalogStore>(
    warehouse: &ResolvedWarehouse,
    request: &UndropTabularsRequest,
    authorizer: &A,
    catalog_state: C::State,
    request_metadata: &RequestMetadata,
) -> api::Result<()> {
    let warehouse_id = warehouse.warehouse_id;
    for target in &request.targets {
        let tabular = C::get_tabular_by_id(
            warehouse_id,
            *target,
            TabularListFlags::only_deleted(),
            catalog_state.clone(),
        )
        .await;
        match target {
            TabularId::Table(id) => {
                authorizer
                    .require_table_action(
                        request_metadata,
                        warehouse,
                        id,
                        tabular,
                        CatalogTableAction::CanUndrop,
                    )
                    .await?;
            }
            TabularId::View(id) => {
                authorizer
                    .require_view_action(
                        request_metadata,
                        warehouse,
                        id,
                        tabular,
                        CatalogViewAction::CanUndrop,
                    )
                    .await?;
            }
        }
    }
    Ok(())
}
