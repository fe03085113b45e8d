use crate::{
    WarehouseId,
    request_metadata::RequestMetadata,
    service::{
        CatalogBackendError, ResolvedWarehouse, WarehouseIdNotFound,
        authz::{
            AuthorizationCountMismatch, Authorizer, BackendUnavailableOrCountMismatch,
            CatalogWarehouseAction, MustUse, define_action_forbidden, define_require_action_error,
        },
    },
};

const CAN_SEE_PERMISSION: CatalogWarehouseAction = CatalogWarehouseAction::CanUse;

// --------------------------- Errors ---------------------------
define_action_forbidden!(
    AuthZWarehouseActionForbidden,
    "Warehouse",
    "WarehouseActionForbidden",
    WarehouseId
);

define_require_action_error!(RequireWarehouseActionError {
    AuthZWarehouseActionForbidden,
    // Hides the existence of the warehouse
    WarehouseIdNotFound,
});

// --------------------------- Warehouse Ops ---------------------------
#[async_trait::async_trait]
pub trait AuthzWarehouseOps: Authorizer {
    fn require_warehouse_presence(
        &self,
        user_provided_warehouse: WarehouseId,
        warehouse: Result<Option<ResolvedWarehouse>, CatalogBackendError>,
    ) -> Result<ResolvedWarehouse, RequireWarehouseActionError> {
        warehouse?.ok_or_else(|| WarehouseIdNotFound::new(user_provided_warehouse).into())
    }

    /// Resolve `warehouse` and check `action` on it. Warehouses the caller may not use
    /// are reported as missing.
    async fn require_warehouse_action(
        &self,
        metadata: &RequestMetadata,
        user_provided_warehouse: WarehouseId,
        warehouse: Result<Option<ResolvedWarehouse>, CatalogBackendError>,
        action: CatalogWarehouseAction,
    ) -> Result<ResolvedWarehouse, RequireWarehouseActionError> {
        let warehouse = self.require_warehouse_presence(user_provided_warehouse, warehouse)?;
        let cant_see_err = || -> RequireWarehouseActionError {
            WarehouseIdNotFound::new(user_provided_warehouse)
                .append_detail("Warehouse not found or access denied")
                .into()
        };

        if action == CAN_SEE_PERMISSION {
            let is_allowed = self
                .is_allowed_warehouse_action(metadata, &warehouse, action)
                .await?
                .into_inner();
            return if is_allowed {
                Ok(warehouse)
            } else {
                Err(cant_see_err())
            };
        }

        let [can_see, is_allowed] = self
            .are_allowed_warehouse_actions_arr(
                metadata,
                &[(&warehouse, CAN_SEE_PERMISSION), (&warehouse, action)],
            )
            .await?
            .into_inner();
        if !can_see {
            return Err(cant_see_err());
        }
        if !is_allowed {
            return Err(AuthZWarehouseActionForbidden::new(
                user_provided_warehouse,
                action,
                metadata.actor().clone(),
            )
            .into());
        }
        Ok(warehouse)
    }

    async fn is_allowed_warehouse_action(
        &self,
        metadata: &RequestMetadata,
        warehouse: &ResolvedWarehouse,
        action: CatalogWarehouseAction,
    ) -> Result<MustUse<bool>, BackendUnavailableOrCountMismatch> {
        let [decision] = self
            .are_allowed_warehouse_actions_arr(metadata, &[(warehouse, action)])
            .await?
            .into_inner();
        Ok(decision.into())
    }

    async fn are_allowed_warehouse_actions_arr<const N: usize>(
        &self,
        metadata: &RequestMetadata,
        warehouses_with_actions: &[(&ResolvedWarehouse, CatalogWarehouseAction); N],
    ) -> Result<MustUse<[bool; N]>, BackendUnavailableOrCountMismatch> {
        let result = self
            .are_allowed_warehouse_actions_vec(metadata, warehouses_with_actions)
            .await?
            .into_inner();
        let n_returned = result.len();
        let arr: [bool; N] = result
            .try_into()
            .map_err(|_| AuthorizationCountMismatch::new(N, n_returned, "warehouse"))?;
        Ok(MustUse::from(arr))
    }

    async fn are_allowed_warehouse_actions_vec(
        &self,
        metadata: &RequestMetadata,
        warehouses_with_actions: &[(&ResolvedWarehouse, CatalogWarehouseAction)],
    ) -> Result<MustUse<Vec<bool>>, BackendUnavailableOrCountMismatch> {
        let decisions = self
            .are_allowed_warehouse_actions_impl(metadata, warehouses_with_actions)
            .await?;

        if decisions.len() != warehouses_with_actions.len() {
            return Err(AuthorizationCountMismatch::new(
                warehouses_with_actions.len(),
                decisions.len(),
                "warehouse",
            )
            .into());
        }

        Ok(decisions.into())
    }
}

impl<T> AuthzWarehouseOps for T where T: Authorizer {}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::Utc;
    use icehouse_ext::catalog::rest::ErrorModel;

    use super::*;
    use crate::{
        ProjectId,
        service::{
            WarehouseStatus,
            authz::tests::HidingAuthorizer,
            storage::{MemoryProfile, StorageProfile},
        },
    };

    pub(crate) fn warehouse() -> ResolvedWarehouse {
        ResolvedWarehouse {
            warehouse_id: WarehouseId::new_random(),
            name: "lake".to_string(),
            project_id: ProjectId::new_random(),
            storage_profile: StorageProfile::Memory(MemoryProfile {
                key_prefix: Some("lake".to_string()),
            }),
            storage_secret_id: None,
            status: WarehouseStatus::Active,
            delete_profile: Default::default(),
            deletion: None,
            created_at: Utc::now(),
            updated_at: None,
            version: 0.into(),
        }
    }

    #[tokio::test]
    async fn test_missing_warehouse_is_not_found() {
        let authz = HidingAuthorizer::new();
        let id = WarehouseId::new_random();
        let err = authz
            .require_warehouse_action(
                &RequestMetadata::new_principal("bob"),
                id,
                Ok(None),
                CatalogWarehouseAction::CanUse,
            )
            .await
            .unwrap_err();
        assert_eq!(ErrorModel::from(err).code, 404);
    }

    #[tokio::test]
    async fn test_hidden_warehouse_looks_missing() {
        let authz = HidingAuthorizer::new();
        let wh = warehouse();
        authz.hide(&format!("warehouse:{}", wh.warehouse_id));
        let err = authz
            .require_warehouse_action(
                &RequestMetadata::new_principal("bob"),
                wh.warehouse_id,
                Ok(Some(wh.clone())),
                CatalogWarehouseAction::CanDelete,
            )
            .await
            .unwrap_err();
        let model = ErrorModel::from(err);
        assert_eq!(model.code, 404);
        assert!(
            model
                .stack
                .contains(&"Warehouse not found or access denied".to_string())
        );
    }

    #[tokio::test]
    async fn test_denied_warehouse_action_is_forbidden() {
        let authz = HidingAuthorizer::new();
        let wh = warehouse();
        authz.block_action("warehouse:can_rename");
        let metadata = RequestMetadata::new_principal("bob");
        let err = authz
            .require_warehouse_action(
                &metadata,
                wh.warehouse_id,
                Ok(Some(wh.clone())),
                CatalogWarehouseAction::CanRename,
            )
            .await
            .unwrap_err();
        assert_eq!(ErrorModel::from(err).code, 403);

        let resolved = authz
            .require_warehouse_action(
                &metadata,
                wh.warehouse_id,
                Ok(Some(wh.clone())),
                CatalogWarehouseAction::CanGetMetadata,
            )
            .await
            .unwrap();
        assert_eq!(resolved.warehouse_id, wh.warehouse_id);
    }
}
