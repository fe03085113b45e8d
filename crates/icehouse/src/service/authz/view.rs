use icehouse_ext::TableIdent;

use crate::{
    request_metadata::RequestMetadata,
    service::{
        CatalogBackendError, ResolvedWarehouse, TabularInfo, TabularNotFound, TabularType,
        authz::{
            AuthorizationCountMismatch, Authorizer, BackendUnavailableOrCountMismatch,
            CatalogViewAction, MustUse, define_action_forbidden, define_require_action_error,
        },
    },
};

const CAN_SEE_PERMISSION: CatalogViewAction = CatalogViewAction::CanGetMetadata;

// --------------------------- Errors ---------------------------
define_action_forbidden!(
    AuthZViewActionForbidden,
    "View",
    "ViewActionForbidden",
    &TableIdent
);

define_require_action_error!(RequireViewActionError {
    AuthZViewActionForbidden,
    TabularNotFound,
});

// --------------------------- View Ops ---------------------------
#[async_trait::async_trait]
pub trait AuthZViewOps: Authorizer {
    /// Hidden views are answered like missing views.
    async fn require_view_action<T: AsRef<TabularInfo> + Send + Sync>(
        &self,
        metadata: &RequestMetadata,
        warehouse: &ResolvedWarehouse,
        user_provided_view: impl ToString + Send,
        view: Result<Option<T>, CatalogBackendError>,
        action: CatalogViewAction,
    ) -> Result<T, RequireViewActionError> {
        let user_provided_view = user_provided_view.to_string();
        let cant_see_err = || -> RequireViewActionError {
            TabularNotFound::new(warehouse.warehouse_id, TabularType::View, &user_provided_view)
                .append_detail("View not found or access denied")
                .into()
        };
        let Some(view) = view? else {
            return Err(cant_see_err());
        };
        let info = view.as_ref();

        let decisions = self
            .are_allowed_view_actions_vec(
                metadata,
                warehouse,
                &[(info, CAN_SEE_PERMISSION), (info, action)],
            )
            .await?
            .into_inner();
        let [can_see, is_allowed]: [bool; 2] = decisions
            .try_into()
            .map_err(|v: Vec<bool>| AuthorizationCountMismatch::new(2, v.len(), "view"))?;

        if !can_see {
            return Err(cant_see_err());
        }
        if !is_allowed {
            return Err(AuthZViewActionForbidden::new(
                &info.tabular_ident,
                action,
                metadata.actor().clone(),
            )
            .into());
        }
        Ok(view)
    }

    async fn is_allowed_view_action(
        &self,
        metadata: &RequestMetadata,
        warehouse: &ResolvedWarehouse,
        view: &TabularInfo,
        action: CatalogViewAction,
    ) -> Result<MustUse<bool>, BackendUnavailableOrCountMismatch> {
        let decision = self
            .is_allowed_view_action_impl(metadata, warehouse, view, action)
            .await?;
        Ok(decision.into())
    }

    async fn are_allowed_view_actions_vec(
        &self,
        metadata: &RequestMetadata,
        warehouse: &ResolvedWarehouse,
        views_with_actions: &[(&TabularInfo, CatalogViewAction)],
    ) -> Result<MustUse<Vec<bool>>, BackendUnavailableOrCountMismatch> {
        let decisions = self
            .are_allowed_view_actions_impl(metadata, warehouse, views_with_actions)
            .await?;

        if decisions.len() != views_with_actions.len() {
            return Err(AuthorizationCountMismatch::new(
                views_with_actions.len(),
                decisions.len(),
                "view",
            )
            .into());
        }

        Ok(decisions.into())
    }
}

impl<T> AuthZViewOps for T where T: Authorizer {}

#[cfg(test)]
mod tests {
    use icehouse_ext::catalog::rest::ErrorModel;

    use super::*;
    use crate::service::{
        ViewId,
        authz::{table::tests::tabular, tests::HidingAuthorizer, warehouse::tests::warehouse},
    };

    #[tokio::test]
    async fn test_view_checks() {
        let authz = HidingAuthorizer::new();
        let metadata = RequestMetadata::new_principal("bob");
        let wh = warehouse();
        let view_id = ViewId::new_random();
        let info = tabular(&wh, view_id.into(), "daily");

        let view = authz
            .require_view_action(
                &metadata,
                &wh,
                &info.tabular_ident,
                Ok(Some(info.clone())),
                CatalogViewAction::CanCommit,
            )
            .await
            .unwrap();
        assert_eq!(view.tabular_id, info.tabular_id);

        authz.block_action("view:can_drop");
        let err = authz
            .require_view_action(
                &metadata,
                &wh,
                &info.tabular_ident,
                Ok(Some(info.clone())),
                CatalogViewAction::CanDrop,
            )
            .await
            .unwrap_err();
        assert_eq!(ErrorModel::from(err).code, 403);

        authz.hide(&format!("view:{}", *view_id));
        let err = authz
            .require_view_action(
                &metadata,
                &wh,
                &info.tabular_ident,
                Ok(Some(info.clone())),
                CatalogViewAction::CanGetMetadata,
            )
            .await
            .unwrap_err();
        let model = ErrorModel::from(err);
        assert_eq!(model.code, 404);
        assert_eq!(model.r#type, "NoSuchViewException");
    }
}
