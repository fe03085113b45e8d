use icehouse_ext::NamespaceIdent;

use crate::{
    request_metadata::RequestMetadata,
    service::{
        CatalogBackendError, NamespaceIdentOrId, NamespaceInfo, NamespaceNotFound,
        ResolvedWarehouse,
        authz::{
            AuthorizationCountMismatch, Authorizer, BackendUnavailableOrCountMismatch,
            CatalogNamespaceAction, MustUse, define_action_forbidden, define_require_action_error,
        },
    },
};

const CAN_SEE_PERMISSION: CatalogNamespaceAction = CatalogNamespaceAction::CanGetMetadata;

// --------------------------- Errors ---------------------------
define_action_forbidden!(
    AuthZNamespaceActionForbidden,
    "Namespace",
    "NamespaceActionForbidden",
    &NamespaceIdent
);

define_require_action_error!(RequireNamespaceActionError {
    AuthZNamespaceActionForbidden,
    NamespaceNotFound,
});

// --------------------------- Namespace Ops ---------------------------
#[async_trait::async_trait]
pub trait AuthZNamespaceOps: Authorizer {
    /// Resolve `namespace` inside an already authorized `warehouse` and check `action`.
    ///
    /// Namespaces the caller may not see are answered like missing namespaces.
    async fn require_namespace_action(
        &self,
        metadata: &RequestMetadata,
        warehouse: &ResolvedWarehouse,
        user_provided_namespace: impl Into<NamespaceIdentOrId> + Send,
        namespace: Result<Option<NamespaceInfo>, CatalogBackendError>,
        action: CatalogNamespaceAction,
    ) -> Result<NamespaceInfo, RequireNamespaceActionError> {
        let user_provided_namespace = user_provided_namespace.into();
        let cant_see_err = |namespace: NamespaceIdentOrId| -> RequireNamespaceActionError {
            NamespaceNotFound::new(warehouse.warehouse_id, namespace)
                .append_detail("Namespace not found or access denied")
                .into()
        };
        let Some(namespace) = namespace? else {
            return Err(cant_see_err(user_provided_namespace));
        };

        let decisions = self
            .are_allowed_namespace_actions_vec(
                metadata,
                warehouse,
                &[(&namespace, CAN_SEE_PERMISSION), (&namespace, action)],
            )
            .await?
            .into_inner();
        let [can_see, is_allowed]: [bool; 2] = decisions
            .try_into()
            .map_err(|v: Vec<bool>| AuthorizationCountMismatch::new(2, v.len(), "namespace"))?;

        if !can_see {
            return Err(cant_see_err(user_provided_namespace));
        }
        if !is_allowed {
            return Err(AuthZNamespaceActionForbidden::new(
                &namespace.namespace_ident,
                action,
                metadata.actor().clone(),
            )
            .into());
        }
        Ok(namespace)
    }

    async fn is_allowed_namespace_action(
        &self,
        metadata: &RequestMetadata,
        warehouse: &ResolvedWarehouse,
        namespace: &NamespaceInfo,
        action: CatalogNamespaceAction,
    ) -> Result<MustUse<bool>, BackendUnavailableOrCountMismatch> {
        let decision = self
            .is_allowed_namespace_action_impl(metadata, warehouse, namespace, action)
            .await?;
        Ok(decision.into())
    }

    async fn are_allowed_namespace_actions_vec(
        &self,
        metadata: &RequestMetadata,
        warehouse: &ResolvedWarehouse,
        namespaces_with_actions: &[(&NamespaceInfo, CatalogNamespaceAction)],
    ) -> Result<MustUse<Vec<bool>>, BackendUnavailableOrCountMismatch> {
        let decisions = self
            .are_allowed_namespace_actions_impl(metadata, warehouse, namespaces_with_actions)
            .await?;

        if decisions.len() != namespaces_with_actions.len() {
            return Err(AuthorizationCountMismatch::new(
                namespaces_with_actions.len(),
                decisions.len(),
                "namespace",
            )
            .into());
        }

        Ok(decisions.into())
    }
}

impl<T> AuthZNamespaceOps for T where T: Authorizer {}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;

    use chrono::Utc;
    use icehouse_ext::catalog::rest::ErrorModel;

    use super::*;
    use crate::service::{
        NamespaceId,
        authz::{tests::HidingAuthorizer, warehouse::tests::warehouse},
    };

    pub(crate) fn namespace(warehouse: &ResolvedWarehouse, name: &str) -> NamespaceInfo {
        NamespaceInfo {
            namespace_id: NamespaceId::new_random(),
            warehouse_id: warehouse.warehouse_id,
            namespace_ident: NamespaceIdent::new(name).unwrap(),
            properties: HashMap::new(),
            created_at: Utc::now(),
            updated_at: None,
            version: 0.into(),
        }
    }

    #[tokio::test]
    async fn test_hidden_namespace_is_indistinguishable_from_missing() {
        let authz = HidingAuthorizer::new();
        let metadata = RequestMetadata::new_principal("bob");
        let wh = warehouse();
        let ns = namespace(&wh, "finance");
        authz.hide(&format!("namespace:{}", ns.namespace_id));

        let hidden = authz
            .require_namespace_action(
                &metadata,
                &wh,
                ns.namespace_ident.clone(),
                Ok(Some(ns.clone())),
                CatalogNamespaceAction::CanListTables,
            )
            .await
            .unwrap_err();
        let missing = authz
            .require_namespace_action(
                &metadata,
                &wh,
                ns.namespace_ident.clone(),
                Ok(None),
                CatalogNamespaceAction::CanListTables,
            )
            .await
            .unwrap_err();

        let hidden = ErrorModel::from(hidden);
        let missing = ErrorModel::from(missing);
        assert_eq!(hidden.code, 404);
        assert_eq!(hidden.code, missing.code);
        assert_eq!(hidden.r#type, missing.r#type);
        assert_eq!(hidden.message, missing.message);
    }

    #[tokio::test]
    async fn test_blocked_namespace_action_is_forbidden() {
        let authz = HidingAuthorizer::new();
        let wh = warehouse();
        let ns = namespace(&wh, "finance");
        authz.block_action("namespace:can_create_table");

        let err = authz
            .require_namespace_action(
                &RequestMetadata::new_principal("bob"),
                &wh,
                ns.namespace_id,
                Ok(Some(ns.clone())),
                CatalogNamespaceAction::CanCreateTable,
            )
            .await
            .unwrap_err();
        let model = ErrorModel::from(err);
        assert_eq!(model.code, 403);
        assert_eq!(model.r#type, "NamespaceActionForbidden");
    }

    #[tokio::test]
    async fn test_list_filtering_keeps_order() {
        let authz = HidingAuthorizer::new();
        let wh = warehouse();
        let visible = namespace(&wh, "a");
        let hidden = namespace(&wh, "b");
        authz.hide(&format!("namespace:{}", hidden.namespace_id));

        let decisions = authz
            .are_allowed_namespace_actions_vec(
                &RequestMetadata::new_principal("bob"),
                &wh,
                &[
                    (&visible, CatalogNamespaceAction::CanIncludeInList),
                    (&hidden, CatalogNamespaceAction::CanIncludeInList),
                ],
            )
            .await
            .unwrap()
            .into_inner();
        assert_eq!(decisions, vec![true, false]);
    }
}
