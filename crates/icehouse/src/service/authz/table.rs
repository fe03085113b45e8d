use icehouse_ext::TableIdent;

use crate::{
    request_metadata::RequestMetadata,
    service::{
        CatalogBackendError, ResolvedWarehouse, TabularInfo, TabularNotFound, TabularType,
        authz::{
            AuthorizationCountMismatch, Authorizer, BackendUnavailableOrCountMismatch,
            CatalogTableAction, MustUse, define_action_forbidden, define_require_action_error,
        },
    },
};

const CAN_SEE_PERMISSION: CatalogTableAction = CatalogTableAction::CanGetMetadata;

// --------------------------- Errors ---------------------------
define_action_forbidden!(
    AuthZTableActionForbidden,
    "Table",
    "TableActionForbidden",
    &TableIdent
);

define_require_action_error!(RequireTableActionError {
    AuthZTableActionForbidden,
    TabularNotFound,
});

// --------------------------- Table Ops ---------------------------
#[async_trait::async_trait]
pub trait AuthZTableOps: Authorizer {
    /// Check `action` on a table resolved from the catalog store.
    ///
    /// `T` is anything carrying the table's [`TabularInfo`], so callers get back the
    /// full record they passed in. Hidden tables are answered like missing tables.
    async fn require_table_action<T: AsRef<TabularInfo> + Send + Sync>(
        &self,
        metadata: &RequestMetadata,
        warehouse: &ResolvedWarehouse,
        user_provided_table: impl ToString + Send,
        table: Result<Option<T>, CatalogBackendError>,
        action: CatalogTableAction,
    ) -> Result<T, RequireTableActionError> {
        self.require_table_actions(metadata, warehouse, user_provided_table, table, &[action])
            .await
    }

    /// Like [`Self::require_table_action`] but every action in `actions` must be allowed.
    async fn require_table_actions<T: AsRef<TabularInfo> + Send + Sync>(
        &self,
        metadata: &RequestMetadata,
        warehouse: &ResolvedWarehouse,
        user_provided_table: impl ToString + Send,
        table: Result<Option<T>, CatalogBackendError>,
        actions: &[CatalogTableAction],
    ) -> Result<T, RequireTableActionError> {
        let user_provided_table = user_provided_table.to_string();
        let cant_see_err = || -> RequireTableActionError {
            TabularNotFound::new(
                warehouse.warehouse_id,
                TabularType::Table,
                &user_provided_table,
            )
            .append_detail("Table not found or access denied")
            .into()
        };
        let Some(table) = table? else {
            return Err(cant_see_err());
        };
        let info = table.as_ref();

        let mut checks = Vec::with_capacity(actions.len() + 1);
        checks.push((info, CAN_SEE_PERMISSION));
        checks.extend(actions.iter().map(|action| (info, *action)));
        let decisions = self
            .are_allowed_table_actions_vec(metadata, warehouse, &checks)
            .await?
            .into_inner();

        if !decisions.first().copied().unwrap_or(false) {
            return Err(cant_see_err());
        }
        if let Some((action, _)) = actions
            .iter()
            .zip(decisions.iter().skip(1))
            .find(|(_, allowed)| !**allowed)
        {
            return Err(AuthZTableActionForbidden::new(
                &info.tabular_ident,
                action,
                metadata.actor().clone(),
            )
            .into());
        }
        Ok(table)
    }

    async fn is_allowed_table_action(
        &self,
        metadata: &RequestMetadata,
        warehouse: &ResolvedWarehouse,
        table: &TabularInfo,
        action: CatalogTableAction,
    ) -> Result<MustUse<bool>, BackendUnavailableOrCountMismatch> {
        let decision = self
            .is_allowed_table_action_impl(metadata, warehouse, table, action)
            .await?;
        Ok(decision.into())
    }

    async fn are_allowed_table_actions_vec(
        &self,
        metadata: &RequestMetadata,
        warehouse: &ResolvedWarehouse,
        tables_with_actions: &[(&TabularInfo, CatalogTableAction)],
    ) -> Result<MustUse<Vec<bool>>, BackendUnavailableOrCountMismatch> {
        let decisions = self
            .are_allowed_table_actions_impl(metadata, warehouse, tables_with_actions)
            .await?;

        if decisions.len() != tables_with_actions.len() {
            return Err(AuthorizationCountMismatch::new(
                tables_with_actions.len(),
                decisions.len(),
                "table",
            )
            .into());
        }

        Ok(decisions.into())
    }
}

impl<T> AuthZTableOps for T where T: Authorizer {}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::Utc;
    use icehouse_ext::catalog::rest::ErrorModel;

    use super::*;
    use crate::service::{
        TableId, TabularId,
        authz::{
            namespace::tests::namespace, tests::HidingAuthorizer, warehouse::tests::warehouse,
        },
    };

    pub(crate) fn tabular(
        warehouse: &ResolvedWarehouse,
        tabular_id: TabularId,
        name: &str,
    ) -> TabularInfo {
        let ns = namespace(warehouse, "sales");
        TabularInfo {
            tabular_id,
            warehouse_id: warehouse.warehouse_id,
            namespace_id: ns.namespace_id,
            tabular_ident: TableIdent::new(ns.namespace_ident, name),
            location: format!("memory://icehouse/lake/{}", tabular_id.uuid()),
            metadata_location: None,
            deletion: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_hidden_table_is_not_found() {
        let authz = HidingAuthorizer::new();
        let wh = warehouse();
        let table_id = TableId::new_random();
        let info = tabular(&wh, table_id.into(), "orders");
        authz.hide(&format!("table:{}", *table_id));

        let err = authz
            .require_table_action(
                &RequestMetadata::new_principal("bob"),
                &wh,
                &info.tabular_ident,
                Ok(Some(info.clone())),
                CatalogTableAction::CanReadData,
            )
            .await
            .unwrap_err();
        let model = ErrorModel::from(err);
        assert_eq!(model.code, 404);
        assert_eq!(model.r#type, "NoSuchTableException");
    }

    #[tokio::test]
    async fn test_every_action_must_be_allowed() {
        let authz = HidingAuthorizer::new();
        let wh = warehouse();
        let info = tabular(&wh, TableId::new_random().into(), "orders");
        authz.block_action("table:can_write_data");
        let metadata = RequestMetadata::new_principal("bob");

        let table = authz
            .require_table_actions(
                &metadata,
                &wh,
                &info.tabular_ident,
                Ok(Some(info.clone())),
                &[CatalogTableAction::CanReadData],
            )
            .await
            .unwrap();
        assert_eq!(table, info);

        let err = authz
            .require_table_actions(
                &metadata,
                &wh,
                &info.tabular_ident,
                Ok(Some(info.clone())),
                &[CatalogTableAction::CanReadData, CatalogTableAction::CanWriteData],
            )
            .await
            .unwrap_err();
        let model = ErrorModel::from(err);
        assert_eq!(model.code, 403);
        assert!(model.message.contains("can_write_data"), "{}", model.message);
    }
}
