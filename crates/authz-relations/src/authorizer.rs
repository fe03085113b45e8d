use std::{
    collections::{HashSet, VecDeque},
    str::FromStr as _,
    sync::Arc,
};

use icehouse::{
    ProjectId, RequestMetadata,
    api::{ApiContext, Result},
    axum::Router,
    service::{
        Actor, CatalogStore, NamespaceId, NamespaceInfo, ResolvedWarehouse, SecretStore, ServerId,
        State, TableId, TabularId, TabularInfo, ViewId, WarehouseId,
        authz::{
            AuthorizationBackendUnavailable, Authorizer, CatalogNamespaceAction,
            CatalogProjectAction, CatalogServerAction, CatalogTableAction, CatalogViewAction,
            CatalogWarehouseAction, NamespaceParent,
        },
    },
};

use crate::{
    RelationsConfig,
    entities::{Object, Subject},
    error::{RelationsError, RelationsResult},
    relations::{PARENT_RELATION, RequiredRole, Role},
    store::{Tuple, TupleFilter, TupleStore},
};

/// Authorizer backed by relationship tuples in a [`TupleStore`].
#[derive(Clone)]
pub struct RelationsAuthorizer {
    store: Arc<dyn TupleStore>,
    server_id: ServerId,
    max_hierarchy_depth: usize,
}

impl std::fmt::Debug for RelationsAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationsAuthorizer")
            .field("server_id", &self.server_id)
            .field("max_hierarchy_depth", &self.max_hierarchy_depth)
            .finish_non_exhaustive()
    }
}

impl RelationsAuthorizer {
    #[must_use]
    pub fn new(store: Arc<dyn TupleStore>, server_id: ServerId, config: &RelationsConfig) -> Self {
        Self {
            store,
            server_id,
            max_hierarchy_depth: config.max_hierarchy_depth,
        }
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &dyn TupleStore {
        self.store.as_ref()
    }

    #[must_use]
    pub fn server_object(&self) -> Object {
        Object::Server(self.server_id)
    }

    /// Whether `object` is known: the server itself or anything with a parent.
    pub(crate) async fn exists(&self, object: &Object) -> RelationsResult<bool> {
        if let Object::Server(id) = object {
            return Ok(*id == self.server_id);
        }
        let parents = self
            .store
            .read(TupleFilter::object(object.to_tuple_string()).with_relation(PARENT_RELATION))
            .await?;
        Ok(!parents.is_empty())
    }

    /// Highest role `actor` holds on `object`, granted directly or on an ancestor.
    /// `None` for unknown objects.
    pub async fn effective_role(
        &self,
        actor: &Actor,
        object: &Object,
    ) -> RelationsResult<Option<Role>> {
        if !self.exists(object).await? {
            return Ok(None);
        }
        let subjects = Subject::tuple_strings_for_actor(actor);
        let mut best: Option<Role> = None;
        let mut current = Some(object.to_tuple_string());
        let mut depth = 0;

        while let Some(object_string) = current.take() {
            if depth > self.max_hierarchy_depth {
                return Err(RelationsError::HierarchyTooDeep {
                    object: object.to_tuple_string(),
                    max_depth: self.max_hierarchy_depth,
                });
            }
            for tuple in self.store.read(TupleFilter::object(object_string)).await? {
                if tuple.relation == PARENT_RELATION {
                    current = Some(tuple.subject);
                } else if subjects.contains(&tuple.subject) {
                    if let Ok(role) = Role::from_str(&tuple.relation) {
                        best = best.max(Some(role));
                    }
                }
            }
            if best == Some(Role::Ownership) {
                break;
            }
            depth += 1;
        }
        Ok(best)
    }

    pub async fn check(&self, actor: &Actor, object: &Object, role: Role) -> RelationsResult<bool> {
        let allowed = self
            .effective_role(actor, object)
            .await?
            .is_some_and(|held| held.implies(role));
        tracing::trace!(%actor, object = %object.to_tuple_string(), %role, allowed, "Checked role");
        Ok(allowed)
    }

    /// Roles granted directly on `object`.
    pub(crate) async fn assignments(&self, object: &Object) -> RelationsResult<Vec<(Subject, Role)>> {
        self.store
            .read(TupleFilter::object(object.to_tuple_string()))
            .await?
            .into_iter()
            .filter(|t| t.relation != PARENT_RELATION)
            .map(|t| {
                let role = Role::from_str(&t.relation)
                    .map_err(|_| RelationsError::InvalidEntity(t.relation.clone()))?;
                Ok((Subject::parse_tuple_string(&t.subject)?, role))
            })
            .collect()
    }

    pub(crate) async fn update_assignments(
        &self,
        object: &Object,
        writes: &[(Subject, Role)],
        deletes: &[(Subject, Role)],
    ) -> RelationsResult<()> {
        let to_tuple = |(subject, role): &(Subject, Role)| {
            Tuple::new(
                object.to_tuple_string(),
                role.to_string(),
                subject.to_tuple_string(),
            )
        };
        self.store
            .write(
                writes.iter().map(to_tuple).collect(),
                deletes.iter().map(to_tuple).collect(),
            )
            .await?;
        Ok(())
    }

    async fn is_allowed(
        &self,
        metadata: &RequestMetadata,
        object: Object,
        action: impl RequiredRole,
    ) -> std::result::Result<bool, AuthorizationBackendUnavailable> {
        self.check(metadata.actor(), &object, action.required_role())
            .await
            .map_err(Into::into)
    }

    /// Link `object` below `parent` and make the caller its owner.
    async fn create_child(
        &self,
        metadata: &RequestMetadata,
        object: Object,
        parent: Object,
    ) -> RelationsResult<()> {
        let object_string = object.to_tuple_string();
        let mut writes = vec![Tuple::new(
            object_string.clone(),
            PARENT_RELATION,
            parent.to_tuple_string(),
        )];
        if let Some(user_id) = metadata.user_id() {
            writes.push(Tuple::new(
                object_string,
                Role::Ownership.to_string(),
                Subject::User(user_id.clone()).to_tuple_string(),
            ));
        }
        self.store.write(writes, vec![]).await?;
        tracing::debug!(object = %object.to_tuple_string(), parent = %parent.to_tuple_string(), "Registered object");
        Ok(())
    }

    /// Remove `object` and everything below it.
    async fn delete_subtree(&self, object: &Object) -> RelationsResult<()> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([object.to_tuple_string()]);
        let mut deletes = Vec::new();

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            deletes.extend(self.store.read(TupleFilter::object(current.clone())).await?);
            let children = self
                .store
                .read(
                    TupleFilter::default()
                        .with_relation(PARENT_RELATION)
                        .with_subject(current),
                )
                .await?;
            queue.extend(children.into_iter().map(|t| t.object));
        }

        let objects = visited.len();
        self.store.write(vec![], deletes).await?;
        tracing::debug!(object = %object.to_tuple_string(), objects, "Removed object subtree");
        Ok(())
    }

    async fn reparent(&self, object: &Object, new_parent: &Object) -> RelationsResult<()> {
        let old = self
            .store
            .read(TupleFilter::object(object.to_tuple_string()).with_relation(PARENT_RELATION))
            .await?;
        let new = Tuple::new(
            object.to_tuple_string(),
            PARENT_RELATION,
            new_parent.to_tuple_string(),
        );
        self.store.write(vec![new], old).await?;
        Ok(())
    }
}

fn tabular_object(tabular_id: TabularId) -> Object {
    match tabular_id {
        TabularId::Table(id) => Object::Table(id),
        TabularId::View(id) => Object::View(id),
    }
}

#[async_trait::async_trait]
impl Authorizer for RelationsAuthorizer {
    fn implementation_name() -> &'static str {
        "relations"
    }

    fn server_id(&self) -> ServerId {
        self.server_id
    }

    fn new_router<C: CatalogStore, S: SecretStore>(&self) -> Router<ApiContext<State<Self, C, S>>> {
        crate::api::new_v1_router()
    }

    async fn can_bootstrap(&self, metadata: &RequestMetadata) -> Result<()> {
        if metadata.user_id().is_none() {
            return Err(RelationsError::AuthenticationRequired.into());
        }
        Ok(())
    }

    /// The bootstrapping user owns the server. Operators are not distinguished.
    async fn bootstrap(&self, metadata: &RequestMetadata, is_operator: bool) -> Result<()> {
        let user_id = metadata
            .user_id()
            .ok_or(RelationsError::AuthenticationRequired)?;
        self.update_assignments(
            &self.server_object(),
            &[(Subject::User(user_id.clone()), Role::Ownership)],
            &[],
        )
        .await?;
        tracing::info!(%user_id, is_operator, "Granted server ownership");
        Ok(())
    }

    async fn is_allowed_server_action_impl(
        &self,
        metadata: &RequestMetadata,
        action: CatalogServerAction,
    ) -> std::result::Result<bool, AuthorizationBackendUnavailable> {
        self.is_allowed(metadata, self.server_object(), action).await
    }

    async fn is_allowed_project_action_impl(
        &self,
        metadata: &RequestMetadata,
        project_id: &ProjectId,
        action: CatalogProjectAction,
    ) -> std::result::Result<bool, AuthorizationBackendUnavailable> {
        self.is_allowed(metadata, Object::Project(project_id.clone()), action)
            .await
    }

    async fn is_allowed_warehouse_action_impl(
        &self,
        metadata: &RequestMetadata,
        warehouse: &ResolvedWarehouse,
        action: CatalogWarehouseAction,
    ) -> std::result::Result<bool, AuthorizationBackendUnavailable> {
        self.is_allowed(metadata, Object::Warehouse(warehouse.warehouse_id), action)
            .await
    }

    async fn is_allowed_namespace_action_impl(
        &self,
        metadata: &RequestMetadata,
        _warehouse: &ResolvedWarehouse,
        namespace: &NamespaceInfo,
        action: CatalogNamespaceAction,
    ) -> std::result::Result<bool, AuthorizationBackendUnavailable> {
        self.is_allowed(metadata, Object::Namespace(namespace.namespace_id), action)
            .await
    }

    async fn is_allowed_table_action_impl(
        &self,
        metadata: &RequestMetadata,
        _warehouse: &ResolvedWarehouse,
        table: &TabularInfo,
        action: CatalogTableAction,
    ) -> std::result::Result<bool, AuthorizationBackendUnavailable> {
        self.is_allowed(metadata, tabular_object(table.tabular_id), action)
            .await
    }

    async fn is_allowed_view_action_impl(
        &self,
        metadata: &RequestMetadata,
        _warehouse: &ResolvedWarehouse,
        view: &TabularInfo,
        action: CatalogViewAction,
    ) -> std::result::Result<bool, AuthorizationBackendUnavailable> {
        self.is_allowed(metadata, tabular_object(view.tabular_id), action)
            .await
    }

    async fn create_project(
        &self,
        metadata: &RequestMetadata,
        project_id: &ProjectId,
    ) -> Result<()> {
        self.create_child(
            metadata,
            Object::Project(project_id.clone()),
            self.server_object(),
        )
        .await?;
        Ok(())
    }

    async fn delete_project(&self, project_id: &ProjectId) -> Result<()> {
        self.delete_subtree(&Object::Project(project_id.clone()))
            .await?;
        Ok(())
    }

    async fn create_warehouse(
        &self,
        metadata: &RequestMetadata,
        warehouse_id: WarehouseId,
        parent_project_id: &ProjectId,
    ) -> Result<()> {
        self.create_child(
            metadata,
            Object::Warehouse(warehouse_id),
            Object::Project(parent_project_id.clone()),
        )
        .await?;
        Ok(())
    }

    async fn delete_warehouse(&self, warehouse_id: WarehouseId) -> Result<()> {
        self.delete_subtree(&Object::Warehouse(warehouse_id)).await?;
        Ok(())
    }

    async fn create_namespace(
        &self,
        metadata: &RequestMetadata,
        namespace_id: NamespaceId,
        parent: NamespaceParent,
    ) -> Result<()> {
        let parent = match parent {
            NamespaceParent::Warehouse(id) => Object::Warehouse(id),
            NamespaceParent::Namespace(id) => Object::Namespace(id),
        };
        self.create_child(metadata, Object::Namespace(namespace_id), parent)
            .await?;
        Ok(())
    }

    async fn delete_namespace(&self, namespace_id: NamespaceId) -> Result<()> {
        self.delete_subtree(&Object::Namespace(namespace_id)).await?;
        Ok(())
    }

    async fn create_table(
        &self,
        metadata: &RequestMetadata,
        _warehouse_id: WarehouseId,
        table_id: TableId,
        parent: NamespaceId,
    ) -> Result<()> {
        self.create_child(metadata, Object::Table(table_id), Object::Namespace(parent))
            .await?;
        Ok(())
    }

    async fn delete_table(&self, _warehouse_id: WarehouseId, table_id: TableId) -> Result<()> {
        self.delete_subtree(&Object::Table(table_id)).await?;
        Ok(())
    }

    async fn create_view(
        &self,
        metadata: &RequestMetadata,
        _warehouse_id: WarehouseId,
        view_id: ViewId,
        parent: NamespaceId,
    ) -> Result<()> {
        self.create_child(metadata, Object::View(view_id), Object::Namespace(parent))
            .await?;
        Ok(())
    }

    async fn delete_view(&self, _warehouse_id: WarehouseId, view_id: ViewId) -> Result<()> {
        self.delete_subtree(&Object::View(view_id)).await?;
        Ok(())
    }

    async fn move_tabular(
        &self,
        _warehouse_id: WarehouseId,
        tabular_id: TabularId,
        new_parent: NamespaceId,
    ) -> Result<()> {
        self.reparent(&tabular_object(tabular_id), &Object::Namespace(new_parent))
            .await?;
        Ok(())
    }
}
