use icehouse_ext::{
    NamespaceIdent, TableIdent,
    catalog::rest::{
        CreateNamespaceRequest, CreateNamespaceResponse, CreateTableRequest, CreateViewRequest,
        LoadTableResult, LoadViewResult,
    },
    spec::{NestedField, Schema, SqlViewRepresentation, Type, ViewRepresentation, ViewVersion},
};

use super::{TestContext, random_request_metadata};
use crate::{
    api::iceberg::{
        types::Prefix,
        v1::{
            DataAccessMode, NamespaceParameters, TableParameters, ViewParameters,
            namespace::NamespaceService as _,
            tables::{LoadTableResultOrNotModified, TablesService as _},
            views::ViewService as _,
        },
    },
    server::CatalogServer,
    service::authz::Authorizer,
};

/// Schema with one optional `string` field per name. Ids start at 1.
pub(crate) fn schema_with_fields(names: &[&str]) -> Schema {
    Schema::new(
        0,
        names
            .iter()
            .zip(1..)
            .map(|(name, id)| NestedField::new(id, *name, Type::primitive("string"), false))
            .collect(),
    )
}

pub(crate) fn ns(levels: &[&str]) -> NamespaceIdent {
    NamespaceIdent::from_vec(levels.iter().map(ToString::to_string).collect()).unwrap()
}

pub(crate) async fn create_ns<A: Authorizer + Clone>(
    ctx: TestContext<A>,
    prefix: &str,
    namespace: NamespaceIdent,
) -> crate::api::Result<CreateNamespaceResponse> {
    CatalogServer::create_namespace(
        Some(Prefix(prefix.to_string())),
        CreateNamespaceRequest {
            namespace,
            properties: None,
        },
        ctx,
        random_request_metadata(),
    )
    .await
}

pub(crate) async fn create_table<A: Authorizer + Clone>(
    ctx: TestContext<A>,
    prefix: &str,
    namespace: NamespaceIdent,
    name: &str,
    fields: &[&str],
) -> crate::api::Result<LoadTableResult> {
    create_table_with_access(
        ctx,
        prefix,
        namespace,
        name,
        fields,
        false,
        DataAccessMode::ClientManaged,
    )
    .await
}

pub(crate) async fn create_table_with_access<A: Authorizer + Clone>(
    ctx: TestContext<A>,
    prefix: &str,
    namespace: NamespaceIdent,
    name: &str,
    fields: &[&str],
    stage: bool,
    data_access: DataAccessMode,
) -> crate::api::Result<LoadTableResult> {
    CatalogServer::create_table(
        NamespaceParameters {
            prefix: Some(Prefix(prefix.to_string())),
            namespace,
        },
        CreateTableRequest {
            name: name.to_string(),
            location: None,
            schema: schema_with_fields(fields),
            partition_spec: None,
            write_order: None,
            stage_create: Some(stage),
            properties: None,
        },
        data_access,
        ctx,
        random_request_metadata(),
    )
    .await
}

pub(crate) fn table_params(prefix: &str, table: TableIdent) -> TableParameters {
    TableParameters {
        prefix: Some(Prefix(prefix.to_string())),
        table,
    }
}

pub(crate) async fn load_table<A: Authorizer + Clone>(
    ctx: TestContext<A>,
    prefix: &str,
    table: TableIdent,
) -> crate::api::Result<LoadTableResult> {
    let result = CatalogServer::load_table(
        table_params(prefix, table),
        DataAccessMode::ClientManaged,
        ctx,
        random_request_metadata(),
        vec![],
    )
    .await?;
    match result {
        LoadTableResultOrNotModified::LoadTableResult(result) => Ok(result),
        LoadTableResultOrNotModified::NotModifiedResponse(_) => {
            panic!("no If-None-Match was sent")
        }
    }
}

pub(crate) fn sql_version(sql: &str) -> ViewVersion {
    ViewVersion {
        version_id: 1,
        schema_id: 0,
        timestamp_ms: 0,
        summary: maplit::hashmap! {"engine-name".to_string() => "spark".to_string()},
        representations: vec![ViewRepresentation::Sql(SqlViewRepresentation {
            sql: sql.to_string(),
            dialect: "spark".to_string(),
        })],
        default_catalog: None,
        default_namespace: vec![],
    }
}

pub(crate) async fn create_view<A: Authorizer + Clone>(
    ctx: TestContext<A>,
    prefix: &str,
    namespace: NamespaceIdent,
    name: &str,
    sql: &str,
) -> crate::api::Result<LoadViewResult> {
    CatalogServer::create_view(
        NamespaceParameters {
            prefix: Some(Prefix(prefix.to_string())),
            namespace,
        },
        CreateViewRequest {
            name: name.to_string(),
            location: None,
            schema: schema_with_fields(&["id"]),
            view_version: sql_version(sql),
            properties: std::collections::HashMap::new(),
        },
        ctx,
        random_request_metadata(),
    )
    .await
}

pub(crate) fn view_params(prefix: &str, view: TableIdent) -> ViewParameters {
    ViewParameters {
        prefix: Some(Prefix(prefix.to_string())),
        view,
    }
}

pub(crate) async fn load_view<A: Authorizer + Clone>(
    ctx: TestContext<A>,
    prefix: &str,
    view: TableIdent,
) -> crate::api::Result<LoadViewResult> {
    CatalogServer::load_view(view_params(prefix, view), ctx, random_request_metadata()).await
}
