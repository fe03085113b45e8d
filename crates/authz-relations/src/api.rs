use std::str::FromStr as _;

use axum::{
    Extension, Json, Router,
    extract::{Path, State as AxumState},
    routing::{get, post},
};
use http::StatusCode;
use icehouse::{
    RequestMetadata,
    api::{ApiContext, ErrorModel, Result},
    service::{CatalogStore, SecretStore, State},
};
use serde::{Deserialize, Serialize};

use crate::{
    ObjectType, RelationsAuthorizer,
    entities::{Object, Subject},
    error::RelationsError,
    relations::Role,
};

type RelationsContext<C, S> = ApiContext<State<RelationsAuthorizer, C, S>>;

pub(super) fn new_v1_router<C: CatalogStore, S: SecretStore>()
-> Router<RelationsContext<C, S>> {
    Router::new()
        .route("/permissions/check", post(crate::check::check::<C, S>))
        .route("/permissions/server/access", get(get_server_access::<C, S>))
        .route(
            "/permissions/server/assignments",
            get(get_server_assignments::<C, S>).post(update_server_assignments::<C, S>),
        )
        .route(
            "/permissions/{object_type}/{object_id}/access",
            get(get_access::<C, S>),
        )
        .route(
            "/permissions/{object_type}/{object_id}/assignments",
            get(get_assignments::<C, S>).post(update_assignments::<C, S>),
        )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct Assignment {
    pub(crate) subject: Subject,
    pub(crate) role: Role,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct GetAssignmentsResponse {
    pub(crate) assignments: Vec<Assignment>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct UpdateAssignmentsRequest {
    #[serde(default)]
    pub(crate) writes: Vec<Assignment>,
    #[serde(default)]
    pub(crate) deletes: Vec<Assignment>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct GetAccessResponse {
    /// Highest role the caller holds, directly or inherited.
    pub(crate) role: Role,
}

fn parse_object(object_type: &str, object_id: &str) -> Result<Object> {
    let object_type = ObjectType::from_str(object_type)
        .map_err(|_| RelationsError::UnknownType(object_type.to_string()))?;
    Ok(Object::from_type_and_id(object_type, object_id)?)
}

/// Resolve the caller's role on `object`. Objects the caller holds no role on
/// are reported as missing. Returns the held role if it implies `required`.
pub(crate) async fn require_role(
    authorizer: &RelationsAuthorizer,
    metadata: &RequestMetadata,
    object: &Object,
    required: Role,
) -> Result<Role> {
    let held = authorizer
        .effective_role(metadata.actor(), object)
        .await
        .map_err(ErrorModel::from)?;
    match held {
        None => Err(ErrorModel::not_found(
            format!("{} does not exist", object.to_tuple_string()),
            "ObjectNotFound",
            None,
        )
        .into()),
        Some(held) if held.implies(required) => Ok(held),
        Some(held) => Err(ErrorModel::forbidden(
            format!(
                "Role `{required}` on {} required, caller holds `{held}`",
                object.to_tuple_string()
            ),
            "PermissionDenied",
            None,
        )
        .into()),
    }
}

async fn access(
    authorizer: &RelationsAuthorizer,
    metadata: &RequestMetadata,
    object: &Object,
) -> Result<Json<GetAccessResponse>> {
    let role = require_role(authorizer, metadata, object, Role::Describe).await?;
    Ok(Json(GetAccessResponse { role }))
}

async fn assignments(
    authorizer: &RelationsAuthorizer,
    metadata: &RequestMetadata,
    object: &Object,
) -> Result<Json<GetAssignmentsResponse>> {
    require_role(authorizer, metadata, object, Role::Ownership).await?;
    let assignments = authorizer
        .assignments(object)
        .await
        .map_err(ErrorModel::from)?
        .into_iter()
        .map(|(subject, role)| Assignment { subject, role })
        .collect();
    Ok(Json(GetAssignmentsResponse { assignments }))
}

async fn update(
    authorizer: &RelationsAuthorizer,
    metadata: &RequestMetadata,
    object: &Object,
    request: UpdateAssignmentsRequest,
) -> Result<StatusCode> {
    require_role(authorizer, metadata, object, Role::Ownership).await?;

    let writes: Vec<_> = request
        .writes
        .into_iter()
        .map(|a| (a.subject, a.role))
        .collect();
    let deletes: Vec<_> = request
        .deletes
        .into_iter()
        .map(|a| (a.subject, a.role))
        .collect();

    if *object == authorizer.server_object() {
        let owners_left = authorizer
            .assignments(object)
            .await
            .map_err(ErrorModel::from)?
            .into_iter()
            .chain(writes.iter().cloned())
            .filter(|assignment| assignment.1 == Role::Ownership && !deletes.contains(assignment))
            .count();
        if owners_left == 0 {
            return Err(ErrorModel::conflict(
                "The server must keep at least one directly assigned owner",
                "LastServerOwner",
                None,
            )
            .into());
        }
    }

    authorizer
        .update_assignments(object, &writes, &deletes)
        .await
        .map_err(ErrorModel::from)?;
    tracing::info!(
        actor = %metadata.actor(),
        object = %object.to_tuple_string(),
        writes = writes.len(),
        deletes = deletes.len(),
        "Updated role assignments"
    );
    Ok(StatusCode::NO_CONTENT)
}

async fn get_server_access<C: CatalogStore, S: SecretStore>(
    AxumState(api_context): AxumState<RelationsContext<C, S>>,
    Extension(metadata): Extension<RequestMetadata>,
) -> Result<Json<GetAccessResponse>> {
    let authorizer = api_context.v1_state.authz;
    access(&authorizer, &metadata, &authorizer.server_object()).await
}

async fn get_server_assignments<C: CatalogStore, S: SecretStore>(
    AxumState(api_context): AxumState<RelationsContext<C, S>>,
    Extension(metadata): Extension<RequestMetadata>,
) -> Result<Json<GetAssignmentsResponse>> {
    let authorizer = api_context.v1_state.authz;
    assignments(&authorizer, &metadata, &authorizer.server_object()).await
}

async fn update_server_assignments<C: CatalogStore, S: SecretStore>(
    AxumState(api_context): AxumState<RelationsContext<C, S>>,
    Extension(metadata): Extension<RequestMetadata>,
    Json(request): Json<UpdateAssignmentsRequest>,
) -> Result<StatusCode> {
    let authorizer = api_context.v1_state.authz;
    update(&authorizer, &metadata, &authorizer.server_object(), request).await
}

async fn get_access<C: CatalogStore, S: SecretStore>(
    Path((object_type, object_id)): Path<(String, String)>,
    AxumState(api_context): AxumState<RelationsContext<C, S>>,
    Extension(metadata): Extension<RequestMetadata>,
) -> Result<Json<GetAccessResponse>> {
    let object = parse_object(&object_type, &object_id)?;
    access(&api_context.v1_state.authz, &metadata, &object).await
}

async fn get_assignments<C: CatalogStore, S: SecretStore>(
    Path((object_type, object_id)): Path<(String, String)>,
    AxumState(api_context): AxumState<RelationsContext<C, S>>,
    Extension(metadata): Extension<RequestMetadata>,
) -> Result<Json<GetAssignmentsResponse>> {
    let object = parse_object(&object_type, &object_id)?;
    assignments(&api_context.v1_state.authz, &metadata, &object).await
}

async fn update_assignments<C: CatalogStore, S: SecretStore>(
    Path((object_type, object_id)): Path<(String, String)>,
    AxumState(api_context): AxumState<RelationsContext<C, S>>,
    Extension(metadata): Extension<RequestMetadata>,
    Json(request): Json<UpdateAssignmentsRequest>,
) -> Result<StatusCode> {
    let object = parse_object(&object_type, &object_id)?;
    update(&api_context.v1_state.authz, &metadata, &object, request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_object() {
        assert!(matches!(
            parse_object("project", "analytics").unwrap(),
            Object::Project(_)
        ));
        assert_eq!(parse_object("bucket", "x").unwrap_err().error.code, 400);
        assert_eq!(parse_object("user", "alice").unwrap_err().error.code, 400);
        assert_eq!(
            parse_object("warehouse", "not-a-uuid")
                .unwrap_err()
                .error
                .code,
            400
        );
    }

    #[test]
    fn test_update_request_defaults() {
        let request: UpdateAssignmentsRequest = serde_json::from_value(serde_json::json!({
            "writes": [{"subject": {"type": "user", "id": "bob"}, "role": "select"}]
        }))
        .unwrap();
        assert_eq!(request.writes.len(), 1);
        assert_eq!(request.writes[0].role, Role::Select);
        assert!(request.deletes.is_empty());
    }
}
