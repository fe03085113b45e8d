use axum::{Extension, Json, extract::State as AxumState};
use icehouse::{
    RequestMetadata,
    api::{ApiContext, ErrorModel, Result},
    service::{Actor, CatalogStore, SecretStore, State},
};
use serde::{Deserialize, Serialize};

use crate::{
    RelationsAuthorizer,
    api::require_role,
    entities::{Object, Subject},
    relations::Role,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct CheckRequest {
    pub(crate) object: Object,
    pub(crate) role: Role,
    /// Check on behalf of another subject. Defaults to the caller.
    #[serde(default)]
    pub(crate) subject: Option<Subject>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct CheckResponse {
    pub(crate) allowed: bool,
}

/// Check whether the caller, or the given subject, holds a role on an object.
/// Checking for someone else requires ownership of the object.
pub(super) async fn check<C: CatalogStore, S: SecretStore>(
    AxumState(api_context): AxumState<ApiContext<State<RelationsAuthorizer, C, S>>>,
    Extension(metadata): Extension<RequestMetadata>,
    Json(request): Json<CheckRequest>,
) -> Result<Json<CheckResponse>> {
    let authorizer = api_context.v1_state.authz;
    let allowed = check_internal(&authorizer, &metadata, request).await?;
    Ok(Json(CheckResponse { allowed }))
}

async fn check_internal(
    authorizer: &RelationsAuthorizer,
    metadata: &RequestMetadata,
    request: CheckRequest,
) -> Result<bool> {
    let CheckRequest {
        object,
        role,
        subject,
    } = request;

    let caller = metadata.actor();
    let target = match subject {
        None => caller.clone(),
        Some(Subject::User(user_id)) => Actor::Principal(user_id),
        Some(Subject::Everyone) => Actor::Anonymous,
    };

    if target == *caller {
        // The caller may always learn about their own access, but unknown or
        // invisible objects stay hidden.
        let held = authorizer
            .effective_role(caller, &object)
            .await
            .map_err(ErrorModel::from)?;
        return match held {
            None => require_role(authorizer, metadata, &object, Role::Describe)
                .await
                .map(|_| false),
            Some(held) => Ok(held.implies(role)),
        };
    }

    require_role(authorizer, metadata, &object, Role::Ownership).await?;
    Ok(authorizer
        .check(&target, &object, role)
        .await
        .map_err(ErrorModel::from)?)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use icehouse::{
        ProjectId,
        service::{ServerId, authz::Authorizer as _},
    };
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{InMemoryTupleStore, RelationsConfig};

    async fn setup() -> (RelationsAuthorizer, Object) {
        let authorizer = RelationsAuthorizer::new(
            Arc::new(InMemoryTupleStore::new()),
            ServerId::new_random(),
            &RelationsConfig::default(),
        );
        let project_id = ProjectId::new_random();
        authorizer
            .create_project(&RequestMetadata::new_principal("alice"), &project_id)
            .await
            .unwrap();
        (authorizer, Object::Project(project_id))
    }

    fn request(object: &Object, role: Role, subject: Option<&str>) -> CheckRequest {
        CheckRequest {
            object: object.clone(),
            role,
            subject: subject.map(|s| Subject::User(icehouse::service::UserId::try_new(s).unwrap())),
        }
    }

    #[tokio::test]
    async fn test_check_own_access() {
        let (authorizer, project) = setup().await;
        let alice = RequestMetadata::new_principal("alice");
        assert!(
            check_internal(&authorizer, &alice, request(&project, Role::Ownership, None))
                .await
                .unwrap()
        );
        // Naming yourself is the same as omitting the subject.
        assert!(
            check_internal(
                &authorizer,
                &alice,
                request(&project, Role::Modify, Some("alice"))
            )
            .await
            .unwrap()
        );
    }

    #[tokio::test]
    async fn test_invisible_object_is_not_found() {
        let (authorizer, project) = setup().await;
        let bob = RequestMetadata::new_principal("bob");
        let err = check_internal(&authorizer, &bob, request(&project, Role::Describe, None))
            .await
            .unwrap_err();
        assert_eq!(err.error.code, 404);
    }

    #[tokio::test]
    async fn test_checking_others_requires_ownership() {
        let (authorizer, project) = setup().await;
        authorizer
            .update_assignments(
                &project,
                &[(
                    Subject::User(icehouse::service::UserId::try_new("bob").unwrap()),
                    Role::Select,
                )],
                &[],
            )
            .await
            .unwrap();

        let alice = RequestMetadata::new_principal("alice");
        assert!(
            check_internal(&authorizer, &alice, request(&project, Role::Select, Some("bob")))
                .await
                .unwrap()
        );
        assert!(
            !check_internal(&authorizer, &alice, request(&project, Role::Modify, Some("bob")))
                .await
                .unwrap()
        );

        let bob = RequestMetadata::new_principal("bob");
        let err = check_internal(&authorizer, &bob, request(&project, Role::Select, Some("alice")))
            .await
            .unwrap_err();
        assert_eq!(err.error.code, 403);
    }
}
