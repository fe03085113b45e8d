use crate::{
    ProjectId,
    request_metadata::RequestMetadata,
    service::{
        ProjectIdNotFound,
        authz::{
            AuthorizationBackendUnavailable, AuthorizationCountMismatch, Authorizer,
            CatalogProjectAction, MustUse, define_action_forbidden, define_require_action_error,
        },
    },
};

const CAN_SEE_PERMISSION: CatalogProjectAction = CatalogProjectAction::CanGetMetadata;

// --------------------------- Errors ---------------------------
define_action_forbidden!(
    AuthZProjectActionForbidden,
    "Project",
    "ProjectActionForbidden",
    &ProjectId
);

define_require_action_error!(RequireProjectActionError {
    AuthZProjectActionForbidden,
    ProjectIdNotFound,
});

// --------------------------- Project Ops ---------------------------
#[async_trait::async_trait]
pub trait AuthZProjectOps: Authorizer {
    async fn are_allowed_project_actions_vec(
        &self,
        metadata: &RequestMetadata,
        projects_with_actions: &[(&ProjectId, CatalogProjectAction)],
    ) -> Result<MustUse<Vec<bool>>, RequireProjectActionError> {
        let decisions = self
            .are_allowed_project_actions_impl(metadata, projects_with_actions)
            .await?;
        if decisions.len() != projects_with_actions.len() {
            return Err(AuthorizationCountMismatch::new(
                projects_with_actions.len(),
                decisions.len(),
                "project",
            )
            .into());
        }
        Ok(decisions.into())
    }

    async fn is_allowed_project_action(
        &self,
        metadata: &RequestMetadata,
        project_id: &ProjectId,
        action: CatalogProjectAction,
    ) -> Result<MustUse<bool>, AuthorizationBackendUnavailable> {
        self.is_allowed_project_action_impl(metadata, project_id, action)
            .await
            .map(MustUse::from)
    }

    /// Projects the caller may not see are reported as missing.
    async fn require_project_action(
        &self,
        metadata: &RequestMetadata,
        project_id: &ProjectId,
        action: CatalogProjectAction,
    ) -> Result<(), RequireProjectActionError> {
        let [can_see, is_allowed]: [bool; 2] = self
            .are_allowed_project_actions_vec(
                metadata,
                &[(project_id, CAN_SEE_PERMISSION), (project_id, action)],
            )
            .await?
            .into_inner()
            .try_into()
            .map_err(|v: Vec<bool>| AuthorizationCountMismatch::new(2, v.len(), "project"))?;

        if !can_see {
            return Err(ProjectIdNotFound::new(project_id.clone()).into());
        }
        if !is_allowed {
            return Err(AuthZProjectActionForbidden::new(
                project_id,
                action,
                metadata.actor().clone(),
            )
            .into());
        }
        Ok(())
    }
}

impl<T> AuthZProjectOps for T where T: Authorizer {}
