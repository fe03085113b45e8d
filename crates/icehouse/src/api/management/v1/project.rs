use std::collections::HashSet;

use chrono::{DateTime, Utc};
use icehouse_ext::catalog::rest::ErrorModel;
use serde::{Deserialize, Serialize};

use super::ApiServer;
use crate::{
    ProjectId,
    api::{ApiContext, Result},
    request_metadata::RequestMetadata,
    service::{
        CatalogStore, GetProjectResponse as ProjectRecord, ProjectIdNotFound, SecretStore, State,
        Transaction,
        authz::{
            AuthZProjectOps, AuthZServerOps, Authorizer, CatalogProjectAction, CatalogServerAction,
        },
    },
};

#[derive(Debug, Deserialize)]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
#[serde(rename_all = "kebab-case")]
pub struct CreateProjectRequest {
    /// Name of the project to create.
    pub project_name: String,
    /// Request a specific project ID. Generated if omitted.
    #[serde(default)]
    #[cfg_attr(feature = "open-api", schema(value_type = Option<String>))]
    pub project_id: Option<ProjectId>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
#[serde(rename_all = "kebab-case")]
pub struct CreateProjectResponse {
    /// ID of the created project.
    #[cfg_attr(feature = "open-api", schema(value_type = String))]
    pub project_id: ProjectId,
}

#[derive(Debug, Deserialize)]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
#[serde(rename_all = "kebab-case")]
pub struct RenameProjectRequest {
    /// New name of the project.
    pub new_name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
#[serde(rename_all = "kebab-case")]
pub struct GetProjectResponse {
    #[cfg_attr(feature = "open-api", schema(value_type = String))]
    pub project_id: ProjectId,
    pub project_name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
#[serde(rename_all = "kebab-case")]
pub struct ListProjectsResponse {
    /// Projects the caller is allowed to see.
    pub projects: Vec<GetProjectResponse>,
}

impl From<ProjectRecord> for GetProjectResponse {
    fn from(record: ProjectRecord) -> Self {
        Self {
            project_id: record.project_id,
            project_name: record.name,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

impl<C: CatalogStore, A: Authorizer, S: SecretStore> Service<C, A, S> for ApiServer<C, A, S> {}

#[async_trait::async_trait]
pub trait Service<C: CatalogStore, A: Authorizer, S: SecretStore> {
    async fn create_project(
        request: CreateProjectRequest,
        context: ApiContext<State<A, C, S>>,
        request_metadata: RequestMetadata,
    ) -> Result<CreateProjectResponse> {
        // ------------------- AUTHZ -------------------
        let authorizer = context.v1_state.authz;
        authorizer
            .require_server_action(&request_metadata, CatalogServerAction::CanCreateProject)
            .await?;

        // ------------------- VALIDATIONS -------------------
        let CreateProjectRequest {
            project_name,
            project_id,
        } = request;
        validate_project_name(&project_name)?;
        let project_id = project_id.unwrap_or_else(ProjectId::new_random);

        // ------------------- BUSINESS LOGIC -------------------
        let mut t = C::Transaction::begin_write(context.v1_state.catalog).await?;
        C::create_project(&project_id, project_name, t.transaction()).await?;
        t.commit().await?;
        authorizer
            .create_project(&request_metadata, &project_id)
            .await?;

        tracing::info!(%project_id, "Project created");
        Ok(CreateProjectResponse { project_id })
    }

    async fn get_project(
        project_id: ProjectId,
        context: ApiContext<State<A, C, S>>,
        request_metadata: RequestMetadata,
    ) -> Result<GetProjectResponse> {
        // ------------------- AUTHZ -------------------
        context
            .v1_state
            .authz
            .require_project_action(
                &request_metadata,
                &project_id,
                CatalogProjectAction::CanGetMetadata,
            )
            .await?;

        // ------------------- BUSINESS LOGIC -------------------
        let project = C::get_project(&project_id, context.v1_state.catalog)
            .await?
            .ok_or_else(|| ProjectIdNotFound::new(project_id))?;
        Ok(project.into())
    }

    async fn list_projects(
        context: ApiContext<State<A, C, S>>,
        request_metadata: RequestMetadata,
    ) -> Result<ListProjectsResponse> {
        let authorizer = context.v1_state.authz;
        let projects = C::list_projects(None, context.v1_state.catalog).await?;

        // ------------------- AUTHZ -------------------
        let can_list_all = authorizer
            .is_allowed_server_action(&request_metadata, CatalogServerAction::CanListAllProjects)
            .await?
            .into_inner();
        let projects = if can_list_all {
            projects
        } else {
            let checks = projects
                .iter()
                .map(|p| (&p.project_id, CatalogProjectAction::CanIncludeInList))
                .collect::<Vec<_>>();
            let allowed = authorizer
                .are_allowed_project_actions_vec(&request_metadata, &checks)
                .await?
                .into_inner();
            let visible = projects
                .iter()
                .zip(allowed)
                .filter(|(_, allowed)| *allowed)
                .map(|(p, _)| p.project_id.clone())
                .collect::<HashSet<_>>();
            projects
                .into_iter()
                .filter(|p| visible.contains(&p.project_id))
                .collect()
        };

        Ok(ListProjectsResponse {
            projects: projects.into_iter().map(Into::into).collect(),
        })
    }

    async fn rename_project(
        project_id: ProjectId,
        request: RenameProjectRequest,
        context: ApiContext<State<A, C, S>>,
        request_metadata: RequestMetadata,
    ) -> Result<()> {
        // ------------------- AUTHZ -------------------
        context
            .v1_state
            .authz
            .require_project_action(&request_metadata, &project_id, CatalogProjectAction::CanRename)
            .await?;

        // ------------------- VALIDATIONS -------------------
        validate_project_name(&request.new_name)?;

        // ------------------- BUSINESS LOGIC -------------------
        let mut t = C::Transaction::begin_write(context.v1_state.catalog).await?;
        C::rename_project(&project_id, &request.new_name, t.transaction()).await?;
        t.commit().await?;
        Ok(())
    }

    async fn delete_project(
        project_id: ProjectId,
        context: ApiContext<State<A, C, S>>,
        request_metadata: RequestMetadata,
    ) -> Result<()> {
        // ------------------- AUTHZ -------------------
        let authorizer = context.v1_state.authz;
        authorizer
            .require_project_action(&request_metadata, &project_id, CatalogProjectAction::CanDelete)
            .await?;

        // ------------------- BUSINESS LOGIC -------------------
        let mut t = C::Transaction::begin_write(context.v1_state.catalog).await?;
        C::delete_project(&project_id, t.transaction()).await?;
        t.commit().await?;
        authorizer.delete_project(&project_id).await?;

        tracing::info!(%project_id, "Project deleted");
        Ok(())
    }
}

fn validate_project_name(project_name: &str) -> Result<()> {
    if project_name.trim().is_empty() {
        return Err(ErrorModel::bad_request(
            "Project name cannot be empty",
            "EmptyProjectName",
            None,
        )
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_names() {
        assert!(validate_project_name("analytics").is_ok());
        assert_eq!(validate_project_name("  ").unwrap_err().error.code, 400);
    }

    #[test]
    fn test_create_request_rejects_malformed_id() {
        let request: CreateProjectRequest = serde_json::from_value(serde_json::json!({
            "project-name": "p",
        }))
        .unwrap();
        assert!(request.project_id.is_none());
        let err = serde_json::from_value::<CreateProjectRequest>(serde_json::json!({
            "project-name": "p",
            "project-id": "not a valid id",
        }));
        assert!(err.is_err());
    }
}
