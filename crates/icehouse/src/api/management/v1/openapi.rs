#![allow(clippy::needless_for_each)]

use utoipa::{OpenApi, openapi::security::SecurityScheme};

#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "Icehouse Management API",
        description = "Manage the server, projects, warehouses and their soft-deleted content.",
    ),
    tags(
        (name = "server", description = "Manage Server"),
        (name = "project", description = "Manage Projects"),
        (name = "warehouse", description = "Manage Warehouses"),
    ),
    security(
        ("bearerAuth" = [])
    ),
    paths(
        super::bootstrap,
        super::create_project,
        super::create_warehouse,
        super::delete_project,
        super::delete_warehouse,
        super::get_project,
        super::get_server_info,
        super::get_warehouse,
        super::list_deleted_tabulars,
        super::list_projects,
        super::list_warehouses,
        super::rename_project,
        super::rename_warehouse,
        super::restore_warehouse,
        super::undrop_tabulars,
        super::update_delete_profile,
        super::update_storage_credential,
    ),
    modifiers(&SecurityAddon)
)]
pub(super) struct ManagementApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi
            .components
            .get_or_insert_with(|| utoipa::openapi::ComponentsBuilder::new().build());
        components.add_security_scheme(
            "bearerAuth",
            SecurityScheme::Http(
                utoipa::openapi::security::HttpBuilder::new()
                    .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// Get the `OpenAPI` documentation for the management API.
#[must_use]
pub fn api_doc() -> utoipa::openapi::OpenApi {
    ManagementApiDoc::openapi()
}
