use http::Method;

/// Routes of the Iceberg REST API below `/catalog/v1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::EnumIter, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum CatalogV1Endpoint {
    GetConfig,
    ListNamespaces,
    CreateNamespace,
    LoadNamespace,
    NamespaceExists,
    DropNamespace,
    UpdateNamespaceProperties,
    ListTables,
    CreateTable,
    LoadTable,
    UpdateTable,
    ReplaceTable,
    DropTable,
    TableExists,
    LoadCredentials,
    RenameTable,
    CommitTransaction,
    ListViews,
    CreateView,
    LoadView,
    ReplaceView,
    DropView,
    ViewExists,
    RenameView,
    S3Sign,
}

impl CatalogV1Endpoint {
    #[must_use]
    pub fn method(self) -> Method {
        match self {
            Self::GetConfig
            | Self::ListNamespaces
            | Self::LoadNamespace
            | Self::ListTables
            | Self::LoadTable
            | Self::LoadCredentials
            | Self::ListViews
            | Self::LoadView => Method::GET,
            Self::CreateNamespace
            | Self::UpdateNamespaceProperties
            | Self::CreateTable
            | Self::UpdateTable
            | Self::RenameTable
            | Self::CommitTransaction
            | Self::CreateView
            | Self::ReplaceView
            | Self::RenameView
            | Self::S3Sign => Method::POST,
            Self::ReplaceTable => Method::PUT,
            Self::NamespaceExists | Self::TableExists | Self::ViewExists => Method::HEAD,
            Self::DropNamespace | Self::DropTable | Self::DropView => Method::DELETE,
        }
    }

    /// Path relative to `/catalog`.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::GetConfig => "/v1/config",
            Self::ListNamespaces | Self::CreateNamespace => "/v1/{prefix}/namespaces",
            Self::LoadNamespace | Self::NamespaceExists | Self::DropNamespace => {
                "/v1/{prefix}/namespaces/{namespace}"
            }
            Self::UpdateNamespaceProperties => "/v1/{prefix}/namespaces/{namespace}/properties",
            Self::ListTables | Self::CreateTable => "/v1/{prefix}/namespaces/{namespace}/tables",
            Self::LoadTable
            | Self::UpdateTable
            | Self::ReplaceTable
            | Self::DropTable
            | Self::TableExists => "/v1/{prefix}/namespaces/{namespace}/tables/{table}",
            Self::LoadCredentials => {
                "/v1/{prefix}/namespaces/{namespace}/tables/{table}/credentials"
            }
            Self::RenameTable => "/v1/{prefix}/tables/rename",
            Self::CommitTransaction => "/v1/{prefix}/transactions/commit",
            Self::ListViews | Self::CreateView => "/v1/{prefix}/namespaces/{namespace}/views",
            Self::LoadView | Self::ReplaceView | Self::DropView | Self::ViewExists => {
                "/v1/{prefix}/namespaces/{namespace}/views/{view}"
            }
            Self::RenameView => "/v1/{prefix}/views/rename",
            Self::S3Sign => "/v1/signer/{prefix}/tabular-id/{tabular_id}/v1/aws/s3/sign",
        }
    }

    /// `"<METHOD> <path>"` as advertised in the `endpoints` list of `/config`.
    #[must_use]
    pub fn as_http_route(self) -> String {
        format!("{} {}", self.method(), self.path())
    }

    /// Whether clients discover the route through `/config`. The signer is announced
    /// through table config instead.
    #[must_use]
    pub fn is_advertised(self) -> bool {
        !matches!(self, Self::GetConfig | Self::S3Sign)
    }
}

/// Routes of the management API below `/management`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::EnumIter, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ManagementV1Endpoint {
    ServerInfo,
    Bootstrap,
    CreateProject,
    GetProject,
    ListProjects,
    RenameProject,
    DeleteProject,
    CreateWarehouse,
    ListWarehouses,
    GetWarehouse,
    DeleteWarehouse,
    RenameWarehouse,
    UpdateStorageCredential,
    UpdateDeleteProfile,
    RestoreWarehouse,
    ListDeletedTabulars,
    UndropTabulars,
}

impl ManagementV1Endpoint {
    /// Full path, starting with `/management/v1`.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::ServerInfo => "/management/v1/info",
            Self::Bootstrap => "/management/v1/bootstrap",
            Self::CreateProject => "/management/v1/project",
            Self::GetProject | Self::DeleteProject => "/management/v1/project/{project_id}",
            Self::ListProjects => "/management/v1/project-list",
            Self::RenameProject => "/management/v1/project/{project_id}/rename",
            Self::CreateWarehouse | Self::ListWarehouses => "/management/v1/warehouse",
            Self::GetWarehouse | Self::DeleteWarehouse => "/management/v1/warehouse/{warehouse_id}",
            Self::RenameWarehouse => "/management/v1/warehouse/{warehouse_id}/rename",
            Self::UpdateStorageCredential => {
                "/management/v1/warehouse/{warehouse_id}/storage-credential"
            }
            Self::UpdateDeleteProfile => "/management/v1/warehouse/{warehouse_id}/delete-profile",
            Self::RestoreWarehouse => "/management/v1/warehouse/{warehouse_id}/restore",
            Self::ListDeletedTabulars => {
                "/management/v1/warehouse/{warehouse_id}/deleted-tabulars"
            }
            Self::UndropTabulars => {
                "/management/v1/warehouse/{warehouse_id}/deleted-tabulars/undrop"
            }
        }
    }

    /// Path as mounted inside the `/management/v1` router.
    #[must_use]
    pub fn path_in_management_v1(self) -> &'static str {
        self.path().trim_start_matches("/management/v1")
    }
}
