pub mod endpoints;
pub mod iceberg;
pub mod management;
#[cfg(feature = "router")]
pub mod router;

pub use icehouse_ext::catalog::rest::*;

/// State shared by all handlers of one router.
#[derive(Debug, Clone)]
pub struct ApiContext<S: ThreadSafe> {
    pub v1_state: S,
}

pub trait ThreadSafe: Clone + Send + Sync + 'static {}

pub type Result<T, E = IcebergErrorResponse> = std::result::Result<T, E>;
