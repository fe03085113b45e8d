mod config;
mod error;
mod namespace;
mod s3_signer;
mod table;
mod view;

pub use config::*;
#[cfg(feature = "axum")]
pub(crate) use error::impl_into_response;
pub use error::*;
pub use namespace::*;
pub use s3_signer::*;
pub use table::*;
pub use view::*;
