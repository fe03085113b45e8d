#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::pedantic
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![forbid(unsafe_code)]

//! Relationship-based authorization for Icehouse.
//!
//! Permissions are stored as `(object, relation, subject)` tuples. Objects form a
//! tree (`server > project > warehouse > namespace > namespace* > table|view`) linked
//! by `parent` tuples, and every role granted on an object is inherited by its
//! descendants.

pub use authorizer::RelationsAuthorizer;
pub use config::{CONFIG, RelationsConfig};
pub use entities::{Object, Subject};
pub use error::{RelationsError, RelationsResult};
pub use relations::Role;
pub use store::{InMemoryTupleStore, StoreError, Tuple, TupleFilter, TupleStore};

mod api;
mod authorizer;
mod check;
mod config;
mod entities;
pub mod error;
mod relations;
mod store;

#[cfg(test)]
mod tests;

/// Types of objects tuples can be written for.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum_macros::Display,
    strum_macros::EnumString,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ObjectType {
    Server,
    Project,
    Warehouse,
    Namespace,
    Table,
    View,
    User,
}

/// Build a [`RelationsAuthorizer`] from [`CONFIG`], opening the tuple snapshot
/// if one is configured.
pub async fn new_authorizer_from_default_config(
    server_id: icehouse::service::ServerId,
) -> RelationsResult<RelationsAuthorizer> {
    let store = match &CONFIG.snapshot_path {
        Some(path) => InMemoryTupleStore::open(path.clone()).await?,
        None => InMemoryTupleStore::new(),
    };
    Ok(RelationsAuthorizer::new(
        std::sync::Arc::new(store),
        server_id,
        &CONFIG,
    ))
}
