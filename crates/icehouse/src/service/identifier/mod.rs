use std::{ops::Deref, str::FromStr};

use http::StatusCode;
use icehouse_ext::catalog::rest::ErrorModel;
use serde::{Deserialize, Serialize};

pub(crate) mod project;
pub(crate) mod tabular;

macro_rules! define_id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord, Copy)]
        #[serde(transparent)]
        pub struct $name(uuid::Uuid);

        impl $name {
            #[must_use]
            pub fn new(id: uuid::Uuid) -> Self {
                Self(id)
            }

            #[must_use]
            pub fn new_random() -> Self {
                Self(uuid::Uuid::now_v7())
            }

            /// # Errors
            /// `BAD_REQUEST` if `s` is not a UUID.
            pub fn from_str_or_bad_request(s: &str) -> Result<Self, ErrorModel> {
                uuid::Uuid::from_str(s).map(Self).map_err(|e| {
                    ErrorModel::builder()
                        .code(StatusCode::BAD_REQUEST.as_u16())
                        .message(format!(
                            concat!("Provided ", stringify!($name), " is not a valid UUID. Got: `{}`"),
                            s
                        ))
                        .r#type(concat!(stringify!($name), "IsNotUUID"))
                        .source(Some(Box::new(e)))
                        .build()
                })
            }
        }

        impl Deref for $name {
            type Target = uuid::Uuid;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl From<uuid::Uuid> for $name {
            fn from(value: uuid::Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$name> for uuid::Uuid {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<uuid::Uuid> for $name {
            fn as_ref(&self) -> &uuid::Uuid {
                &self.0
            }
        }

        // Hand-written to name the id type in the error.
        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> std::result::Result<$name, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                uuid::Uuid::from_str(&s).map($name).map_err(|_| {
                    serde::de::Error::custom(format!(
                        "Provided {} is not a valid UUID. Got `{s}`.",
                        stringify!($name),
                    ))
                })
            }
        }
    };
}

define_id_type!(ServerId);
define_id_type!(WarehouseId);
define_id_type!(NamespaceId);
define_id_type!(TableId);
define_id_type!(ViewId);
