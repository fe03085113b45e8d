use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{LAST_ADDED, Schema, SpecError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SqlViewRepresentation {
    pub sql: String,
    pub dialect: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ViewRepresentation {
    Sql(SqlViewRepresentation),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ViewVersion {
    pub version_id: i32,
    pub schema_id: i32,
    pub timestamp_ms: i64,
    #[serde(default)]
    pub summary: HashMap<String, String>,
    pub representations: Vec<ViewRepresentation>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub default_catalog: Option<String>,
    pub default_namespace: Vec<String>,
}

impl ViewVersion {
    /// Same query definition, ignoring id, timestamp, summary and schema.
    fn same_definition(&self, other: &ViewVersion) -> bool {
        self.representations == other.representations
            && self.default_catalog == other.default_catalog
            && self.default_namespace == other.default_namespace
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ViewVersionLog {
    pub version_id: i32,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ViewMetadata {
    pub view_uuid: Uuid,
    pub format_version: u8,
    pub location: String,
    pub current_version_id: i32,
    pub versions: Vec<ViewVersion>,
    #[serde(default)]
    pub version_log: Vec<ViewVersionLog>,
    pub schemas: Vec<Schema>,
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum ViewUpdate {
    AssignUuid {
        uuid: Uuid,
    },
    #[serde(rename_all = "kebab-case")]
    UpgradeFormatVersion {
        format_version: u8,
    },
    #[serde(rename_all = "kebab-case")]
    AddSchema {
        schema: Schema,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_column_id: Option<i32>,
    },
    SetLocation {
        location: String,
    },
    SetProperties {
        updates: HashMap<String, String>,
    },
    RemoveProperties {
        removals: Vec<String>,
    },
    #[serde(rename_all = "kebab-case")]
    AddViewVersion {
        view_version: ViewVersion,
    },
    #[serde(rename_all = "kebab-case")]
    SetCurrentViewVersion {
        view_version_id: i32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ViewRequirement {
    AssertViewUuid { uuid: Uuid },
}

impl ViewRequirement {
    /// # Errors
    /// Returns a description of the violated requirement.
    pub fn check(&self, metadata: &ViewMetadata) -> Result<(), super::RequirementFailed> {
        match self {
            ViewRequirement::AssertViewUuid { uuid } if *uuid == metadata.view_uuid => Ok(()),
            ViewRequirement::AssertViewUuid { uuid } => Err(super::RequirementFailed(format!(
                "View uuid {} does not match expected {uuid}",
                metadata.view_uuid
            ))),
        }
    }
}

impl ViewMetadata {
    /// Metadata of a new view with `version` as its first and current version.
    ///
    /// # Errors
    /// Fails if the version has no representation.
    pub fn new_view(
        schema: &Schema,
        version: &ViewVersion,
        location: impl Into<String>,
        properties: HashMap<String, String>,
        now_ms: i64,
    ) -> Result<Self, SpecError> {
        let mut metadata = Self {
            view_uuid: Uuid::now_v7(),
            format_version: 1,
            location: location.into(),
            current_version_id: 0,
            versions: Vec::new(),
            version_log: Vec::new(),
            schemas: Vec::new(),
            properties,
        };
        metadata.apply_updates(
            &[
                ViewUpdate::AddSchema {
                    schema: schema.clone(),
                    last_column_id: None,
                },
                ViewUpdate::AddViewVersion {
                    view_version: ViewVersion {
                        schema_id: LAST_ADDED,
                        ..version.clone()
                    },
                },
                ViewUpdate::SetCurrentViewVersion {
                    view_version_id: LAST_ADDED,
                },
            ],
            now_ms,
        )?;
        Ok(metadata)
    }

    #[must_use]
    pub fn current_version(&self) -> Option<&ViewVersion> {
        self.versions
            .iter()
            .find(|v| v.version_id == self.current_version_id)
    }

    fn schema(&self, schema_id: i32) -> Option<&Schema> {
        self.schemas.iter().find(|s| s.schema_id == schema_id)
    }

    /// Apply updates in order. `-1` refers to the schema or version last added in the
    /// same sequence.
    ///
    /// An added version whose definition and schema equal an existing version reuses
    /// that version's id, so re-issuing an unchanged definition adds nothing.
    ///
    /// # Errors
    /// Fails on the first invalid update.
    pub fn apply_updates(&mut self, updates: &[ViewUpdate], now_ms: i64) -> Result<(), SpecError> {
        let mut last_added_schema: Option<i32> = None;
        let mut last_added_version: Option<i32> = None;

        for update in updates {
            match update {
                ViewUpdate::AssignUuid { uuid } => {
                    if *uuid != self.view_uuid {
                        return Err(SpecError::new("Cannot reassign the uuid of a view"));
                    }
                }
                ViewUpdate::UpgradeFormatVersion { format_version } => {
                    if *format_version != 1 {
                        return Err(SpecError::new(format!(
                            "Unsupported view format version {format_version}"
                        )));
                    }
                }
                ViewUpdate::AddSchema { schema, .. } => {
                    let id = if let Some(existing) =
                        self.schemas.iter().find(|s| s.is_structurally_equal(schema))
                    {
                        existing.schema_id
                    } else {
                        let id = self
                            .schemas
                            .iter()
                            .map(|s| s.schema_id)
                            .max()
                            .map_or(0, |m| m + 1);
                        self.schemas.push(schema.clone().with_schema_id(id));
                        id
                    };
                    last_added_schema = Some(id);
                }
                ViewUpdate::SetLocation { location } => {
                    self.location = location.trim_end_matches('/').to_string();
                }
                ViewUpdate::SetProperties { updates } => {
                    self.properties
                        .extend(updates.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                ViewUpdate::RemoveProperties { removals } => {
                    for key in removals {
                        self.properties.remove(key);
                    }
                }
                ViewUpdate::AddViewVersion { view_version } => {
                    let id = self.add_version(view_version, last_added_schema, now_ms)?;
                    last_added_version = Some(id);
                }
                ViewUpdate::SetCurrentViewVersion { view_version_id } => {
                    let id = if *view_version_id == LAST_ADDED {
                        last_added_version.ok_or_else(|| {
                            SpecError::new("No view version was added in this commit")
                        })?
                    } else {
                        *view_version_id
                    };
                    if !self.versions.iter().any(|v| v.version_id == id) {
                        return Err(SpecError::new(format!("View version {id} does not exist")));
                    }
                    if id != self.current_version_id || self.version_log.is_empty() {
                        self.current_version_id = id;
                        self.version_log.push(ViewVersionLog {
                            version_id: id,
                            timestamp_ms: now_ms,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn add_version(
        &mut self,
        version: &ViewVersion,
        last_added_schema: Option<i32>,
        now_ms: i64,
    ) -> Result<i32, SpecError> {
        if version.representations.is_empty() {
            return Err(SpecError::new("View version must have a representation"));
        }
        let schema_id = if version.schema_id == LAST_ADDED {
            last_added_schema
                .ok_or_else(|| SpecError::new("No schema was added in this commit"))?
        } else {
            version.schema_id
        };
        let schema = self
            .schema(schema_id)
            .ok_or_else(|| SpecError::new(format!("Schema {schema_id} does not exist")))?;

        let reusable = self.versions.iter().find(|existing| {
            existing.same_definition(version)
                && self
                    .schema(existing.schema_id)
                    .is_some_and(|s| s.is_structurally_equal(schema))
        });
        if let Some(existing) = reusable {
            return Ok(existing.version_id);
        }

        let id = self
            .versions
            .iter()
            .map(|v| v.version_id)
            .max()
            .map_or(1, |m| m + 1);
        self.versions.push(ViewVersion {
            version_id: id,
            schema_id,
            timestamp_ms: if version.timestamp_ms > 0 {
                version.timestamp_ms
            } else {
                now_ms
            },
            ..version.clone()
        });
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::spec::{NestedField, Type};

    fn schema() -> Schema {
        Schema::new(0, vec![NestedField::new(1, "id", Type::primitive("long"), true)])
    }

    fn version(sql: &str) -> ViewVersion {
        ViewVersion {
            version_id: 1,
            schema_id: 0,
            timestamp_ms: 10,
            summary: HashMap::from([("engine-name".to_string(), "spark".to_string())]),
            representations: vec![ViewRepresentation::Sql(SqlViewRepresentation {
                sql: sql.to_string(),
                dialect: "spark".to_string(),
            })],
            default_catalog: None,
            default_namespace: vec!["ns".to_string()],
        }
    }

    fn replace(sql: &str) -> Vec<ViewUpdate> {
        vec![
            ViewUpdate::AddSchema {
                schema: schema(),
                last_column_id: Some(1),
            },
            ViewUpdate::AddViewVersion {
                view_version: ViewVersion {
                    version_id: 99,
                    schema_id: LAST_ADDED,
                    timestamp_ms: 20,
                    ..version(sql)
                },
            },
            ViewUpdate::SetCurrentViewVersion {
                view_version_id: LAST_ADDED,
            },
        ]
    }

    #[test]
    fn test_identical_definition_reuses_version() {
        let mut view =
            ViewMetadata::new_view(&schema(), &version("SELECT 1"), "s3://b/v", HashMap::new(), 1)
                .unwrap();
        assert_eq!(view.versions.len(), 1);

        view.apply_updates(&replace("SELECT 1"), 2).unwrap();
        view.apply_updates(&replace("SELECT 1"), 3).unwrap();
        assert_eq!(view.versions.len(), 1);
        assert_eq!(view.schemas.len(), 1);
        assert_eq!(view.current_version_id, 1);
        assert_eq!(view.version_log.len(), 1);
    }

    #[test]
    fn test_changed_sql_adds_version() {
        let mut view =
            ViewMetadata::new_view(&schema(), &version("SELECT 1"), "s3://b/v", HashMap::new(), 1)
                .unwrap();
        view.apply_updates(&replace("SELECT 2"), 2).unwrap();
        assert_eq!(view.versions.len(), 2);
        assert_eq!(view.current_version_id, 2);
        assert_eq!(view.version_log.len(), 2);

        // Switching back to the first definition reuses version 1.
        view.apply_updates(&replace("SELECT 1"), 3).unwrap();
        assert_eq!(view.versions.len(), 2);
        assert_eq!(view.current_version_id, 1);
    }

    #[test]
    fn test_whitespace_is_significant() {
        let mut view =
            ViewMetadata::new_view(&schema(), &version("SELECT 1"), "s3://b/v", HashMap::new(), 1)
                .unwrap();
        view.apply_updates(&replace("SELECT  1"), 2).unwrap();
        assert_eq!(view.versions.len(), 2);
    }

    #[test]
    fn test_update_wire_format() {
        let update: ViewUpdate = serde_json::from_value(serde_json::json!({
            "action": "set-current-view-version", "view-version-id": -1
        }))
        .unwrap();
        assert_eq!(
            update,
            ViewUpdate::SetCurrentViewVersion {
                view_version_id: LAST_ADDED
            }
        );
        let rep: ViewRepresentation = serde_json::from_value(serde_json::json!({
            "type": "sql", "sql": "SELECT 1", "dialect": "trino"
        }))
        .unwrap();
        assert!(matches!(rep, ViewRepresentation::Sql(_)));
    }
}
