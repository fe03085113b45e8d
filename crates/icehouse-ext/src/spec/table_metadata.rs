use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    PartitionSpec, Schema, SortOrder, SpecError, UnboundPartitionSpec,
    partition::PARTITION_DATA_ID_START,
};

pub const MAIN_BRANCH: &str = "main";
/// Sentinel id meaning "the schema, spec or order added last in this commit".
pub const LAST_ADDED: i32 = -1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Snapshot {
    pub snapshot_id: i64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub parent_snapshot_id: Option<i64>,
    #[serde(default)]
    pub sequence_number: i64,
    pub timestamp_ms: i64,
    pub manifest_list: String,
    #[serde(default)]
    pub summary: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub schema_id: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SnapshotRefType {
    Branch,
    Tag,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SnapshotReference {
    pub snapshot_id: i64,
    #[serde(rename = "type")]
    pub ref_type: SnapshotRefType,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub max_ref_age_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub max_snapshot_age_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub min_snapshots_to_keep: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SnapshotLog {
    pub snapshot_id: i64,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MetadataLog {
    pub metadata_file: String,
    pub timestamp_ms: i64,
}

/// Iceberg table metadata as tracked by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TableMetadata {
    pub format_version: u8,
    pub table_uuid: Uuid,
    pub location: String,
    pub last_sequence_number: i64,
    pub last_updated_ms: i64,
    pub last_column_id: i32,
    pub schemas: Vec<Schema>,
    pub current_schema_id: i32,
    pub partition_specs: Vec<PartitionSpec>,
    pub default_spec_id: i32,
    pub last_partition_id: i32,
    #[serde(default)]
    pub properties: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub current_snapshot_id: Option<i64>,
    #[serde(default)]
    pub snapshots: Vec<Snapshot>,
    #[serde(default)]
    pub snapshot_log: Vec<SnapshotLog>,
    #[serde(default)]
    pub metadata_log: Vec<MetadataLog>,
    pub sort_orders: Vec<SortOrder>,
    pub default_sort_order_id: i64,
    #[serde(default)]
    pub refs: HashMap<String, SnapshotReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum TableUpdate {
    #[serde(rename_all = "kebab-case")]
    AssignUuid { uuid: Uuid },
    #[serde(rename_all = "kebab-case")]
    UpgradeFormatVersion { format_version: u8 },
    #[serde(rename_all = "kebab-case")]
    AddSchema {
        schema: Schema,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_column_id: Option<i32>,
    },
    #[serde(rename_all = "kebab-case")]
    SetCurrentSchema { schema_id: i32 },
    AddSpec { spec: UnboundPartitionSpec },
    #[serde(rename_all = "kebab-case")]
    SetDefaultSpec { spec_id: i32 },
    #[serde(rename_all = "kebab-case")]
    AddSortOrder { sort_order: SortOrder },
    #[serde(rename_all = "kebab-case")]
    SetDefaultSortOrder { sort_order_id: i64 },
    AddSnapshot { snapshot: Snapshot },
    #[serde(rename_all = "kebab-case")]
    SetSnapshotRef {
        ref_name: String,
        #[serde(flatten)]
        reference: SnapshotReference,
    },
    #[serde(rename_all = "kebab-case")]
    RemoveSnapshots { snapshot_ids: Vec<i64> },
    #[serde(rename_all = "kebab-case")]
    RemoveSnapshotRef { ref_name: String },
    SetLocation { location: String },
    SetProperties { updates: HashMap<String, String> },
    RemoveProperties { removals: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TableRequirement {
    AssertCreate,
    AssertTableUuid {
        uuid: Uuid,
    },
    #[serde(rename_all = "kebab-case")]
    AssertRefSnapshotId {
        r#ref: String,
        snapshot_id: Option<i64>,
    },
    #[serde(rename_all = "kebab-case")]
    AssertLastAssignedFieldId { last_assigned_field_id: i32 },
    #[serde(rename_all = "kebab-case")]
    AssertCurrentSchemaId { current_schema_id: i32 },
    #[serde(rename_all = "kebab-case")]
    AssertLastAssignedPartitionId { last_assigned_partition_id: i32 },
    #[serde(rename_all = "kebab-case")]
    AssertDefaultSpecId { default_spec_id: i32 },
    #[serde(rename_all = "kebab-case")]
    AssertDefaultSortOrderId { default_sort_order_id: i64 },
}

/// A requirement did not hold against the current metadata.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Requirement failed: {0}")]
pub struct RequirementFailed(pub String);

impl TableRequirement {
    /// Check the requirement against `metadata` (`None` for a table that does not exist yet).
    ///
    /// # Errors
    /// Returns the violated requirement.
    pub fn check(&self, metadata: Option<&TableMetadata>) -> Result<(), RequirementFailed> {
        let Some(m) = metadata else {
            return match self {
                TableRequirement::AssertCreate => Ok(()),
                _ => Err(RequirementFailed(format!(
                    "{self:?} cannot be checked against a table that does not exist"
                ))),
            };
        };
        let ok = match self {
            TableRequirement::AssertCreate => {
                return Err(RequirementFailed("Table already exists".to_string()));
            }
            TableRequirement::AssertTableUuid { uuid } => m.table_uuid == *uuid,
            TableRequirement::AssertRefSnapshotId { r#ref, snapshot_id } => {
                m.refs.get(r#ref).map(|r| r.snapshot_id) == *snapshot_id
            }
            TableRequirement::AssertLastAssignedFieldId {
                last_assigned_field_id,
            } => m.last_column_id == *last_assigned_field_id,
            TableRequirement::AssertCurrentSchemaId { current_schema_id } => {
                m.current_schema_id == *current_schema_id
            }
            TableRequirement::AssertLastAssignedPartitionId {
                last_assigned_partition_id,
            } => m.last_partition_id == *last_assigned_partition_id,
            TableRequirement::AssertDefaultSpecId { default_spec_id } => {
                m.default_spec_id == *default_spec_id
            }
            TableRequirement::AssertDefaultSortOrderId {
                default_sort_order_id,
            } => m.default_sort_order_id == *default_sort_order_id,
        };
        if ok {
            Ok(())
        } else {
            Err(RequirementFailed(format!("{self:?}")))
        }
    }
}

impl TableMetadata {
    /// Metadata of a freshly created table. Field, partition and sort ids are
    /// reassigned as a new table starts from an empty id space.
    ///
    /// # Errors
    /// Fails if the schema, spec or order are inconsistent.
    pub fn new_table(
        schema: &Schema,
        spec: Option<&UnboundPartitionSpec>,
        sort_order: Option<&SortOrder>,
        location: impl Into<String>,
        properties: HashMap<String, String>,
        now_ms: i64,
    ) -> Result<Self, SpecError> {
        let (schema, last_column_id, mapping) = schema.with_fresh_ids(0)?;
        let schema = schema.with_schema_id(0);
        let (partition_spec, last_partition_id) = match spec {
            Some(spec) => spec.bind(0, PARTITION_DATA_ID_START - 1, Some(&mapping))?,
            None => (PartitionSpec::unpartitioned(), PARTITION_DATA_ID_START - 1),
        };
        let sort_order = match sort_order {
            Some(order) if !order.is_unsorted() => {
                let mut order = order.remap_source_ids(&mapping)?;
                order.order_id = 1;
                order
            }
            _ => SortOrder::unsorted(),
        };
        Ok(Self {
            format_version: 2,
            table_uuid: Uuid::now_v7(),
            location: location.into(),
            last_sequence_number: 0,
            last_updated_ms: now_ms,
            last_column_id,
            current_schema_id: schema.schema_id,
            schemas: vec![schema],
            default_spec_id: partition_spec.spec_id,
            partition_specs: vec![partition_spec],
            last_partition_id,
            properties,
            current_snapshot_id: None,
            snapshots: Vec::new(),
            snapshot_log: Vec::new(),
            metadata_log: Vec::new(),
            default_sort_order_id: sort_order.order_id,
            sort_orders: vec![sort_order],
            refs: HashMap::new(),
        })
    }

    #[must_use]
    pub fn current_schema(&self) -> Option<&Schema> {
        self.schemas
            .iter()
            .find(|s| s.schema_id == self.current_schema_id)
    }

    #[must_use]
    pub fn current_snapshot(&self) -> Option<&Snapshot> {
        let id = self.current_snapshot_id?;
        self.snapshots.iter().find(|s| s.snapshot_id == id)
    }

    /// Replace the table definition in place: identity, uuid and location stay,
    /// the new schema becomes the only schema and snapshot lineage is cleared.
    /// Properties are merged.
    ///
    /// # Errors
    /// Fails if the new definition is inconsistent.
    pub fn replace_definition(
        &self,
        schema: &Schema,
        spec: Option<&UnboundPartitionSpec>,
        sort_order: Option<&SortOrder>,
        properties: HashMap<String, String>,
        now_ms: i64,
    ) -> Result<Self, SpecError> {
        let mut merged = self.properties.clone();
        merged.extend(properties);
        let mut fresh =
            Self::new_table(schema, spec, sort_order, self.location.clone(), merged, now_ms)?;
        fresh.table_uuid = self.table_uuid;
        fresh.format_version = self.format_version;
        fresh.last_sequence_number = self.last_sequence_number;
        fresh.metadata_log.clone_from(&self.metadata_log);
        Ok(fresh)
    }

    /// Record the previous metadata file before a new one is written.
    pub fn push_metadata_log(&mut self, previous_location: &str, timestamp_ms: i64) {
        self.metadata_log.push(MetadataLog {
            metadata_file: previous_location.to_string(),
            timestamp_ms,
        });
    }

    /// Apply a sequence of updates. Ids `-1` refer to the element last added within
    /// the same sequence.
    ///
    /// # Errors
    /// Fails on the first update that is invalid for the metadata.
    #[allow(clippy::too_many_lines)]
    pub fn apply_updates(&mut self, updates: &[TableUpdate], now_ms: i64) -> Result<(), SpecError> {
        let mut last_added_schema: Option<i32> = None;
        let mut last_added_spec: Option<i32> = None;
        let mut last_added_order: Option<i64> = None;

        for update in updates {
            match update {
                TableUpdate::AssignUuid { uuid } => {
                    if *uuid != self.table_uuid {
                        return Err(SpecError::new("Cannot reassign the uuid of a table"));
                    }
                }
                TableUpdate::UpgradeFormatVersion { format_version } => {
                    if *format_version < self.format_version {
                        return Err(SpecError::new(format!(
                            "Cannot downgrade format version from {} to {format_version}",
                            self.format_version
                        )));
                    }
                    if *format_version > 2 {
                        return Err(SpecError::new(format!(
                            "Unsupported format version {format_version}"
                        )));
                    }
                    self.format_version = *format_version;
                }
                TableUpdate::AddSchema {
                    schema,
                    last_column_id,
                } => {
                    let id = self.add_schema(schema, *last_column_id)?;
                    last_added_schema = Some(id);
                }
                TableUpdate::SetCurrentSchema { schema_id } => {
                    let id = resolve_last_added(*schema_id, last_added_schema, "schema")?;
                    if !self.schemas.iter().any(|s| s.schema_id == id) {
                        return Err(SpecError::new(format!("Schema {id} does not exist")));
                    }
                    self.current_schema_id = id;
                }
                TableUpdate::AddSpec { spec } => {
                    let next_id = self
                        .partition_specs
                        .iter()
                        .map(|s| s.spec_id)
                        .max()
                        .map_or(0, |m| m + 1);
                    let (bound, last) = spec.bind(next_id, self.last_partition_id, None)?;
                    if let Some(existing) = self
                        .partition_specs
                        .iter()
                        .find(|s| s.is_compatible_with(&bound))
                    {
                        last_added_spec = Some(existing.spec_id);
                    } else {
                        self.last_partition_id = self.last_partition_id.max(last);
                        last_added_spec = Some(bound.spec_id);
                        self.partition_specs.push(bound);
                    }
                }
                TableUpdate::SetDefaultSpec { spec_id } => {
                    let id = resolve_last_added(*spec_id, last_added_spec, "partition spec")?;
                    if !self.partition_specs.iter().any(|s| s.spec_id == id) {
                        return Err(SpecError::new(format!("Partition spec {id} does not exist")));
                    }
                    self.default_spec_id = id;
                }
                TableUpdate::AddSortOrder { sort_order } => {
                    if let Some(existing) = self
                        .sort_orders
                        .iter()
                        .find(|o| o.fields == sort_order.fields)
                    {
                        last_added_order = Some(existing.order_id);
                    } else {
                        let next_id = self
                            .sort_orders
                            .iter()
                            .map(|o| o.order_id)
                            .max()
                            .map_or(1, |m| m + 1);
                        let mut order = sort_order.clone();
                        order.order_id = next_id;
                        last_added_order = Some(next_id);
                        self.sort_orders.push(order);
                    }
                }
                TableUpdate::SetDefaultSortOrder { sort_order_id } => {
                    let id = if *sort_order_id == i64::from(LAST_ADDED) {
                        last_added_order.ok_or_else(|| {
                            SpecError::new("No sort order was added in this commit")
                        })?
                    } else {
                        *sort_order_id
                    };
                    if !self.sort_orders.iter().any(|o| o.order_id == id) {
                        return Err(SpecError::new(format!("Sort order {id} does not exist")));
                    }
                    self.default_sort_order_id = id;
                }
                TableUpdate::AddSnapshot { snapshot } => {
                    if self
                        .snapshots
                        .iter()
                        .any(|s| s.snapshot_id == snapshot.snapshot_id)
                    {
                        return Err(SpecError::new(format!(
                            "Snapshot {} already exists",
                            snapshot.snapshot_id
                        )));
                    }
                    if self.format_version >= 2
                        && snapshot.sequence_number <= self.last_sequence_number
                        && snapshot.parent_snapshot_id.is_some()
                    {
                        return Err(SpecError::new(format!(
                            "Sequence number {} is not greater than the last sequence number {}",
                            snapshot.sequence_number, self.last_sequence_number
                        )));
                    }
                    self.last_sequence_number =
                        self.last_sequence_number.max(snapshot.sequence_number);
                    self.snapshots.push(snapshot.clone());
                }
                TableUpdate::SetSnapshotRef {
                    ref_name,
                    reference,
                } => {
                    let snapshot = self
                        .snapshots
                        .iter()
                        .find(|s| s.snapshot_id == reference.snapshot_id)
                        .ok_or_else(|| {
                            SpecError::new(format!(
                                "Snapshot {} does not exist",
                                reference.snapshot_id
                            ))
                        })?;
                    if ref_name == MAIN_BRANCH {
                        if reference.ref_type != SnapshotRefType::Branch {
                            return Err(SpecError::new("The main ref must be a branch"));
                        }
                        self.current_snapshot_id = Some(reference.snapshot_id);
                        self.snapshot_log.push(SnapshotLog {
                            snapshot_id: reference.snapshot_id,
                            timestamp_ms: snapshot.timestamp_ms,
                        });
                    }
                    self.refs.insert(ref_name.clone(), reference.clone());
                }
                TableUpdate::RemoveSnapshots { snapshot_ids } => {
                    self.snapshots.retain(|s| !snapshot_ids.contains(&s.snapshot_id));
                    self.refs
                        .retain(|_, r| !snapshot_ids.contains(&r.snapshot_id));
                    if self
                        .current_snapshot_id
                        .is_some_and(|id| snapshot_ids.contains(&id))
                    {
                        self.current_snapshot_id = None;
                    }
                }
                TableUpdate::RemoveSnapshotRef { ref_name } => {
                    self.refs.remove(ref_name);
                    if ref_name == MAIN_BRANCH {
                        self.current_snapshot_id = None;
                    }
                }
                TableUpdate::SetLocation { location } => {
                    self.location = location.trim_end_matches('/').to_string();
                }
                TableUpdate::SetProperties { updates } => {
                    self.properties
                        .extend(updates.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                TableUpdate::RemoveProperties { removals } => {
                    for key in removals {
                        self.properties.remove(key);
                    }
                }
            }
        }
        if !updates.is_empty() {
            self.last_updated_ms = now_ms;
        }
        Ok(())
    }

    fn add_schema(&mut self, schema: &Schema, last_column_id: Option<i32>) -> Result<i32, SpecError> {
        if let Some(existing) = self
            .schemas
            .iter()
            .find(|s| s.is_structurally_equal(schema))
        {
            return Ok(existing.schema_id);
        }
        let highest = schema.highest_field_id();
        let new_last = last_column_id.unwrap_or(highest).max(highest);
        if new_last < self.last_column_id {
            return Err(SpecError::new(format!(
                "Invalid last column id {new_last}, must be >= {}",
                self.last_column_id
            )));
        }
        let id = self
            .schemas
            .iter()
            .map(|s| s.schema_id)
            .max()
            .map_or(0, |m| m + 1);
        self.schemas.push(schema.clone().with_schema_id(id));
        self.last_column_id = new_last;
        Ok(id)
    }
}

fn resolve_last_added(id: i32, last_added: Option<i32>, what: &str) -> Result<i32, SpecError> {
    if id == LAST_ADDED {
        last_added.ok_or_else(|| SpecError::new(format!("No {what} was added in this commit")))
    } else {
        Ok(id)
    }
}
