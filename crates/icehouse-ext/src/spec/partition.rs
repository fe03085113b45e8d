use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::SpecError;

/// First field id assigned to partition fields.
pub const PARTITION_DATA_ID_START: i32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PartitionField {
    pub source_id: i32,
    pub field_id: i32,
    pub name: String,
    pub transform: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PartitionSpec {
    pub spec_id: i32,
    pub fields: Vec<PartitionField>,
}

impl PartitionSpec {
    #[must_use]
    pub fn unpartitioned() -> Self {
        Self {
            spec_id: 0,
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn highest_field_id(&self) -> Option<i32> {
        self.fields.iter().map(|f| f.field_id).max()
    }

    /// Equal apart from the spec id.
    #[must_use]
    pub fn is_compatible_with(&self, other: &PartitionSpec) -> bool {
        self.fields == other.fields
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UnboundPartitionField {
    pub source_id: i32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub field_id: Option<i32>,
    pub name: String,
    pub transform: String,
}

/// Partition spec as sent by clients, before field ids are assigned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UnboundPartitionSpec {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub spec_id: Option<i32>,
    #[serde(default)]
    pub fields: Vec<UnboundPartitionField>,
}

impl UnboundPartitionSpec {
    /// Assign partition field ids after `last_partition_id`, translating source ids
    /// through `source_mapping` when given.
    ///
    /// # Errors
    /// Fails if a source id cannot be translated or partition names collide.
    pub fn bind(
        &self,
        spec_id: i32,
        last_partition_id: i32,
        source_mapping: Option<&HashMap<i32, i32>>,
    ) -> Result<(PartitionSpec, i32), SpecError> {
        let mut next = last_partition_id.max(PARTITION_DATA_ID_START - 1);
        let mut names = std::collections::HashSet::new();
        let mut fields = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            if !names.insert(field.name.clone()) {
                return Err(SpecError::new(format!(
                    "Duplicate partition field name `{}`",
                    field.name
                )));
            }
            let source_id = match source_mapping {
                Some(mapping) => *mapping.get(&field.source_id).ok_or_else(|| {
                    SpecError::new(format!(
                        "Partition source id {} is not part of the schema",
                        field.source_id
                    ))
                })?,
                None => field.source_id,
            };
            let field_id = match field.field_id {
                Some(id) if source_mapping.is_none() => id,
                _ => {
                    next += 1;
                    next
                }
            };
            next = next.max(field_id);
            fields.push(PartitionField {
                source_id,
                field_id,
                name: field.name.clone(),
                transform: field.transform.clone(),
            });
        }
        Ok((PartitionSpec { spec_id, fields }, next))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SortField {
    pub source_id: i32,
    pub transform: String,
    pub direction: String,
    pub null_order: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SortOrder {
    pub order_id: i64,
    #[serde(default)]
    pub fields: Vec<SortField>,
}

impl SortOrder {
    #[must_use]
    pub fn unsorted() -> Self {
        Self {
            order_id: 0,
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_unsorted(&self) -> bool {
        self.fields.is_empty()
    }

    /// # Errors
    /// Fails if a source id cannot be translated.
    pub fn remap_source_ids(&self, mapping: &HashMap<i32, i32>) -> Result<Self, SpecError> {
        let fields = self
            .fields
            .iter()
            .map(|f| {
                let source_id = *mapping.get(&f.source_id).ok_or_else(|| {
                    SpecError::new(format!(
                        "Sort source id {} is not part of the schema",
                        f.source_id
                    ))
                })?;
                Ok(SortField {
                    source_id,
                    ..f.clone()
                })
            })
            .collect::<Result<Vec<_>, SpecError>>()?;
        Ok(Self {
            order_id: self.order_id,
            fields,
        })
    }
}
