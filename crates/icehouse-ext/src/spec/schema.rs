use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::SpecError;

/// Primitive types are kept in their textual form (`long`, `decimal(10,2)`, `fixed[16]`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrimitiveType(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NestedType {
    Struct {
        fields: Vec<NestedField>,
    },
    List {
        #[serde(rename = "element-id")]
        element_id: i32,
        #[serde(rename = "element-required")]
        element_required: bool,
        element: Box<Type>,
    },
    Map {
        #[serde(rename = "key-id")]
        key_id: i32,
        key: Box<Type>,
        #[serde(rename = "value-id")]
        value_id: i32,
        #[serde(rename = "value-required")]
        value_required: bool,
        value: Box<Type>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Type {
    Primitive(PrimitiveType),
    Nested(NestedType),
}

impl Type {
    #[must_use]
    pub fn primitive(name: impl Into<String>) -> Self {
        Type::Primitive(PrimitiveType(name.into()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NestedField {
    pub id: i32,
    pub name: String,
    pub required: bool,
    #[serde(rename = "type")]
    pub field_type: Type,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub doc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub initial_default: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub write_default: Option<serde_json::Value>,
}

impl NestedField {
    #[must_use]
    pub fn new(id: i32, name: impl Into<String>, field_type: Type, required: bool) -> Self {
        Self {
            id,
            name: name.into(),
            required,
            field_type,
            doc: None,
            initial_default: None,
            write_default: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructTag {
    #[default]
    #[serde(rename = "struct")]
    Struct,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Schema {
    #[serde(rename = "type", default)]
    pub struct_tag: StructTag,
    #[serde(default)]
    pub schema_id: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identifier_field_ids: Vec<i32>,
    pub fields: Vec<NestedField>,
}

impl Schema {
    #[must_use]
    pub fn new(schema_id: i32, fields: Vec<NestedField>) -> Self {
        Self {
            struct_tag: StructTag::Struct,
            schema_id,
            identifier_field_ids: Vec::new(),
            fields,
        }
    }

    #[must_use]
    pub fn with_schema_id(mut self, schema_id: i32) -> Self {
        self.schema_id = schema_id;
        self
    }

    /// Highest field id used anywhere in the schema, including nested ids.
    #[must_use]
    pub fn highest_field_id(&self) -> i32 {
        fn visit_type(t: &Type, max: &mut i32) {
            if let Type::Nested(nested) = t {
                match nested {
                    NestedType::Struct { fields } => fields.iter().for_each(|f| visit(f, max)),
                    NestedType::List {
                        element_id,
                        element,
                        ..
                    } => {
                        *max = (*max).max(*element_id);
                        visit_type(element, max);
                    }
                    NestedType::Map {
                        key_id,
                        key,
                        value_id,
                        value,
                        ..
                    } => {
                        *max = (*max).max(*key_id).max(*value_id);
                        visit_type(key, max);
                        visit_type(value, max);
                    }
                }
            }
        }
        fn visit(f: &NestedField, max: &mut i32) {
            *max = (*max).max(f.id);
            visit_type(&f.field_type, max);
        }
        let mut max = 0;
        self.fields.iter().for_each(|f| visit(f, &mut max));
        max
    }

    /// Names of the top-level fields in declaration order.
    #[must_use]
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Equal apart from the schema id.
    #[must_use]
    pub fn is_structurally_equal(&self, other: &Schema) -> bool {
        self.fields == other.fields && self.identifier_field_ids == other.identifier_field_ids
    }

    /// Reassign all field ids starting at `last_column_id + 1`. Fields of a struct get
    /// consecutive ids before any of their children are visited.
    ///
    /// Returns the new schema, the new highest id, and the mapping from old to new ids.
    ///
    /// # Errors
    /// Fails if field names within one struct are not unique or an identifier field is
    /// missing.
    pub fn with_fresh_ids(
        &self,
        last_column_id: i32,
    ) -> Result<(Schema, i32, HashMap<i32, i32>), SpecError> {
        let mut next = last_column_id;
        let mut mapping = HashMap::new();
        let fields = assign_struct(&self.fields, &mut next, &mut mapping)?;
        let identifier_field_ids = self
            .identifier_field_ids
            .iter()
            .map(|id| {
                mapping.get(id).copied().ok_or_else(|| {
                    SpecError::new(format!("Identifier field id {id} not found in schema"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok((
            Schema {
                struct_tag: StructTag::Struct,
                schema_id: self.schema_id,
                identifier_field_ids,
                fields,
            },
            next,
            mapping,
        ))
    }
}

fn fresh_id(next: &mut i32, old: i32, mapping: &mut HashMap<i32, i32>) -> i32 {
    *next += 1;
    mapping.insert(old, *next);
    *next
}

fn assign_struct(
    fields: &[NestedField],
    next: &mut i32,
    mapping: &mut HashMap<i32, i32>,
) -> Result<Vec<NestedField>, SpecError> {
    let mut seen = std::collections::HashSet::new();
    for f in fields {
        if f.name.is_empty() {
            return Err(SpecError::new("Field names must not be empty"));
        }
        if !seen.insert(f.name.as_str()) {
            return Err(SpecError::new(format!("Duplicate field name `{}`", f.name)));
        }
    }
    let ids = fields
        .iter()
        .map(|f| fresh_id(next, f.id, mapping))
        .collect::<Vec<_>>();
    fields
        .iter()
        .zip(ids)
        .map(|(f, id)| {
            Ok(NestedField {
                id,
                field_type: assign_type(&f.field_type, next, mapping)?,
                ..f.clone()
            })
        })
        .collect()
}

fn assign_type(
    t: &Type,
    next: &mut i32,
    mapping: &mut HashMap<i32, i32>,
) -> Result<Type, SpecError> {
    Ok(match t {
        Type::Primitive(_) => t.clone(),
        Type::Nested(NestedType::Struct { fields }) => Type::Nested(NestedType::Struct {
            fields: assign_struct(fields, next, mapping)?,
        }),
        Type::Nested(NestedType::List {
            element_id,
            element_required,
            element,
        }) => {
            let element_id = fresh_id(next, *element_id, mapping);
            Type::Nested(NestedType::List {
                element_id,
                element_required: *element_required,
                element: Box::new(assign_type(element, next, mapping)?),
            })
        }
        Type::Nested(NestedType::Map {
            key_id,
            key,
            value_id,
            value_required,
            value,
        }) => {
            let key_id = fresh_id(next, *key_id, mapping);
            let value_id = fresh_id(next, *value_id, mapping);
            Type::Nested(NestedType::Map {
                key_id,
                key: Box::new(assign_type(key, next, mapping)?),
                value_id,
                value_required: *value_required,
                value: Box::new(assign_type(value, next, mapping)?),
            })
        }
    })
}
