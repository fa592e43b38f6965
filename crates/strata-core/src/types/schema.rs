//! Declarative schema descriptors.
//!
//! A [`SchemaDescriptor`] names the table, the natural-key fields, and the
//! typed payload fields of one kind of fact. The generic repository, the
//! change detector, and the query compiler are all driven by it, so adding a
//! new kind of fact means writing a descriptor rather than a repository.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::{FieldType, FieldValue, Fields};
use crate::error::{ErrorCode, StrataError, StrataResult};

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_]{0,62}$").expect("identifier regex"));

/// Whether `name` is usable as an unquoted table or column name.
pub(crate) fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Column names owned by the store itself.
pub const RESERVED_COLUMNS: [&str; 4] = ["cid", "owner", "life_start", "life_end"];

/// One declared field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// Declarative description of one versioned schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    /// Table name.
    pub name: String,
    /// Fields identifying the same fact across versions.
    pub key: Vec<FieldDef>,
    /// Payload fields.
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    /// Schema-specific page size for paginated queries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
}

impl SchemaDescriptor {
    /// Start building a descriptor for `table`.
    pub fn builder(table: impl Into<String>) -> SchemaDescriptorBuilder {
        SchemaDescriptorBuilder {
            descriptor: SchemaDescriptor {
                name: table.into(),
                key: Vec::new(),
                fields: Vec::new(),
                page_size: None,
            },
        }
    }

    /// Load a descriptor from JSON and validate it.
    pub fn from_json(json: &str) -> StrataResult<Self> {
        let descriptor: Self = serde_json::from_str(json)?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Check identifiers, uniqueness, and key constraints.
    pub fn validate(&self) -> StrataResult<()> {
        if !IDENTIFIER.is_match(&self.name) {
            return Err(StrataError::invalid_schema(format!(
                "table name '{}' is not a valid identifier",
                self.name
            )));
        }
        if self.key.is_empty() {
            return Err(StrataError::invalid_schema(format!(
                "schema '{}' declares no natural key",
                self.name
            )));
        }
        if self.page_size == Some(0) {
            return Err(StrataError::invalid_schema("page_size must be positive"));
        }

        let mut seen = HashSet::new();
        for def in self.key.iter().chain(self.fields.iter()) {
            if !IDENTIFIER.is_match(&def.name) {
                return Err(StrataError::invalid_schema(format!(
                    "field name '{}' is not a valid identifier",
                    def.name
                )));
            }
            if RESERVED_COLUMNS.contains(&def.name.as_str()) {
                return Err(StrataError::invalid_schema(format!(
                    "field name '{}' is reserved",
                    def.name
                )));
            }
            if !seen.insert(def.name.as_str()) {
                return Err(StrataError::invalid_schema(format!(
                    "field '{}' declared twice",
                    def.name
                )));
            }
            if let FieldType::Collection(element) = &def.field_type {
                if !element.is_scalar() {
                    return Err(StrataError::invalid_schema(format!(
                        "field '{}' nests collections",
                        def.name
                    )));
                }
            }
        }
        if let Some(def) = self.key.iter().find(|d| !d.field_type.is_scalar()) {
            return Err(StrataError::invalid_schema(format!(
                "key field '{}' must be scalar",
                def.name
            )));
        }
        Ok(())
    }

    /// Look up any declared field, key or payload.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.key.iter().chain(self.fields.iter()).find(|d| d.name == name)
    }

    /// Key columns followed by payload columns, in declaration order.
    pub fn columns(&self) -> impl Iterator<Item = &FieldDef> {
        self.key.iter().chain(self.fields.iter())
    }

    /// Coerce a natural key to the declared key types. Every key field must
    /// be present and non-null; extra fields are rejected.
    pub fn normalize_key(&self, key: &Fields) -> StrataResult<Fields> {
        reject_unknown(key, &self.key)?;
        self.key
            .iter()
            .map(|def| {
                let value = key
                    .get(&def.name)
                    .filter(|v| !v.is_null())
                    .ok_or_else(|| {
                        StrataError::invalid_field(
                            &def.name,
                            ErrorCode::ValInvalidInput,
                            format!("key field '{}' is missing", def.name),
                        )
                    })?;
                Ok((def.name.clone(), coerce(def, value)?))
            })
            .collect()
    }

    /// Coerce a payload to the declared field types. Absent fields are
    /// normalized to explicit `Null` so equivalence is null-safe.
    pub fn normalize_payload(&self, payload: &Fields) -> StrataResult<Fields> {
        reject_unknown(payload, &self.fields)?;
        self.fields
            .iter()
            .map(|def| {
                let value = match payload.get(&def.name) {
                    Some(value) => coerce(def, value)?,
                    None => FieldValue::Null,
                };
                Ok((def.name.clone(), value))
            })
            .collect()
    }
}

fn reject_unknown(values: &Fields, defs: &[FieldDef]) -> StrataResult<()> {
    if let Some((name, _)) = values.iter().find(|(name, _)| !defs.iter().any(|d| &d.name == *name)) {
        return Err(StrataError::invalid_field(
            name.as_str(),
            ErrorCode::ValUnknownField,
            format!("unknown field '{}'", name),
        ));
    }
    Ok(())
}

fn coerce(def: &FieldDef, value: &FieldValue) -> StrataResult<FieldValue> {
    value.coerce(&def.field_type).ok_or_else(|| {
        StrataError::invalid_field(
            &def.name,
            ErrorCode::ValTypeMismatch,
            format!("value {:?} does not fit field '{}' of type {}", value, def.name, def.field_type),
        )
    })
}

/// Builder for [`SchemaDescriptor`].
pub struct SchemaDescriptorBuilder {
    descriptor: SchemaDescriptor,
}

impl SchemaDescriptorBuilder {
    /// Add a natural-key field.
    pub fn key(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.descriptor.key.push(FieldDef::new(name, field_type));
        self
    }

    /// Add a payload field.
    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.descriptor.fields.push(FieldDef::new(name, field_type));
        self
    }

    /// Set the schema page size.
    pub fn page_size(mut self, size: u32) -> Self {
        self.descriptor.page_size = Some(size);
        self
    }

    /// Validate and build.
    pub fn build(self) -> StrataResult<SchemaDescriptor> {
        self.descriptor.validate()?;
        Ok(self.descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accounts() -> SchemaDescriptor {
        SchemaDescriptor::builder("accounts")
            .key("account_id", FieldType::Text)
            .field("balance", FieldType::Double)
            .field("opened_at", FieldType::Timestamp)
            .field("tags", FieldType::collection(FieldType::Text))
            .build()
            .unwrap()
    }

    #[test]
    fn test_rejects_reserved_and_duplicate_names() {
        let reserved = SchemaDescriptor::builder("t")
            .key("cid", FieldType::Long)
            .build();
        assert!(reserved.is_err());

        let duplicate = SchemaDescriptor::builder("t")
            .key("id", FieldType::Long)
            .field("id", FieldType::Text)
            .build();
        assert!(duplicate.is_err());
    }

    #[test]
    fn test_rejects_bad_identifiers_and_empty_key() {
        assert!(SchemaDescriptor::builder("drop table")
            .key("id", FieldType::Long)
            .build()
            .is_err());
        assert!(SchemaDescriptor::builder("t")
            .field("x", FieldType::Long)
            .build()
            .is_err());
        assert!(SchemaDescriptor::builder("t")
            .key("ids", FieldType::collection(FieldType::Long))
            .build()
            .is_err());
    }

    #[test]
    fn test_normalize_payload_fills_nulls_and_coerces() {
        let schema = accounts();
        let payload = Fields::new().with("balance", 10i64);
        let normalized = schema.normalize_payload(&payload).unwrap();

        assert_eq!(normalized.get("balance"), Some(&FieldValue::Double(10.0)));
        assert_eq!(normalized.get("opened_at"), Some(&FieldValue::Null));
        assert_eq!(normalized.get("tags"), Some(&FieldValue::Null));
    }

    #[test]
    fn test_normalize_payload_rejects_unknown_and_mistyped() {
        let schema = accounts();
        let unknown = schema.normalize_payload(&Fields::new().with("colour", "red"));
        assert!(matches!(
            unknown,
            Err(StrataError::Validation { code: ErrorCode::ValUnknownField, .. })
        ));

        let mistyped = schema.normalize_payload(&Fields::new().with("balance", "lots"));
        assert!(matches!(
            mistyped,
            Err(StrataError::Validation { code: ErrorCode::ValTypeMismatch, .. })
        ));
    }

    #[test]
    fn test_normalize_key_requires_every_field() {
        let schema = accounts();
        assert!(schema.normalize_key(&Fields::new()).is_err());
        assert!(schema
            .normalize_key(&Fields::new().with("account_id", FieldValue::Null))
            .is_err());
        assert!(schema
            .normalize_key(&Fields::new().with("account_id", "a-1"))
            .is_ok());
    }

    #[test]
    fn test_from_json() {
        let schema = SchemaDescriptor::from_json(
            r#"{"name": "balances", "key": [{"name": "id", "type": "text"}],
                "fields": [{"name": "tags", "type": {"collection": "text"}}], "page_size": 50}"#,
        )
        .unwrap();
        assert_eq!(schema.page_size, Some(50));
        assert_eq!(
            schema.field("tags").map(|d| &d.field_type),
            Some(&FieldType::collection(FieldType::Text))
        );
    }
}
