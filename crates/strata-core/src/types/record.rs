//! Versioned record types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::FieldValue;

/// `life_end` of the current version of a fact.
pub const FOREVER: i64 = i64::MAX;

/// Named attribute values, used both for payloads and natural keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fields(BTreeMap<String, FieldValue>);

/// Schema-specific attributes of one version.
pub type Payload = Fields;

/// Attributes that identify the same fact across versions.
pub type NaturalKey = Fields;

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set one attribute.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.0.insert(name.into(), value.into());
    }

    /// Attribute value; an absent attribute reads as `None`.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, FieldValue)> for Fields {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One historical version of one fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedRecord {
    /// Surrogate id; primary key and pagination cursor.
    pub cid: i64,
    /// Owning account; `None` for shared reference facts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub natural_key: NaturalKey,
    /// Inclusive start of validity, in milliseconds.
    pub life_start: i64,
    /// Exclusive end of validity; [`FOREVER`] for the current version.
    pub life_end: i64,
    pub payload: Payload,
}

impl VersionedRecord {
    /// Whether this is the current version of its fact.
    pub fn is_live(&self) -> bool {
        self.life_end == FOREVER
    }

    /// Whether the validity interval contains `at`.
    pub fn contains(&self, at: i64) -> bool {
        self.life_start <= at && at < self.life_end
    }
}

/// Result of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    /// A new version was written (first version or supersession).
    Changed { cid: i64 },
    /// The candidate matched the live version; nothing was written.
    Unchanged { cid: i64 },
}

impl UpsertOutcome {
    pub fn changed(&self) -> bool {
        matches!(self, UpsertOutcome::Changed { .. })
    }

    /// Cid of the version that is live after the upsert.
    pub fn cid(&self) -> i64 {
        match self {
            UpsertOutcome::Changed { cid } | UpsertOutcome::Unchanged { cid } => *cid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_contains() {
        let record = VersionedRecord {
            cid: 1,
            owner: Some("acct-1".to_string()),
            natural_key: Fields::new().with("id", "a"),
            life_start: 100,
            life_end: 300,
            payload: Fields::new(),
        };
        assert!(record.contains(100));
        assert!(record.contains(299));
        assert!(!record.contains(300));
        assert!(!record.contains(99));
        assert!(!record.is_live());
    }

    #[test]
    fn test_fields_serialize_as_plain_object() {
        let fields = Fields::new().with("balance", 12.5).with("name", "Checking");
        let json = serde_json::to_value(&fields).unwrap();
        assert_eq!(json, serde_json::json!({"balance": 12.5, "name": "Checking"}));
    }
}
