//! Typed field values and their declared types.

use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::error::{ErrorCode, StrataError, StrataResult};

/// Declared type of a schema field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Int,
    Long,
    Double,
    /// Milliseconds since the Unix epoch.
    Timestamp,
    Text,
    Bool,
    /// A collection of scalar elements, stored as a JSON array.
    Collection(Box<FieldType>),
}

impl FieldType {
    /// Shorthand for a collection of `element`.
    pub fn collection(element: FieldType) -> Self {
        FieldType::Collection(Box::new(element))
    }

    /// Whether values of this type have a total order usable by range selectors.
    pub fn is_ordered(&self) -> bool {
        matches!(
            self,
            FieldType::Int | FieldType::Long | FieldType::Double | FieldType::Timestamp
        )
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, FieldType::Collection(_))
    }

    /// SQLite column affinity.
    pub fn column_type(&self) -> &'static str {
        match self {
            FieldType::Int | FieldType::Long | FieldType::Timestamp | FieldType::Bool => "INTEGER",
            FieldType::Double => "REAL",
            FieldType::Text | FieldType::Collection(_) => "TEXT",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Int => write!(f, "int"),
            FieldType::Long => write!(f, "long"),
            FieldType::Double => write!(f, "double"),
            FieldType::Timestamp => write!(f, "timestamp"),
            FieldType::Text => write!(f, "text"),
            FieldType::Bool => write!(f, "bool"),
            FieldType::Collection(element) => write!(f, "collection<{}>", element),
        }
    }
}

/// A single attribute value.
///
/// Deserialization is untagged, so plain JSON maps onto the widest matching
/// variant (integers become `Long`); [`FieldValue::coerce`] narrows a value
/// to the declared field type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Long(i64),
    Double(f64),
    Text(String),
    List(Vec<FieldValue>),
    Int(i32),
    Timestamp(i64),
}

impl FieldValue {
    /// Build a timestamp value from a chrono instant.
    pub fn timestamp(at: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(at.timestamp_millis())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Convert this value to the declared type, or `None` if it cannot be
    /// represented there. `Null` coerces to every type.
    ///
    /// Doubles must be finite, and `-0.0` becomes `0.0`; SQLite keeps
    /// neither NaN nor the sign of zero.
    pub fn coerce(&self, ty: &FieldType) -> Option<FieldValue> {
        use FieldValue as V;
        match (self, ty) {
            (V::Null, _) => Some(V::Null),
            (V::Int(v), FieldType::Int) => Some(V::Int(*v)),
            (V::Long(v), FieldType::Int) => i32::try_from(*v).ok().map(V::Int),
            (V::Timestamp(v), FieldType::Int) => i32::try_from(*v).ok().map(V::Int),
            (V::Int(v), FieldType::Long) => Some(V::Long(i64::from(*v))),
            (V::Long(v) | V::Timestamp(v), FieldType::Long) => Some(V::Long(*v)),
            (V::Int(v), FieldType::Timestamp) => Some(V::Timestamp(i64::from(*v))),
            (V::Long(v) | V::Timestamp(v), FieldType::Timestamp) => Some(V::Timestamp(*v)),
            (V::Double(v), FieldType::Double) => storable_double(*v).map(V::Double),
            (V::Int(v), FieldType::Double) => Some(V::Double(f64::from(*v))),
            (V::Long(v), FieldType::Double) => storable_double(*v as f64).map(V::Double),
            (V::Text(s), FieldType::Text) => Some(V::Text(s.clone())),
            (V::Bool(b), FieldType::Bool) => Some(V::Bool(*b)),
            (V::List(items), FieldType::Collection(element)) => items
                .iter()
                .map(|item| match item {
                    V::Null | V::List(_) => None,
                    other => other.coerce(element),
                })
                .collect::<Option<Vec<_>>>()
                .map(V::List),
            _ => None,
        }
    }

    /// Total order across all values: first by variant, then by content.
    /// Doubles use IEEE total ordering, so the order is reflexive for NaN.
    pub fn total_cmp(&self, other: &FieldValue) -> Ordering {
        use FieldValue as V;
        match (self, other) {
            (V::Null, V::Null) => Ordering::Equal,
            (V::Bool(a), V::Bool(b)) => a.cmp(b),
            (V::Int(a), V::Int(b)) => a.cmp(b),
            (V::Long(a), V::Long(b)) => a.cmp(b),
            (V::Timestamp(a), V::Timestamp(b)) => a.cmp(b),
            (V::Double(a), V::Double(b)) => a.total_cmp(b),
            (V::Text(a), V::Text(b)) => a.cmp(b),
            (V::List(a), V::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.total_cmp(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            FieldValue::Null => 0,
            FieldValue::Bool(_) => 1,
            FieldValue::Int(_) => 2,
            FieldValue::Long(_) => 3,
            FieldValue::Timestamp(_) => 4,
            FieldValue::Double(_) => 5,
            FieldValue::Text(_) => 6,
            FieldValue::List(_) => 7,
        }
    }

    /// Value bound into SQLite. Collections are stored as JSON arrays.
    ///
    /// Fails for a non-finite double anywhere in the value.
    pub fn to_sql(&self) -> StrataResult<SqlValue> {
        Ok(match self {
            FieldValue::Null => SqlValue::Null,
            FieldValue::Bool(b) => SqlValue::Integer(i64::from(*b)),
            FieldValue::Int(v) => SqlValue::Integer(i64::from(*v)),
            FieldValue::Long(v) | FieldValue::Timestamp(v) => SqlValue::Integer(*v),
            FieldValue::Double(v) => match storable_double(*v) {
                Some(v) => SqlValue::Real(v),
                None => return Err(non_finite(*v)),
            },
            FieldValue::Text(s) => SqlValue::Text(s.clone()),
            FieldValue::List(items) => {
                for item in items {
                    item.to_sql()?;
                }
                SqlValue::Text(serde_json::to_string(self)?)
            }
        })
    }
}

fn storable_double(v: f64) -> Option<f64> {
    // Adding positive zero turns -0.0 into 0.0 and leaves everything else alone.
    v.is_finite().then_some(v + 0.0)
}

fn non_finite(v: f64) -> StrataError {
    StrataError::Validation {
        message: format!("double value {} cannot be stored", v),
        code: ErrorCode::ValTypeMismatch,
        field: None,
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Long(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Double(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl<T: Into<FieldValue>> From<Vec<T>> for FieldValue {
    fn from(items: Vec<T>) -> Self {
        FieldValue::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_narrows_integers() {
        assert_eq!(FieldValue::Long(7).coerce(&FieldType::Int), Some(FieldValue::Int(7)));
        assert_eq!(FieldValue::Long(i64::MAX).coerce(&FieldType::Int), None);
        assert_eq!(
            FieldValue::Long(1_700_000_000_000).coerce(&FieldType::Timestamp),
            Some(FieldValue::Timestamp(1_700_000_000_000))
        );
        assert_eq!(FieldValue::Int(2).coerce(&FieldType::Double), Some(FieldValue::Double(2.0)));
    }

    #[test]
    fn test_coerce_rejects_cross_kind() {
        assert_eq!(FieldValue::from("x").coerce(&FieldType::Long), None);
        assert_eq!(FieldValue::Double(1.5).coerce(&FieldType::Long), None);
        assert_eq!(FieldValue::Long(1).coerce(&FieldType::Text), None);
        assert_eq!(
            FieldValue::Long(1).coerce(&FieldType::collection(FieldType::Long)),
            None
        );
    }

    #[test]
    fn test_coerce_collection_elements() {
        let tags = FieldValue::from(vec![1i64, 2, 3]);
        assert_eq!(
            tags.coerce(&FieldType::collection(FieldType::Int)),
            Some(FieldValue::List(vec![
                FieldValue::Int(1),
                FieldValue::Int(2),
                FieldValue::Int(3)
            ]))
        );

        let nested = FieldValue::List(vec![FieldValue::Null]);
        assert_eq!(nested.coerce(&FieldType::collection(FieldType::Int)), None);
    }

    #[test]
    fn test_coerce_rejects_non_finite_doubles() {
        for v in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert_eq!(FieldValue::Double(v).coerce(&FieldType::Double), None);
        }
        let rates = FieldValue::from(vec![1.0, f64::NAN]);
        assert_eq!(rates.coerce(&FieldType::collection(FieldType::Double)), None);
    }

    #[test]
    fn test_coerce_drops_sign_of_zero() {
        let zero = FieldValue::Double(-0.0).coerce(&FieldType::Double);
        match &zero {
            Some(FieldValue::Double(v)) => assert!(*v == 0.0 && v.is_sign_positive()),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            zero.unwrap().total_cmp(&FieldValue::Double(0.0)),
            Ordering::Equal
        );

        let rates = FieldValue::from(vec![-0.0, 2.5])
            .coerce(&FieldType::collection(FieldType::Double))
            .unwrap();
        assert_eq!(rates, FieldValue::from(vec![0.0, 2.5]));
        assert_eq!(
            rates.total_cmp(&FieldValue::from(vec![0.0, 2.5])),
            Ordering::Equal
        );
    }

    #[test]
    fn test_to_sql_refuses_non_finite_doubles() {
        let err = FieldValue::Double(f64::INFINITY).to_sql().unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValTypeMismatch);

        let err = FieldValue::from(vec![1.0, f64::NAN]).to_sql().unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValTypeMismatch);

        assert_eq!(
            FieldValue::from(vec![1.5, 2.0]).to_sql().unwrap(),
            SqlValue::Text("[1.5,2.0]".to_string())
        );
        assert_eq!(FieldValue::Double(-0.0).to_sql().unwrap(), SqlValue::Real(0.0));
    }

    #[test]
    fn test_untagged_json() {
        let value: FieldValue = serde_json::from_str(r#"["a", 1, 2.5, true, null]"#).unwrap();
        assert_eq!(
            value,
            FieldValue::List(vec![
                FieldValue::from("a"),
                FieldValue::Long(1),
                FieldValue::Double(2.5),
                FieldValue::Bool(true),
                FieldValue::Null,
            ])
        );
        assert_eq!(serde_json::to_string(&FieldValue::Int(4)).unwrap(), "4");
    }

    #[test]
    fn test_total_cmp_nan_is_reflexive() {
        let nan = FieldValue::Double(f64::NAN);
        assert_eq!(nan.total_cmp(&nan), Ordering::Equal);
    }

    #[test]
    fn test_field_type_display() {
        assert_eq!(FieldType::collection(FieldType::Text).to_string(), "collection<text>");
        assert_eq!(FieldType::Timestamp.column_type(), "INTEGER");
    }
}
