//! Structural equivalence between a candidate payload and the live version.

use std::cmp::Ordering;

use crate::types::{FieldValue, Payload};

/// Whether `candidate` carries the same facts as `current`.
///
/// Absent attributes equal explicit nulls and collections compare as
/// multisets. Doubles compare numerically, so `-0.0` equals `0.0`, and `NaN`
/// equals itself. Pure.
pub fn equivalent(candidate: &Payload, current: &Payload) -> bool {
    let names = candidate.iter().map(|(k, _)| k).chain(current.iter().map(|(k, _)| k));
    for name in names {
        let left = candidate.get(name).unwrap_or(&FieldValue::Null);
        let right = current.get(name).unwrap_or(&FieldValue::Null);
        if !values_equivalent(left, right) {
            return false;
        }
    }
    true
}

/// Deep equivalence of two attribute values.
pub fn values_equivalent(left: &FieldValue, right: &FieldValue) -> bool {
    match (left, right) {
        (FieldValue::List(a), FieldValue::List(b)) => {
            if a.len() != b.len() {
                return false;
            }
            let mut a: Vec<&FieldValue> = a.iter().collect();
            let mut b: Vec<&FieldValue> = b.iter().collect();
            a.sort_by(|x, y| x.total_cmp(y));
            b.sort_by(|x, y| x.total_cmp(y));
            a.iter().zip(b.iter()).all(|(x, y)| values_equivalent(x, y))
        }
        (FieldValue::Double(a), FieldValue::Double(b)) => a == b || (a.is_nan() && b.is_nan()),
        _ => left.total_cmp(right) == Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Fields;

    #[test]
    fn test_identical_payloads() {
        let a = Fields::new().with("balance", 10.5).with("name", "Checking");
        assert!(equivalent(&a, &a.clone()));
    }

    #[test]
    fn test_absent_equals_null() {
        let a = Fields::new().with("balance", 10.5);
        let b = Fields::new().with("balance", 10.5).with("memo", FieldValue::Null);
        assert!(equivalent(&a, &b));
        assert!(equivalent(&b, &a));
    }

    #[test]
    fn test_collections_ignore_order_but_not_multiplicity() {
        let a = Fields::new().with("tags", vec!["x", "y", "y"]);
        let b = Fields::new().with("tags", vec!["y", "x", "y"]);
        let c = Fields::new().with("tags", vec!["x", "x", "y"]);
        assert!(equivalent(&a, &b));
        assert!(!equivalent(&a, &c));
    }

    #[test]
    fn test_scalar_difference_detected() {
        let a = Fields::new().with("balance", 10.5);
        let b = Fields::new().with("balance", 10.25);
        assert!(!equivalent(&a, &b));

        let null = Fields::new().with("balance", FieldValue::Null);
        assert!(!equivalent(&a, &null));
    }

    #[test]
    fn test_nan_is_equivalent_to_itself() {
        let a = Fields::new().with("rate", f64::NAN);
        assert!(equivalent(&a, &a.clone()));
    }

    #[test]
    fn test_signed_zeros_are_equivalent() {
        let negative = Fields::new().with("rate", -0.0).with("history", vec![-0.0, 1.0]);
        let positive = Fields::new().with("rate", 0.0).with("history", vec![1.0, 0.0]);
        assert!(equivalent(&negative, &positive));
        assert!(equivalent(&positive, &negative));
    }
}
