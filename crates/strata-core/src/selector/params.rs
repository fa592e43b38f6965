//! Out-of-band parameter binding for compiled predicates.
//!
//! Every literal that reaches a query goes through here and is referenced
//! by a numbered placeholder (`?N`). Nothing the caller supplies is ever
//! spliced into SQL text.

use rusqlite::types::Value as SqlValue;

use super::TextMode;
use crate::error::StrataResult;
use crate::types::FieldValue;

/// Ordered parameter list for one compiled query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeParameters {
    values: Vec<SqlValue>,
}

impl AttributeParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a raw SQL value and return its placeholder.
    pub fn bind_raw(&mut self, value: SqlValue) -> String {
        self.values.push(value);
        format!("?{}", self.values.len())
    }

    /// Bind a typed field value and return its placeholder.
    pub fn bind(&mut self, value: &FieldValue) -> StrataResult<String> {
        Ok(self.bind_raw(value.to_sql()?))
    }

    pub fn bind_i64(&mut self, value: i64) -> String {
        self.bind_raw(SqlValue::Integer(value))
    }

    /// Bind a text literal in the form the match mode expects.
    ///
    /// Prefix and contains modes compile to `GLOB`, so the literal's glob
    /// metacharacters are escaped and the wildcard is appended here, not in
    /// the SQL text. Case-insensitive literals are folded to lowercase.
    pub fn bind_text(&mut self, pattern: &str, mode: TextMode) -> String {
        let bound = match mode {
            TextMode::Exact => pattern.to_string(),
            TextMode::CaseInsensitive => pattern.to_lowercase(),
            TextMode::Prefix => format!("{}*", escape_glob(pattern)),
            TextMode::Contains => format!("*{}*", escape_glob(pattern)),
        };
        self.bind_raw(SqlValue::Text(bound))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Parameters in a form `rusqlite` statements accept.
    pub fn as_params(&self) -> rusqlite::ParamsFromIter<std::slice::Iter<'_, SqlValue>> {
        rusqlite::params_from_iter(self.values.iter())
    }
}

/// Escape SQLite `GLOB` metacharacters by wrapping each in a character class.
pub fn escape_glob(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        match c {
            '*' | '?' | '[' => {
                escaped.push('[');
                escaped.push(c);
                escaped.push(']');
            }
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders_are_numbered_in_order() {
        let mut params = AttributeParameters::new();
        assert_eq!(params.bind_i64(5), "?1");
        assert_eq!(params.bind(&FieldValue::from("x")).unwrap(), "?2");
        assert_eq!(params.len(), 2);
        assert_eq!(params.values()[0], SqlValue::Integer(5));
    }

    #[test]
    fn test_escape_glob() {
        assert_eq!(escape_glob("a*b?c[d]"), "a[*]b[?]c[[]d]");
        assert_eq!(escape_glob("plain"), "plain");
    }

    #[test]
    fn test_bind_text_modes() {
        let mut params = AttributeParameters::new();
        params.bind_text("50%_off*", TextMode::Prefix);
        params.bind_text("x'); DROP TABLE t; --", TextMode::Contains);
        params.bind_text("Exact", TextMode::Exact);
        params.bind_text("ÉCOLE Bakery", TextMode::CaseInsensitive);

        assert_eq!(params.values()[0], SqlValue::Text("50%_off[*]*".to_string()));
        assert_eq!(
            params.values()[1],
            SqlValue::Text("*x'); DROP TABLE t; --*".to_string())
        );
        assert_eq!(params.values()[2], SqlValue::Text("Exact".to_string()));
        assert_eq!(params.values()[3], SqlValue::Text("école bakery".to_string()));
    }

    #[test]
    fn test_bind_rejects_unstorable_value() {
        let mut params = AttributeParameters::new();
        assert!(params.bind(&FieldValue::Double(f64::NAN)).is_err());
        assert!(params.is_empty());
    }
}
