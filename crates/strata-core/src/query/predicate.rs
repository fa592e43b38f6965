//! Typed predicate AST and its SQLite rendering.

use crate::error::StrataResult;
use crate::selector::{AttributeParameters, TextMode};
use crate::storage::FOLD_CASE_FUNCTION;
use crate::types::FieldValue;

/// Alias of the scanned table in compiled queries.
pub const TABLE_ALIAS: &str = "t";

/// Alias of the `json_each` row inside collection predicates.
const ELEMENT_ALIAS: &str = "je";

/// Column reference.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Cid,
    Owner,
    LifeStart,
    LifeEnd,
    /// A declared key or payload field.
    Field(String),
    /// The current element inside a collection predicate.
    Element,
}

impl Column {
    fn render(&self) -> String {
        match self {
            Column::Cid => format!("{}.cid", TABLE_ALIAS),
            Column::Owner => format!("{}.owner", TABLE_ALIAS),
            Column::LifeStart => format!("{}.life_start", TABLE_ALIAS),
            Column::LifeEnd => format!("{}.life_end", TABLE_ALIAS),
            Column::Field(name) => format!("{}.\"{}\"", TABLE_ALIAS, name),
            Column::Element => format!("{}.value", ELEMENT_ALIAS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// A boolean condition over one row.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Conjunction; empty is true.
    And(Vec<Predicate>),
    /// Matches nothing.
    False,
    Compare {
        column: Column,
        op: CompareOp,
        value: FieldValue,
    },
    IsNull(Column),
    In {
        column: Column,
        values: Vec<FieldValue>,
    },
    Text {
        column: Column,
        pattern: String,
        mode: TextMode,
    },
    /// Some element of a JSON-array column satisfies `element`.
    AnyElement {
        column: Column,
        element: Box<Predicate>,
    },
    /// The row is the lowest-cid version of its fact among those with
    /// `life_end > at`, and is itself such a version.
    FirstLiveAtOrAfter {
        table: String,
        key_columns: Vec<String>,
        at: i64,
    },
}

impl Predicate {
    pub fn compare(column: Column, op: CompareOp, value: impl Into<FieldValue>) -> Self {
        Predicate::Compare {
            column,
            op,
            value: value.into(),
        }
    }

    /// Conjunction that flattens nested `And`s and drops trivially true parts.
    pub fn all(parts: Vec<Predicate>) -> Self {
        let mut flat = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                Predicate::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.iter().any(|p| matches!(p, Predicate::False)) {
            return Predicate::False;
        }
        Predicate::And(flat)
    }

    /// Render to SQL, binding every literal into `params`.
    pub fn render(&self, params: &mut AttributeParameters) -> StrataResult<String> {
        let sql = match self {
            Predicate::And(parts) if parts.is_empty() => "1".to_string(),
            Predicate::And(parts) => parts
                .iter()
                .map(|p| p.render(params))
                .collect::<StrataResult<Vec<_>>>()?
                .join(" AND "),
            Predicate::False => "0".to_string(),
            Predicate::Compare { column, op, value } => {
                let placeholder = params.bind(value)?;
                format!("{} {} {}", column.render(), op.as_sql(), placeholder)
            }
            Predicate::IsNull(column) => format!("{} IS NULL", column.render()),
            Predicate::In { values, .. } if values.is_empty() => "0".to_string(),
            Predicate::In { column, values } => {
                let placeholders = values
                    .iter()
                    .map(|v| params.bind(v))
                    .collect::<StrataResult<Vec<_>>>()?;
                format!("{} IN ({})", column.render(), placeholders.join(", "))
            }
            Predicate::Text {
                column,
                pattern,
                mode,
            } => {
                let placeholder = params.bind_text(pattern, *mode);
                match mode {
                    TextMode::Exact => format!("{} = {}", column.render(), placeholder),
                    TextMode::Prefix | TextMode::Contains => {
                        format!("{} GLOB {}", column.render(), placeholder)
                    }
                    // The literal is folded when bound.
                    TextMode::CaseInsensitive => {
                        format!("{}({}) = {}", FOLD_CASE_FUNCTION, column.render(), placeholder)
                    }
                }
            }
            Predicate::AnyElement { column, element } => format!(
                "EXISTS (SELECT 1 FROM json_each({}) AS {} WHERE {})",
                column.render(),
                ELEMENT_ALIAS,
                element.render(params)?
            ),
            Predicate::FirstLiveAtOrAfter {
                table,
                key_columns,
                at,
            } => {
                let at = params.bind_i64(*at);
                let key_match: String = key_columns
                    .iter()
                    .map(|k| format!(" AND f.\"{k}\" = {}.\"{k}\"", TABLE_ALIAS))
                    .collect();
                format!(
                    "{alias}.life_end > {at} AND {alias}.cid = (SELECT MIN(f.cid) FROM \"{table}\" AS f \
                     WHERE f.owner IS {alias}.owner{key_match} AND f.life_end > {at})",
                    alias = TABLE_ALIAS,
                )
            }
        };
        Ok(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_binds_literals() {
        let predicate = Predicate::all(vec![
            Predicate::compare(Column::Owner, CompareOp::Eq, "acct-1"),
            Predicate::compare(Column::Field("balance".into()), CompareOp::Ge, 10.0),
        ]);
        let mut params = AttributeParameters::new();
        let sql = predicate.render(&mut params).unwrap();

        assert_eq!(sql, "t.owner = ?1 AND t.\"balance\" >= ?2");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_all_flattens_and_short_circuits() {
        let nested = Predicate::all(vec![
            Predicate::And(vec![Predicate::IsNull(Column::Owner)]),
            Predicate::And(vec![]),
        ]);
        assert_eq!(nested, Predicate::And(vec![Predicate::IsNull(Column::Owner)]));

        let falsy = Predicate::all(vec![Predicate::IsNull(Column::Owner), Predicate::False]);
        assert_eq!(falsy, Predicate::False);
    }

    #[test]
    fn test_render_text_never_inlines_pattern() {
        let predicate = Predicate::Text {
            column: Column::Field("name".into()),
            pattern: "'; DROP TABLE x; --".into(),
            mode: TextMode::Contains,
        };
        let mut params = AttributeParameters::new();
        let sql = predicate.render(&mut params).unwrap();

        assert_eq!(sql, "t.\"name\" GLOB ?1");
        assert!(!sql.contains("DROP"));
    }

    #[test]
    fn test_render_case_insensitive_folds_both_sides() {
        let predicate = Predicate::Text {
            column: Column::Field("merchant".into()),
            pattern: "ÉCOLE".into(),
            mode: TextMode::CaseInsensitive,
        };
        let mut params = AttributeParameters::new();
        let sql = predicate.render(&mut params).unwrap();

        assert_eq!(sql, format!("{}(t.\"merchant\") = ?1", FOLD_CASE_FUNCTION));
        assert_eq!(
            params.values()[0],
            rusqlite::types::Value::Text("école".to_string())
        );
    }

    #[test]
    fn test_render_rejects_non_finite_literal() {
        let predicate = Predicate::all(vec![
            Predicate::IsNull(Column::Owner),
            Predicate::compare(Column::Field("rate".into()), CompareOp::Lt, f64::INFINITY),
        ]);
        let mut params = AttributeParameters::new();
        assert!(predicate.render(&mut params).is_err());
    }

    #[test]
    fn test_render_any_element() {
        let predicate = Predicate::AnyElement {
            column: Column::Field("tags".into()),
            element: Box::new(Predicate::In {
                column: Column::Element,
                values: vec!["a".into(), "b".into()],
            }),
        };
        let mut params = AttributeParameters::new();
        assert_eq!(
            predicate.render(&mut params).unwrap(),
            "EXISTS (SELECT 1 FROM json_each(t.\"tags\") AS je WHERE je.value IN (?1, ?2))"
        );
    }

    #[test]
    fn test_render_empty_set_matches_nothing() {
        let predicate = Predicate::In {
            column: Column::Field("status".into()),
            values: vec![],
        };
        let mut params = AttributeParameters::new();
        assert_eq!(predicate.render(&mut params).unwrap(), "0");
        assert!(params.is_empty());
    }
}
