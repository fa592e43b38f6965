//! Compiles selectors into a filtered, keyset-paginated query.

use tracing::debug;

use super::predicate::{Column, CompareOp, Predicate, TABLE_ALIAS};
use crate::config::StoreConfig;
use crate::error::{ErrorCode, StrataError, StrataResult};
use crate::selector::{
    AttributeParameters, AttributeSelector, Direction, FieldSelector, LifelineSelector,
    OwnerScope, RangeBound,
};
use crate::types::{FieldDef, FieldType, FieldValue, SchemaDescriptor, FOREVER};

/// A compiled page query, ready to run against the schema's table.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutablePage {
    pub sql: String,
    pub params: AttributeParameters,
    pub limit: u32,
    pub direction: Direction,
}

/// Everything a page query is compiled from.
#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    pub lifeline: LifelineSelector,
    pub selectors: Vec<FieldSelector>,
    /// Last cid returned by the previous page.
    pub cursor: Option<i64>,
    pub direction: Direction,
    /// Requested page size; absent or non-positive means the default.
    pub limit: Option<i64>,
}

impl PageRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lifeline(mut self, lifeline: LifelineSelector) -> Self {
        self.lifeline = lifeline;
        self
    }

    pub fn select(mut self, field: impl Into<String>, selector: AttributeSelector) -> Self {
        self.selectors.push(FieldSelector::new(field, selector));
        self
    }

    pub fn after(mut self, cursor: Option<i64>) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Turns selectors into SQL for one schema.
#[derive(Debug, Clone)]
pub struct QueryCompiler<'a> {
    schema: &'a SchemaDescriptor,
    default_page_size: u32,
    max_page_size: u32,
}

impl<'a> QueryCompiler<'a> {
    pub fn new(schema: &'a SchemaDescriptor, config: &StoreConfig) -> Self {
        Self {
            schema,
            default_page_size: schema.page_size.unwrap_or(config.default_page_size),
            max_page_size: config.max_page_size,
        }
    }

    /// Effective page size for a requested limit.
    pub fn resolve_limit(&self, limit: Option<i64>) -> u32 {
        match limit {
            Some(n) if n > 0 => n.min(i64::from(self.max_page_size)) as u32,
            _ => self.default_page_size.min(self.max_page_size),
        }
    }

    /// Compile a page query.
    ///
    /// Fails with [`StrataError::SelectorMismatch`] before anything runs if a
    /// selector names an unknown field, does not fit the field's type, or
    /// carries a literal of the wrong type.
    pub fn compile(&self, owner: &OwnerScope, request: &PageRequest) -> StrataResult<ExecutablePage> {
        let mut parts = vec![owner_predicate(owner), self.lifeline_predicate(request.lifeline)];
        for selector in &request.selectors {
            if let Some(predicate) = self.selector_predicate(selector)? {
                parts.push(predicate);
            }
        }
        if let Some(cursor) = request.cursor {
            let op = match request.direction {
                Direction::Ascending => CompareOp::Gt,
                Direction::Descending => CompareOp::Lt,
            };
            parts.push(Predicate::compare(Column::Cid, op, cursor));
        }

        let limit = self.resolve_limit(request.limit);
        let mut params = AttributeParameters::new();
        let filter = Predicate::all(parts).render(&mut params)?;
        let order = match request.direction {
            Direction::Ascending => "ASC",
            Direction::Descending => "DESC",
        };
        let limit_placeholder = params.bind_i64(i64::from(limit));
        let sql = format!(
            "SELECT {} FROM \"{}\" AS {} WHERE {} ORDER BY {}.cid {} LIMIT {}",
            select_list(self.schema),
            self.schema.name,
            TABLE_ALIAS,
            filter,
            TABLE_ALIAS,
            order,
            limit_placeholder
        );
        debug!(table = %self.schema.name, %sql, params = params.len(), "compiled page query");

        Ok(ExecutablePage {
            sql,
            params,
            limit,
            direction: request.direction,
        })
    }

    fn lifeline_predicate(&self, lifeline: LifelineSelector) -> Predicate {
        match lifeline {
            LifelineSelector::Live => Predicate::compare(Column::LifeEnd, CompareOp::Eq, FOREVER),
            LifelineSelector::LiveAt(at) => Predicate::all(vec![
                Predicate::compare(Column::LifeStart, CompareOp::Le, at),
                Predicate::compare(Column::LifeEnd, CompareOp::Gt, at),
            ]),
            LifelineSelector::LiveDuring { from, to } => Predicate::all(vec![
                Predicate::compare(Column::LifeStart, CompareOp::Le, to),
                Predicate::compare(Column::LifeEnd, CompareOp::Gt, from),
            ]),
            LifelineSelector::FirstLiveAtOrAfter(at) => Predicate::FirstLiveAtOrAfter {
                table: self.schema.name.clone(),
                key_columns: self.schema.key.iter().map(|d| d.name.clone()).collect(),
                at,
            },
            LifelineSelector::AllVersions => Predicate::And(Vec::new()),
        }
    }

    fn selector_predicate(&self, selector: &FieldSelector) -> StrataResult<Option<Predicate>> {
        let def = self.schema.field(&selector.field).ok_or_else(|| {
            StrataError::selector(
                &selector.field,
                ErrorCode::SelUnknownField,
                format!("schema '{}' has no such field", self.schema.name),
            )
        })?;
        field_predicate(def, Column::Field(def.name.clone()), &def.field_type, &selector.selector)
    }
}

fn owner_predicate(owner: &OwnerScope) -> Predicate {
    match owner {
        OwnerScope::Owner(id) => Predicate::compare(Column::Owner, CompareOp::Eq, id.as_str()),
        OwnerScope::Shared => Predicate::IsNull(Column::Owner),
    }
}

/// Predicate for `selector` applied to `column` of type `ty`; `None` when the
/// selector constrains nothing.
fn field_predicate(
    def: &FieldDef,
    column: Column,
    ty: &FieldType,
    selector: &AttributeSelector,
) -> StrataResult<Option<Predicate>> {
    let incompatible = || {
        StrataError::selector(
            &def.name,
            ErrorCode::SelIncompatibleType,
            format!("{} selector cannot apply to {}", selector.kind(), ty),
        )
    };

    match selector {
        AttributeSelector::Unconstrained => Ok(None),
        AttributeSelector::Range { min, max } => {
            if !ty.is_ordered() {
                return Err(incompatible());
            }
            let mut parts = Vec::new();
            if let Some(bound) = min {
                let op = if bound.is_inclusive() { CompareOp::Ge } else { CompareOp::Gt };
                parts.push(bound_predicate(def, &column, ty, op, bound)?);
            }
            if let Some(bound) = max {
                let op = if bound.is_inclusive() { CompareOp::Le } else { CompareOp::Lt };
                parts.push(bound_predicate(def, &column, ty, op, bound)?);
            }
            Ok((!parts.is_empty()).then(|| Predicate::all(parts)))
        }
        AttributeSelector::SetMembership { values } => {
            if !ty.is_scalar() {
                return Err(incompatible());
            }
            let values = values
                .iter()
                .map(|v| literal(def, ty, v))
                .collect::<StrataResult<Vec<_>>>()?;
            Ok(Some(Predicate::In { column, values }))
        }
        AttributeSelector::TextMatch { pattern, mode } => {
            if *ty != FieldType::Text {
                return Err(incompatible());
            }
            Ok(Some(Predicate::Text {
                column,
                pattern: pattern.clone(),
                mode: *mode,
            }))
        }
        AttributeSelector::CollectionMembership { element } => {
            let FieldType::Collection(element_type) = ty else {
                return Err(incompatible());
            };
            let inner = field_predicate(def, Column::Element, element_type, element)?
                .unwrap_or(Predicate::And(Vec::new()));
            Ok(Some(Predicate::AnyElement {
                column,
                element: Box::new(inner),
            }))
        }
    }
}

fn bound_predicate(
    def: &FieldDef,
    column: &Column,
    ty: &FieldType,
    op: CompareOp,
    bound: &RangeBound,
) -> StrataResult<Predicate> {
    // A bound on an int field may lie outside i32 and still be meaningful.
    let bound_type = match ty {
        FieldType::Int => &FieldType::Long,
        other => other,
    };
    Ok(Predicate::Compare {
        column: column.clone(),
        op,
        value: literal(def, bound_type, bound.value())?,
    })
}

/// Coerce a selector literal to the field type. Null literals never match
/// anything under SQL comparison, so they are rejected outright.
fn literal(def: &FieldDef, ty: &FieldType, value: &FieldValue) -> StrataResult<FieldValue> {
    if value.is_null() {
        return Err(StrataError::selector(
            &def.name,
            ErrorCode::SelInvalidLiteral,
            "null literal in selector",
        ));
    }
    value.coerce(ty).ok_or_else(|| {
        StrataError::selector(
            &def.name,
            ErrorCode::SelInvalidLiteral,
            format!("literal {:?} does not fit {}", value, ty),
        )
    })
}

/// Column list shared by every query against a schema table; row decoding
/// relies on this order.
pub(crate) fn select_list(schema: &SchemaDescriptor) -> String {
    let mut columns = vec![
        format!("{}.cid", TABLE_ALIAS),
        format!("{}.owner", TABLE_ALIAS),
    ];
    columns.extend(
        schema
            .columns()
            .map(|def| format!("{}.\"{}\"", TABLE_ALIAS, def.name)),
    );
    columns.push(format!("{}.life_start", TABLE_ALIAS));
    columns.push(format!("{}.life_end", TABLE_ALIAS));
    columns.join(", ")
}
