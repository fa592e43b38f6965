//! Attribute and lifeline selectors for version-history queries.
//!
//! Selectors are declarative: they say what a matching record looks like
//! and carry typed literals. They are compiled against a schema descriptor
//! by [`crate::query::QueryCompiler`], which binds their literals into
//! [`AttributeParameters`].

mod params;

pub use params::AttributeParameters;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::types::FieldValue;

/// One end of a range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeBound {
    Inclusive(FieldValue),
    Exclusive(FieldValue),
}

impl RangeBound {
    pub fn value(&self) -> &FieldValue {
        match self {
            RangeBound::Inclusive(v) | RangeBound::Exclusive(v) => v,
        }
    }

    pub fn is_inclusive(&self) -> bool {
        matches!(self, RangeBound::Inclusive(_))
    }
}

/// How a text literal is matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TextMode {
    /// Byte-for-byte equality.
    Exact,
    /// Value starts with the literal.
    Prefix,
    /// Value contains the literal.
    Contains,
    /// Equality ignoring case.
    CaseInsensitive,
}

/// Filter on one field.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeSelector {
    /// Matches everything.
    #[default]
    Unconstrained,
    /// Ordered scalar within optional bounds.
    Range {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<RangeBound>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<RangeBound>,
    },
    /// Scalar is one of the listed values.
    SetMembership { values: Vec<FieldValue> },
    /// Text matches the literal under `mode`.
    TextMatch { pattern: String, mode: TextMode },
    /// At least one element of a collection satisfies `element`.
    CollectionMembership { element: Box<AttributeSelector> },
}

impl AttributeSelector {
    /// Half-open range `[lo, hi)`.
    pub fn between(lo: impl Into<FieldValue>, hi: impl Into<FieldValue>) -> Self {
        AttributeSelector::Range {
            min: Some(RangeBound::Inclusive(lo.into())),
            max: Some(RangeBound::Exclusive(hi.into())),
        }
    }

    /// Closed range `[lo, hi]`.
    pub fn between_inclusive(lo: impl Into<FieldValue>, hi: impl Into<FieldValue>) -> Self {
        AttributeSelector::Range {
            min: Some(RangeBound::Inclusive(lo.into())),
            max: Some(RangeBound::Inclusive(hi.into())),
        }
    }

    /// `value >= lo`.
    pub fn at_least(lo: impl Into<FieldValue>) -> Self {
        AttributeSelector::Range {
            min: Some(RangeBound::Inclusive(lo.into())),
            max: None,
        }
    }

    /// `value > lo`.
    pub fn greater_than(lo: impl Into<FieldValue>) -> Self {
        AttributeSelector::Range {
            min: Some(RangeBound::Exclusive(lo.into())),
            max: None,
        }
    }

    /// `value < hi`.
    pub fn below(hi: impl Into<FieldValue>) -> Self {
        AttributeSelector::Range {
            min: None,
            max: Some(RangeBound::Exclusive(hi.into())),
        }
    }

    /// `value <= hi`.
    pub fn at_most(hi: impl Into<FieldValue>) -> Self {
        AttributeSelector::Range {
            min: None,
            max: Some(RangeBound::Inclusive(hi.into())),
        }
    }

    /// `value ∈ values`.
    pub fn one_of<V: Into<FieldValue>>(values: impl IntoIterator<Item = V>) -> Self {
        AttributeSelector::SetMembership {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn text(pattern: impl Into<String>, mode: TextMode) -> Self {
        AttributeSelector::TextMatch {
            pattern: pattern.into(),
            mode,
        }
    }

    pub fn exact(pattern: impl Into<String>) -> Self {
        Self::text(pattern, TextMode::Exact)
    }

    pub fn prefix(pattern: impl Into<String>) -> Self {
        Self::text(pattern, TextMode::Prefix)
    }

    pub fn contains(pattern: impl Into<String>) -> Self {
        Self::text(pattern, TextMode::Contains)
    }

    /// Any element of the collection satisfies `element`.
    pub fn any_element(element: AttributeSelector) -> Self {
        AttributeSelector::CollectionMembership {
            element: Box::new(element),
        }
    }

    pub fn is_unconstrained(&self) -> bool {
        matches!(self, AttributeSelector::Unconstrained)
    }

    /// Short name of the selector kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            AttributeSelector::Unconstrained => "unconstrained",
            AttributeSelector::Range { .. } => "range",
            AttributeSelector::SetMembership { .. } => "set_membership",
            AttributeSelector::TextMatch { .. } => "text_match",
            AttributeSelector::CollectionMembership { .. } => "collection_membership",
        }
    }
}

/// A selector bound to a field name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSelector {
    pub field: String,
    pub selector: AttributeSelector,
}

impl FieldSelector {
    pub fn new(field: impl Into<String>, selector: AttributeSelector) -> Self {
        Self {
            field: field.into(),
            selector,
        }
    }
}

/// Temporal relationship required between a record's interval and the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifelineSelector {
    /// Current versions only.
    #[default]
    Live,
    /// Versions whose interval contains the instant.
    LiveAt(i64),
    /// Versions whose interval intersects the closed window `[from, to]`.
    LiveDuring { from: i64, to: i64 },
    /// Per fact, the earliest version still live at or after the instant.
    FirstLiveAtOrAfter(i64),
    /// Every version, regardless of time.
    AllVersions,
}

/// Which facts a query may see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerScope {
    /// Facts belonging to one owner.
    Owner(String),
    /// Shared reference facts with no owner.
    Shared,
}

impl OwnerScope {
    pub fn owner(id: impl Into<String>) -> Self {
        OwnerScope::Owner(id.into())
    }

    pub fn from_option(owner: Option<&str>) -> Self {
        match owner {
            Some(id) => OwnerScope::Owner(id.to_string()),
            None => OwnerScope::Shared,
        }
    }

    pub fn as_option(&self) -> Option<&str> {
        match self {
            OwnerScope::Owner(id) => Some(id),
            OwnerScope::Shared => None,
        }
    }
}

/// Keyset pagination direction over `cid`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}
