//! Selector query compilation.
//!
//! Field selectors, a lifeline selector, an owner scope, and a cursor are
//! turned into a typed [`Predicate`] tree and rendered once into a single
//! parameterized SQLite statement with keyset pagination on `cid`.

mod compiler;
mod predicate;

pub use compiler::{ExecutablePage, PageRequest, QueryCompiler};
pub use predicate::{Column, CompareOp, Predicate};

pub(crate) use compiler::select_list;
pub(crate) use predicate::TABLE_ALIAS;
