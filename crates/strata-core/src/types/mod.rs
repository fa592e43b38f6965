//! Core types for strata.

mod record;
mod schema;
mod value;

pub use record::{Fields, NaturalKey, Payload, UpsertOutcome, VersionedRecord, FOREVER};
pub(crate) use schema::is_identifier;
pub use schema::{FieldDef, SchemaDescriptor, SchemaDescriptorBuilder, RESERVED_COLUMNS};
pub use value::{FieldType, FieldValue};
