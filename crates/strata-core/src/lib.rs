//! strata-core - Point-in-time versioned fact store.
//!
//! Facts pulled from upstream systems are stored as immutable versions with
//! validity intervals. Readers ask for the state of a fact at any instant or
//! page through filtered history with typed selectors.
//!
//! # Example
//!
//! ```ignore
//! use strata_core::{key_of, FieldType, Fields, SchemaDescriptor, TemporalStore};
//!
//! let schema = SchemaDescriptor::builder("balances")
//!     .key("account_id", FieldType::Text)
//!     .field("current", FieldType::Double)
//!     .build()?;
//! let store = TemporalStore::in_memory(schema)?;
//!
//! let key = key_of("account_id", "chk");
//! store.upsert(Some("user-1"), &key, &Fields::new().with("current", 10.0), 100)?;
//! let live = store.get_live_at(Some("user-1"), &key, 150)?;
//! ```

pub mod config;
pub mod error;
pub mod query;
pub mod selector;
pub mod storage;
pub mod types;
pub mod versioning;

// Re-export commonly used types
pub use config::StoreConfig;
pub use error::{ErrorCode, StrataError, StrataResult};
pub use query::{PageRequest, QueryCompiler};
pub use selector::{
    AttributeParameters, AttributeSelector, Direction, FieldSelector, LifelineSelector,
    OwnerScope, RangeBound, TextMode,
};
pub use storage::{Clock, ManualClock, SqliteTransactionRunner, SystemClock, TransactionRunner};
pub use types::{
    FieldDef, FieldType, FieldValue, Fields, NaturalKey, Payload, SchemaDescriptor,
    UpsertOutcome, VersionedRecord, FOREVER,
};
pub use versioning::{key_of, SyncState, SyncStateStore, TemporalStore};
