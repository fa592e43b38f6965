//! Bitemporal versioning for synchronized facts.
//!
//! Each resynchronization either leaves a fact's live version in place or
//! closes it and opens a successor, so any past instant can be queried
//! with "what did we believe was true at time T?"

mod detector;
mod store;
mod sync_state;
mod table;

pub use detector::{equivalent, values_equivalent};
pub use store::{key_of, TemporalStore};
pub use sync_state::{SyncState, SyncStateStore, DEFAULT_SYNC_TABLE};
pub use table::SchemaTable;
