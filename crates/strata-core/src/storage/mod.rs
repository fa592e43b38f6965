//! Transaction substrate, id sequence, and clock.

mod clock;
mod runner;
pub(crate) mod sequence;

#[cfg(test)]
pub use clock::MockClock;
pub use clock::{Clock, ManualClock, SystemClock};
pub use runner::{SqliteTransactionRunner, TransactionRunner, FOLD_CASE_FUNCTION};
