//! Capital and loss accounting for the position manager.
//!
//! The ledger enforces the position count, available capital and the
//! sticky daily loss guard before any entry is executed.

mod ledger;

pub use ledger::{BalanceLedger, LedgerSnapshot};
