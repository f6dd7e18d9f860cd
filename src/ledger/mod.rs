//! Durable quota ledger: `Users` rows carrying tier and daily-use counter,
//! and the append-only `Messages` audit log.

pub mod store;
pub mod types;

pub use store::{Ledger, SqliteLedger};
pub use types::{InteractionRecord, TIMESTAMP_FORMAT, UserId, UserRecord};
