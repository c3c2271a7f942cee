//! Persistence - Access to the statistics database shared with the collectors

mod database;

#[cfg(test)]
pub use database::fixtures;
pub use database::{Database, Pool, StoreTx};
