//! Oracle service for script-header encoded token and unique assets.
//!
//! Follows a bitcoind-compatible node, validates every transaction touching protocol outputs
//! and keeps the set of live token and unique asset UTXOs that attestations are issued against.

pub mod cache;
pub mod config;
pub mod node;
pub mod oracle;
pub mod protocol;
pub mod query;
pub mod store;
pub mod sync;
pub mod utils;

#[cfg(test)]
mod test_utils;
