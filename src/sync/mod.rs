//! Chain Synchronization Module
//!
//! This module keeps the oracle in step with the node. It is composed of several submodules:
//!
//! - `orchestrator`: The `ChainSyncEngine`, which crawls blocks, sweeps the mempool and reacts to
//!   node notifications.
//! - `progress_tracker`: Tracks crawled heights and transaction counts, and reports gaps.
//! - `unconfirmed`: The set of transactions examined before confirmation with their verdicts.
//! - `types`: Engine configuration and errors.

/// Main coordinator for the chain sync process
pub mod orchestrator;
/// Tracks synchronization progress and statistics
pub mod progress_tracker;
/// Engine configuration and errors
pub mod types;
/// Verdicts for transactions seen before confirmation
pub mod unconfirmed;

pub use orchestrator::*;
pub use types::*;
pub use unconfirmed::{UnconfirmedSet, Verdict};
