use crate::node::{NodeError, RetryPolicy};
use crate::oracle::OracleError;
use crate::store::StoreError;

use std::time::Duration;

/// Error types for the chain sync engine
#[allow(clippy::enum_variant_names)]
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
	#[error("Node error: {0}")]
	NodeError(#[from] NodeError),

	#[error("Oracle error: {0}")]
	OracleError(#[from] OracleError),

	#[error("Storage error: {0}")]
	StoreError(#[from] StoreError),
}

/// Configuration for the sync engine
#[derive(Debug, Clone)]
pub struct SyncConfig {
	/// Lowest height to crawl from when the stored checkpoint is behind it
	pub start_height: u64,
	/// Bound on concurrent node and storage requests
	pub max_concurrency: usize,
	/// Interval of the periodic resync independent of notifications
	pub poll_interval: Duration,
	pub retry: RetryPolicy,
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			start_height: 0,
			max_concurrency: 10,
			poll_interval: Duration::from_secs(60),
			retry: RetryPolicy::default(),
		}
	}
}
