//! Progress tracking for chain synchronization.
//!
//! This module provides the `SyncProgressTracker`, which records the block heights the engine has
//! crawled, counts examined and accepted transactions, and reports statistics and gaps so a sync
//! session can be checked for completeness.

use std::collections::BTreeSet;
use tracing::{info, warn};

/// Blocks between two periodic progress lines
const LOG_INTERVAL: u64 = 1000;

/// Service for tracking synchronization progress
#[derive(Debug, Clone)]
pub struct SyncProgressTracker {
	/// The highest block height we've crawled
	highest_processed_height: u64,
	/// Every block height crawled in this session
	processed_heights: BTreeSet<u64>,
	/// Checkpoint the session started from
	start_height: u64,
	/// Transactions handed to the oracle
	transactions_examined: usize,
	/// Transactions the oracle accepted
	oracle_transactions: usize,
	/// Last height at which we logged progress
	last_logged_height: u64,
}

impl SyncProgressTracker {
	/// Create a new progress tracker starting from the given checkpoint.
	pub fn new(start_height: u64) -> Self {
		Self {
			highest_processed_height: start_height,
			processed_heights: BTreeSet::new(),
			start_height,
			transactions_examined: 0,
			oracle_transactions: 0,
			last_logged_height: start_height,
		}
	}

	/// Record that the block at `height` was fully crawled
	pub fn record_block(&mut self, height: u64) {
		self.highest_processed_height = self.highest_processed_height.max(height);
		self.processed_heights.insert(height);
	}

	/// Record one examined transaction and whether the oracle accepted it
	pub fn record_transaction(&mut self, accepted: bool) {
		self.transactions_examined += 1;
		if accepted {
			self.oracle_transactions += 1;
		}
	}

	/// Check for gaps in crawled heights
	///
	/// Returns a list of (start, end) pairs around missing height ranges.
	pub fn check_for_gaps(&self) -> Vec<(u64, u64)> {
		let heights: Vec<u64> = self.processed_heights.iter().copied().collect();
		heights
			.windows(2)
			.filter(|window| window[1] - window[0] > 1)
			.map(|window| (window[0], window[1]))
			.collect()
	}

	/// Log progress every `LOG_INTERVAL` blocks or when forced
	pub fn log_progress(&mut self, force: bool) {
		let blocks_since_last_log = self
			.highest_processed_height
			.saturating_sub(self.last_logged_height);
		let should_log = force || blocks_since_last_log >= LOG_INTERVAL;

		if should_log && !self.processed_heights.is_empty() {
			info!(
				"Sync progress: {} transactions examined, {} oracle transactions up to height {}",
				self.transactions_examined, self.oracle_transactions, self.highest_processed_height
			);
			self.last_logged_height = self.highest_processed_height;
		}
	}

	/// Get sync statistics as a SyncStats struct
	pub fn get_stats(&self) -> SyncStats {
		SyncStats {
			start_height: self.start_height,
			highest_processed_height: self.highest_processed_height,
			blocks_processed: self.processed_heights.len(),
			transactions_examined: self.transactions_examined,
			oracle_transactions: self.oracle_transactions,
			gaps: self.check_for_gaps(),
		}
	}

	/// Warn about any gaps left by the session
	pub fn validate_completion(&self) {
		let gaps = self.check_for_gaps();
		if !gaps.is_empty() {
			warn!("Sync finished with {} gaps in crawled heights", gaps.len());
			for (start, end) in &gaps {
				warn!("Gap detected: missing heights between {} and {}", start, end);
			}
		}
	}
}

/// Statistics about the sync progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStats {
	pub start_height: u64,
	pub highest_processed_height: u64,
	pub blocks_processed: usize,
	pub transactions_examined: usize,
	pub oracle_transactions: usize,
	pub gaps: Vec<(u64, u64)>,
}

impl SyncStats {
	/// Get a human-readable summary of the sync statistics
	pub fn summary(&self) -> String {
		format!(
			"Sync from {} to {}: {} blocks, {} transactions, {} oracle transactions{}",
			self.start_height,
			self.highest_processed_height,
			self.blocks_processed,
			self.transactions_examined,
			self.oracle_transactions,
			if self.gaps.is_empty() {
				String::new()
			} else {
				format!(" ({} gaps)", self.gaps.len())
			}
		)
	}
}
