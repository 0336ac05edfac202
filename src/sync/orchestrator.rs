//! Chain sync engine and integration point for the oracle.
//!
//! The `ChainSyncEngine` keeps the oracle's view of protocol UTXOs in step with the node. It
//! crawls confirmed blocks from the stored checkpoint to the tip, sweeps the mempool for
//! unconfirmed transactions, and reacts to push notifications, while a periodic timer re-runs the
//! crawl so a missed notification only delays processing.
//!
//! Each transaction moves through three states: unseen, unconfirmed with a verdict, confirmed.
//! A transaction validated while unconfirmed is never validated again at confirmation; its
//! persisted record only has its confirmation flag flipped.

use crate::node::{NodeError, NodeNotification, NodeRpc, retry};
use crate::oracle::OracleProcessor;
use crate::store::{CheckpointRepository, TransactionRecord, TransactionRepository};
use crate::sync::progress_tracker::{SyncProgressTracker, SyncStats};
use crate::sync::types::{SyncConfig, SyncError};
use crate::sync::unconfirmed::{UnconfirmedSet, Verdict};

use bitcoin::{Transaction, Txid};
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Main chain sync engine
pub struct ChainSyncEngine {
	node: Arc<dyn NodeRpc>,
	oracle: Arc<OracleProcessor>,
	transactions: Arc<dyn TransactionRepository>,
	checkpoint: Arc<dyn CheckpointRepository>,
	unconfirmed: Arc<UnconfirmedSet>,
	config: SyncConfig,
	/// Held for the whole height loop so only one crawl runs at a time
	progress: Mutex<SyncProgressTracker>,
}

impl ChainSyncEngine {
	pub fn new(
		node: Arc<dyn NodeRpc>,
		oracle: Arc<OracleProcessor>,
		transactions: Arc<dyn TransactionRepository>,
		checkpoint: Arc<dyn CheckpointRepository>,
		unconfirmed: Arc<UnconfirmedSet>,
		config: SyncConfig,
	) -> Self {
		Self {
			node,
			oracle,
			transactions,
			checkpoint,
			unconfirmed,
			progress: Mutex::new(SyncProgressTracker::new(config.start_height)),
			config,
		}
	}

	pub fn unconfirmed(&self) -> &Arc<UnconfirmedSet> {
		&self.unconfirmed
	}

	pub async fn stats(&self) -> SyncStats {
		self.progress.lock().await.get_stats()
	}

	/// Prepare for a sync session: resolve the starting checkpoint, drop unconfirmed records
	/// that cannot be reconciled after a restart and rebuild the UTXO cache from storage.
	///
	/// Returns the checkpoint the session starts from.
	pub async fn bootstrap(&self) -> Result<u64, SyncError> {
		let stored = self.checkpoint.get().await?;
		let height = stored.max(self.config.start_height);
		if height != stored {
			info!(
				"Stored checkpoint {} is behind start height {}, skipping ahead",
				stored, self.config.start_height
			);
			self.checkpoint.set(height).await?;
		}

		let purged = self.transactions.remove_all_unconfirmed().await?;
		if purged > 0 {
			info!("Removed {} unconfirmed transaction records", purged);
		}
		self.unconfirmed.clear();

		self.oracle
			.cache()
			.rebuild(self.oracle.store().utxos.as_ref())
			.await?;

		*self.progress.lock().await = SyncProgressTracker::new(height);
		info!("Sync bootstrapped at checkpoint {}", height);
		Ok(height)
	}

	/// Validate a transaction first seen outside a block
	///
	/// A transaction is examined at most once while unconfirmed; later sightings are ignored.
	pub async fn handle_unconfirmed(&self, tx: &Transaction) -> Result<bool, SyncError> {
		let txid = tx.txid();
		if !self.unconfirmed.claim(txid) {
			debug!("Transaction {} already examined", txid);
			return Ok(false);
		}

		let accepted = match self.oracle.process_transaction(tx).await {
			Ok(accepted) => accepted,
			Err(e) => {
				self.unconfirmed.release(&txid);
				return Err(e.into());
			}
		};
		// inputs are consumed, so the verdict stands even if the record write fails
		self.unconfirmed.record(txid, accepted);
		if accepted {
			self.transactions
				.insert(TransactionRecord::new(tx, None))
				.await?;
		}
		Ok(accepted)
	}

	/// Reconcile a transaction found in the block at `height`
	pub async fn handle_confirmed(&self, tx: &Transaction, height: u64) -> Result<bool, SyncError> {
		let txid = tx.txid();
		match self.unconfirmed.take(&txid) {
			Some(Verdict::Examined { accepted: true }) => {
				if !self.transactions.set_confirmed(&txid, height).await? {
					warn!("Accepted transaction {} had no stored record", txid);
					self.transactions
						.insert(TransactionRecord::new(tx, Some(height)))
						.await?;
				}
				debug!("Confirmed oracle transaction {} at height {}", txid, height);
				Ok(true)
			}
			Some(Verdict::Examined { accepted: false }) => Ok(false),
			Some(Verdict::Pending) => {
				// validation never finished; only a stored record tells whether it was accepted
				warn!("Transaction {} confirmed while its validation was pending", txid);
				Ok(self.transactions.set_confirmed(&txid, height).await?)
			}
			None => {
				let accepted = self.oracle.process_transaction(tx).await?;
				if accepted {
					self.transactions
						.insert(TransactionRecord::new(tx, Some(height)))
						.await?;
				}
				Ok(accepted)
			}
		}
	}

	async fn fetch_transactions(&self, txids: Vec<Txid>) -> Vec<Result<Transaction, NodeError>> {
		let node = &self.node;
		let policy = &self.config.retry;
		stream::iter(txids)
			.map(|txid| async move {
				retry(policy, "getrawtransaction", || node.raw_transaction(&txid)).await
			})
			.buffered(self.config.max_concurrency.max(1))
			.collect()
			.await
	}

	/// Fetch and validate every transaction of the block at `height` in block order
	async fn crawl_block(
		&self,
		height: u64,
		progress: &mut SyncProgressTracker,
	) -> Result<(), SyncError> {
		let node = &self.node;
		let policy = &self.config.retry;
		let hash = retry(policy, "getblockhash", || node.block_hash(height)).await?;
		let block = retry(policy, "getblock", || node.block(&hash)).await?;
		debug!(
			"Crawling block {} at height {} with {} transactions",
			block.hash,
			block.height,
			block.txids.len()
		);

		let txs = self
			.fetch_transactions(block.txids)
			.await
			.into_iter()
			.collect::<Result<Vec<_>, _>>()?;

		for tx in &txs {
			let accepted = self.handle_confirmed(tx, height).await?;
			progress.record_transaction(accepted);
		}
		Ok(())
	}

	/// Crawl from the checkpoint to the node's tip, advancing the checkpoint after every block.
	///
	/// Returns the number of blocks crawled.
	pub async fn sync_blocks(&self) -> Result<u64, SyncError> {
		let mut progress = self.progress.lock().await;
		let node = &self.node;
		let policy = &self.config.retry;

		let mut height = self.checkpoint.get().await?;
		let mut crawled = 0;
		loop {
			let tip = retry(policy, "getblockcount", || node.block_count()).await?;
			if tip <= height {
				break;
			}
			info!("Crawling blocks {} to {}", height + 1, tip);
			while height < tip {
				let next = height + 1;
				self.crawl_block(next, &mut progress).await?;
				self.checkpoint.set(next).await?;
				progress.record_block(next);
				progress.log_progress(false);
				height = next;
				crawled += 1;
			}
		}

		if crawled > 0 {
			progress.log_progress(true);
			progress.validate_completion();
			info!("{}", progress.get_stats().summary());
		}
		Ok(crawled)
	}

	/// Examine every mempool transaction not seen before.
	///
	/// Returns the number of accepted transactions.
	pub async fn sync_mempool(&self) -> Result<usize, SyncError> {
		let node = &self.node;
		let txids: Vec<Txid> = retry(&self.config.retry, "getrawmempool", || node.raw_mempool())
			.await?
			.into_iter()
			.filter(|txid| !self.unconfirmed.contains(txid))
			.collect();
		if txids.is_empty() {
			return Ok(0);
		}
		debug!("Sweeping {} mempool transactions", txids.len());

		let mut accepted = 0;
		for fetched in self.fetch_transactions(txids).await {
			let tx = match fetched {
				Ok(tx) => tx,
				// evicted or mined since the mempool listing
				Err(e) if !e.is_transient() => {
					debug!("Skipping mempool transaction: {}", e);
					continue;
				}
				Err(e) => return Err(e.into()),
			};
			if self.handle_unconfirmed(&tx).await? {
				accepted += 1;
			}
		}
		if accepted > 0 {
			info!("Accepted {} unconfirmed oracle transactions", accepted);
		}
		Ok(accepted)
	}

	async fn handle_notification(&self, notification: NodeNotification) -> Result<(), SyncError> {
		match notification {
			NodeNotification::RawTransaction(tx) => {
				if let Err(e) = self.handle_unconfirmed(&tx).await {
					warn!("Failed to process notified transaction {}: {}", tx.txid(), e);
				}
			}
			NodeNotification::BlockHash(hash) => {
				debug!("Block {} announced", hash);
				if self.sync_blocks().await? > 0 {
					self.sync_mempool().await?;
				}
			}
		}
		Ok(())
	}

	/// Bootstrap, catch up with the chain and keep following it until an unrecoverable error.
	///
	/// Notifications are optional; without them the engine relies on the poll interval alone.
	pub async fn run(
		&self,
		mut notifications: Option<mpsc::Receiver<NodeNotification>>,
	) -> Result<(), SyncError> {
		self.bootstrap().await?;
		self.sync_blocks().await?;
		self.sync_mempool().await?;

		let mut ticker = tokio::time::interval(self.config.poll_interval);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		// the first tick completes immediately
		ticker.tick().await;

		let mut listening = notifications.is_some();
		loop {
			tokio::select! {
				notification = next_notification(&mut notifications), if listening => {
					match notification {
						Some(notification) => self.handle_notification(notification).await?,
						None => {
							warn!("Notification channel closed, continuing with periodic sync");
							listening = false;
						}
					}
				}
				_ = ticker.tick() => {
					if self.sync_blocks().await? > 0 {
						self.sync_mempool().await?;
					}
				}
			}
		}
	}
}

async fn next_notification(
	notifications: &mut Option<mpsc::Receiver<NodeNotification>>,
) -> Option<NodeNotification> {
	match notifications {
		Some(receiver) => receiver.recv().await,
		None => std::future::pending().await,
	}
}
