//! Node access: the RPC seam the sync engine drives, its bitcoind implementation and the retry
//! policy wrapped around every call.

pub mod client;
pub mod retry;
pub mod types;

pub use client::BitcoindRpcClient;
pub use retry::{RetryPolicy, retry};
pub use types::*;

use bitcoin::{BlockHash, Transaction, Txid};

/// Chain queries needed to follow the node
#[async_trait::async_trait]
pub trait NodeRpc: Send + Sync {
	/// Height of the current tip
	async fn block_count(&self) -> Result<u64, NodeError>;
	async fn block_hash(&self, height: u64) -> Result<BlockHash, NodeError>;
	async fn block(&self, hash: &BlockHash) -> Result<BlockInfo, NodeError>;
	async fn raw_transaction(&self, txid: &Txid) -> Result<Transaction, NodeError>;
	async fn raw_mempool(&self) -> Result<Vec<Txid>, NodeError>;
}
