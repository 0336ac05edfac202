//! Types for bitcoind JSON-RPC integration

use bitcoin::{BlockHash, Transaction, Txid};
use serde::{Deserialize, Serialize};

/// bitcoind is still loading its block index
const RPC_IN_WARMUP: i64 = -28;

/// Block summary returned by `getblock <hash> 1`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
	pub hash: BlockHash,
	pub height: u64,
	pub time: u64,
	/// Transaction ids in block order
	#[serde(rename = "tx")]
	pub txids: Vec<Txid>,
}

/// Push notification delivered by the node
#[derive(Debug, Clone)]
pub enum NodeNotification {
	/// A transaction entered the mempool
	RawTransaction(Transaction),
	/// A block was connected to the tip
	BlockHash(BlockHash),
}

/// Error types for node RPC calls
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
	#[error("HTTP error: {0}")]
	HttpError(#[from] reqwest::Error),

	#[error("HTTP status {0}")]
	HttpStatus(u16),

	#[error("RPC error {code}: {message}")]
	RpcError { code: i64, message: String },

	#[error("JSON parse error: {0}")]
	JsonError(#[from] serde_json::Error),

	#[error("Transaction decode error: {0}")]
	DecodeError(String),

	#[error("No result returned for {0}")]
	NoData(String),
}

impl NodeError {
	/// Whether retrying the same call can succeed
	pub fn is_transient(&self) -> bool {
		match self {
			NodeError::HttpError(_) => true,
			NodeError::HttpStatus(status) => *status >= 500 || *status == 429,
			NodeError::RpcError { code, .. } => *code == RPC_IN_WARMUP,
			NodeError::JsonError(_) | NodeError::DecodeError(_) | NodeError::NoData(_) => false,
		}
	}
}
