//! Storage collaborators of the oracle.
//!
//! The oracle only talks to storage through the repository traits below, so the document
//! database behind them can be swapped without touching validation or sync logic.
//!
//! - `memory`: concurrent in-memory repositories, used by tests and as the state behind `file`.
//! - `file`: journal-backed repositories used by the binary, replayed on restart.
//! - `checkpoint`: file-backed sync checkpoint that survives restarts.

/// File-backed checkpoint repository
pub mod checkpoint;
/// Journal-backed repositories
pub mod file;
/// In-memory repository implementations
pub mod memory;
/// Record types and storage errors
mod types;

pub use checkpoint::FileCheckpointRepository;
pub use file::{
	FileTokenRegistry, FileTransactionRepository, FileUtxoRepository, FileWalletRepository,
};
pub use memory::*;
pub use types::*;

use crate::protocol::{Address, TokenId};
use bitcoin::{OutPoint, Txid};
use std::path::Path;
use std::sync::Arc;

/// Repository for live protocol UTXOs
#[async_trait::async_trait]
pub trait UtxoRepository: Send + Sync {
	/// Returns false when the record was refused, e.g. the outpoint is already stored or the
	/// unique id already has a live record
	async fn insert(&self, record: UtxoRecord) -> Result<bool, StoreError>;
	/// Delete and return the record at `outpoint`
	async fn remove(&self, outpoint: &OutPoint) -> Result<Option<UtxoRecord>, StoreError>;
	async fn find_by_outpoint(&self, outpoint: &OutPoint)
	-> Result<Option<UtxoRecord>, StoreError>;
	async fn query_by_address_and_asset(
		&self,
		address: &Address,
		token_id: &TokenId,
	) -> Result<Vec<TokenRecord>, StoreError>;
	/// Every stored outpoint, used to rebuild the existence cache
	async fn outpoints(&self) -> Result<Vec<OutPoint>, StoreError>;
}

/// Repository for token metadata registered at genesis
#[async_trait::async_trait]
pub trait TokenRegistryRepository: Send + Sync {
	/// Returns false when the id is already registered; entries are never overwritten
	async fn insert(&self, token_id: TokenId, info: TokenInfo) -> Result<bool, StoreError>;
	async fn find_one(&self, token_id: &TokenId) -> Result<Option<TokenInfo>, StoreError>;
	async fn list(&self) -> Result<Vec<(TokenId, TokenInfo)>, StoreError>;
}

/// Repository mapping owner addresses to registered wallet ids
#[async_trait::async_trait]
pub trait WalletRepository: Send + Sync {
	async fn register_address(&self, address: Address, wallet_id: String)
	-> Result<bool, StoreError>;
	async fn wallet_id(&self, address: &Address) -> Result<Option<String>, StoreError>;
}

/// Repository for the sync checkpoint
#[async_trait::async_trait]
pub trait CheckpointRepository: Send + Sync {
	/// Last fully processed block height, zero when nothing was processed yet
	async fn get(&self) -> Result<u64, StoreError>;
	async fn set(&self, height: u64) -> Result<(), StoreError>;
}

/// Repository for protocol-relevant transactions and their confirmation state
#[async_trait::async_trait]
pub trait TransactionRepository: Send + Sync {
	async fn insert(&self, record: TransactionRecord) -> Result<bool, StoreError>;
	/// Mark a stored transaction as confirmed at `height`; false when it is unknown
	async fn set_confirmed(&self, txid: &Txid, height: u64) -> Result<bool, StoreError>;
	async fn find(&self, txid: &Txid) -> Result<Option<TransactionRecord>, StoreError>;
	/// Drop every unconfirmed record, returning how many were removed
	async fn remove_all_unconfirmed(&self) -> Result<usize, StoreError>;
}

/// Storage handles the oracle processor needs
#[derive(Clone)]
pub struct OracleStore {
	pub utxos: Arc<dyn UtxoRepository>,
	pub tokens: Arc<dyn TokenRegistryRepository>,
	pub wallets: Arc<dyn WalletRepository>,
}

impl OracleStore {
	pub fn new(
		utxos: Arc<dyn UtxoRepository>,
		tokens: Arc<dyn TokenRegistryRepository>,
		wallets: Arc<dyn WalletRepository>,
	) -> Self {
		Self {
			utxos,
			tokens,
			wallets,
		}
	}

	pub fn in_memory() -> Self {
		Self::new(
			Arc::new(MemoryUtxoRepository::new()),
			Arc::new(MemoryTokenRegistry::new()),
			Arc::new(MemoryWalletRepository::new()),
		)
	}

	/// Store whose repositories replay their journals under `data_dir`
	pub async fn open(data_dir: &Path) -> Result<Self, StoreError> {
		Ok(Self::new(
			Arc::new(FileUtxoRepository::open(data_dir).await?),
			Arc::new(FileTokenRegistry::open(data_dir).await?),
			Arc::new(FileWalletRepository::open(data_dir).await?),
		))
	}
}
