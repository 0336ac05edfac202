use super::{
	CheckpointRepository, StoreError, TokenInfo, TokenRecord, TokenRegistryRepository,
	TransactionRecord, TransactionRepository, UtxoRecord, UtxoRepository, WalletRepository,
};
use crate::protocol::{Address, TokenId, UniqueId};

use bitcoin::{OutPoint, Txid};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// In-memory implementation of UtxoRepository
///
/// Keeps a secondary index of live unique ids so a second live record for the same id is
/// refused.
#[derive(Default)]
pub struct MemoryUtxoRepository {
	utxos: DashMap<OutPoint, UtxoRecord>,
	live_unique_ids: DashMap<UniqueId, OutPoint>,
}

impl MemoryUtxoRepository {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.utxos.len()
	}

	pub fn is_empty(&self) -> bool {
		self.utxos.is_empty()
	}

	/// Every stored record, ordered by outpoint
	pub fn records(&self) -> Vec<UtxoRecord> {
		let mut records: Vec<UtxoRecord> =
			self.utxos.iter().map(|entry| entry.value().clone()).collect();
		records.sort_by_key(UtxoRecord::outpoint);
		records
	}
}

#[async_trait::async_trait]
impl UtxoRepository for MemoryUtxoRepository {
	async fn insert(&self, record: UtxoRecord) -> Result<bool, StoreError> {
		let outpoint = record.outpoint();
		let slot = match self.utxos.entry(outpoint) {
			Entry::Occupied(_) => {
				debug!("UTXO {} already stored", outpoint);
				return Ok(false);
			}
			Entry::Vacant(slot) => slot,
		};

		if let UtxoRecord::Unique(unique) = &record {
			match self.live_unique_ids.entry(unique.unique_id) {
				Entry::Occupied(live) => {
					info!(
						"Refusing UTXO {}: unique id {} is live at {}",
						outpoint,
						unique.unique_id,
						live.get()
					);
					return Ok(false);
				}
				Entry::Vacant(id_slot) => {
					id_slot.insert(outpoint);
				}
			}
		}

		slot.insert(record);
		Ok(true)
	}

	async fn remove(&self, outpoint: &OutPoint) -> Result<Option<UtxoRecord>, StoreError> {
		let removed = self.utxos.remove(outpoint).map(|(_, record)| record);
		if let Some(UtxoRecord::Unique(unique)) = &removed {
			self.live_unique_ids
				.remove_if(&unique.unique_id, |_, live| live == outpoint);
		}
		Ok(removed)
	}

	async fn find_by_outpoint(
		&self,
		outpoint: &OutPoint,
	) -> Result<Option<UtxoRecord>, StoreError> {
		Ok(self.utxos.get(outpoint).map(|entry| entry.value().clone()))
	}

	async fn query_by_address_and_asset(
		&self,
		address: &Address,
		token_id: &TokenId,
	) -> Result<Vec<TokenRecord>, StoreError> {
		let mut records: Vec<TokenRecord> = self
			.utxos
			.iter()
			.filter_map(|entry| match entry.value() {
				UtxoRecord::Token(token)
					if token.address == *address && token.token_id == *token_id =>
				{
					Some(token.clone())
				}
				_ => None,
			})
			.collect();
		records.sort_by_key(|record| (record.txid, record.output_index));
		Ok(records)
	}

	async fn outpoints(&self) -> Result<Vec<OutPoint>, StoreError> {
		Ok(self.utxos.iter().map(|entry| *entry.key()).collect())
	}
}

/// In-memory implementation of TokenRegistryRepository
#[derive(Default)]
pub struct MemoryTokenRegistry {
	tokens: DashMap<TokenId, TokenInfo>,
}

impl MemoryTokenRegistry {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait::async_trait]
impl TokenRegistryRepository for MemoryTokenRegistry {
	async fn insert(&self, token_id: TokenId, info: TokenInfo) -> Result<bool, StoreError> {
		match self.tokens.entry(token_id) {
			Entry::Occupied(_) => Ok(false),
			Entry::Vacant(slot) => {
				slot.insert(info);
				Ok(true)
			}
		}
	}

	async fn find_one(&self, token_id: &TokenId) -> Result<Option<TokenInfo>, StoreError> {
		Ok(self.tokens.get(token_id).map(|entry| entry.value().clone()))
	}

	async fn list(&self) -> Result<Vec<(TokenId, TokenInfo)>, StoreError> {
		let mut tokens: Vec<(TokenId, TokenInfo)> = self
			.tokens
			.iter()
			.map(|entry| (*entry.key(), entry.value().clone()))
			.collect();
		tokens.sort_by_key(|(token_id, _)| *token_id);
		Ok(tokens)
	}
}

/// In-memory implementation of WalletRepository
#[derive(Default)]
pub struct MemoryWalletRepository {
	wallets: DashMap<Address, String>,
}

impl MemoryWalletRepository {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn entries(&self) -> Vec<(Address, String)> {
		let mut entries: Vec<(Address, String)> = self
			.wallets
			.iter()
			.map(|entry| (*entry.key(), entry.value().clone()))
			.collect();
		entries.sort();
		entries
	}
}

#[async_trait::async_trait]
impl WalletRepository for MemoryWalletRepository {
	async fn register_address(
		&self,
		address: Address,
		wallet_id: String,
	) -> Result<bool, StoreError> {
		info!("Registered address {} to wallet {}", address, wallet_id);
		self.wallets.insert(address, wallet_id);
		Ok(true)
	}

	async fn wallet_id(&self, address: &Address) -> Result<Option<String>, StoreError> {
		Ok(self.wallets.get(address).map(|entry| entry.value().clone()))
	}
}

/// In-memory implementation of TransactionRepository
#[derive(Default)]
pub struct MemoryTransactionRepository {
	transactions: DashMap<Txid, TransactionRecord>,
}

impl MemoryTransactionRepository {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.transactions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.transactions.is_empty()
	}

	/// Every stored record, oldest sighting first
	pub fn records(&self) -> Vec<TransactionRecord> {
		let mut records: Vec<TransactionRecord> = self
			.transactions
			.iter()
			.map(|entry| entry.value().clone())
			.collect();
		records.sort_by_key(|record| (record.seen_at, record.txid));
		records
	}
}

#[async_trait::async_trait]
impl TransactionRepository for MemoryTransactionRepository {
	async fn insert(&self, record: TransactionRecord) -> Result<bool, StoreError> {
		match self.transactions.entry(record.txid) {
			Entry::Occupied(_) => Ok(false),
			Entry::Vacant(slot) => {
				info!(
					"Stored transaction {}, confirmed {}",
					record.txid, record.confirmed
				);
				slot.insert(record);
				Ok(true)
			}
		}
	}

	async fn set_confirmed(&self, txid: &Txid, height: u64) -> Result<bool, StoreError> {
		match self.transactions.get_mut(txid) {
			Some(mut record) => {
				record.confirmed = true;
				record.block_height = Some(height);
				Ok(true)
			}
			None => Ok(false),
		}
	}

	async fn find(&self, txid: &Txid) -> Result<Option<TransactionRecord>, StoreError> {
		Ok(self.transactions.get(txid).map(|entry| entry.value().clone()))
	}

	async fn remove_all_unconfirmed(&self) -> Result<usize, StoreError> {
		let before = self.transactions.len();
		self.transactions.retain(|_, record| record.confirmed);
		Ok(before - self.transactions.len())
	}
}

/// In-memory implementation of CheckpointRepository
#[derive(Default)]
pub struct MemoryCheckpointRepository {
	height: AtomicU64,
}

impl MemoryCheckpointRepository {
	pub fn new(height: u64) -> Self {
		Self {
			height: AtomicU64::new(height),
		}
	}
}

#[async_trait::async_trait]
impl CheckpointRepository for MemoryCheckpointRepository {
	async fn get(&self) -> Result<u64, StoreError> {
		Ok(self.height.load(Ordering::SeqCst))
	}

	async fn set(&self, height: u64) -> Result<(), StoreError> {
		self.height.store(height, Ordering::SeqCst);
		Ok(())
	}
}
