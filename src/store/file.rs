//! File-backed repositories.
//!
//! Each repository keeps its state in the matching in-memory repository and an append-only
//! journal of JSON lines next to it. Opening replays the journal, rewrites it compacted through
//! a temporary file and a rename, then appends one line per mutation. A torn last line from an
//! interrupted write is dropped on replay.

use super::{
	MemoryTokenRegistry, MemoryTransactionRepository, MemoryUtxoRepository,
	MemoryWalletRepository, StoreError, TokenInfo, TokenRecord, TokenRegistryRepository,
	TransactionRecord, TransactionRepository, UtxoRecord, UtxoRepository, WalletRepository,
};
use crate::protocol::{Address, TokenId};

use bitcoin::{OutPoint, Txid};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

const UTXO_JOURNAL: &str = "utxos.jsonl";
const TOKEN_JOURNAL: &str = "tokens.jsonl";
const WALLET_JOURNAL: &str = "wallets.jsonl";
const TRANSACTION_JOURNAL: &str = "transactions.jsonl";

/// Append handle of one journal file. Holding the lock serializes mutations so the journal
/// order matches the order they were applied in memory.
struct Journal {
	file: Mutex<File>,
}

impl Journal {
	async fn read<E: DeserializeOwned>(path: &Path) -> Result<Vec<E>, StoreError> {
		let content = match tokio::fs::read_to_string(path).await {
			Ok(content) => content,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(e.into()),
		};

		let lines: Vec<&str> = content
			.lines()
			.filter(|line| !line.trim().is_empty())
			.collect();
		let mut entries = Vec::with_capacity(lines.len());
		for (index, line) in lines.iter().enumerate() {
			match serde_json::from_str(line) {
				Ok(entry) => entries.push(entry),
				Err(e) if index + 1 == lines.len() => {
					warn!("Dropping torn last entry of {:?}: {}", path, e);
				}
				Err(e) => return Err(e.into()),
			}
		}
		Ok(entries)
	}

	/// Replace the journal at `path` with `entries` and open it for appending
	async fn create<E: Serialize>(path: PathBuf, entries: &[E]) -> Result<Self, StoreError> {
		if let Some(dir) = path.parent() {
			tokio::fs::create_dir_all(dir).await?;
		}

		let mut content = Vec::new();
		for entry in entries {
			serde_json::to_writer(&mut content, entry)?;
			content.push(b'\n');
		}
		let temp_path = path.with_extension("jsonl.tmp");
		tokio::fs::write(&temp_path, content).await?;
		tokio::fs::rename(&temp_path, &path).await?;

		let file = OpenOptions::new().append(true).open(&path).await?;
		Ok(Self {
			file: Mutex::new(file),
		})
	}

	async fn append<E: Serialize>(file: &mut File, entry: &E) -> Result<(), StoreError> {
		let mut line = serde_json::to_vec(entry)?;
		line.push(b'\n');
		file.write_all(&line).await?;
		file.sync_data().await?;
		Ok(())
	}
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum UtxoEntry {
	Insert { record: UtxoRecord },
	Remove { outpoint: OutPoint },
}

/// UTXO repository persisted to `utxos.jsonl`
pub struct FileUtxoRepository {
	memory: MemoryUtxoRepository,
	journal: Journal,
}

impl FileUtxoRepository {
	pub async fn open(data_dir: &Path) -> Result<Self, StoreError> {
		let path = data_dir.join(UTXO_JOURNAL);
		let memory = MemoryUtxoRepository::new();
		for entry in Journal::read::<UtxoEntry>(&path).await? {
			match entry {
				UtxoEntry::Insert { record } => {
					memory.insert(record).await?;
				}
				UtxoEntry::Remove { outpoint } => {
					memory.remove(&outpoint).await?;
				}
			}
		}

		let snapshot: Vec<UtxoEntry> = memory
			.records()
			.into_iter()
			.map(|record| UtxoEntry::Insert { record })
			.collect();
		let journal = Journal::create(path, &snapshot).await?;
		info!("Loaded {} UTXOs from {:?}", memory.len(), data_dir);
		Ok(Self { memory, journal })
	}
}

#[async_trait::async_trait]
impl UtxoRepository for FileUtxoRepository {
	async fn insert(&self, record: UtxoRecord) -> Result<bool, StoreError> {
		let mut file = self.journal.file.lock().await;
		let outpoint = record.outpoint();
		if !self.memory.insert(record.clone()).await? {
			return Ok(false);
		}
		if let Err(e) = Journal::append(&mut file, &UtxoEntry::Insert { record }).await {
			self.memory.remove(&outpoint).await?;
			return Err(e);
		}
		Ok(true)
	}

	async fn remove(&self, outpoint: &OutPoint) -> Result<Option<UtxoRecord>, StoreError> {
		let mut file = self.journal.file.lock().await;
		let Some(record) = self.memory.remove(outpoint).await? else {
			return Ok(None);
		};
		let entry = UtxoEntry::Remove {
			outpoint: *outpoint,
		};
		if let Err(e) = Journal::append(&mut file, &entry).await {
			self.memory.insert(record).await?;
			return Err(e);
		}
		Ok(Some(record))
	}

	async fn find_by_outpoint(
		&self,
		outpoint: &OutPoint,
	) -> Result<Option<UtxoRecord>, StoreError> {
		self.memory.find_by_outpoint(outpoint).await
	}

	async fn query_by_address_and_asset(
		&self,
		address: &Address,
		token_id: &TokenId,
	) -> Result<Vec<TokenRecord>, StoreError> {
		self.memory
			.query_by_address_and_asset(address, token_id)
			.await
	}

	async fn outpoints(&self) -> Result<Vec<OutPoint>, StoreError> {
		self.memory.outpoints().await
	}
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenEntry {
	token_id: TokenId,
	info: TokenInfo,
}

/// Token registry persisted to `tokens.jsonl`
pub struct FileTokenRegistry {
	memory: MemoryTokenRegistry,
	journal: Journal,
}

impl FileTokenRegistry {
	pub async fn open(data_dir: &Path) -> Result<Self, StoreError> {
		let path = data_dir.join(TOKEN_JOURNAL);
		let memory = MemoryTokenRegistry::new();
		for entry in Journal::read::<TokenEntry>(&path).await? {
			memory.insert(entry.token_id, entry.info).await?;
		}

		let snapshot: Vec<TokenEntry> = memory
			.list()
			.await?
			.into_iter()
			.map(|(token_id, info)| TokenEntry { token_id, info })
			.collect();
		let journal = Journal::create(path, &snapshot).await?;
		Ok(Self { memory, journal })
	}
}

#[async_trait::async_trait]
impl TokenRegistryRepository for FileTokenRegistry {
	async fn insert(&self, token_id: TokenId, info: TokenInfo) -> Result<bool, StoreError> {
		let mut file = self.journal.file.lock().await;
		if self.memory.find_one(&token_id).await?.is_some() {
			return Ok(false);
		}
		let entry = TokenEntry { token_id, info };
		Journal::append(&mut file, &entry).await?;
		self.memory.insert(entry.token_id, entry.info).await
	}

	async fn find_one(&self, token_id: &TokenId) -> Result<Option<TokenInfo>, StoreError> {
		self.memory.find_one(token_id).await
	}

	async fn list(&self) -> Result<Vec<(TokenId, TokenInfo)>, StoreError> {
		self.memory.list().await
	}
}

#[derive(Debug, Serialize, Deserialize)]
struct WalletEntry {
	address: Address,
	wallet_id: String,
}

/// Wallet registrations persisted to `wallets.jsonl`
pub struct FileWalletRepository {
	memory: MemoryWalletRepository,
	journal: Journal,
}

impl FileWalletRepository {
	pub async fn open(data_dir: &Path) -> Result<Self, StoreError> {
		let path = data_dir.join(WALLET_JOURNAL);
		let memory = MemoryWalletRepository::new();
		for entry in Journal::read::<WalletEntry>(&path).await? {
			memory.register_address(entry.address, entry.wallet_id).await?;
		}

		let snapshot: Vec<WalletEntry> = memory
			.entries()
			.into_iter()
			.map(|(address, wallet_id)| WalletEntry { address, wallet_id })
			.collect();
		let journal = Journal::create(path, &snapshot).await?;
		Ok(Self { memory, journal })
	}
}

#[async_trait::async_trait]
impl WalletRepository for FileWalletRepository {
	async fn register_address(
		&self,
		address: Address,
		wallet_id: String,
	) -> Result<bool, StoreError> {
		let mut file = self.journal.file.lock().await;
		let entry = WalletEntry { address, wallet_id };
		Journal::append(&mut file, &entry).await?;
		self.memory
			.register_address(entry.address, entry.wallet_id)
			.await
	}

	async fn wallet_id(&self, address: &Address) -> Result<Option<String>, StoreError> {
		self.memory.wallet_id(address).await
	}
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum TransactionEntry {
	Insert { record: TransactionRecord },
	Confirm { txid: Txid, height: u64 },
	PurgeUnconfirmed,
}

/// Transaction records persisted to `transactions.jsonl`
pub struct FileTransactionRepository {
	memory: MemoryTransactionRepository,
	journal: Journal,
}

impl FileTransactionRepository {
	pub async fn open(data_dir: &Path) -> Result<Self, StoreError> {
		let path = data_dir.join(TRANSACTION_JOURNAL);
		let memory = MemoryTransactionRepository::new();
		for entry in Journal::read::<TransactionEntry>(&path).await? {
			match entry {
				TransactionEntry::Insert { record } => {
					memory.insert(record).await?;
				}
				TransactionEntry::Confirm { txid, height } => {
					memory.set_confirmed(&txid, height).await?;
				}
				TransactionEntry::PurgeUnconfirmed => {
					memory.remove_all_unconfirmed().await?;
				}
			}
		}

		let snapshot: Vec<TransactionEntry> = memory
			.records()
			.into_iter()
			.map(|record| TransactionEntry::Insert { record })
			.collect();
		let journal = Journal::create(path, &snapshot).await?;
		Ok(Self { memory, journal })
	}
}

#[async_trait::async_trait]
impl TransactionRepository for FileTransactionRepository {
	async fn insert(&self, record: TransactionRecord) -> Result<bool, StoreError> {
		let mut file = self.journal.file.lock().await;
		if self.memory.find(&record.txid).await?.is_some() {
			return Ok(false);
		}
		let entry = TransactionEntry::Insert {
			record: record.clone(),
		};
		Journal::append(&mut file, &entry).await?;
		self.memory.insert(record).await
	}

	async fn set_confirmed(&self, txid: &Txid, height: u64) -> Result<bool, StoreError> {
		let mut file = self.journal.file.lock().await;
		if self.memory.find(txid).await?.is_none() {
			return Ok(false);
		}
		let entry = TransactionEntry::Confirm {
			txid: *txid,
			height,
		};
		Journal::append(&mut file, &entry).await?;
		self.memory.set_confirmed(txid, height).await
	}

	async fn find(&self, txid: &Txid) -> Result<Option<TransactionRecord>, StoreError> {
		self.memory.find(txid).await
	}

	async fn remove_all_unconfirmed(&self) -> Result<usize, StoreError> {
		let mut file = self.journal.file.lock().await;
		Journal::append(&mut file, &TransactionEntry::PurgeUnconfirmed).await?;
		self.memory.remove_all_unconfirmed().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::protocol::UniqueId;
	use crate::test_utils::{
		plain_transaction, sample_token_record, sample_unique_record, test_address,
		txid_from_byte,
	};

	#[tokio::test]
	async fn utxos_survive_reopen() {
		let dir = tempfile::tempdir().unwrap();
		let kept = sample_token_record(txid_from_byte(1), 0, 600);
		let spent = sample_token_record(txid_from_byte(2), 0, 400);
		let unique = sample_unique_record(txid_from_byte(3), 1, UniqueId([4u8; 36]));

		let repo = FileUtxoRepository::open(dir.path()).await.unwrap();
		assert!(repo.insert(kept.clone().into()).await.unwrap());
		assert!(repo.insert(spent.clone().into()).await.unwrap());
		assert!(repo.insert(unique.clone().into()).await.unwrap());
		assert!(!repo.insert(kept.clone().into()).await.unwrap());
		assert!(repo.remove(&spent.outpoint()).await.unwrap().is_some());
		drop(repo);

		let reopened = FileUtxoRepository::open(dir.path()).await.unwrap();
		let mut outpoints = reopened.outpoints().await.unwrap();
		outpoints.sort();
		let mut expected = vec![kept.outpoint(), unique.outpoint()];
		expected.sort();
		assert_eq!(outpoints, expected);
		assert_eq!(
			reopened.find_by_outpoint(&kept.outpoint()).await.unwrap(),
			Some(UtxoRecord::Token(kept))
		);

		// the live unique id index is rebuilt too
		let clash = sample_unique_record(txid_from_byte(5), 0, UniqueId([4u8; 36]));
		assert!(!reopened.insert(clash.into()).await.unwrap());
	}

	#[tokio::test]
	async fn torn_last_entry_is_dropped() {
		let dir = tempfile::tempdir().unwrap();
		let record = sample_token_record(txid_from_byte(1), 0, 5);
		let repo = FileUtxoRepository::open(dir.path()).await.unwrap();
		repo.insert(record.clone().into()).await.unwrap();
		drop(repo);

		let path = dir.path().join(UTXO_JOURNAL);
		let mut content = std::fs::read_to_string(&path).unwrap();
		content.push_str("{\"op\":\"remove\",\"outp");
		std::fs::write(&path, content).unwrap();

		let reopened = FileUtxoRepository::open(dir.path()).await.unwrap();
		assert!(
			reopened
				.find_by_outpoint(&record.outpoint())
				.await
				.unwrap()
				.is_some()
		);
		// compaction rewrote the journal without the torn line
		let compacted = std::fs::read_to_string(&path).unwrap();
		assert_eq!(compacted.lines().count(), 1);
	}

	#[tokio::test]
	async fn corrupt_entry_before_the_end_is_an_error() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(
			dir.path().join(UTXO_JOURNAL),
			"not json\n{\"op\":\"remove\",\"outpoint\":\"x\"}\n",
		)
		.unwrap();
		assert!(matches!(
			FileUtxoRepository::open(dir.path()).await,
			Err(StoreError::SerializationError(_))
		));
	}

	#[tokio::test]
	async fn registry_and_wallets_survive_reopen() {
		let dir = tempfile::tempdir().unwrap();
		let info = TokenInfo {
			name: "test token name".into(),
			symbol: "ttn".into(),
			decimal_num: 8,
		};
		let registry = FileTokenRegistry::open(dir.path()).await.unwrap();
		assert!(registry.insert(TokenId([1u8; 20]), info.clone()).await.unwrap());
		assert!(!registry.insert(TokenId([1u8; 20]), info.clone()).await.unwrap());
		let wallets = FileWalletRepository::open(dir.path()).await.unwrap();
		wallets
			.register_address(test_address(), "wallet-1".into())
			.await
			.unwrap();
		wallets
			.register_address(test_address(), "wallet-2".into())
			.await
			.unwrap();
		drop(registry);
		drop(wallets);

		let registry = FileTokenRegistry::open(dir.path()).await.unwrap();
		assert_eq!(registry.list().await.unwrap(), vec![(TokenId([1u8; 20]), info)]);
		let wallets = FileWalletRepository::open(dir.path()).await.unwrap();
		assert_eq!(
			wallets.wallet_id(&test_address()).await.unwrap(),
			Some("wallet-2".to_string())
		);
	}

	#[tokio::test]
	async fn transaction_states_replay_in_order() {
		let dir = tempfile::tempdir().unwrap();
		let confirmed = plain_transaction(1);
		let purged = plain_transaction(2);
		let pending = plain_transaction(3);

		let repo = FileTransactionRepository::open(dir.path()).await.unwrap();
		repo.insert(TransactionRecord::new(&confirmed, None))
			.await
			.unwrap();
		repo.insert(TransactionRecord::new(&purged, None))
			.await
			.unwrap();
		assert!(repo.set_confirmed(&confirmed.txid(), 7).await.unwrap());
		assert_eq!(repo.remove_all_unconfirmed().await.unwrap(), 1);
		repo.insert(TransactionRecord::new(&pending, None))
			.await
			.unwrap();
		drop(repo);

		let reopened = FileTransactionRepository::open(dir.path()).await.unwrap();
		let stored = reopened.find(&confirmed.txid()).await.unwrap().unwrap();
		assert!(stored.confirmed);
		assert_eq!(stored.block_height, Some(7));
		assert!(reopened.find(&purged.txid()).await.unwrap().is_none());
		assert!(!reopened.find(&pending.txid()).await.unwrap().unwrap().confirmed);
	}
}
