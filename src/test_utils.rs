//! Fixtures shared by the unit tests.

use crate::cache::UtxoCache;
use crate::node::{BlockInfo, NodeError, NodeRpc};
use crate::oracle::{OracleProcessor, ProcessorContext};
use crate::protocol::token::{TokenFields, derive_token_id, transfer_from_genesis_script};
use crate::protocol::unique::UniqueFields;
use crate::protocol::{self, Address, UniqueId};
use crate::store::{OracleStore, TokenRecord, UniqueRecord};

use bitcoin::hashes::Hash;
use bitcoin::{
	Amount, BlockHash, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
	absolute, transaction,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Stand-in contract code placed in front of every test token header
pub const CONTRACT_CODE: &[u8] = &[0x00, 0x6a, 0x51, 0x52, 0x53, 0x54, 0x55, 0x56, 0x87];

const SPENDING_CODE: &[u8] = &[0x76, 0xa9, 0x88, 0xac];

pub fn test_address() -> Address {
	"ce0b4a25ec9a7db3ad28cf824aa624125ea8143d"
		.parse()
		.unwrap()
}

pub fn txid_from_byte(byte: u8) -> Txid {
	Txid::from_byte_array([byte; 32])
}

/// Outpoint the oracle has never seen, used to fund test transactions
pub fn funding_outpoint(seed: u8) -> OutPoint {
	OutPoint::new(txid_from_byte(0xf0u8.wrapping_add(seed)), 7)
}

pub fn genesis_token_script(name: &str, symbol: &str) -> Vec<u8> {
	TokenFields::genesis(CONTRACT_CODE.to_vec(), name, symbol, 8)
		.unwrap()
		.encode()
}

pub fn unique_script(custom_data: &[u8], unique_id: UniqueId, is_genesis: bool) -> Vec<u8> {
	UniqueFields {
		spending_code: SPENDING_CODE.to_vec(),
		custom_data: custom_data.to_vec(),
		is_genesis,
		unique_id,
	}
	.encode()
	.unwrap()
}

/// Token record owned by the test address
pub fn sample_token_record(txid: Txid, output_index: u32, value: u64) -> TokenRecord {
	let genesis = genesis_token_script("test token name", "ttn");
	let token_id = derive_token_id(&genesis);
	TokenRecord {
		txid,
		output_index,
		script: transfer_from_genesis_script(&genesis, &test_address(), value, &token_id).unwrap(),
		address: test_address(),
		token_id,
		token_value: value,
		decimal_num: 8,
		is_genesis: false,
		token_name: "test token name".into(),
		token_symbol: "ttn".into(),
		satoshis: 100,
		wallet_id: None,
	}
}

pub fn sample_unique_record(txid: Txid, output_index: u32, unique_id: UniqueId) -> UniqueRecord {
	UniqueRecord {
		txid,
		output_index,
		script: unique_script(b"", unique_id, false),
		unique_id,
		is_genesis: false,
		satoshis: 100,
	}
}

pub fn build_transaction(inputs: &[OutPoint], scripts: &[Vec<u8>]) -> Transaction {
	Transaction {
		version: transaction::Version::ONE,
		lock_time: absolute::LockTime::ZERO,
		input: inputs
			.iter()
			.map(|outpoint| TxIn {
				previous_output: *outpoint,
				script_sig: ScriptBuf::new(),
				sequence: Sequence::MAX,
				witness: Witness::new(),
			})
			.collect(),
		output: scripts
			.iter()
			.map(|script| TxOut {
				value: Amount::from_sat(546),
				script_pubkey: ScriptBuf::from_bytes(script.clone()),
			})
			.collect(),
	}
}

/// Transaction without any protocol output
pub fn plain_transaction(seed: u8) -> Transaction {
	build_transaction(
		&[funding_outpoint(seed)],
		&[vec![0x76, 0xa9, 0x14, seed, 0x88, 0xac]],
	)
}

pub fn test_context() -> ProcessorContext {
	ProcessorContext::new(OracleStore::in_memory(), Arc::new(UtxoCache::new()), 4)
}

pub fn test_oracle() -> OracleProcessor {
	OracleProcessor::new(test_context())
}

fn block_hash_at(height: u64) -> BlockHash {
	BlockHash::from_byte_array(protocol::sha256(&height.to_le_bytes()))
}

#[derive(Default)]
struct ChainState {
	/// Block at height `i + 1`
	blocks: Vec<Vec<Transaction>>,
	mempool: Vec<Txid>,
	transactions: HashMap<Txid, Transaction>,
}

/// Scripted in-memory node
#[derive(Default)]
pub struct MockNode {
	chain: Mutex<ChainState>,
	failures: AtomicU32,
	calls: AtomicU32,
}

impl MockNode {
	pub fn new() -> Self {
		Self::default()
	}

	/// Append a block and return its height
	pub fn mine(&self, txs: Vec<Transaction>) -> u64 {
		let mut chain = self.chain.lock().unwrap();
		for tx in &txs {
			let txid = tx.txid();
			chain.mempool.retain(|pending| *pending != txid);
			chain.transactions.insert(txid, tx.clone());
		}
		chain.blocks.push(txs);
		chain.blocks.len() as u64
	}

	pub fn broadcast(&self, tx: Transaction) {
		let mut chain = self.chain.lock().unwrap();
		let txid = tx.txid();
		chain.mempool.push(txid);
		chain.transactions.insert(txid, tx);
	}

	/// The next `count` calls fail with a transient error
	pub fn fail_next(&self, count: u32) {
		self.failures.store(count, Ordering::SeqCst);
	}

	pub fn calls(&self) -> u32 {
		self.calls.load(Ordering::SeqCst)
	}

	fn enter(&self) -> Result<(), NodeError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		let failing = self
			.failures
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
			.is_ok();
		if failing {
			return Err(NodeError::HttpStatus(503));
		}
		Ok(())
	}
}

fn not_found(what: String) -> NodeError {
	NodeError::RpcError {
		code: -5,
		message: format!("{} not found", what),
	}
}

#[async_trait::async_trait]
impl NodeRpc for MockNode {
	async fn block_count(&self) -> Result<u64, NodeError> {
		self.enter()?;
		Ok(self.chain.lock().unwrap().blocks.len() as u64)
	}

	async fn block_hash(&self, height: u64) -> Result<BlockHash, NodeError> {
		self.enter()?;
		let chain = self.chain.lock().unwrap();
		if height == 0 || height > chain.blocks.len() as u64 {
			return Err(not_found(format!("block at height {}", height)));
		}
		Ok(block_hash_at(height))
	}

	async fn block(&self, hash: &BlockHash) -> Result<BlockInfo, NodeError> {
		self.enter()?;
		let chain = self.chain.lock().unwrap();
		let height = (1..=chain.blocks.len() as u64)
			.find(|height| block_hash_at(*height) == *hash)
			.ok_or_else(|| not_found(format!("block {}", hash)))?;
		Ok(BlockInfo {
			hash: *hash,
			height,
			time: 1_600_000_000 + height,
			txids: chain.blocks[(height - 1) as usize]
				.iter()
				.map(Transaction::txid)
				.collect(),
		})
	}

	async fn raw_transaction(&self, txid: &Txid) -> Result<Transaction, NodeError> {
		self.enter()?;
		self.chain
			.lock()
			.unwrap()
			.transactions
			.get(txid)
			.cloned()
			.ok_or_else(|| not_found(format!("transaction {}", txid)))
	}

	async fn raw_mempool(&self) -> Result<Vec<Txid>, NodeError> {
		self.enter()?;
		Ok(self.chain.lock().unwrap().mempool.clone())
	}
}
