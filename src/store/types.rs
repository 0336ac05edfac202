use crate::protocol::{self, Address, AssetType, TokenId, UniqueId};

use bitcoin::{OutPoint, Transaction, Txid};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Error types for storage backends
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),

	#[error("Serialization error: {0}")]
	SerializationError(#[from] serde_json::Error),

	#[error("Backend error: {0}")]
	BackendError(String),
}

/// Live fungible token output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
	pub txid: Txid,
	pub output_index: u32,
	#[serde(with = "hex::serde")]
	pub script: Vec<u8>,
	pub address: Address,
	pub token_id: TokenId,
	pub token_value: u64,
	pub decimal_num: u8,
	pub is_genesis: bool,
	pub token_name: String,
	pub token_symbol: String,
	pub satoshis: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub wallet_id: Option<String>,
}

impl TokenRecord {
	pub fn outpoint(&self) -> OutPoint {
		OutPoint::new(self.txid, self.output_index)
	}
}

/// Live unique asset output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueRecord {
	pub txid: Txid,
	pub output_index: u32,
	#[serde(with = "hex::serde")]
	pub script: Vec<u8>,
	pub unique_id: UniqueId,
	pub is_genesis: bool,
	pub satoshis: u64,
}

impl UniqueRecord {
	pub fn outpoint(&self) -> OutPoint {
		OutPoint::new(self.txid, self.output_index)
	}
}

/// A stored protocol UTXO of either asset variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum UtxoRecord {
	Token(TokenRecord),
	Unique(UniqueRecord),
}

impl UtxoRecord {
	pub fn asset_type(&self) -> AssetType {
		match self {
			UtxoRecord::Token(_) => AssetType::Token,
			UtxoRecord::Unique(_) => AssetType::Unique,
		}
	}

	pub fn outpoint(&self) -> OutPoint {
		match self {
			UtxoRecord::Token(record) => record.outpoint(),
			UtxoRecord::Unique(record) => record.outpoint(),
		}
	}

	pub fn script(&self) -> &[u8] {
		match self {
			UtxoRecord::Token(record) => &record.script,
			UtxoRecord::Unique(record) => &record.script,
		}
	}

	pub fn satoshis(&self) -> u64 {
		match self {
			UtxoRecord::Token(record) => record.satoshis,
			UtxoRecord::Unique(record) => record.satoshis,
		}
	}

	/// Identifying fields an external attestation signs over
	pub fn attestation_fields(&self) -> AttestationFields {
		let (value, asset_id) = match self {
			UtxoRecord::Token(record) => (record.token_value, record.token_id.0.to_vec()),
			UtxoRecord::Unique(record) => (0, record.unique_id.0.to_vec()),
		};
		let outpoint = self.outpoint();
		AttestationFields {
			txid: outpoint.txid,
			output_index: outpoint.vout,
			script_hash: protocol::sha256(self.script()),
			satoshis: self.satoshis(),
			value,
			asset_id,
		}
	}
}

impl From<TokenRecord> for UtxoRecord {
	fn from(record: TokenRecord) -> Self {
		UtxoRecord::Token(record)
	}
}

impl From<UniqueRecord> for UtxoRecord {
	fn from(record: UniqueRecord) -> Self {
		UtxoRecord::Unique(record)
	}
}

/// Field layout consumed by the attestation endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttestationFields {
	pub txid: Txid,
	pub output_index: u32,
	#[serde(with = "hex::serde")]
	pub script_hash: [u8; 32],
	pub satoshis: u64,
	pub value: u64,
	#[serde(with = "hex::serde")]
	pub asset_id: Vec<u8>,
}

impl AttestationFields {
	/// `txid (display order) || output_index (LE) || script_hash || satoshis (LE) ||
	/// value (LE) || asset_id`
	pub fn canonical_bytes(&self) -> Vec<u8> {
		let mut txid = bitcoin::hashes::Hash::to_byte_array(self.txid);
		txid.reverse();
		let mut out = Vec::with_capacity(32 + 4 + 32 + 8 + 8 + self.asset_id.len());
		out.extend_from_slice(&txid);
		out.extend_from_slice(&self.output_index.to_le_bytes());
		out.extend_from_slice(&self.script_hash);
		out.extend_from_slice(&self.satoshis.to_le_bytes());
		out.extend_from_slice(&self.value.to_le_bytes());
		out.extend_from_slice(&self.asset_id);
		out
	}
}

/// Registry metadata written once at token genesis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
	pub name: String,
	pub symbol: String,
	pub decimal_num: u8,
}

/// Persisted protocol-relevant transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
	pub txid: Txid,
	/// Consensus-serialized transaction as hex
	pub raw: String,
	pub confirmed: bool,
	pub block_height: Option<u64>,
	pub seen_at: DateTime<Utc>,
}

impl TransactionRecord {
	/// A record is confirmed exactly when it is created from a block
	pub fn new(tx: &Transaction, block_height: Option<u64>) -> Self {
		Self {
			txid: tx.txid(),
			raw: bitcoin::consensus::encode::serialize_hex(tx),
			confirmed: block_height.is_some(),
			block_height,
			seen_at: Utc::now(),
		}
	}
}
