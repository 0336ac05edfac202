use crate::protocol::{AssetType, HeaderError, TokenId};
use crate::store::{StoreError, UtxoRecord};

use bitcoin::Transaction;

/// Error types for transaction validation
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
	#[error("Storage error: {0}")]
	StoreError(#[from] StoreError),

	#[error("Script error: {0}")]
	HeaderError(#[from] HeaderError),
}

/// Value accounting failures; each one rejects the affected token id
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConservationError {
	#[error("token {token_id} value sum overflows")]
	Overflow { token_id: TokenId },

	#[error("token {token_id} outputs {outputs} exceed inputs {inputs}")]
	Inflation {
		token_id: TokenId,
		inputs: u128,
		outputs: u128,
	},
}

/// A protocol UTXO consumed by the transaction under validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpentUtxo {
	/// Position of the spending input
	pub input_index: usize,
	/// Record removed from storage
	pub record: UtxoRecord,
}

/// Output whose script carries a well-formed protocol header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidOutput {
	pub index: u32,
	pub script: Vec<u8>,
	pub satoshis: u64,
}

impl ValidOutput {
	pub fn asset_type(&self) -> Option<AssetType> {
		crate::protocol::header_type(&self.script)
	}
}

/// Per-asset validation of one transaction
#[async_trait::async_trait]
pub trait AssetProcessor: Send + Sync {
	/// Validate the outputs of one asset type against the inputs of that type and persist
	/// the accepted ones. Returns true when at least one output was persisted.
	async fn process_transaction(
		&self,
		tx: &Transaction,
		valid_inputs: &[SpentUtxo],
		valid_outputs: &[ValidOutput],
	) -> Result<bool, OracleError>;
}
