//! Transaction validation.
//!
//! The `OracleProcessor` classifies a transaction's inputs and outputs, consumes the protocol
//! UTXOs it spends and hands each asset type to its processor:
//!
//! - `token`: fungible tokens, value conserving with genesis issuance
//! - `unique`: non-fungible assets, existence conserving

/// Fungible token rules
pub mod token;
/// Processor types and errors
mod types;
/// Unique asset rules
pub mod unique;

pub use token::{TokenProcessor, genesis_reauthorizes_issuance};
pub use types::*;
pub use unique::UniqueProcessor;

use crate::cache::UtxoCache;
use crate::protocol::{self, AssetType};
use crate::store::{OracleStore, StoreError, UtxoRecord};

use bitcoin::{OutPoint, Transaction};
use futures_util::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared handles every asset processor writes through
#[derive(Clone)]
pub struct ProcessorContext {
	pub store: OracleStore,
	pub cache: Arc<UtxoCache>,
	/// Upper bound on in-flight storage calls
	pub max_concurrency: usize,
}

impl ProcessorContext {
	pub fn new(store: OracleStore, cache: Arc<UtxoCache>, max_concurrency: usize) -> Self {
		Self {
			store,
			cache,
			max_concurrency: max_concurrency.max(1),
		}
	}

	/// Insert accepted records with bounded concurrency and mirror every successful insert
	/// into the cache. Returns the number of records persisted.
	pub async fn persist(&self, records: Vec<UtxoRecord>) -> usize {
		let results: Vec<(OutPoint, Result<bool, StoreError>)> = stream::iter(records)
			.map(|record| {
				let utxos = self.store.utxos.clone();
				async move {
					let outpoint = record.outpoint();
					(outpoint, utxos.insert(record).await)
				}
			})
			.buffer_unordered(self.max_concurrency)
			.collect()
			.await;

		let mut persisted = 0;
		for (outpoint, result) in results {
			match result {
				Ok(true) => {
					self.cache.add(outpoint);
					persisted += 1;
				}
				Ok(false) => info!("Storage refused UTXO {}", outpoint),
				Err(e) => warn!("Failed to store UTXO {}: {}", outpoint, e),
			}
		}
		persisted
	}
}

/// Entry point for validating a single transaction
pub struct OracleProcessor {
	ctx: ProcessorContext,
	token: TokenProcessor,
	unique: UniqueProcessor,
}

impl OracleProcessor {
	pub fn new(ctx: ProcessorContext) -> Self {
		Self {
			token: TokenProcessor::new(ctx.clone()),
			unique: UniqueProcessor::new(ctx.clone()),
			ctx,
		}
	}

	pub fn cache(&self) -> &Arc<UtxoCache> {
		&self.ctx.cache
	}

	pub fn store(&self) -> &OracleStore {
		&self.ctx.store
	}

	/// Validate `tx`, spending the protocol UTXOs it consumes and persisting the outputs it
	/// legitimately creates. Returns true when the transaction touched protocol state.
	pub async fn process_transaction(&self, tx: &Transaction) -> Result<bool, OracleError> {
		let txid = tx.txid();

		// Only outpoints known to the cache cost a storage round trip
		let spent: Vec<(usize, OutPoint)> = tx
			.input
			.iter()
			.enumerate()
			.filter(|(_, input)| self.ctx.cache.remove(&input.previous_output))
			.map(|(index, input)| (index, input.previous_output))
			.collect();

		let removed: Vec<(usize, OutPoint, Result<Option<UtxoRecord>, StoreError>)> =
			stream::iter(spent)
				.map(|(input_index, outpoint)| {
					let utxos = self.ctx.store.utxos.clone();
					async move { (input_index, outpoint, utxos.remove(&outpoint).await) }
				})
				.buffered(self.ctx.max_concurrency)
				.collect()
				.await;

		let mut spent_utxos: Vec<SpentUtxo> = Vec::new();
		let mut failure: Option<StoreError> = None;
		for (input_index, outpoint, result) in removed {
			match result {
				Ok(Some(record)) => spent_utxos.push(SpentUtxo {
					input_index,
					record,
				}),
				Ok(None) => debug!("Cached UTXO {} missing from storage", outpoint),
				Err(e) => {
					warn!("Failed to remove spent UTXO {}: {}", outpoint, e);
					// still stored, so it must stay spendable
					self.ctx.cache.add(outpoint);
					if failure.is_none() {
						failure = Some(e);
					}
				}
			}
		}

		if let Some(e) = failure {
			let records: Vec<UtxoRecord> =
				spent_utxos.into_iter().map(|spent| spent.record).collect();
			let expected = records.len();
			let restored = self.ctx.persist(records).await;
			if restored != expected {
				warn!("Restored {} of {} UTXOs spent by {}", restored, expected, txid);
			}
			return Err(e.into());
		}

		let mut inputs: HashMap<AssetType, Vec<SpentUtxo>> = HashMap::new();
		for spent in spent_utxos {
			inputs
				.entry(spent.record.asset_type())
				.or_default()
				.push(spent);
		}

		let mut outputs: HashMap<AssetType, Vec<ValidOutput>> = HashMap::new();
		for (index, output) in tx.output.iter().enumerate() {
			let script = output.script_pubkey.as_bytes();
			if !protocol::has_header(script) {
				continue;
			}
			let Some(asset_type) = protocol::header_type(script) else {
				continue;
			};
			outputs.entry(asset_type).or_default().push(ValidOutput {
				index: index as u32,
				script: script.to_vec(),
				satoshis: output.value.to_sat(),
			});
		}

		if inputs.is_empty() && outputs.is_empty() {
			return Ok(false);
		}

		debug!(
			"Transaction {} spends {} and creates {} protocol UTXOs",
			txid,
			inputs.values().map(Vec::len).sum::<usize>(),
			outputs.values().map(Vec::len).sum::<usize>()
		);

		let mut relevant = !inputs.is_empty();
		for asset_type in AssetType::ALL {
			let Some(asset_outputs) = outputs.get(&asset_type) else {
				continue;
			};
			let asset_inputs = inputs.get(&asset_type).map(Vec::as_slice).unwrap_or(&[]);
			let processor: &dyn AssetProcessor = match asset_type {
				AssetType::Token => &self.token,
				AssetType::Unique => &self.unique,
			};
			if processor
				.process_transaction(tx, asset_inputs, asset_outputs)
				.await?
			{
				relevant = true;
			}
		}

		if relevant {
			info!("Accepted oracle transaction {}", txid);
		}
		Ok(relevant)
	}
}
