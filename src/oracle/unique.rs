use super::{AssetProcessor, OracleError, ProcessorContext, SpentUtxo, ValidOutput};
use crate::protocol::UniqueId;
use crate::protocol::unique::{UniqueFields, derive_unique_id};
use crate::store::{UniqueRecord, UtxoRecord};

use bitcoin::{OutPoint, Transaction};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

/// Validates unique asset outputs
pub struct UniqueProcessor {
	ctx: ProcessorContext,
}

impl UniqueProcessor {
	pub fn new(ctx: ProcessorContext) -> Self {
		Self { ctx }
	}
}

#[async_trait::async_trait]
impl AssetProcessor for UniqueProcessor {
	async fn process_transaction(
		&self,
		tx: &Transaction,
		valid_inputs: &[SpentUtxo],
		valid_outputs: &[ValidOutput],
	) -> Result<bool, OracleError> {
		let txid = tx.txid();
		let mut accepted: Vec<UtxoRecord> = Vec::new();
		let mut transfers: BTreeMap<UniqueId, Vec<(&ValidOutput, UniqueFields)>> = BTreeMap::new();

		for output in valid_outputs {
			let fields = match UniqueFields::decode(&output.script) {
				Ok(fields) => fields,
				Err(e) => {
					debug!("Skipping output {}:{}: {}", txid, output.index, e);
					continue;
				}
			};

			if fields.is_genesis {
				if !fields.unique_id.is_zero() {
					info!(
						"Rejected genesis output {}:{}: unique id must be zero",
						txid, output.index
					);
					continue;
				}
				let unique_id = derive_unique_id(&OutPoint::new(txid, output.index));
				info!("Minted unique asset {}", unique_id);
				accepted.push(UtxoRecord::Unique(UniqueRecord {
					txid,
					output_index: output.index,
					script: output.script.clone(),
					unique_id,
					is_genesis: true,
					satoshis: output.satoshis,
				}));
				continue;
			}

			transfers
				.entry(fields.unique_id)
				.or_default()
				.push((output, fields));
		}

		let spent_ids: HashSet<UniqueId> = valid_inputs
			.iter()
			.filter_map(|spent| match &spent.record {
				UtxoRecord::Unique(record) => Some(record.unique_id),
				UtxoRecord::Token(_) => None,
			})
			.collect();

		for (unique_id, outputs) in transfers {
			if outputs.len() > 1 {
				info!(
					"Rejected unique asset {} in {}: {} outputs claim it",
					unique_id,
					txid,
					outputs.len()
				);
				continue;
			}
			if !spent_ids.contains(&unique_id) {
				info!(
					"Rejected unique asset {} in {}: no input carries it",
					unique_id, txid
				);
				continue;
			}
			for (output, fields) in outputs {
				accepted.push(UtxoRecord::Unique(UniqueRecord {
					txid,
					output_index: output.index,
					script: output.script.clone(),
					unique_id,
					is_genesis: fields.is_genesis,
					satoshis: output.satoshis,
				}));
			}
		}

		if accepted.is_empty() {
			return Ok(false);
		}
		let persisted = self.ctx.persist(accepted).await;
		Ok(persisted > 0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_utils::{
		build_transaction, funding_outpoint, sample_unique_record, test_context, txid_from_byte,
		unique_script,
	};

	fn output(index: u32, script: Vec<u8>) -> ValidOutput {
		ValidOutput {
			index,
			script,
			satoshis: 546,
		}
	}

	fn spent(record: UniqueRecord) -> SpentUtxo {
		SpentUtxo {
			input_index: 0,
			record: record.into(),
		}
	}

	#[tokio::test]
	async fn duplicated_id_blacklists_every_claim() {
		let ctx = test_context();
		let processor = UniqueProcessor::new(ctx.clone());
		let id = UniqueId([6u8; 36]);
		let input = sample_unique_record(txid_from_byte(1), 0, id);
		let tx = build_transaction(&[input.outpoint()], &[]);

		let accepted = processor
			.process_transaction(
				&tx,
				&[spent(input)],
				&[
					output(0, unique_script(b"a", id, false)),
					output(1, unique_script(b"a", id, false)),
				],
			)
			.await
			.unwrap();
		assert!(!accepted);
		assert!(ctx.cache.is_empty());
	}

	#[tokio::test]
	async fn transfer_needs_matching_input() {
		let ctx = test_context();
		let processor = UniqueProcessor::new(ctx.clone());
		let id = UniqueId([6u8; 36]);
		let other = sample_unique_record(txid_from_byte(1), 0, UniqueId([7u8; 36]));
		let tx = build_transaction(&[other.outpoint()], &[]);

		let accepted = processor
			.process_transaction(&tx, &[spent(other)], &[output(0, unique_script(b"", id, false))])
			.await
			.unwrap();
		assert!(!accepted);
	}

	#[tokio::test]
	async fn genesis_id_is_derived_from_its_outpoint() {
		let ctx = test_context();
		let processor = UniqueProcessor::new(ctx.clone());
		let tx = build_transaction(&[funding_outpoint(3)], &[]);

		let accepted = processor
			.process_transaction(
				&tx,
				&[],
				&[
					output(0, unique_script(b"one", UniqueId::ZERO, true)),
					output(1, unique_script(b"two", UniqueId::ZERO, true)),
					output(2, unique_script(b"bad", UniqueId([1u8; 36]), true)),
				],
			)
			.await
			.unwrap();
		assert!(accepted);

		for index in 0..2 {
			let outpoint = OutPoint::new(tx.txid(), index);
			match ctx.store.utxos.find_by_outpoint(&outpoint).await.unwrap() {
				Some(UtxoRecord::Unique(record)) => {
					assert_eq!(record.unique_id, derive_unique_id(&outpoint));
					assert!(record.is_genesis);
				}
				other => panic!("unexpected record {:?}", other),
			}
		}
		assert!(!ctx.cache.contains(&OutPoint::new(tx.txid(), 2)));
	}
}
