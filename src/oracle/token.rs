use super::{
	AssetProcessor, ConservationError, OracleError, ProcessorContext, SpentUtxo, ValidOutput,
};
use crate::protocol::token::{
	TokenFields, derive_token_id, transfer_from_genesis_script, transfer_script,
};
use crate::protocol::{Address, TokenId, hash160};
use crate::store::{TokenInfo, TokenRecord, UtxoRecord};
use crate::utils::format_token_amount;

use bitcoin::{Transaction, Txid};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

/// Issuance beyond the spent value is allowed when the genesis output of the token itself is
/// among the inputs, identified by its script hashing to the token id.
pub fn genesis_reauthorizes_issuance(token_id: &TokenId, inputs: &[SpentUtxo]) -> bool {
	inputs
		.iter()
		.any(|spent| hash160(spent.record.script()) == token_id.0)
}

fn accumulate(token_id: &TokenId, total: u128, value: u64) -> Result<u128, ConservationError> {
	total
		.checked_add(u128::from(value))
		.ok_or(ConservationError::Overflow {
			token_id: *token_id,
		})
}

fn checked_sum(
	token_id: &TokenId,
	values: impl IntoIterator<Item = u64>,
) -> Result<u128, ConservationError> {
	values
		.into_iter()
		.try_fold(0u128, |total, value| accumulate(token_id, total, value))
}

/// Value accounting for one token id. Outputs may not exceed inputs unless the genesis output
/// of the token is spent alongside; an overflowing sum always rejects.
fn check_conservation(
	token_id: &TokenId,
	inputs: Result<u128, ConservationError>,
	outputs: Result<u128, ConservationError>,
	genesis_spent: bool,
) -> Result<(), ConservationError> {
	let (inputs, outputs) = (inputs?, outputs?);
	if outputs <= inputs || genesis_spent {
		return Ok(());
	}
	Err(ConservationError::Inflation {
		token_id: *token_id,
		inputs,
		outputs,
	})
}

/// Transfer outputs of one token id that passed the contract check
struct TokenOutput<'a> {
	output: &'a ValidOutput,
	fields: TokenFields,
}

/// Validates fungible token outputs
pub struct TokenProcessor {
	ctx: ProcessorContext,
}

impl TokenProcessor {
	pub fn new(ctx: ProcessorContext) -> Self {
		Self { ctx }
	}

	/// The output must be exactly what transferring one of the spent records of the same token
	/// would produce, and its contract hash must commit to its contract code
	fn is_contract_consistent(
		fields: &TokenFields,
		script: &[u8],
		sources: &[&TokenRecord],
	) -> bool {
		if !fields.has_valid_contract_hash() {
			debug!("Contract hash does not match contract code");
			return false;
		}
		sources.iter().any(|source| {
			let expected = if source.is_genesis {
				transfer_from_genesis_script(
					&source.script,
					&fields.address,
					fields.value,
					&fields.token_id,
				)
			} else {
				transfer_script(&source.script, &fields.address, fields.value)
			};
			match expected {
				Ok(expected) => expected == script,
				Err(e) => {
					debug!("Cannot derive transfer from {}: {}", source.outpoint(), e);
					false
				}
			}
		})
	}

	async fn wallet_id(&self, address: &Address) -> Option<String> {
		if address.is_zero() {
			return None;
		}
		match self.ctx.store.wallets.wallet_id(address).await {
			Ok(wallet_id) => wallet_id,
			Err(e) => {
				warn!("Wallet lookup for {} failed: {}", address, e);
				None
			}
		}
	}

	async fn record(
		&self,
		txid: Txid,
		output: &ValidOutput,
		fields: &TokenFields,
		token_id: TokenId,
	) -> UtxoRecord {
		UtxoRecord::Token(TokenRecord {
			txid,
			output_index: output.index,
			script: output.script.clone(),
			address: fields.address,
			token_id,
			token_value: fields.value,
			decimal_num: fields.decimal_num,
			is_genesis: fields.is_genesis,
			token_name: fields.name_str(),
			token_symbol: fields.symbol_str(),
			satoshis: output.satoshis,
			wallet_id: self.wallet_id(&fields.address).await,
		})
	}
}

#[async_trait::async_trait]
impl AssetProcessor for TokenProcessor {
	async fn process_transaction(
		&self,
		tx: &Transaction,
		valid_inputs: &[SpentUtxo],
		valid_outputs: &[ValidOutput],
	) -> Result<bool, OracleError> {
		let txid = tx.txid();

		let mut sources: HashMap<TokenId, Vec<&TokenRecord>> = HashMap::new();
		for spent in valid_inputs {
			if let UtxoRecord::Token(record) = &spent.record {
				sources.entry(record.token_id).or_default().push(record);
			}
		}

		let mut accepted: Vec<UtxoRecord> = Vec::new();
		let mut transfers: BTreeMap<TokenId, Vec<TokenOutput>> = BTreeMap::new();

		for output in valid_outputs {
			let fields = match TokenFields::decode(&output.script) {
				Ok(fields) => fields,
				Err(e) => {
					debug!("Skipping output {}:{}: {}", txid, output.index, e);
					continue;
				}
			};

			if fields.is_genesis {
				if fields.value != 0 || !fields.token_id.is_zero() || !fields.address.is_zero() {
					info!(
						"Rejected genesis output {}:{}: value, token id and address must be zero",
						txid, output.index
					);
					continue;
				}
				let token_id = derive_token_id(&output.script);
				let info = TokenInfo {
					name: fields.name_str(),
					symbol: fields.symbol_str(),
					decimal_num: fields.decimal_num,
				};
				match self.ctx.store.tokens.insert(token_id, info).await {
					Ok(true) => info!("Registered token {} ({})", token_id, fields.name_str()),
					Ok(false) => debug!("Token {} already registered", token_id),
					Err(e) => warn!("Failed to register token {}: {}", token_id, e),
				}
				accepted.push(self.record(txid, output, &fields, token_id).await);
				continue;
			}

			let token_sources = sources
				.get(&fields.token_id)
				.map(Vec::as_slice)
				.unwrap_or(&[]);
			if !Self::is_contract_consistent(&fields, &output.script, token_sources) {
				info!(
					"Rejected output {}:{} of token {}: contract check failed",
					txid, output.index, fields.token_id
				);
				continue;
			}
			transfers
				.entry(fields.token_id)
				.or_default()
				.push(TokenOutput { output, fields });
		}

		for (token_id, outputs) in transfers {
			let inputs = checked_sum(
				&token_id,
				sources
					.get(&token_id)
					.into_iter()
					.flatten()
					.map(|record| record.token_value),
			);
			let produced = checked_sum(&token_id, outputs.iter().map(|o| o.fields.value));

			let verdict = check_conservation(
				&token_id,
				inputs,
				produced,
				genesis_reauthorizes_issuance(&token_id, valid_inputs),
			);

			if let Err(e) = verdict {
				info!("Rejected token outputs of {}: {}", txid, e);
				continue;
			}

			for TokenOutput { output, fields } in outputs {
				debug!(
					"Token {} output {}:{} carries {}",
					token_id,
					txid,
					output.index,
					format_token_amount(fields.value, fields.decimal_num)
				);
				accepted.push(self.record(txid, output, &fields, token_id).await);
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
		build_transaction, funding_outpoint, genesis_token_script, sample_token_record,
		test_address, test_context, txid_from_byte,
	};
	use bitcoin::OutPoint;

	fn spent(record: TokenRecord) -> SpentUtxo {
		SpentUtxo {
			input_index: 0,
			record: record.into(),
		}
	}

	fn output(index: u32, script: Vec<u8>) -> ValidOutput {
		ValidOutput {
			index,
			script,
			satoshis: 546,
		}
	}

	#[test]
	fn only_the_genesis_script_reauthorizes() {
		let genesis = genesis_token_script("name", "sym");
		let token_id = derive_token_id(&genesis);
		let mut genesis_record = sample_token_record(txid_from_byte(1), 0, 0);
		genesis_record.script = genesis.clone();
		let transfer = sample_token_record(txid_from_byte(2), 0, 10);

		assert!(genesis_reauthorizes_issuance(
			&token_id,
			&[spent(transfer.clone()), spent(genesis_record)]
		));
		assert!(!genesis_reauthorizes_issuance(&token_id, &[spent(transfer)]));
		assert!(!genesis_reauthorizes_issuance(&token_id, &[]));
	}

	#[test]
	fn value_sums_are_widened() {
		let id = TokenId([1u8; 20]);
		assert_eq!(
			checked_sum(&id, vec![u64::MAX, u64::MAX]),
			Ok(2 * u128::from(u64::MAX))
		);
		assert_eq!(checked_sum(&id, Vec::new()), Ok(0));
	}

	#[test]
	fn overflowing_sum_is_rejected() {
		let id = TokenId([2u8; 20]);
		assert_eq!(
			accumulate(&id, u128::MAX, 1),
			Err(ConservationError::Overflow { token_id: id })
		);
		assert_eq!(accumulate(&id, u128::MAX - 1, 1), Ok(u128::MAX));

		// a spent genesis output does not excuse an overflow on either side
		let overflow = ConservationError::Overflow { token_id: id };
		assert_eq!(
			check_conservation(&id, Err(overflow.clone()), Ok(5), true),
			Err(overflow.clone())
		);
		assert_eq!(
			check_conservation(&id, Ok(5), Err(overflow.clone()), true),
			Err(overflow)
		);
	}

	#[test]
	fn inflation_needs_a_spent_genesis() {
		let id = TokenId([3u8; 20]);
		assert_eq!(check_conservation(&id, Ok(10), Ok(10), false), Ok(()));
		assert_eq!(check_conservation(&id, Ok(10), Ok(4), false), Ok(()));
		assert_eq!(
			check_conservation(&id, Ok(10), Ok(11), false),
			Err(ConservationError::Inflation {
				token_id: id,
				inputs: 10,
				outputs: 11
			})
		);
		assert_eq!(check_conservation(&id, Ok(0), Ok(11), true), Ok(()));
	}

	#[tokio::test]
	async fn partial_spend_is_accepted() {
		let ctx = test_context();
		let processor = TokenProcessor::new(ctx.clone());

		let genesis = genesis_token_script("name", "sym");
		let token_id = derive_token_id(&genesis);
		let issued =
			transfer_from_genesis_script(&genesis, &test_address(), 1_000, &token_id).unwrap();
		let source = TokenRecord {
			script: issued.clone(),
			token_id,
			..sample_token_record(txid_from_byte(3), 0, 1_000)
		};
		let tx = build_transaction(&[source.outpoint()], &[]);

		let accepted = processor
			.process_transaction(
				&tx,
				&[spent(source)],
				&[output(0, transfer_script(&issued, &test_address(), 400).unwrap())],
			)
			.await
			.unwrap();
		assert!(accepted);
		assert!(ctx.cache.contains(&OutPoint::new(tx.txid(), 0)));
	}

	#[tokio::test]
	async fn wallet_id_is_attached_to_owned_outputs() {
		let ctx = test_context();
		ctx.store
			.wallets
			.register_address(test_address(), "wallet-1".into())
			.await
			.unwrap();
		let processor = TokenProcessor::new(ctx.clone());

		let genesis = genesis_token_script("name", "sym");
		let token_id = derive_token_id(&genesis);
		let mut genesis_record = sample_token_record(txid_from_byte(4), 0, 0);
		genesis_record.script = genesis.clone();
		genesis_record.token_id = token_id;
		genesis_record.is_genesis = true;

		let issued =
			transfer_from_genesis_script(&genesis, &test_address(), 77, &token_id).unwrap();
		let tx = build_transaction(&[funding_outpoint(4)], &[]);
		assert!(
			processor
				.process_transaction(&tx, &[spent(genesis_record)], &[output(0, issued)])
				.await
				.unwrap()
		);

		let stored = ctx
			.store
			.utxos
			.find_by_outpoint(&OutPoint::new(tx.txid(), 0))
			.await
			.unwrap();
		match stored {
			Some(UtxoRecord::Token(record)) => {
				assert_eq!(record.wallet_id.as_deref(), Some("wallet-1"));
				assert_eq!(record.token_value, 77);
			}
			other => panic!("unexpected record {:?}", other),
		}
	}
}
