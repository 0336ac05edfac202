//! Read-side surface over oracle state.
//!
//! Serves the token registry, address-scoped token UTXOs, attestation field layouts and wallet
//! registration to whatever front end embeds the crate.

use crate::protocol::{Address, TokenId};
use crate::store::{AttestationFields, OracleStore, StoreError, TokenInfo, TokenRecord};

use bitcoin::OutPoint;
use serde::Serialize;
use tracing::info;

/// Registry entry together with its id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenSummary {
	pub token_id: TokenId,
	#[serde(flatten)]
	pub info: TokenInfo,
}

/// Token holdings of one address
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenBalance {
	pub address: Address,
	pub token_id: TokenId,
	/// Sum of `token_value` over the live UTXOs, widened so it cannot overflow
	pub value: u128,
	pub utxos: Vec<TokenRecord>,
}

pub struct OracleQuery {
	store: OracleStore,
}

impl OracleQuery {
	pub fn new(store: OracleStore) -> Self {
		Self { store }
	}

	/// Every registered token, ordered by id
	pub async fn tokens(&self) -> Result<Vec<TokenSummary>, StoreError> {
		Ok(self
			.store
			.tokens
			.list()
			.await?
			.into_iter()
			.map(|(token_id, info)| TokenSummary { token_id, info })
			.collect())
	}

	pub async fn token(&self, token_id: &TokenId) -> Result<Option<TokenInfo>, StoreError> {
		self.store.tokens.find_one(token_id).await
	}

	pub async fn token_balance(
		&self,
		address: &Address,
		token_id: &TokenId,
	) -> Result<TokenBalance, StoreError> {
		let utxos = self
			.store
			.utxos
			.query_by_address_and_asset(address, token_id)
			.await?;
		let value = utxos
			.iter()
			.map(|record| u128::from(record.token_value))
			.sum();
		Ok(TokenBalance {
			address: *address,
			token_id: *token_id,
			value,
			utxos,
		})
	}

	/// Fields an attestation over the live UTXO at `outpoint` signs, if it is live
	pub async fn attestation(
		&self,
		outpoint: &OutPoint,
	) -> Result<Option<AttestationFields>, StoreError> {
		Ok(self
			.store
			.utxos
			.find_by_outpoint(outpoint)
			.await?
			.map(|record| record.attestation_fields()))
	}

	/// Attach `wallet_id` to outputs created for `address` from now on
	pub async fn register_address(
		&self,
		address: Address,
		wallet_id: String,
	) -> Result<bool, StoreError> {
		info!("Registering address {} for wallet {}", address, wallet_id);
		self.store.wallets.register_address(address, wallet_id).await
	}
}
