//! Fungible token script layout.
//!
//! ```text
//! <contract code> <contract hash (20)> <name (20)> <symbol (10)> <genesis flag (1)>
//! <decimal num (1)> <address (20)> <token value (8, LE)> <token id (20)> <type (4)> <flag (8)>
//! ```

use super::header::{self, HEADER_LEN, Tail, write_tail};
use super::hash160;
use super::types::{Address, AssetType, HeaderError, TokenId};

pub const TOKEN_ID_LEN: usize = 20;
pub const TOKEN_VALUE_LEN: usize = 8;
pub const ADDRESS_LEN: usize = 20;
pub const DECIMAL_NUM_LEN: usize = 1;
pub const GENESIS_FLAG_LEN: usize = 1;
pub const SYMBOL_LEN: usize = 10;
pub const NAME_LEN: usize = 20;
pub const CONTRACT_HASH_LEN: usize = 20;

pub const TOKEN_ID_OFFSET: usize = HEADER_LEN + TOKEN_ID_LEN;
pub const TOKEN_VALUE_OFFSET: usize = TOKEN_ID_OFFSET + TOKEN_VALUE_LEN;
pub const ADDRESS_OFFSET: usize = TOKEN_VALUE_OFFSET + ADDRESS_LEN;
pub const DECIMAL_NUM_OFFSET: usize = ADDRESS_OFFSET + DECIMAL_NUM_LEN;
pub const GENESIS_FLAG_OFFSET: usize = DECIMAL_NUM_OFFSET + GENESIS_FLAG_LEN;
pub const SYMBOL_OFFSET: usize = GENESIS_FLAG_OFFSET + SYMBOL_LEN;
pub const NAME_OFFSET: usize = SYMBOL_OFFSET + NAME_LEN;
pub const CONTRACT_HASH_OFFSET: usize = NAME_OFFSET + CONTRACT_HASH_LEN;

/// Fixed suffix length of every token script
pub const TOKEN_HEADER_LEN: usize = CONTRACT_HASH_OFFSET;

/// Decoded token script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenFields {
	pub contract_code: Vec<u8>,
	pub contract_hash: [u8; CONTRACT_HASH_LEN],
	pub name: [u8; NAME_LEN],
	pub symbol: [u8; SYMBOL_LEN],
	pub is_genesis: bool,
	pub decimal_num: u8,
	pub address: Address,
	pub value: u64,
	pub token_id: TokenId,
}

impl TokenFields {
	/// Genesis output fields: zero value, zero address and the zero token id sentinel
	pub fn genesis(
		contract_code: Vec<u8>,
		name: &str,
		symbol: &str,
		decimal_num: u8,
	) -> Result<Self, HeaderError> {
		Ok(Self {
			contract_hash: hash160(&contract_code),
			contract_code,
			name: pad_field("name", name)?,
			symbol: pad_field("symbol", symbol)?,
			is_genesis: true,
			decimal_num,
			address: Address::ZERO,
			value: 0,
			token_id: TokenId::ZERO,
		})
	}

	pub fn decode(script: &[u8]) -> Result<Self, HeaderError> {
		let parsed = header::parse_header(script)?;
		if parsed.asset_type != AssetType::Token {
			return Err(HeaderError::WrongAssetType {
				expected: AssetType::Token,
				actual: parsed.asset_type,
			});
		}

		let tail = Tail::new(script);
		let mut contract_hash = [0u8; CONTRACT_HASH_LEN];
		contract_hash.copy_from_slice(tail.bytes(CONTRACT_HASH_OFFSET, CONTRACT_HASH_LEN)?);
		let mut name = [0u8; NAME_LEN];
		name.copy_from_slice(tail.bytes(NAME_OFFSET, NAME_LEN)?);
		let mut symbol = [0u8; SYMBOL_LEN];
		symbol.copy_from_slice(tail.bytes(SYMBOL_OFFSET, SYMBOL_LEN)?);

		Ok(Self {
			contract_code: tail.prefix(CONTRACT_HASH_OFFSET)?.to_vec(),
			contract_hash,
			name,
			symbol,
			is_genesis: tail.u8(GENESIS_FLAG_OFFSET)? == 1,
			decimal_num: tail.u8(DECIMAL_NUM_OFFSET)?,
			address: Address::from_slice(tail.bytes(ADDRESS_OFFSET, ADDRESS_LEN)?)?,
			value: tail.u64_le(TOKEN_VALUE_OFFSET)?,
			token_id: TokenId::from_slice(tail.bytes(TOKEN_ID_OFFSET, TOKEN_ID_LEN)?)?,
		})
	}

	pub fn encode(&self) -> Vec<u8> {
		let mut script = Vec::with_capacity(self.contract_code.len() + TOKEN_HEADER_LEN);
		script.extend_from_slice(&self.contract_code);
		script.extend_from_slice(&self.contract_hash);
		script.extend_from_slice(&self.name);
		script.extend_from_slice(&self.symbol);
		script.push(u8::from(self.is_genesis));
		script.push(self.decimal_num);
		script.extend_from_slice(self.address.as_bytes());
		script.extend_from_slice(&self.value.to_le_bytes());
		script.extend_from_slice(self.token_id.as_bytes());
		header::push_trailer(&mut script, AssetType::Token);
		script
	}

	pub fn name_str(&self) -> String {
		field_str(&self.name)
	}

	pub fn symbol_str(&self) -> String {
		field_str(&self.symbol)
	}

	/// The contract hash must commit to the contract code carried in front of it
	pub fn has_valid_contract_hash(&self) -> bool {
		hash160(&self.contract_code) == self.contract_hash
	}
}

/// Token id minted by a genesis output
pub fn derive_token_id(genesis_script: &[u8]) -> TokenId {
	TokenId(hash160(genesis_script))
}

/// Script produced by transferring `value` of the token held in `source` to `address`
pub fn transfer_script(
	source: &[u8],
	address: &Address,
	value: u64,
) -> Result<Vec<u8>, HeaderError> {
	TokenFields::decode(source)?;
	let mut script = source.to_vec();
	write_tail(&mut script, ADDRESS_OFFSET, address.as_bytes())?;
	write_tail(&mut script, TOKEN_VALUE_OFFSET, &value.to_le_bytes())?;
	Ok(script)
}

/// First transfer out of a genesis output: stamps the derived token id and clears the
/// genesis flag
pub fn transfer_from_genesis_script(
	genesis: &[u8],
	address: &Address,
	value: u64,
	token_id: &TokenId,
) -> Result<Vec<u8>, HeaderError> {
	let mut script = transfer_script(genesis, address, value)?;
	write_tail(&mut script, TOKEN_ID_OFFSET, token_id.as_bytes())?;
	write_tail(&mut script, GENESIS_FLAG_OFFSET, &[0])?;
	Ok(script)
}

fn pad_field<const N: usize>(field: &'static str, value: &str) -> Result<[u8; N], HeaderError> {
	let bytes = value.as_bytes();
	if bytes.len() > N {
		return Err(HeaderError::InvalidLength {
			field,
			expected: N,
			actual: bytes.len(),
		});
	}
	let mut padded = [0u8; N];
	padded[..bytes.len()].copy_from_slice(bytes);
	Ok(padded)
}

fn field_str(raw: &[u8]) -> String {
	let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
	String::from_utf8_lossy(&raw[..end]).into_owned()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_utils::{CONTRACT_CODE, genesis_token_script, test_address};

	#[test]
	fn transfer_script_round_trips_fields() {
		let genesis = genesis_token_script("test token name", "ttn");
		let token_id = derive_token_id(&genesis);
		let address = test_address();

		let script =
			transfer_from_genesis_script(&genesis, &address, 999_999_999_900, &token_id).unwrap();
		let fields = TokenFields::decode(&script).unwrap();

		assert_eq!(fields.address, address);
		assert_eq!(fields.value, 999_999_999_900);
		assert_eq!(fields.token_id, token_id);
		assert_eq!(fields.name_str(), "test token name");
		assert_eq!(fields.symbol_str(), "ttn");
		assert!(!fields.is_genesis);
		assert_eq!(fields.decimal_num, 8);
		assert_eq!(fields.contract_code, CONTRACT_CODE.to_vec());
		assert!(fields.has_valid_contract_hash());
		assert_eq!(fields.encode(), script);
	}

	#[test]
	fn transfer_keeps_everything_but_address_and_value() {
		let genesis = genesis_token_script("name", "sym");
		let token_id = derive_token_id(&genesis);
		let first =
			transfer_from_genesis_script(&genesis, &test_address(), 1_000, &token_id).unwrap();
		let other = Address([9u8; 20]);
		let second = transfer_script(&first, &other, 400).unwrap();

		assert_eq!(first.len(), second.len());
		let decoded = TokenFields::decode(&second).unwrap();
		assert_eq!(decoded.address, other);
		assert_eq!(decoded.value, 400);
		assert_eq!(decoded.token_id, token_id);
		assert_eq!(
			&first[..first.len() - ADDRESS_OFFSET],
			&second[..second.len() - ADDRESS_OFFSET]
		);
	}

	#[test]
	fn genesis_fields_use_sentinels() {
		let fields = TokenFields::genesis(CONTRACT_CODE.to_vec(), "n", "s", 2).unwrap();
		assert!(fields.is_genesis);
		assert!(fields.address.is_zero());
		assert!(fields.token_id.is_zero());
		assert_eq!(fields.value, 0);
		assert_eq!(TokenFields::decode(&fields.encode()).unwrap(), fields);
	}

	#[test]
	fn oversized_name_is_rejected() {
		let err = TokenFields::genesis(vec![], "a name that is far too long", "s", 0).unwrap_err();
		assert!(matches!(err, HeaderError::InvalidLength { field: "name", .. }));
	}

	#[test]
	fn decoding_a_unique_script_fails() {
		let script = crate::test_utils::unique_script(b"", crate::protocol::UniqueId::ZERO, true);
		assert!(matches!(
			TokenFields::decode(&script),
			Err(HeaderError::WrongAssetType { .. })
		));
	}
}
