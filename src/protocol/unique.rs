//! Unique (non-fungible) asset script layout.
//!
//! ```text
//! <spending code> <custom data (N)> <custom data size N (4, LE)> <genesis flag (1)>
//! <unique id (36)> <type (4)> <flag (8)>
//! ```

use super::header::{self, HEADER_LEN, Tail, write_tail};
use super::types::{AssetType, HeaderError, UniqueId};
use bitcoin::OutPoint;
use bitcoin::hashes::Hash;

pub const UNIQUE_ID_LEN: usize = 36;
pub const GENESIS_FLAG_LEN: usize = 1;
pub const CUSTOM_DATA_SIZE_LEN: usize = 4;

pub const UNIQUE_ID_OFFSET: usize = HEADER_LEN + UNIQUE_ID_LEN;
pub const GENESIS_FLAG_OFFSET: usize = UNIQUE_ID_OFFSET + GENESIS_FLAG_LEN;
pub const CUSTOM_DATA_SIZE_OFFSET: usize = GENESIS_FLAG_OFFSET + CUSTOM_DATA_SIZE_LEN;

/// Suffix length of a unique script carrying no custom data
pub const UNIQUE_FIXED_LEN: usize = CUSTOM_DATA_SIZE_OFFSET;

/// Declared header length: fixed suffix plus the custom data block
pub fn header_length(script: &[u8]) -> Result<usize, HeaderError> {
	let tail = Tail::new(script);
	if tail.len() < UNIQUE_FIXED_LEN {
		return Err(HeaderError::Truncated {
			needed: UNIQUE_FIXED_LEN,
			available: tail.len(),
		});
	}
	let custom_size = tail.u32_le(CUSTOM_DATA_SIZE_OFFSET)?;
	usize::try_from(custom_size)
		.ok()
		.and_then(|size| UNIQUE_FIXED_LEN.checked_add(size))
		.ok_or(HeaderError::LengthOverflow)
}

/// Decoded unique asset script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueFields {
	pub spending_code: Vec<u8>,
	pub custom_data: Vec<u8>,
	pub is_genesis: bool,
	pub unique_id: UniqueId,
}

impl UniqueFields {
	pub fn decode(script: &[u8]) -> Result<Self, HeaderError> {
		let parsed = header::parse_header(script)?;
		if parsed.asset_type != AssetType::Unique {
			return Err(HeaderError::WrongAssetType {
				expected: AssetType::Unique,
				actual: parsed.asset_type,
			});
		}

		let tail = Tail::new(script);
		let total = header_length(script)?;
		let custom_len = total - UNIQUE_FIXED_LEN;
		Ok(Self {
			spending_code: tail.prefix(total)?.to_vec(),
			custom_data: tail.bytes(total, custom_len)?.to_vec(),
			is_genesis: tail.u8(GENESIS_FLAG_OFFSET)? == 1,
			unique_id: UniqueId::from_slice(tail.bytes(UNIQUE_ID_OFFSET, UNIQUE_ID_LEN)?)?,
		})
	}

	pub fn encode(&self) -> Result<Vec<u8>, HeaderError> {
		let custom_size =
			u32::try_from(self.custom_data.len()).map_err(|_| HeaderError::LengthOverflow)?;
		let mut script = Vec::with_capacity(
			self.spending_code.len() + self.custom_data.len() + UNIQUE_FIXED_LEN,
		);
		script.extend_from_slice(&self.spending_code);
		script.extend_from_slice(&self.custom_data);
		script.extend_from_slice(&custom_size.to_le_bytes());
		script.push(u8::from(self.is_genesis));
		script.extend_from_slice(self.unique_id.as_bytes());
		header::push_trailer(&mut script, AssetType::Unique);
		Ok(script)
	}
}

/// Identity assigned to the unique asset minted at `genesis`: the txid in display byte order
/// followed by the big-endian output index
pub fn derive_unique_id(genesis: &OutPoint) -> UniqueId {
	let mut txid = genesis.txid.to_byte_array();
	txid.reverse();
	let mut id = [0u8; UNIQUE_ID_LEN];
	id[..32].copy_from_slice(&txid);
	id[32..].copy_from_slice(&genesis.vout.to_be_bytes());
	UniqueId(id)
}

/// Move the asset held in `source` under `unique_id`, clearing the genesis flag
#[cfg(test)]
pub(crate) fn transfer_script(source: &[u8], unique_id: &UniqueId) -> Result<Vec<u8>, HeaderError> {
	UniqueFields::decode(source)?;
	let mut script = source.to_vec();
	write_tail(&mut script, UNIQUE_ID_OFFSET, unique_id.as_bytes())?;
	write_tail(&mut script, GENESIS_FLAG_OFFSET, &[0])?;
	Ok(script)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_utils::{txid_from_byte, unique_script};

	#[test]
	fn decode_reads_custom_data_block() {
		let script = unique_script(b"ipfs://artwork", UniqueId::ZERO, true);
		let fields = UniqueFields::decode(&script).unwrap();
		assert_eq!(fields.custom_data, b"ipfs://artwork".to_vec());
		assert!(fields.is_genesis);
		assert!(fields.unique_id.is_zero());
		assert_eq!(fields.encode().unwrap(), script);
	}

	#[test]
	fn derived_id_is_display_txid_then_big_endian_index() {
		let outpoint = OutPoint::new(txid_from_byte(0xab), 0x0102_0304);
		let id = derive_unique_id(&outpoint);
		let expected = format!("{}01020304", outpoint.txid);
		assert_eq!(id.to_string(), expected);
	}

	#[test]
	fn transfer_stamps_identity() {
		let genesis = unique_script(b"data", UniqueId::ZERO, true);
		let id = UniqueId([5u8; 36]);
		let moved = transfer_script(&genesis, &id).unwrap();
		let fields = UniqueFields::decode(&moved).unwrap();
		assert_eq!(fields.unique_id, id);
		assert!(!fields.is_genesis);
		assert_eq!(fields.custom_data, b"data".to_vec());
	}

	#[test]
	fn short_script_has_no_length() {
		assert!(matches!(
			header_length(&[0u8; 10]),
			Err(HeaderError::Truncated { needed: UNIQUE_FIXED_LEN, available: 10 })
		));
	}
}
