//! Protocol trailer detection and bounds-checked tail reads.
//!
//! Every protocol script ends with `<asset type (u32 LE)> <protocol flag>`. Fields of each
//! asset variant sit at fixed or length-prefixed offsets counted backward from the end of the
//! script, which leaves the front free for an arbitrary spending condition.

use super::types::{AssetType, HeaderError};
use super::{token, unique};
use tracing::debug;

/// Magic bytes closing every protocol script
pub const PROTO_FLAG: &[u8; 8] = b"oraclesv";
pub const PROTO_FLAG_LEN: usize = PROTO_FLAG.len();
pub const TYPE_LEN: usize = 4;

/// Length of the common trailer: asset type tag plus protocol flag
pub const HEADER_LEN: usize = TYPE_LEN + PROTO_FLAG_LEN;

const TYPE_OFFSET: usize = HEADER_LEN;

/// Parsed view of a script's trailing metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptHeader {
	pub asset_type: AssetType,
	/// Bytes of type-specific data preceding the common trailer
	pub payload_length: usize,
}

/// Read-only accessor addressing a script from its end.
///
/// `offset` is always the distance from the end of the script to the first byte of the field.
#[derive(Clone, Copy)]
pub(crate) struct Tail<'a> {
	script: &'a [u8],
}

impl<'a> Tail<'a> {
	pub(crate) fn new(script: &'a [u8]) -> Self {
		Self { script }
	}

	pub(crate) fn len(&self) -> usize {
		self.script.len()
	}

	pub(crate) fn bytes(&self, offset: usize, len: usize) -> Result<&'a [u8], HeaderError> {
		if len > offset || offset > self.script.len() {
			return Err(HeaderError::Truncated {
				needed: offset,
				available: self.script.len(),
			});
		}
		let start = self.script.len() - offset;
		Ok(&self.script[start..start + len])
	}

	pub(crate) fn u8(&self, offset: usize) -> Result<u8, HeaderError> {
		Ok(self.bytes(offset, 1)?[0])
	}

	pub(crate) fn u32_le(&self, offset: usize) -> Result<u32, HeaderError> {
		let raw = self.bytes(offset, 4)?;
		Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
	}

	pub(crate) fn u64_le(&self, offset: usize) -> Result<u64, HeaderError> {
		let mut raw = [0u8; 8];
		raw.copy_from_slice(self.bytes(offset, 8)?);
		Ok(u64::from_le_bytes(raw))
	}

	/// Everything in front of the field ending `offset` bytes from the end
	pub(crate) fn prefix(&self, offset: usize) -> Result<&'a [u8], HeaderError> {
		if offset > self.script.len() {
			return Err(HeaderError::Truncated {
				needed: offset,
				available: self.script.len(),
			});
		}
		Ok(&self.script[..self.script.len() - offset])
	}
}

/// Overwrite a field addressed from the end of `script`
pub(crate) fn write_tail(
	script: &mut [u8],
	offset: usize,
	value: &[u8],
) -> Result<(), HeaderError> {
	if value.len() > offset || offset > script.len() {
		return Err(HeaderError::Truncated {
			needed: offset,
			available: script.len(),
		});
	}
	let start = script.len() - offset;
	script[start..start + value.len()].copy_from_slice(value);
	Ok(())
}

/// Append the common trailer for `asset_type`
pub(crate) fn push_trailer(script: &mut Vec<u8>, asset_type: AssetType) {
	script.extend_from_slice(&asset_type.tag().to_le_bytes());
	script.extend_from_slice(PROTO_FLAG);
}

/// True when the script ends with the protocol flag
pub fn has_proto_flag(script: &[u8]) -> bool {
	script.len() >= PROTO_FLAG_LEN && script.ends_with(PROTO_FLAG)
}

/// Asset variant declared by the trailer, if the trailer is present and the tag is known
pub fn header_type(script: &[u8]) -> Option<AssetType> {
	if script.len() < HEADER_LEN || !has_proto_flag(script) {
		return None;
	}
	let tag = Tail::new(script).u32_le(TYPE_OFFSET).ok()?;
	AssetType::from_tag(tag)
}

/// Total header length the script declares for `asset_type`, trailer included.
///
/// Variable-length variants read their declared payload size from the script itself, so this
/// can fail on truncated input.
pub fn header_length(script: &[u8], asset_type: AssetType) -> Result<usize, HeaderError> {
	match asset_type {
		AssetType::Token => Ok(token::TOKEN_HEADER_LEN),
		AssetType::Unique => unique::header_length(script),
	}
}

/// Fully validate the trailer and type-specific length of a script
pub fn parse_header(script: &[u8]) -> Result<ScriptHeader, HeaderError> {
	if script.len() < HEADER_LEN {
		return Err(HeaderError::Truncated {
			needed: HEADER_LEN,
			available: script.len(),
		});
	}
	if !has_proto_flag(script) {
		return Err(HeaderError::MissingProtocolFlag);
	}
	let tag = Tail::new(script).u32_le(TYPE_OFFSET)?;
	let asset_type = AssetType::from_tag(tag).ok_or(HeaderError::UnsupportedType(tag))?;
	let total = header_length(script, asset_type)?;
	if script.len() < total {
		return Err(HeaderError::Truncated {
			needed: total,
			available: script.len(),
		});
	}
	Ok(ScriptHeader {
		asset_type,
		payload_length: total - HEADER_LEN,
	})
}

/// Pure classifier over untrusted scripts: never errors, never panics
pub fn has_header(script: &[u8]) -> bool {
	match parse_header(script) {
		Ok(_) => true,
		Err(e) => {
			if has_proto_flag(script) {
				debug!("Rejecting flagged script of {} bytes: {}", script.len(), e);
			}
			false
		}
	}
}
