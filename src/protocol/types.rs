//! Identifier and error types shared by the script codecs.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Asset variants carried by the protocol trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
	/// Fungible, balance-conserving token
	Token,
	/// Non-fungible, existence-conserving asset
	Unique,
}

impl AssetType {
	pub const ALL: [AssetType; 2] = [AssetType::Token, AssetType::Unique];

	/// Wire tag written into the trailer
	pub fn tag(self) -> u32 {
		match self {
			AssetType::Token => 1,
			AssetType::Unique => 2,
		}
	}

	pub fn from_tag(tag: u32) -> Option<Self> {
		match tag {
			1 => Some(AssetType::Token),
			2 => Some(AssetType::Unique),
			_ => None,
		}
	}
}

impl fmt::Display for AssetType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			AssetType::Token => f.write_str("token"),
			AssetType::Unique => f.write_str("unique"),
		}
	}
}

/// Errors raised while reading or writing protocol scripts
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HeaderError {
	#[error("script truncated: need {needed} bytes, have {available}")]
	Truncated { needed: usize, available: usize },

	#[error("protocol flag mismatch")]
	MissingProtocolFlag,

	#[error("unsupported asset type tag {0}")]
	UnsupportedType(u32),

	#[error("script is a {actual} script, expected {expected}")]
	WrongAssetType {
		expected: AssetType,
		actual: AssetType,
	},

	#[error("declared payload length overflows")]
	LengthOverflow,

	#[error("{field} must be {expected} bytes, got {actual}")]
	InvalidLength {
		field: &'static str,
		expected: usize,
		actual: usize,
	},

	#[error("invalid hex: {0}")]
	InvalidHex(#[from] hex::FromHexError),
}

macro_rules! fixed_bytes_id {
	($(#[$meta:meta])* $name:ident, $len:expr) => {
		$(#[$meta])*
		#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
		pub struct $name(pub [u8; $len]);

		impl $name {
			pub const LEN: usize = $len;
			/// All-zero sentinel used by genesis outputs
			pub const ZERO: Self = Self([0u8; $len]);

			pub fn from_slice(bytes: &[u8]) -> Result<Self, HeaderError> {
				let array: [u8; $len] =
					bytes.try_into().map_err(|_| HeaderError::InvalidLength {
						field: stringify!($name),
						expected: $len,
						actual: bytes.len(),
					})?;
				Ok(Self(array))
			}

			pub fn as_bytes(&self) -> &[u8; $len] {
				&self.0
			}

			pub fn is_zero(&self) -> bool {
				self.0.iter().all(|b| *b == 0)
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				f.write_str(&hex::encode(self.0))
			}
		}

		impl fmt::Debug for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}({})", stringify!($name), hex::encode(self.0))
			}
		}

		impl FromStr for $name {
			type Err = HeaderError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				let bytes = hex::decode(s)?;
				Self::from_slice(&bytes)
			}
		}

		impl Serialize for $name {
			fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
				serializer.collect_str(self)
			}
		}

		impl<'de> Deserialize<'de> for $name {
			fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
				let s = String::deserialize(deserializer)?;
				s.parse().map_err(serde::de::Error::custom)
			}
		}
	};
}

fixed_bytes_id!(
	/// Token identity: HASH160 of the genesis output script
	TokenId,
	20
);

fixed_bytes_id!(
	/// Public key hash owning a token output
	Address,
	20
);

fixed_bytes_id!(
	/// Unique asset identity: genesis txid followed by the big-endian output index
	UniqueId,
	36
);
