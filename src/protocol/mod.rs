//! Script header protocol codec.
//!
//! Recognizes the metadata suffix appended to output scripts and exposes field accessors and
//! encoders for both asset variants.

/// Common trailer detection and tail-relative reads
pub mod header;
/// Fungible token layout
pub mod token;
/// Identifier newtypes and codec errors
mod types;
/// Unique asset layout
pub mod unique;

pub use header::{ScriptHeader, has_header, header_length, header_type, parse_header};
pub use types::*;

use bitcoin::hashes::{Hash, hash160, sha256};

/// RIPEMD160(SHA256(data))
pub fn hash160(data: &[u8]) -> [u8; 20] {
	hash160::Hash::hash(data).to_byte_array()
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
	sha256::Hash::hash(data).to_byte_array()
}
