//! In-memory existence set of live protocol UTXOs.
//!
//! Storage stays authoritative; the cache only lets the oracle skip the storage round trip for
//! inputs that cannot be protocol outputs. Every insert or delete the oracle performs against
//! storage is mirrored here.

use bitcoin::OutPoint;
use dashmap::DashSet;
use tracing::info;

use crate::store::{StoreError, UtxoRepository};

#[derive(Debug, Default)]
pub struct UtxoCache {
	outpoints: DashSet<OutPoint>,
}

impl UtxoCache {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns false when the outpoint was already cached
	pub fn add(&self, outpoint: OutPoint) -> bool {
		self.outpoints.insert(outpoint)
	}

	/// Returns false when the outpoint was not cached
	pub fn remove(&self, outpoint: &OutPoint) -> bool {
		self.outpoints.remove(outpoint).is_some()
	}

	pub fn contains(&self, outpoint: &OutPoint) -> bool {
		self.outpoints.contains(outpoint)
	}

	pub fn clear(&self) {
		self.outpoints.clear();
	}

	pub fn len(&self) -> usize {
		self.outpoints.len()
	}

	pub fn is_empty(&self) -> bool {
		self.outpoints.is_empty()
	}

	/// Replace the cache contents with the outpoints currently held by storage
	pub async fn rebuild(&self, utxos: &dyn UtxoRepository) -> Result<usize, StoreError> {
		let outpoints = utxos.outpoints().await?;
		self.clear();
		for outpoint in outpoints {
			self.add(outpoint);
		}
		info!("Rebuilt UTXO cache with {} entries", self.len());
		Ok(self.len())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::MemoryUtxoRepository;
	use crate::test_utils::{sample_token_record, txid_from_byte};
	use std::sync::Arc;

	#[test]
	fn add_remove_contains() {
		let cache = UtxoCache::new();
		let outpoint = OutPoint::new(txid_from_byte(1), 0);

		assert!(!cache.contains(&outpoint));
		assert!(cache.add(outpoint));
		assert!(!cache.add(outpoint));
		assert!(cache.contains(&outpoint));
		assert!(!cache.contains(&OutPoint::new(txid_from_byte(1), 1)));

		assert!(cache.remove(&outpoint));
		assert!(!cache.remove(&outpoint));
		assert!(cache.is_empty());
	}

	#[test]
	fn clear_empties_cache() {
		let cache = UtxoCache::new();
		for vout in 0..10 {
			cache.add(OutPoint::new(txid_from_byte(2), vout));
		}
		assert_eq!(cache.len(), 10);
		cache.clear();
		assert!(cache.is_empty());
	}

	#[tokio::test]
	async fn concurrent_mutation_loses_no_updates() {
		let cache = Arc::new(UtxoCache::new());
		let mut handles = Vec::new();
		for task in 0..8u8 {
			let cache = cache.clone();
			handles.push(tokio::spawn(async move {
				for vout in 0..100 {
					cache.add(OutPoint::new(txid_from_byte(task), vout));
				}
				for vout in 0..50 {
					assert!(cache.remove(&OutPoint::new(txid_from_byte(task), vout)));
				}
			}));
		}
		for handle in handles {
			handle.await.unwrap();
		}
		assert_eq!(cache.len(), 8 * 50);
	}

	#[tokio::test]
	async fn rebuild_mirrors_storage() {
		let store = MemoryUtxoRepository::new();
		let record = sample_token_record(txid_from_byte(3), 1, 50);
		let outpoint = record.outpoint();
		assert!(store.insert(record.into()).await.unwrap());

		let cache = UtxoCache::new();
		cache.add(OutPoint::new(txid_from_byte(9), 9));
		assert_eq!(cache.rebuild(&store).await.unwrap(), 1);
		assert!(cache.contains(&outpoint));
		assert!(!cache.contains(&OutPoint::new(txid_from_byte(9), 9)));
	}
}
