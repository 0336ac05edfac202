//! Transactions seen unconfirmed and the verdict the oracle gave them.

use bitcoin::Txid;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
	/// Claimed, validation still running
	Pending,
	Examined { accepted: bool },
}

#[derive(Debug, Default)]
pub struct UnconfirmedSet {
	entries: DashMap<Txid, Verdict>,
}

impl UnconfirmedSet {
	pub fn new() -> Self {
		Self::default()
	}

	/// Reserve `txid` for validation. False when it was already claimed or examined.
	pub fn claim(&self, txid: Txid) -> bool {
		match self.entries.entry(txid) {
			Entry::Occupied(_) => false,
			Entry::Vacant(slot) => {
				slot.insert(Verdict::Pending);
				true
			}
		}
	}

	pub fn record(&self, txid: Txid, accepted: bool) {
		self.entries.insert(txid, Verdict::Examined { accepted });
	}

	/// Release a claim whose validation did not complete
	pub fn release(&self, txid: &Txid) {
		self.entries
			.remove_if(txid, |_, verdict| *verdict == Verdict::Pending);
	}

	/// Remove `txid` at confirmation, returning its verdict. `None` when it was never claimed.
	pub fn take(&self, txid: &Txid) -> Option<Verdict> {
		self.entries.remove(txid).map(|(_, verdict)| verdict)
	}

	pub fn contains(&self, txid: &Txid) -> bool {
		self.entries.contains_key(txid)
	}

	pub fn clear(&self) {
		self.entries.clear();
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}
