//! A map with a secondary key, shared by the Watcher and the Responder.

use std::collections::{HashMap, HashSet};
use std::collections::hash_map::Entry;
use std::hash::Hash;

use bitcoin::Txid;

use crate::appointment::{AppointmentId, AppointmentSummary, Locator, Tracker};


/// A record that can be looked up by a secondary key.
pub trait Record {
	type Secondary: Clone + Eq + Hash;

	fn secondary_key(&self) -> Self::Secondary;
}

impl Record for AppointmentSummary {
	type Secondary = Locator;

	fn secondary_key(&self) -> Locator {
		self.locator
	}
}

impl Record for Tracker {
	type Secondary = Txid;

	fn secondary_key(&self) -> Txid {
		self.penalty_txid
	}
}

/// Records by primary key, plus the set of primary keys per secondary key.
///
/// Every primary key appears in exactly one secondary bucket, that of its
/// record, and there are no empty buckets.
#[derive(Debug, Clone)]
pub struct TwoLevelIndex<K, V: Record> {
	records: HashMap<K, V>,
	by_secondary: HashMap<V::Secondary, HashSet<K>>,
}

impl<K: Copy + Eq + Hash, V: Record> Default for TwoLevelIndex<K, V> {
	fn default() -> Self {
		TwoLevelIndex {
			records: HashMap::new(),
			by_secondary: HashMap::new(),
		}
	}
}

impl<K: Copy + Eq + Hash, V: Record> TwoLevelIndex<K, V> {
	pub fn new() -> Self {
		Self::default()
	}

	/// Insert a record, replacing any record with the same primary key.
	pub fn insert(&mut self, key: K, record: V) {
		let secondary = record.secondary_key();
		if let Some(old) = self.records.insert(key, record) {
			self.unlink(&key, &old.secondary_key());
		}
		self.by_secondary.entry(secondary).or_default().insert(key);
	}

	/// Remove a record, pruning its secondary bucket if it becomes empty.
	///
	/// Removing an absent key is a no-op.
	pub fn remove(&mut self, key: &K) -> Option<V> {
		let record = self.records.remove(key)?;
		self.unlink(key, &record.secondary_key());
		Some(record)
	}

	fn unlink(&mut self, key: &K, secondary: &V::Secondary) {
		if let Entry::Occupied(mut e) = self.by_secondary.entry(secondary.clone()) {
			e.get_mut().remove(key);
			if e.get().is_empty() {
				e.remove();
			}
		}
	}

	pub fn get(&self, key: &K) -> Option<&V> {
		self.records.get(key)
	}

	pub fn contains_key(&self, key: &K) -> bool {
		self.records.contains_key(key)
	}

	/// All primary keys whose record has the given secondary key.
	pub fn keys_for(&self, secondary: &V::Secondary) -> impl Iterator<Item = &K> + '_ {
		self.by_secondary.get(secondary).into_iter().flat_map(|s| s.iter())
	}

	pub fn contains_secondary(&self, secondary: &V::Secondary) -> bool {
		self.by_secondary.contains_key(secondary)
	}

	pub fn secondary_keys(&self) -> impl Iterator<Item = &V::Secondary> + '_ {
		self.by_secondary.keys()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
		self.records.iter()
	}

	pub fn len(&self) -> usize {
		self.records.len()
	}

	pub fn is_empty(&self) -> bool {
		self.records.is_empty()
	}

	/// Check that both levels describe the same mapping.
	pub fn is_consistent(&self) -> bool {
		let linked = self.by_secondary.values().map(|s| s.len()).sum::<usize>();
		if linked != self.records.len() {
			return false;
		}
		self.by_secondary.iter().all(|(secondary, keys)| {
			!keys.is_empty() && keys.iter().all(|k| {
				self.records.get(k).map(|r| r.secondary_key() == *secondary).unwrap_or(false)
			})
		})
	}
}

/// The Watcher's in-memory index.
pub type AppointmentIndex = TwoLevelIndex<AppointmentId, AppointmentSummary>;

/// The Responder's in-memory index.
pub type TrackerIndex = TwoLevelIndex<AppointmentId, Tracker>;
