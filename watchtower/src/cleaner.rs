//! Removal of resolved appointments and trackers.
//!
//! The store is always updated first, in one batch. Memory is only touched
//! once that write succeeded. Ids that are not (or no longer) present are
//! skipped, so running a cleanup twice is harmless.

use std::collections::{HashMap, HashSet};

use bitcoin::Txid;

use crate::appointment::AppointmentId;
use crate::database::TowerDb;
use crate::index::{AppointmentIndex, TrackerIndex};


/// Delete appointments from the store and the Watcher's index.
///
/// Returns the number of appointments removed.
pub async fn delete_appointments<'a>(
	db: &TowerDb,
	appointments: &mut AppointmentIndex,
	ids: impl IntoIterator<Item = &'a AppointmentId>,
) -> anyhow::Result<usize> {
	let items = ids.into_iter()
		.filter_map(|id| appointments.get(id).map(|a| (*id, a.locator)))
		.collect::<Vec<_>>();
	if items.is_empty() {
		return Ok(0);
	}

	db.delete_appointments(items.iter().copied()).await?;
	for (id, _) in &items {
		appointments.remove(id);
	}
	Ok(items.len())
}

/// Delete trackers from the store and the Responder's index.
///
/// Penalty txids left without any tracker are dropped from the unconfirmed
/// set and their missed-confirmation counter is forgotten.
pub async fn delete_trackers<'a>(
	db: &TowerDb,
	trackers: &mut TrackerIndex,
	unconfirmed: &mut HashSet<Txid>,
	missed_confirmations: &mut HashMap<Txid, u32>,
	ids: impl IntoIterator<Item = &'a AppointmentId>,
) -> anyhow::Result<usize> {
	let items = ids.into_iter()
		.filter_map(|id| trackers.get(id).map(|t| (*id, t.penalty_txid)))
		.collect::<Vec<_>>();
	if items.is_empty() {
		return Ok(0);
	}

	db.delete_trackers(items.iter().copied()).await?;
	for (id, penalty_txid) in &items {
		trackers.remove(id);
		if !trackers.contains_secondary(penalty_txid) {
			unconfirmed.remove(penalty_txid);
			missed_confirmations.remove(penalty_txid);
		}
	}
	Ok(items.len())
}

#[cfg(test)]
mod test {
	use super::*;

	use std::sync::Arc;

	use crate::appointment::{Appointment, Locator, Tracker};
	use crate::database::{self, MemoryStore};
	use crate::test_util::{dummy_tx, random_txid};

	fn db() -> (Arc<MemoryStore>, TowerDb) {
		let store = Arc::new(MemoryStore::new());
		(store.clone(), TowerDb::new(store, database::Config::default()))
	}

	#[tokio::test]
	async fn cleanup_is_idempotent() {
		let (_, db) = db();
		let mut index = AppointmentIndex::new();

		let locator = Locator::from_txid(&random_txid());
		let ids = (0..3).map(|_| AppointmentId::new_v4()).collect::<Vec<_>>();
		for id in &ids {
			let appointment = Appointment { locator, end_time: 120, encrypted_blob: vec![1, 2, 3] };
			db.store_appointment(*id, &appointment).await.unwrap();
			index.insert(*id, appointment.summary());
		}

		assert_eq!(delete_appointments(&db, &mut index, &ids[0..2]).await.unwrap(), 2);
		assert_eq!(index.len(), 1);
		assert!(index.is_consistent());
		assert!(db.load_appointment(&ids[0]).unwrap().is_none());
		assert_eq!(db.appointment_ids_for_locator(&locator).unwrap(), vec![ids[2]]);

		// second run on the same ids does nothing
		assert_eq!(delete_appointments(&db, &mut index, &ids[0..2]).await.unwrap(), 0);
		assert_eq!(index.len(), 1);

		delete_appointments(&db, &mut index, &ids[2..]).await.unwrap();
		assert!(index.is_empty());
		assert!(!index.contains_secondary(&locator));
		assert!(db.load_appointments().unwrap().is_empty());
	}

	#[tokio::test]
	async fn tracker_cleanup_drops_orphaned_penalties() {
		let (_, db) = db();
		let mut trackers = TrackerIndex::new();
		let mut unconfirmed = HashSet::new();
		let mut missed = HashMap::new();

		let dispute = random_txid();
		let penalty = dummy_tx(7);
		let penalty_txid = penalty.compute_txid();
		let (a, b) = (AppointmentId::new_v4(), AppointmentId::new_v4());
		for id in [a, b] {
			let tracker = Tracker::new(Locator::from_txid(&dispute), dispute, penalty.clone(), 110);
			db.store_tracker(id, &tracker).await.unwrap();
			trackers.insert(id, tracker);
		}
		unconfirmed.insert(penalty_txid);
		missed.insert(penalty_txid, 3);

		delete_trackers(&db, &mut trackers, &mut unconfirmed, &mut missed, &[a]).await.unwrap();
		assert!(unconfirmed.contains(&penalty_txid), "b still needs the penalty");
		assert_eq!(missed.get(&penalty_txid), Some(&3));

		delete_trackers(&db, &mut trackers, &mut unconfirmed, &mut missed, &[a, b]).await.unwrap();
		assert!(trackers.is_empty());
		assert!(unconfirmed.is_empty());
		assert!(missed.is_empty());
		assert!(db.tracker_ids_for_penalty(&penalty_txid).unwrap().is_empty());
	}

	#[tokio::test]
	async fn failed_write_leaves_memory_untouched() {
		let store = Arc::new(MemoryStore::new());
		let cfg = database::Config { write_attempts: 2, write_backoff: std::time::Duration::from_millis(1) };
		let db = TowerDb::new(store.clone(), cfg);
		let mut index = AppointmentIndex::new();

		let id = AppointmentId::new_v4();
		let appointment = Appointment {
			locator: Locator::from_txid(&random_txid()),
			end_time: 120,
			encrypted_blob: vec![0xaa],
		};
		db.store_appointment(id, &appointment).await.unwrap();
		index.insert(id, appointment.summary());

		store.fail_next_writes(2);
		assert!(delete_appointments(&db, &mut index, &[id]).await.is_err());
		assert!(index.contains_key(&id));
		assert!(db.load_appointment(&id).unwrap().is_some());
	}
}
