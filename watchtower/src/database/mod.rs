//! Persistence of the tower state.
//!
//! The store is the source of truth. Every change is written here before
//! the in-memory state is touched, and a write that keeps failing is
//! escalated to the caller instead of being skipped.

mod memory;
mod migrations;
mod sqlite;

pub use self::memory::MemoryStore;
pub use self::sqlite::SqliteStore;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bitcoin::{BlockHash, Txid};

use crate::appointment::{Appointment, AppointmentId, Locator, Tracker};


/// Key prefix of appointments.
const APPOINTMENT_PREFIX: &str = "w:";
/// Key prefix of trackers.
const TRACKER_PREFIX: &str = "r:";
/// Key prefix of the locator to appointment index.
const LOCATOR_INDEX_PREFIX: &str = "m:";
/// Key prefix of the penalty txid to tracker index.
const PENALTY_INDEX_PREFIX: &str = "t:";
/// Key prefix of trackers flagged for manual review.
const FLAG_PREFIX: &str = "f:";

const WATCHER_LAST_BLOCK_KEY: &str = "bw";
const RESPONDER_LAST_BLOCK_KEY: &str = "br";


/// A plain key-value store.
pub trait KeyValueStore: Send + Sync + 'static {
	fn put(&self, key: &str, value: &[u8]) -> anyhow::Result<()>;
	fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
	/// Deleting an absent key is not an error.
	fn delete(&self, key: &str) -> anyhow::Result<()>;
	/// All pairs whose key starts with the prefix, ordered by key.
	fn iterate(&self, prefix: &str) -> anyhow::Result<Vec<(String, Vec<u8>)>>;
	/// Apply all operations of the batch atomically.
	fn write_batch(&self, batch: WriteBatch) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
	Put(String, Vec<u8>),
	Delete(String),
}

/// A list of writes to be applied atomically.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
	ops: Vec<BatchOp>,
}

impl WriteBatch {
	pub fn new() -> WriteBatch {
		WriteBatch::default()
	}

	pub fn put(&mut self, key: impl Into<String>, value: Vec<u8>) {
		self.ops.push(BatchOp::Put(key.into(), value));
	}

	pub fn delete(&mut self, key: impl Into<String>) {
		self.ops.push(BatchOp::Delete(key.into()));
	}

	pub fn len(&self) -> usize {
		self.ops.len()
	}

	pub fn is_empty(&self) -> bool {
		self.ops.is_empty()
	}

	pub fn into_ops(self) -> Vec<BatchOp> {
		self.ops
	}
}

/// The two block-processing components, each with their own last known block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
	Watcher,
	Responder,
}

impl Component {
	pub fn as_str(&self) -> &'static str {
		match self {
			Component::Watcher => "watcher",
			Component::Responder => "responder",
		}
	}

	fn last_block_key(&self) -> &'static str {
		match self {
			Component::Watcher => WATCHER_LAST_BLOCK_KEY,
			Component::Responder => RESPONDER_LAST_BLOCK_KEY,
		}
	}
}

impl fmt::Display for Component {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
	/// Number of times a write is tried before giving up.
	pub write_attempts: usize,
	/// Delay before the first retry, doubled on every next one.
	#[serde(with = "crate::serde_util::duration")]
	pub write_backoff: Duration,
}

impl Default for Config {
	fn default() -> Config {
		Config {
			write_attempts: 3,
			write_backoff: Duration::from_millis(100),
		}
	}
}

/// Everything the store holds, for inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedState {
	pub appointments: HashMap<AppointmentId, Appointment>,
	pub trackers: HashMap<AppointmentId, Tracker>,
	#[serde(default)]
	pub flagged: HashSet<AppointmentId>,
	pub watcher_last_block: Option<BlockHash>,
	pub responder_last_block: Option<BlockHash>,
}

fn appointment_key(id: &AppointmentId) -> String {
	format!("{}{}", APPOINTMENT_PREFIX, id)
}

fn tracker_key(id: &AppointmentId) -> String {
	format!("{}{}", TRACKER_PREFIX, id)
}

fn locator_index_key(locator: &Locator, id: &AppointmentId) -> String {
	format!("{}{}:{}", LOCATOR_INDEX_PREFIX, locator, id)
}

fn penalty_index_key(txid: &Txid, id: &AppointmentId) -> String {
	format!("{}{}:{}", PENALTY_INDEX_PREFIX, txid, id)
}

fn flag_key(id: &AppointmentId) -> String {
	format!("{}{}", FLAG_PREFIX, id)
}

/// Parse the id at the end of a key.
fn id_from_key(key: &str) -> anyhow::Result<AppointmentId> {
	let id = key.rsplit(':').next().unwrap_or(key);
	id.parse().with_context(|| format!("invalid id in store key {}", key))
}

/// Typed access to the tower's state in a [KeyValueStore].
#[derive(Clone)]
pub struct TowerDb {
	store: Arc<dyn KeyValueStore>,
	config: Config,
}

impl TowerDb {
	pub fn new(store: Arc<dyn KeyValueStore>, config: Config) -> TowerDb {
		TowerDb { store, config }
	}

	/// Write the batch, retrying with backoff.
	///
	/// Returns an error only once all attempts failed.
	async fn write(&self, batch: WriteBatch) -> anyhow::Result<()> {
		let attempts = self.config.write_attempts.max(1);
		let mut backoff = self.config.write_backoff;
		let mut attempt = 1;
		loop {
			match self.store.write_batch(batch.clone()) {
				Ok(()) => return Ok(()),
				Err(e) if attempt < attempts => {
					slog!(StoreWriteRetry, attempt, error: format!("{:#}", e));
					tokio::time::sleep(backoff).await;
					backoff *= 2;
					attempt += 1;
				},
				Err(e) => {
					slog!(StoreWriteFailed, attempts, error: format!("{:#}", e));
					return Err(e.context(format!("store write failed after {} attempts", attempts)));
				},
			}
		}
	}

	pub async fn store_appointment(
		&self,
		id: AppointmentId,
		appointment: &Appointment,
	) -> anyhow::Result<()> {
		let mut batch = WriteBatch::new();
		batch.put(appointment_key(&id), serde_json::to_vec(appointment)?);
		batch.put(locator_index_key(&appointment.locator, &id), Vec::new());
		self.write(batch).await
	}

	pub async fn store_tracker(&self, id: AppointmentId, tracker: &Tracker) -> anyhow::Result<()> {
		let mut batch = WriteBatch::new();
		batch.put(tracker_key(&id), serde_json::to_vec(tracker)?);
		batch.put(penalty_index_key(&tracker.penalty_txid, &id), Vec::new());
		self.write(batch).await
	}

	/// Delete appointments and their index entries in one batch.
	pub async fn delete_appointments(
		&self,
		items: impl IntoIterator<Item = (AppointmentId, Locator)>,
	) -> anyhow::Result<()> {
		let mut batch = WriteBatch::new();
		for (id, locator) in items {
			batch.delete(appointment_key(&id));
			batch.delete(locator_index_key(&locator, &id));
		}
		if batch.is_empty() {
			return Ok(());
		}
		self.write(batch).await
	}

	/// Delete trackers, their index entries and flags in one batch.
	pub async fn delete_trackers(
		&self,
		items: impl IntoIterator<Item = (AppointmentId, Txid)>,
	) -> anyhow::Result<()> {
		let mut batch = WriteBatch::new();
		for (id, penalty_txid) in items {
			batch.delete(tracker_key(&id));
			batch.delete(penalty_index_key(&penalty_txid, &id));
			batch.delete(flag_key(&id));
		}
		if batch.is_empty() {
			return Ok(());
		}
		self.write(batch).await
	}

	/// Flag and unflag trackers in one batch.
	pub async fn update_flags(
		&self,
		flagged: impl IntoIterator<Item = AppointmentId>,
		cleared: impl IntoIterator<Item = AppointmentId>,
	) -> anyhow::Result<()> {
		let mut batch = WriteBatch::new();
		for id in flagged {
			batch.put(flag_key(&id), Vec::new());
		}
		for id in cleared {
			batch.delete(flag_key(&id));
		}
		if batch.is_empty() {
			return Ok(());
		}
		self.write(batch).await
	}

	pub fn load_flags(&self) -> anyhow::Result<HashSet<AppointmentId>> {
		self.store.iterate(FLAG_PREFIX)?.into_iter().map(|(key, _)| id_from_key(&key)).collect()
	}

	pub async fn store_last_block(&self, component: Component, hash: BlockHash) -> anyhow::Result<()> {
		let mut batch = WriteBatch::new();
		batch.put(component.last_block_key(), serde_json::to_vec(&hash)?);
		self.write(batch).await
	}

	pub fn load_last_block(&self, component: Component) -> anyhow::Result<Option<BlockHash>> {
		match self.store.get(component.last_block_key())? {
			Some(raw) => Ok(Some(serde_json::from_slice(&raw)
				.with_context(|| format!("corrupt last block of {}", component))?)),
			None => Ok(None),
		}
	}

	pub fn load_appointment(&self, id: &AppointmentId) -> anyhow::Result<Option<Appointment>> {
		match self.store.get(&appointment_key(id))? {
			Some(raw) => Ok(Some(serde_json::from_slice(&raw)
				.with_context(|| format!("corrupt appointment {}", id))?)),
			None => Ok(None),
		}
	}

	pub fn load_appointments(&self) -> anyhow::Result<HashMap<AppointmentId, Appointment>> {
		self.store.iterate(APPOINTMENT_PREFIX)?.into_iter().map(|(key, raw)| {
			let appointment = serde_json::from_slice(&raw)
				.with_context(|| format!("corrupt appointment at {}", key))?;
			Ok((id_from_key(&key)?, appointment))
		}).collect()
	}

	pub fn load_tracker(&self, id: &AppointmentId) -> anyhow::Result<Option<Tracker>> {
		match self.store.get(&tracker_key(id))? {
			Some(raw) => Ok(Some(serde_json::from_slice(&raw)
				.with_context(|| format!("corrupt tracker {}", id))?)),
			None => Ok(None),
		}
	}

	pub fn load_trackers(&self) -> anyhow::Result<HashMap<AppointmentId, Tracker>> {
		self.store.iterate(TRACKER_PREFIX)?.into_iter().map(|(key, raw)| {
			let tracker = serde_json::from_slice(&raw)
				.with_context(|| format!("corrupt tracker at {}", key))?;
			Ok((id_from_key(&key)?, tracker))
		}).collect()
	}

	/// Ids of the stored appointments with the given locator.
	pub fn appointment_ids_for_locator(&self, locator: &Locator) -> anyhow::Result<Vec<AppointmentId>> {
		let prefix = format!("{}{}:", LOCATOR_INDEX_PREFIX, locator);
		self.store.iterate(&prefix)?.into_iter().map(|(key, _)| id_from_key(&key)).collect()
	}

	/// Ids of the stored trackers for the given penalty.
	pub fn tracker_ids_for_penalty(&self, penalty_txid: &Txid) -> anyhow::Result<Vec<AppointmentId>> {
		let prefix = format!("{}{}:", PENALTY_INDEX_PREFIX, penalty_txid);
		self.store.iterate(&prefix)?.into_iter().map(|(key, _)| id_from_key(&key)).collect()
	}

	pub fn dump(&self) -> anyhow::Result<PersistedState> {
		Ok(PersistedState {
			appointments: self.load_appointments()?,
			trackers: self.load_trackers()?,
			flagged: self.load_flags()?,
			watcher_last_block: self.load_last_block(Component::Watcher)?,
			responder_last_block: self.load_last_block(Component::Responder)?,
		})
	}
}
