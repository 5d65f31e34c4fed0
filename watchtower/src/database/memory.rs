
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{BatchOp, KeyValueStore, WriteBatch};


/// A [KeyValueStore] that lives in memory, for tests and ephemeral towers.
#[derive(Debug, Default)]
pub struct MemoryStore {
	data: Mutex<BTreeMap<String, Vec<u8>>>,
	/// Number of upcoming writes that should fail.
	failing_writes: AtomicUsize,
}

impl MemoryStore {
	pub fn new() -> MemoryStore {
		MemoryStore::default()
	}

	/// Make the next `n` write calls fail.
	pub fn fail_next_writes(&self, n: usize) {
		self.failing_writes.store(n, Ordering::SeqCst);
	}

	fn check_write(&self) -> anyhow::Result<()> {
		let res = self.failing_writes.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
			n.checked_sub(1)
		});
		match res {
			Ok(_) => bail!("simulated write failure"),
			Err(_) => Ok(()),
		}
	}

	fn data(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
		// a panic while holding the lock can't leave the map half-updated
		self.data.lock().unwrap_or_else(|e| e.into_inner())
	}
}

impl KeyValueStore for MemoryStore {
	fn put(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
		self.check_write()?;
		self.data().insert(key.to_owned(), value.to_vec());
		Ok(())
	}

	fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
		Ok(self.data().get(key).cloned())
	}

	fn delete(&self, key: &str) -> anyhow::Result<()> {
		self.check_write()?;
		self.data().remove(key);
		Ok(())
	}

	fn iterate(&self, prefix: &str) -> anyhow::Result<Vec<(String, Vec<u8>)>> {
		Ok(self.data()
			.range(prefix.to_owned()..)
			.take_while(|(k, _)| k.starts_with(prefix))
			.map(|(k, v)| (k.clone(), v.clone()))
			.collect())
	}

	fn write_batch(&self, batch: WriteBatch) -> anyhow::Result<()> {
		self.check_write()?;
		let mut data = self.data();
		for op in batch.into_ops() {
			match op {
				BatchOp::Put(key, value) => { data.insert(key, value); },
				BatchOp::Delete(key) => { data.remove(&key); },
			}
		}
		Ok(())
	}
}
