//! SQLite backend, a single key-value table.

use std::path::{Path, PathBuf};

use anyhow::Context;
use rusqlite::{named_params, Connection};

use super::{BatchOp, KeyValueStore, WriteBatch};
use super::migrations::MigrationContext;


/// A [KeyValueStore] in a SQLite database file.
///
/// Every call opens its own connection, so the store can be shared between tasks.
#[derive(Debug, Clone)]
pub struct SqliteStore {
	connection_string: PathBuf,
}

impl SqliteStore {
	/// Open the database at the given path, creating and migrating it if needed.
	pub fn open(db_file: impl AsRef<Path>) -> anyhow::Result<SqliteStore> {
		let path = db_file.as_ref().to_path_buf();

		debug!("Opening database at {}", path.display());
		let mut conn = Connection::open(&path)
			.with_context(|| format!("Error connecting to database {}", path.display()))?;

		MigrationContext::new().do_all_migrations(&mut conn)?;

		Ok(SqliteStore { connection_string: path })
	}

	fn connect(&self) -> anyhow::Result<Connection> {
		Connection::open(&self.connection_string)
			.with_context(|| format!("Error connecting to database {}", self.connection_string.display()))
	}
}

fn put(conn: &Connection, key: &str, value: &[u8]) -> anyhow::Result<()> {
	let query = "
		INSERT INTO watchtower_kv (key, value) VALUES (:key, :value)
		ON CONFLICT (key) DO UPDATE SET
			value = :value,
			updated_at = strftime('%Y-%m-%d %H:%M:%f', 'now')";
	conn.execute(query, named_params! { ":key": key, ":value": value })?;
	Ok(())
}

fn delete(conn: &Connection, key: &str) -> anyhow::Result<()> {
	conn.execute("DELETE FROM watchtower_kv WHERE key = :key", named_params! { ":key": key })?;
	Ok(())
}

impl KeyValueStore for SqliteStore {
	fn put(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
		put(&self.connect()?, key, value)
	}

	fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
		let conn = self.connect()?;
		let mut statement = conn.prepare("SELECT value FROM watchtower_kv WHERE key = :key")?;
		let mut rows = statement.query(named_params! { ":key": key })?;
		match rows.next()? {
			Some(row) => Ok(Some(row.get(0)?)),
			None => Ok(None),
		}
	}

	fn delete(&self, key: &str) -> anyhow::Result<()> {
		delete(&self.connect()?, key)
	}

	fn iterate(&self, prefix: &str) -> anyhow::Result<Vec<(String, Vec<u8>)>> {
		let conn = self.connect()?;
		let query = "
			SELECT key, value FROM watchtower_kv
			WHERE substr(key, 1, :len) = :prefix
			ORDER BY key";
		let mut statement = conn.prepare(query)?;
		let rows = statement.query_map(
			named_params! { ":len": prefix.len() as i64, ":prefix": prefix },
			|row| Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?)),
		)?;
		Ok(rows.collect::<Result<Vec<_>, _>>()?)
	}

	fn write_batch(&self, batch: WriteBatch) -> anyhow::Result<()> {
		let mut conn = self.connect()?;
		let tx = conn.transaction()?;
		for op in batch.into_ops() {
			match op {
				BatchOp::Put(key, value) => put(&tx, &key, &value)?,
				BatchOp::Delete(key) => delete(&tx, &key)?,
			}
		}
		tx.commit().context("failed to commit batch")?;
		Ok(())
	}
}
