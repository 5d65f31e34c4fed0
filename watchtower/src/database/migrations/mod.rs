mod m0001_initial_version;

use anyhow::Context;
use rusqlite::{Connection, Transaction};

use m0001_initial_version::Migration0001;

pub struct MigrationContext {}

impl MigrationContext {

	pub fn new() -> Self {
		MigrationContext {}
	}

	/// Bring the schema up to date.
	pub fn do_all_migrations(&self, conn: &mut Connection) -> anyhow::Result<()> {
		let tx = conn.transaction().context("Failed to start transaction")?;
		self.init_migrations(&tx)?;
		tx.commit().context("Failed to commit transaction")?;

		self.try_migration(conn, &Migration0001{})?;
		Ok(())
	}

	/// Creates the migrations table if needed and returns the schema version.
	fn init_migrations(&self, conn: &Connection) -> anyhow::Result<i64> {
		conn.execute(
			"CREATE TABLE IF NOT EXISTS migrations (
				id INTEGER PRIMARY KEY AUTOINCREMENT,
				created_at DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
				value INTEGER NOT NULL
			)",
			(),
		).context("Failed to create migration table")?;

		match self.get_current_version(conn)? {
			Some(version) => Ok(version),
			None => {
				self.update_version(conn, 0)?;
				Ok(0)
			}
		}
	}

	fn try_migration(
		&self,
		conn: &mut Connection,
		migration: &impl Migration,
	) -> anyhow::Result<()> {
		let tx = conn.transaction().context("Failed to init transaction")?;

		let current_version = self.get_current_version(&tx)?.unwrap_or(0);
		let from_version = migration.from_version();

		if current_version == from_version {
			debug!("Performing migration {}", migration.summary());
			migration.do_migration(&tx)
				.with_context(|| format!("migration {} failed", migration.summary()))?;
			self.update_version(&tx, migration.to_version())?;
		} else if current_version < from_version {
			bail!("Failed to perform migration. Database is at {} for migration {}",
				current_version, migration.summary(),
			);
		} else {
			trace!("Skipping migration {}. Nothing to be done", migration.summary());
		}
		tx.commit().context("Failed to commit transaction")?;
		Ok(())
	}

	fn get_current_version(&self, conn: &Connection) -> anyhow::Result<Option<i64>> {
		let query = "SELECT value FROM migrations ORDER BY value DESC LIMIT 1";
		let mut statement = conn.prepare(query)?;
		let mut rows = statement.query(())?;
		match rows.next()? {
			Some(row) => Ok(Some(row.get(0)?)),
			None => Ok(None),
		}
	}

	fn update_version(&self, conn: &Connection, new_version: i64) -> anyhow::Result<i64> {
		conn.execute("INSERT INTO migrations (value) VALUES (?1)", [new_version])
			.context("Failed to update schema version")?;
		Ok(new_version)
	}
}

trait Migration {
	fn name(&self) -> &str;
	fn to_version(&self) -> i64;

	fn from_version(&self) -> i64 {
		self.to_version() - 1
	}

	fn do_migration(&self, conn: &Transaction) -> anyhow::Result<()>;

	fn summary(&self) -> String {
		format!("{}->{}:'{}'", self.from_version(), self.to_version(), self.name())
	}
}
