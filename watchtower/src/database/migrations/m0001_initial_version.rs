use rusqlite::Transaction;

use super::Migration;

pub struct Migration0001 {}

impl Migration for Migration0001 {

	fn name(&self) -> &str {
		"Create key-value table"
	}

	fn to_version(&self) -> i64 { 1 }

	fn do_migration(&self, conn: &Transaction) -> anyhow::Result<()> {
		let query = "CREATE TABLE IF NOT EXISTS watchtower_kv (
			key TEXT NOT NULL PRIMARY KEY,
			value BLOB NOT NULL,
			updated_at DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
		);";
		conn.execute(query, ())?;
		Ok(())
	}
}
