
#[macro_use] extern crate anyhow;
#[macro_use] extern crate log;
#[macro_use] extern crate serde;
#[macro_use] extern crate watchtower_log;

pub mod appointment;
pub mod block_processor;
pub mod builder;
pub mod carrier;
pub mod chain_monitor;
pub mod cleaner;
pub mod config;
pub mod crypto;
pub mod database;
pub mod error;
pub mod index;
pub mod node;
pub mod responder;
pub mod serde_util;
pub mod system;
pub mod telemetry;
pub mod watcher;

#[cfg(test)]
mod test_util;

pub use crate::config::Config;

use std::fs;
use std::path::Path;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use bitcoin::BlockHash;
use bitcoin::secp256k1::{self, PublicKey, SecretKey};
use bitcoin_ext::BlockHeight;
use futures::Stream;

use crate::appointment::{Appointment, AppointmentId, AppointmentStatus, Tracker};
use crate::block_processor::BlockProcessor;
use crate::chain_monitor::ChainMonitor;
use crate::database::{KeyValueStore, SqliteStore, TowerDb};
use crate::error::ContextExt;
use crate::node::ChainSource;
use crate::responder::{Responder, ResponderState};
use crate::system::RuntimeManager;
use crate::telemetry::TelemetryMetrics;
use crate::watcher::{AddAppointmentOutcome, Watcher, WatcherState};

lazy_static::lazy_static! {
	/// Global secp context.
	static ref SECP: secp256k1::Secp256k1<secp256k1::All> = secp256k1::Secp256k1::new();
}

/// File in the data directory holding the tower's signing key.
pub const TOWER_KEY_FILE: &str = "tower.key";
/// File in the data directory holding the SQLite store.
pub const DB_FILE: &str = "watchtower.sqlite";

/// How far above the tip an appointment's `end_time` may be, about a year.
pub const MAX_APPOINTMENT_LIFETIME: BlockHeight = 52_560;

/// A stream of block hashes pushed by the node.
pub type BlockFeed = Pin<Box<dyn Stream<Item = BlockHash> + Send>>;

/// Everything the tower knows about an appointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum AppointmentInfo {
	BeingWatched {
		appointment: Appointment,
	},
	DisputeResponded {
		tracker: Tracker,
	},
}

/// Snapshot of both processes, for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveState {
	pub watcher: WatcherState,
	pub responder: ResponderState,
}

pub struct Tower {
	rtmgr: RuntimeManager,
	db: TowerDb,
	blocks: BlockProcessor,
	chain_monitor: ChainMonitor,
	watcher: Watcher,
	responder: Responder,
	public_key: PublicKey,
}

impl Tower {
	/// Initialize a new data directory.
	pub fn create(datadir: &Path, config: &Config) -> anyhow::Result<()> {
		info!("Creating watchtower at {}", datadir.display());
		trace!("Config: {:?}", config);

		// create dir if not exit, but check that it's empty
		fs::create_dir_all(&datadir).context("can't create dir")?;
		if fs::read_dir(&datadir).context("can't read dir")?.next().is_some() {
			bail!("dir is not empty");
		}

		let mut file = fs::File::create(datadir.join(config::CONFIG_FILE))
			.context("failed to create config file")?;
		config.write_into(&mut file)?;

		let key = SecretKey::new(&mut secp256k1::rand::thread_rng());
		fs::write(datadir.join(TOWER_KEY_FILE), key.display_secret().to_string())
			.context("failed to write tower key")?;
		info!("Created tower key with public key {}", key.public_key(&SECP));

		SqliteStore::open(datadir.join(DB_FILE)).context("failed to create db")?;
		Ok(())
	}

	pub fn load_tower_key(datadir: &Path) -> anyhow::Result<SecretKey> {
		let path = datadir.join(TOWER_KEY_FILE);
		let hex = fs::read_to_string(&path)
			.with_context(|| format!("failed to read tower key at {}", path.display()))?;
		SecretKey::from_str(hex.trim()).context("invalid tower key")
	}

	pub fn open_store(datadir: &Path) -> anyhow::Result<SqliteStore> {
		let path = datadir.join(DB_FILE);
		if !path.exists() {
			bail!("no database at {}, did you run create?", path.display());
		}
		SqliteStore::open(path)
	}

	/// Restore the state, spawn all tasks and start following the chain.
	///
	/// Blocks missed while offline are handed to the Watcher and the
	/// Responder before any new tip.
	pub async fn start(
		config: Config,
		node: Arc<dyn ChainSource>,
		store: Arc<dyn KeyValueStore>,
		tower_key: SecretKey,
		feed: Option<BlockFeed>,
	) -> anyhow::Result<Tower> {
		let public_key = tower_key.public_key(&SECP);
		let rtmgr = RuntimeManager::new();
		let telemetry = TelemetryMetrics::init(&config, public_key)
			.context("failed to initialize telemetry")?;

		let db = TowerDb::new(store, config.persistence.clone());
		let blocks = BlockProcessor::new(node.clone());
		let tip = blocks.get_best_block().context("failed to fetch tip from the node")?;

		let restored = builder::restore(&db, &blocks, tip).await
			.context("failed to restore tower state")?;
		let nb_appointments = restored.watcher.appointments.len();
		let nb_trackers = restored.responder.trackers.len();

		let responder = Responder::start(
			rtmgr.clone(),
			config.responder.clone(),
			db.clone(),
			blocks.clone(),
			telemetry.clone(),
			restored.responder,
		);
		let watcher = Watcher::start(
			rtmgr.clone(),
			config.watcher.clone(),
			db.clone(),
			blocks.clone(),
			responder.clone(),
			tower_key,
			telemetry,
			restored.watcher,
		);

		let chain_monitor = ChainMonitor::new(node, config.chain_monitor.clone())?;
		chain_monitor.attach("Watcher", watcher.block_queue(), watcher.awake_flag());
		chain_monitor.attach("Responder", responder.block_queue(), responder.awake_flag());
		chain_monitor.monitor_chain(rtmgr.clone(), feed);

		for hash in restored.replay.watcher {
			watcher.block_queue().send(hash).context("watcher down")?;
		}
		for hash in restored.replay.responder {
			responder.block_queue().send(hash).context("responder down")?;
		}
		chain_monitor.activate();

		slog!(TowerStarted, tip, appointments: nb_appointments, trackers: nb_trackers);
		Ok(Tower { rtmgr, db, blocks, chain_monitor, watcher, responder, public_key })
	}

	pub fn public_key(&self) -> PublicKey {
		self.public_key
	}

	pub fn runtime(&self) -> &RuntimeManager {
		&self.rtmgr
	}

	pub fn chain_monitor(&self) -> &ChainMonitor {
		&self.chain_monitor
	}

	pub async fn add_appointment(
		&self,
		appointment: Appointment,
	) -> anyhow::Result<AddAppointmentOutcome> {
		if appointment.encrypted_blob.is_empty() {
			return badarg!("encrypted_blob can't be empty");
		}
		let tip = self.blocks.get_best_block().context("failed to fetch tip from the node")?;
		if appointment.end_time <= tip.height {
			return badarg!("end_time {} is not after the current height {}",
				appointment.end_time, tip.height,
			);
		}
		if appointment.end_time > tip.height.saturating_add(MAX_APPOINTMENT_LIFETIME) {
			return badarg!("end_time {} is more than {} blocks after the current height {}",
				appointment.end_time, MAX_APPOINTMENT_LIFETIME, tip.height,
			);
		}
		self.watcher.add_appointment(appointment, tip).await
	}

	pub async fn get_appointment_status(
		&self,
		uuid: AppointmentId,
	) -> anyhow::Result<AppointmentStatus> {
		if self.watcher.is_watching(uuid).await? {
			Ok(AppointmentStatus::BeingWatched)
		} else if self.responder.get_tracker(uuid).await?.is_some() {
			Ok(AppointmentStatus::DisputeResponded)
		} else {
			Ok(AppointmentStatus::NotFound)
		}
	}

	pub async fn get_appointment(&self, uuid: AppointmentId) -> anyhow::Result<AppointmentInfo> {
		if self.watcher.is_watching(uuid).await? {
			if let Some(appointment) = self.db.load_appointment(&uuid)? {
				return Ok(AppointmentInfo::BeingWatched { appointment });
			}
		}
		let tracker = self.responder.get_tracker(uuid).await?
			.not_found([uuid], "unknown appointment")?;
		Ok(AppointmentInfo::DisputeResponded { tracker })
	}

	pub async fn get_all_live_state(&self) -> anyhow::Result<LiveState> {
		Ok(LiveState {
			watcher: self.watcher.live_state().await?,
			responder: self.responder.live_state().await?,
		})
	}

	/// Wait until both processes handled all blocks queued so far.
	pub async fn sync(&self) -> anyhow::Result<()> {
		self.watcher.sync().await?;
		self.responder.sync().await?;
		Ok(())
	}

	pub async fn shutdown(&self) {
		info!("Shutting down watchtower...");
		self.rtmgr.shutdown_wait().await;
		slog!(TowerTerminated);
	}
}
