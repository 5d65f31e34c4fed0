//! The Watcher holds the appointments and looks for their disputes in every
//! new block.
//!
//! A matched appointment has its blob decrypted with the dispute txid. A valid
//! penalty is handed to the [Responder], an invalid one is dropped. Either
//! way the appointment is done and gets removed, just like appointments that
//! expire without a match.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use bitcoin::{BlockHash, Transaction, Txid};
use bitcoin::hashes::sha256;
use bitcoin::secp256k1::SecretKey;
use bitcoin::sign_message::MessageSignature;
use bitcoin_ext::{BlockHeight, BlockRef};
use tokio::sync::{mpsc, oneshot};

use crate::appointment::{Appointment, AppointmentId, AppointmentSummary};
use crate::block_processor::BlockProcessor;
use crate::cleaner;
use crate::crypto::{self, DecryptionError};
use crate::database::{Component, TowerDb};
use crate::index::AppointmentIndex;
use crate::node::BlockData;
use crate::responder::{Breach, Responder};
use crate::system::RuntimeManager;
use crate::telemetry::TelemetryMetrics;


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
	/// Maximum number of appointments watched at the same time.
	pub max_appointments: usize,
	/// Blocks an appointment is kept after its `end_time`, in case the
	/// dispute confirms a little late.
	pub expiry_delta: BlockHeight,
}

impl Default for Config {
	fn default() -> Config {
		Config {
			max_appointments: 1_000_000,
			expiry_delta: 6,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
	MaxAppointmentsReached,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddAppointmentOutcome {
	Accepted {
		uuid: AppointmentId,
		/// Height of the tip when the appointment was accepted.
		start_block: BlockHeight,
		/// The tower's signature over the appointment.
		signature: MessageSignature,
	},
	Rejected(RejectReason),
}

/// State restored from the store at startup.
#[derive(Debug, Default)]
pub struct InitialState {
	pub appointments: AppointmentIndex,
	pub last_known_block: Option<BlockRef>,
}

/// Snapshot of the Watcher for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherState {
	pub appointments: HashMap<AppointmentId, AppointmentSummary>,
	pub last_known_block: Option<BlockRef>,
	pub awake: bool,
}

/// Decrypted penalties of a single block.
///
/// Appointments often share a blob, which only needs decrypting once per
/// dispute.
#[derive(Default)]
struct DecryptionCache {
	results: HashMap<(Txid, sha256::Hash), Result<Transaction, DecryptionError>>,
	misses: usize,
}

impl DecryptionCache {
	fn decrypt(&mut self, blob: &[u8], dispute_txid: &Txid) -> &Result<Transaction, DecryptionError> {
		let misses = &mut self.misses;
		self.results.entry((*dispute_txid, crypto::blob_digest(blob))).or_insert_with(|| {
			*misses += 1;
			crypto::decrypt(blob, dispute_txid)
		})
	}
}

struct Process {
	config: Config,
	db: TowerDb,
	blocks: BlockProcessor,
	responder: Responder,
	tower_key: SecretKey,
	telemetry: TelemetryMetrics,

	appointments: AppointmentIndex,
	last_known_block: Option<BlockRef>,
	awake: Arc<AtomicBool>,
}

impl Process {
	fn is_awake(&self) -> bool {
		self.awake.load(Ordering::SeqCst)
	}

	async fn wake_up(&mut self, tip: BlockRef) -> anyhow::Result<()> {
		self.db.store_last_block(Component::Watcher, tip.hash).await?;
		self.last_known_block = Some(tip);
		self.awake.store(true, Ordering::SeqCst);
		slog!(WatcherAwake, last_known_block: tip);
		Ok(())
	}

	fn go_asleep(&mut self) {
		self.awake.store(false, Ordering::SeqCst);
		slog!(WatcherAsleep);
	}

	async fn add_appointment(
		&mut self,
		appointment: Appointment,
		tip: BlockRef,
	) -> anyhow::Result<AddAppointmentOutcome> {
		if self.appointments.len() >= self.config.max_appointments {
			slog!(AppointmentRejected,
				locator: appointment.locator.to_string(),
				max_appointments: self.config.max_appointments,
			);
			return Ok(AddAppointmentOutcome::Rejected(RejectReason::MaxAppointmentsReached));
		}

		let uuid = AppointmentId::new_v4();
		self.db.store_appointment(uuid, &appointment).await
			.context("failed to persist appointment")?;
		self.appointments.insert(uuid, appointment.summary());
		if !self.is_awake() {
			self.wake_up(tip).await?;
		}
		self.telemetry.set_appointments(self.appointments.len());

		let signature = crypto::sign_appointment(&appointment, &self.tower_key);
		slog!(AppointmentAccepted,
			uuid,
			locator: appointment.locator.to_string(),
			end_time: appointment.end_time,
			start_block: tip.height,
		);
		Ok(AddAppointmentOutcome::Accepted { uuid, start_block: tip.height, signature })
	}

	async fn process_block(&mut self, block: &BlockData) -> anyhow::Result<()> {
		let height = block.height();

		let expired = self.appointments.iter()
			.filter(|(_, a)| a.end_time.saturating_add(self.config.expiry_delta) < height)
			.map(|(id, _)| *id)
			.collect::<HashSet<_>>();
		if !expired.is_empty() {
			slog!(AppointmentsExpired, count: expired.len(), height);
		}

		// expired appointments are not matched anymore
		let mut resolved = expired;
		let mut breaches = Vec::new();
		let mut decrypted = DecryptionCache::default();
		for (locator, dispute_txid) in self.blocks.get_potential_matches(&block.txids, &self.appointments) {
			let ids = self.appointments.keys_for(&locator)
				.filter(|id| !resolved.contains(*id))
				.copied()
				.collect::<Vec<_>>();
			for uuid in ids {
				resolved.insert(uuid);
				let appointment = match self.db.load_appointment(&uuid)? {
					Some(a) => a,
					None => {
						warn!("Appointment {} is missing from the store, dropping it", uuid);
						continue;
					},
				};

				match decrypted.decrypt(&appointment.encrypted_blob, &dispute_txid) {
					Ok(penalty_tx) => {
						slog!(BreachDetected, uuid, locator: locator.to_string(), dispute_txid);
						breaches.push(Breach {
							uuid,
							locator,
							dispute_txid,
							penalty_txid: penalty_tx.compute_txid(),
							penalty_tx: penalty_tx.clone(),
							appointment_end: appointment.end_time,
							chain_tip: block.block_ref,
						});
					},
					Err(e) => {
						slog!(InvalidPenaltyBlob, uuid, dispute_txid, error: e.to_string());
					},
				}
			}
		}

		let nb_breaches = breaches.len();
		self.telemetry.add_breaches(nb_breaches);
		for breach in breaches {
			let uuid = breach.uuid;
			let receipt = self.responder.handle_breach(breach).await
				.context("failed to hand breach to the responder")?;
			trace!("Breach of appointment {} handled: {}", uuid, receipt);
		}

		let removed = cleaner::delete_appointments(&self.db, &mut self.appointments, &resolved).await
			.context("failed to delete resolved appointments")?;

		self.db.store_last_block(Component::Watcher, block.hash()).await?;
		self.last_known_block = Some(block.block_ref);

		self.telemetry.set_block_height(Component::Watcher.as_str(), height);
		self.telemetry.set_appointments(self.appointments.len());
		slog!(WatcherProcessedBlock,
			block: block.block_ref,
			breaches: nb_breaches,
			removed,
			remaining: self.appointments.len(),
		);

		if self.appointments.is_empty() {
			self.go_asleep();
		}
		Ok(())
	}

	/// Process every block up to the given tip that we haven't seen yet.
	///
	/// Long gaps are processed batch by batch.
	async fn process_tip(&mut self, tip: BlockHash) -> anyhow::Result<()> {
		loop {
			let last = match self.last_known_block {
				Some(b) => b,
				None => {
					warn!("Watcher is awake without a last known block, ignoring tip {}", tip);
					return Ok(());
				},
			};
			if last.hash == tip {
				return Ok(());
			}

			let blocks = match self.blocks.get_missed_blocks(&last.hash, &tip) {
				Ok(b) if b.is_empty() => return Ok(()),
				Ok(b) => b,
				Err(e) => {
					// retried with the next tip
					warn!("Watcher failed to fetch blocks up to {}: {}", tip, e);
					return Ok(());
				},
			};
			for block in blocks {
				self.process_block(&block).await?;
				if !self.is_awake() {
					return Ok(());
				}
			}
		}
	}

	async fn process_queued(
		&mut self,
		block_rx: &mut mpsc::UnboundedReceiver<BlockHash>,
	) -> anyhow::Result<()> {
		while let Ok(tip) = block_rx.try_recv() {
			if self.is_awake() {
				self.process_tip(tip).await?;
			}
		}
		Ok(())
	}

	fn live_state(&self) -> WatcherState {
		WatcherState {
			appointments: self.appointments.iter().map(|(id, a)| (*id, *a)).collect(),
			last_known_block: self.last_known_block,
			awake: self.is_awake(),
		}
	}

	async fn run(
		mut self,
		rtmgr: RuntimeManager,
		mut ctrl_rx: mpsc::UnboundedReceiver<Ctrl>,
		mut block_rx: mpsc::UnboundedReceiver<BlockHash>,
	) {
		let _worker = rtmgr.spawn_critical("Watcher");

		info!("Starting watcher with {} appointments", self.appointments.len());
		self.telemetry.set_appointments(self.appointments.len());
		loop {
			tokio::select! {
				Some(ctrl) = ctrl_rx.recv() => {
					match ctrl {
						Ctrl::AddAppointment { appointment, tip, resp } => {
							match self.add_appointment(appointment, tip).await {
								Ok(outcome) => { let _ = resp.send(Ok(outcome)); },
								Err(e) => {
									let _ = resp.send(Err(anyhow!("watcher failed to add appointment")));
									slog!(WorkerFailed, name: "Watcher".into(), error: format!("{:#}", e));
									break;
								},
							}
						},
						Ctrl::Status(uuid, resp) => {
							let _ = resp.send(self.appointments.contains_key(&uuid));
						},
						Ctrl::LiveState(resp) => {
							let _ = resp.send(self.live_state());
						},
						Ctrl::Sync(resp) => {
							if let Err(e) = self.process_queued(&mut block_rx).await {
								slog!(WorkerFailed, name: "Watcher".into(), error: format!("{:#}", e));
								break;
							}
							let _ = resp.send(());
						},
					}
				},
				Some(tip) = block_rx.recv(), if self.is_awake() => {
					if let Err(e) = self.process_tip(tip).await {
						slog!(WorkerFailed, name: "Watcher".into(), error: format!("{:#}", e));
						break;
					}
				},
				_ = rtmgr.shutdown_signal() => {
					info!("Shutdown signal received. Exiting watcher...");
					break;
				},
			}

			if !self.is_awake() {
				// tips queued before we went to sleep
				while block_rx.try_recv().is_ok() {}
			}
		}
	}
}

enum Ctrl {
	AddAppointment {
		appointment: Appointment,
		tip: BlockRef,
		resp: oneshot::Sender<anyhow::Result<AddAppointmentOutcome>>,
	},
	Status(AppointmentId, oneshot::Sender<bool>),
	LiveState(oneshot::Sender<WatcherState>),
	Sync(oneshot::Sender<()>),
}

/// Handle to the Watcher task.
#[derive(Clone)]
pub struct Watcher {
	ctrl_tx: mpsc::UnboundedSender<Ctrl>,
	block_tx: mpsc::UnboundedSender<BlockHash>,
	awake: Arc<AtomicBool>,
}

impl Watcher {
	/// Spawn the Watcher task.
	///
	/// It starts awake iff it was restored with appointments.
	pub fn start(
		rtmgr: RuntimeManager,
		config: Config,
		db: TowerDb,
		blocks: BlockProcessor,
		responder: Responder,
		tower_key: SecretKey,
		telemetry: TelemetryMetrics,
		state: InitialState,
	) -> Watcher {
		let awake = Arc::new(AtomicBool::new(
			!state.appointments.is_empty() && state.last_known_block.is_some(),
		));
		let proc = Process {
			config,
			db,
			blocks,
			responder,
			tower_key,
			telemetry,
			appointments: state.appointments,
			last_known_block: state.last_known_block,
			awake: awake.clone(),
		};

		let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel();
		let (block_tx, block_rx) = mpsc::unbounded_channel();
		tokio::spawn(proc.run(rtmgr, ctrl_rx, block_rx));

		Watcher { ctrl_tx, block_tx, awake }
	}

	/// The queue new tips should be pushed on.
	pub fn block_queue(&self) -> mpsc::UnboundedSender<BlockHash> {
		self.block_tx.clone()
	}

	pub fn awake_flag(&self) -> Arc<AtomicBool> {
		self.awake.clone()
	}

	pub fn is_awake(&self) -> bool {
		self.awake.load(Ordering::SeqCst)
	}

	/// Add an appointment, `tip` being the node's current best block.
	pub async fn add_appointment(
		&self,
		appointment: Appointment,
		tip: BlockRef,
	) -> anyhow::Result<AddAppointmentOutcome> {
		let (resp, resp_rx) = oneshot::channel();
		self.ctrl_tx.send(Ctrl::AddAppointment { appointment, tip, resp }).context("process down")?;
		resp_rx.await.context("no response")?
	}

	/// Whether the appointment is still being watched.
	pub async fn is_watching(&self, uuid: AppointmentId) -> anyhow::Result<bool> {
		let (resp_tx, resp_rx) = oneshot::channel();
		self.ctrl_tx.send(Ctrl::Status(uuid, resp_tx)).context("process down")?;
		Ok(resp_rx.await.context("no response")?)
	}

	pub async fn live_state(&self) -> anyhow::Result<WatcherState> {
		let (resp_tx, resp_rx) = oneshot::channel();
		self.ctrl_tx.send(Ctrl::LiveState(resp_tx)).context("process down")?;
		Ok(resp_rx.await.context("no response")?)
	}

	/// Wait until all queued blocks are processed.
	pub async fn sync(&self) -> anyhow::Result<()> {
		let (resp_tx, resp_rx) = oneshot::channel();
		self.ctrl_tx.send(Ctrl::Sync(resp_tx)).context("process down")?;
		Ok(resp_rx.await.context("no response")?)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	use std::time::Duration;

	use bitcoin::secp256k1::PublicKey;

	use crate::appointment::Locator;
	use crate::database::{self, MemoryStore};
	use crate::responder;
	use crate::test_util::{dummy_tx, MockNode};

	struct Setup {
		node: Arc<MockNode>,
		db: TowerDb,
		key: SecretKey,
		watcher: Watcher,
		responder: Responder,
	}

	fn setup(max_appointments: usize) -> Setup {
		let node = Arc::new(MockNode::new(100));
		let store = Arc::new(MemoryStore::new());
		let db_cfg = database::Config { write_attempts: 2, write_backoff: Duration::from_millis(1) };
		let db = TowerDb::new(store, db_cfg);
		let rtmgr = RuntimeManager::new();
		let blocks = BlockProcessor::new(node.clone());
		let responder = Responder::start(
			rtmgr.clone(),
			responder::Config::default(),
			db.clone(),
			blocks.clone(),
			TelemetryMetrics::disabled(),
			responder::InitialState::default(),
		);
		let key = SecretKey::new(&mut bitcoin::secp256k1::rand::thread_rng());
		let cfg = Config { max_appointments, expiry_delta: 6 };
		let watcher = Watcher::start(
			rtmgr,
			cfg,
			db.clone(),
			blocks,
			responder.clone(),
			key,
			TelemetryMetrics::disabled(),
			InitialState::default(),
		);
		Setup { node, db, key, watcher, responder }
	}

	async fn add(s: &Setup, appointment: Appointment) -> AppointmentId {
		match s.watcher.add_appointment(appointment, s.node.best_block()).await.unwrap() {
			AddAppointmentOutcome::Accepted { uuid, .. } => uuid,
			AddAppointmentOutcome::Rejected(r) => panic!("rejected: {:?}", r),
		}
	}

	async fn mine(s: &Setup, txs: Vec<Transaction>) {
		let hash = s.node.mine_block(txs);
		if s.watcher.is_awake() {
			s.watcher.block_queue().send(hash).unwrap();
		}
		if s.responder.is_awake() {
			s.responder.block_queue().send(hash).unwrap();
		}
		s.watcher.sync().await.unwrap();
		s.responder.sync().await.unwrap();
	}

	#[tokio::test]
	async fn accepted_appointment_is_signed_and_stored() {
		let s = setup(10);
		let dispute_txid = dummy_tx(1).compute_txid();
		let appointment = Appointment {
			locator: Locator::from_txid(&dispute_txid),
			end_time: 110,
			encrypted_blob: crypto::encrypt(&dummy_tx(2), &dispute_txid),
		};
		assert!(!s.watcher.is_awake());

		let outcome = s.watcher.add_appointment(appointment.clone(), s.node.best_block()).await.unwrap();
		let (uuid, signature) = match outcome {
			AddAppointmentOutcome::Accepted { uuid, start_block, signature } => {
				assert_eq!(start_block, 100);
				(uuid, signature)
			},
			o => panic!("unexpected outcome: {:?}", o),
		};
		let signer = crypto::recover_signer(&appointment, &signature).unwrap();
		assert_eq!(signer, PublicKey::from_secret_key(&crate::SECP, &s.key));

		assert!(s.watcher.is_awake());
		assert!(s.watcher.is_watching(uuid).await.unwrap());
		assert_eq!(s.db.load_appointment(&uuid).unwrap(), Some(appointment));
		assert_eq!(s.db.load_last_block(Component::Watcher).unwrap(), Some(s.node.best_block().hash));
	}

	#[tokio::test]
	async fn max_appointments() {
		let s = setup(2);
		for i in 0..2 {
			let appointment = Appointment {
				locator: Locator::from_txid(&dummy_tx(i).compute_txid()),
				end_time: 110,
				encrypted_blob: vec![1],
			};
			add(&s, appointment).await;
		}
		let appointment = Appointment {
			locator: Locator::from_txid(&dummy_tx(3).compute_txid()),
			end_time: 110,
			encrypted_blob: vec![1],
		};
		let outcome = s.watcher.add_appointment(appointment, s.node.best_block()).await.unwrap();
		assert_eq!(outcome, AddAppointmentOutcome::Rejected(RejectReason::MaxAppointmentsReached));
		assert_eq!(s.watcher.live_state().await.unwrap().appointments.len(), 2);
	}

	#[tokio::test]
	async fn expiry_takes_precedence_over_a_match() {
		let s = setup(10);
		let dispute = dummy_tx(1);
		let dispute_txid = dispute.compute_txid();
		let uuid = add(&s, Appointment {
			locator: Locator::from_txid(&dispute_txid),
			end_time: 102,
			encrypted_blob: crypto::encrypt(&dummy_tx(2), &dispute_txid),
		}).await;
		// keeps the watcher awake
		let other = add(&s, Appointment {
			locator: Locator::from_txid(&dummy_tx(50).compute_txid()),
			end_time: 200,
			encrypted_blob: vec![1],
		}).await;

		// 101 up to 108 = 102 + expiry_delta keep it alive
		for _ in 101..=108 {
			mine(&s, vec![]).await;
		}
		assert!(s.watcher.is_watching(uuid).await.unwrap());

		// expired at 109, so the dispute in that same block is ignored
		mine(&s, vec![dispute]).await;
		assert!(!s.watcher.is_watching(uuid).await.unwrap());
		assert!(s.watcher.is_watching(other).await.unwrap());
		assert!(s.responder.live_state().await.unwrap().trackers.is_empty());
		assert_eq!(s.node.broadcast_count(&dummy_tx(2).compute_txid()), 0);
		assert!(s.db.load_appointment(&uuid).unwrap().is_none());
	}

	#[tokio::test]
	async fn skipped_blocks_are_processed() {
		let s = setup(10);
		let dispute = dummy_tx(1);
		let dispute_txid = dispute.compute_txid();
		let penalty = dummy_tx(2);
		let uuid = add(&s, Appointment {
			locator: Locator::from_txid(&dispute_txid),
			end_time: 120,
			encrypted_blob: crypto::encrypt(&penalty, &dispute_txid),
		}).await;

		// the dispute is in a block we never get notified of
		let breach_block = s.node.mine_block(vec![dispute]);
		s.node.mine_block(vec![]);
		mine(&s, vec![]).await;

		assert!(!s.watcher.is_watching(uuid).await.unwrap());
		let state = s.responder.live_state().await.unwrap();
		assert_eq!(state.trackers[&uuid].penalty_txid, penalty.compute_txid());
		assert_eq!(state.trackers[&uuid].dispute_txid, dispute_txid);
		// the watcher ran out of appointments right at the breach
		assert!(!s.watcher.is_awake());
		assert_eq!(s.db.load_last_block(Component::Watcher).unwrap(), Some(breach_block));
		assert_eq!(state.last_known_block.unwrap().hash, breach_block);
	}

	#[tokio::test]
	async fn shared_blob_breaches_every_appointment() {
		let s = setup(10);
		let dispute = dummy_tx(1);
		let dispute_txid = dispute.compute_txid();
		let blob = crypto::encrypt(&dummy_tx(2), &dispute_txid);
		let mut ids = Vec::new();
		for _ in 0..3 {
			ids.push(add(&s, Appointment {
				locator: Locator::from_txid(&dispute_txid),
				end_time: 120,
				encrypted_blob: blob.clone(),
			}).await);
		}

		mine(&s, vec![dispute]).await;
		let state = s.responder.live_state().await.unwrap();
		assert_eq!(state.trackers.len(), 3);
		assert_eq!(s.node.broadcast_count(&dummy_tx(2).compute_txid()), 1);
		assert!(s.watcher.live_state().await.unwrap().appointments.is_empty());
	}

	#[test]
	fn decryption_cache() {
		let dispute_txid = dummy_tx(1).compute_txid();
		let penalty = dummy_tx(2);
		let blob = crypto::encrypt(&penalty, &dispute_txid);

		let mut cache = DecryptionCache::default();
		for _ in 0..3 {
			assert_eq!(cache.decrypt(&blob, &dispute_txid), &Ok(penalty.clone()));
		}
		assert_eq!(cache.misses, 1);

		let other_blob = crypto::encrypt(&dummy_tx(3), &dispute_txid);
		cache.decrypt(&other_blob, &dispute_txid);
		assert_eq!(cache.misses, 2);

		// same blob, other dispute: a different key, so decrypted again and failing
		let other_dispute = dummy_tx(4).compute_txid();
		assert!(cache.decrypt(&blob, &other_dispute).is_err());
		assert!(cache.decrypt(&blob, &other_dispute).is_err());
		assert_eq!(cache.misses, 3);
	}

	#[tokio::test]
	async fn far_end_time_does_not_overflow_expiry() {
		let s = setup(10);
		let uuid = add(&s, Appointment {
			locator: Locator::from_txid(&dummy_tx(1).compute_txid()),
			end_time: BlockHeight::MAX,
			encrypted_blob: vec![1],
		}).await;

		mine(&s, vec![]).await;
		mine(&s, vec![]).await;
		assert!(s.watcher.is_watching(uuid).await.unwrap());
		assert_eq!(s.watcher.live_state().await.unwrap().last_known_block, Some(s.node.best_block()));
	}

	#[tokio::test]
	async fn long_gap_is_caught_up_on_a_single_tip() {
		let s = setup(10);
		let dispute = dummy_tx(1);
		let dispute_txid = dispute.compute_txid();
		let penalty = dummy_tx(2);
		let uuid = add(&s, Appointment {
			locator: Locator::from_txid(&dispute_txid),
			end_time: 5000,
			encrypted_blob: crypto::encrypt(&penalty, &dispute_txid),
		}).await;
		let other = add(&s, Appointment {
			locator: Locator::from_txid(&dummy_tx(50).compute_txid()),
			end_time: 5000,
			encrypted_blob: vec![1],
		}).await;

		// no tips for well over a batch of blocks, the dispute at the very end
		for _ in 0..crate::block_processor::MAX_WALK_BACK + 50 {
			s.node.mine_block(vec![]);
		}
		mine(&s, vec![dispute]).await;

		assert!(!s.watcher.is_watching(uuid).await.unwrap());
		assert!(s.watcher.is_watching(other).await.unwrap());
		assert_eq!(s.watcher.live_state().await.unwrap().last_known_block, Some(s.node.best_block()));
		assert!(s.responder.live_state().await.unwrap().trackers.contains_key(&uuid));
	}
}
