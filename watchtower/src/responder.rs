//! The Responder broadcasts penalties for detected breaches and tracks them
//! until they are buried deep enough.
//!
//! Like the Watcher, it runs as a single task that owns all of its state.
//! Breaches come in through the control channel, blocks through the block
//! queue that is attached to the [ChainMonitor](crate::chain_monitor::ChainMonitor).

use std::collections::{HashMap, HashSet};
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use bitcoin::{BlockHash, Transaction, Txid};
use bitcoin_ext::{BlockHeight, BlockRef};
use tokio::sync::{mpsc, oneshot};

use crate::appointment::{AppointmentId, Locator, Tracker, TrackerSummary};
use crate::block_processor::BlockProcessor;
use crate::carrier::{Carrier, Receipt};
use crate::cleaner;
use crate::database::{Component, TowerDb};
use crate::index::TrackerIndex;
use crate::node::BlockData;
use crate::system::RuntimeManager;
use crate::telemetry::TelemetryMetrics;


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
	/// Number of blocks a penalty may stay unconfirmed before it is sent again.
	pub confirmations_before_retry: u32,
	/// Confirmations after which a penalty is considered irrevocable.
	pub min_confirmations: u32,
}

impl Default for Config {
	fn default() -> Config {
		Config {
			confirmations_before_retry: 6,
			min_confirmations: 6,
		}
	}
}

/// A breach detected by the Watcher, with its decrypted penalty.
#[derive(Debug, Clone)]
pub struct Breach {
	pub uuid: AppointmentId,
	pub locator: Locator,
	pub dispute_txid: Txid,
	pub penalty_txid: Txid,
	pub penalty_tx: Transaction,
	pub appointment_end: BlockHeight,
	/// The block the dispute was found in.
	pub chain_tip: BlockRef,
}

/// State restored from the store at startup.
#[derive(Debug, Default)]
pub struct InitialState {
	pub trackers: TrackerIndex,
	pub unconfirmed: HashSet<Txid>,
	/// Trackers flagged for manual review before the restart.
	pub flagged: HashSet<AppointmentId>,
	pub last_known_block: Option<BlockRef>,
}

/// Snapshot of the Responder for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponderState {
	pub trackers: HashMap<AppointmentId, TrackerSummary>,
	pub unconfirmed: Vec<Txid>,
	pub missed_confirmations: HashMap<Txid, u32>,
	/// Trackers whose dispute disappeared in a reorg and that need manual review.
	pub flagged: Vec<AppointmentId>,
	pub last_known_block: Option<BlockRef>,
	pub awake: bool,
}

struct Process {
	config: Config,
	db: TowerDb,
	blocks: BlockProcessor,
	carrier: Carrier,
	telemetry: TelemetryMetrics,

	trackers: TrackerIndex,
	unconfirmed: HashSet<Txid>,
	missed_confirmations: HashMap<Txid, u32>,
	flagged: HashSet<AppointmentId>,

	last_known_block: Option<BlockRef>,
	/// The block the cached carrier receipts belong to.
	receipts_block: Option<BlockHash>,
	awake: Arc<AtomicBool>,
}

impl Process {
	fn is_awake(&self) -> bool {
		self.awake.load(Ordering::SeqCst)
	}

	async fn wake_up(&mut self, tip: BlockRef) -> anyhow::Result<()> {
		self.db.store_last_block(Component::Responder, tip.hash).await?;
		self.last_known_block = Some(tip);
		self.awake.store(true, Ordering::SeqCst);
		slog!(ResponderAwake, last_known_block: tip);
		Ok(())
	}

	fn go_asleep(&mut self, height: BlockHeight) {
		self.awake.store(false, Ordering::SeqCst);
		slog!(ResponderAsleep, height);
	}

	fn update_metrics(&self) {
		self.telemetry.set_trackers(self.trackers.len(), self.unconfirmed.len());
	}

	/// Number of blocks the node is ahead of the given block, for logging.
	fn blocks_behind(&self, block: &BlockHash) -> Option<u32> {
		match self.blocks.get_distance_to_tip(block) {
			Ok(d) => d,
			Err(e) => {
				debug!("Failed to compute distance of block {} to the tip: {}", block, e);
				None
			},
		}
	}

	/// Record the outcome of a delivered penalty.
	fn penalty_delivered(&mut self, penalty_txid: Txid, receipt: &Receipt) {
		if receipt.confirmations() == 0 {
			self.unconfirmed.insert(penalty_txid);
			self.missed_confirmations.insert(penalty_txid, 0);
		} else {
			self.unconfirmed.remove(&penalty_txid);
			self.missed_confirmations.remove(&penalty_txid);
		}
	}

	async fn handle_breach(&mut self, breach: Breach) -> anyhow::Result<Receipt> {
		// receipts are only valid for the block they were issued in
		if self.receipts_block != Some(breach.chain_tip.hash) {
			self.carrier.clear_receipts();
			self.receipts_block = Some(breach.chain_tip.hash);
		}

		let receipt = self.carrier.send_transaction(&breach.penalty_tx);
		if !receipt.delivered() {
			slog!(PenaltyBroadcastFailed,
				uuid: breach.uuid,
				penalty_txid: breach.penalty_txid,
				reason: receipt.to_string(),
				blocks_behind: self.blocks_behind(&breach.chain_tip.hash),
			);
			return Ok(receipt);
		}
		slog!(PenaltyBroadcast,
			uuid: breach.uuid,
			penalty_txid: breach.penalty_txid,
			receipt: receipt.to_string(),
		);

		let tracker = Tracker::new(
			breach.locator, breach.dispute_txid, breach.penalty_tx, breach.appointment_end,
		);
		self.db.store_tracker(breach.uuid, &tracker).await
			.context("failed to persist tracker")?;
		let penalty_txid = tracker.penalty_txid;
		self.trackers.insert(breach.uuid, tracker);
		self.penalty_delivered(penalty_txid, &receipt);

		if !self.is_awake() {
			self.wake_up(breach.chain_tip).await?;
		}
		self.update_metrics();
		Ok(receipt)
	}

	/// Send a penalty again for all trackers that share it.
	///
	/// The missed-confirmation counter is reset whatever the outcome.
	fn rebroadcast(&mut self, penalty_txid: Txid, block: &BlockRef) {
		let ids = self.trackers.keys_for(&penalty_txid).copied().collect::<Vec<_>>();
		slog!(PenaltyRebroadcast, penalty_txid, trackers: ids.len());
		self.telemetry.add_rebroadcasts(1);

		for uuid in ids {
			let tx = match self.trackers.get(&uuid) {
				Some(t) => t.penalty_tx.clone(),
				None => continue,
			};
			let receipt = self.carrier.send_transaction(&tx);
			if receipt.delivered() {
				self.penalty_delivered(penalty_txid, &receipt);
			} else {
				slog!(PenaltyBroadcastFailed,
					uuid,
					penalty_txid,
					reason: receipt.to_string(),
					blocks_behind: self.blocks_behind(&block.hash),
				);
				self.unconfirmed.insert(penalty_txid);
				self.missed_confirmations.insert(penalty_txid, 0);
			}
		}
	}

	/// Re-validate all trackers after the chain diverged from what we processed.
	///
	/// Trackers whose dispute can no longer be found are flagged, never
	/// deleted or rebroadcast.
	fn reconcile(&mut self, block: &BlockRef) {
		let mut disputes = HashMap::<Txid, bool>::new();
		let penalties = self.trackers.secondary_keys().copied().collect::<Vec<_>>();
		for penalty_txid in penalties {
			let ids = self.trackers.keys_for(&penalty_txid).copied().collect::<Vec<_>>();
			let mut dispute_found = false;
			for uuid in ids {
				let dispute_txid = match self.trackers.get(&uuid) {
					Some(t) => t.dispute_txid,
					None => continue,
				};
				let found = match disputes.entry(dispute_txid) {
					Entry::Occupied(e) => *e.get(),
					Entry::Vacant(e) => match self.carrier.get_transaction(&dispute_txid) {
						Ok(info) => *e.insert(info.is_some()),
						Err(err) => {
							warn!("Failed to look up dispute {} during reconciliation: {}",
								dispute_txid, err);
							continue;
						},
					},
				};

				if found {
					dispute_found = true;
					if self.flagged.remove(&uuid) {
						info!("Dispute {} of tracker {} is back, clearing flag", dispute_txid, uuid);
					}
				} else if self.flagged.insert(uuid) {
					slog!(DisputeVanished, uuid, dispute_txid, penalty_txid);
				}
			}
			if !dispute_found {
				continue;
			}

			match self.carrier.get_transaction(&penalty_txid) {
				Ok(Some(info)) if info.confirmations > 0 => {
					self.unconfirmed.remove(&penalty_txid);
					self.missed_confirmations.remove(&penalty_txid);
				},
				Ok(_) => self.rebroadcast(penalty_txid, block),
				Err(e) => warn!("Failed to look up penalty {} during reconciliation: {}",
					penalty_txid, e),
			}
		}
	}

	async fn process_block(&mut self, block: &BlockData) -> anyhow::Result<()> {
		let height = block.height();
		self.carrier.clear_receipts();
		self.receipts_block = Some(block.hash());

		if let Some(last) = self.last_known_block {
			if block.prev_hash != Some(last.hash) {
				let common_ancestor = BlockRef {
					height: height.saturating_sub(1),
					hash: block.prev_hash.unwrap_or(last.hash),
				};
				slog!(ReorgDetected,
					last_known_block: last.hash,
					new_block: block.block_ref,
					common_ancestor,
				);
				let flagged_before = self.flagged.clone();
				self.reconcile(&block.block_ref);
				self.db.update_flags(
					self.flagged.difference(&flagged_before).copied(),
					flagged_before.difference(&self.flagged).copied(),
				).await.context("failed to persist flagged trackers")?;
			}
		}

		// confirmations
		for txid in &block.txids {
			if self.unconfirmed.remove(txid) {
				self.missed_confirmations.remove(txid);
				debug!("Penalty {} confirmed in block {}", txid, block.block_ref);
			}
		}
		for txid in &self.unconfirmed {
			*self.missed_confirmations.entry(*txid).or_insert(0) += 1;
		}

		// rebroadcast what has been waiting too long
		let due = self.missed_confirmations.iter()
			.filter(|(_, missed)| **missed >= self.config.confirmations_before_retry)
			.map(|(txid, _)| *txid)
			.collect::<Vec<_>>();
		for txid in &due {
			self.rebroadcast(*txid, &block.block_ref);
		}

		// completion
		let candidates = self.trackers.iter()
			.filter(|(_, t)| t.appointment_end <= height)
			.filter(|(_, t)| !self.unconfirmed.contains(&t.penalty_txid))
			.map(|(id, t)| (*id, t.penalty_txid))
			.collect::<Vec<_>>();
		let mut confirmations = HashMap::<Txid, Option<u32>>::new();
		let mut completed = Vec::new();
		for (uuid, penalty_txid) in candidates {
			let confs = match confirmations.entry(penalty_txid) {
				Entry::Occupied(e) => *e.get(),
				Entry::Vacant(e) => {
					let confs = match self.carrier.get_transaction(&penalty_txid) {
						Ok(info) => info.map(|i| i.confirmations),
						Err(err) => {
							warn!("Failed to fetch confirmations of penalty {}: {}", penalty_txid, err);
							None
						},
					};
					*e.insert(confs)
				},
			};
			if let Some(confs) = confs.filter(|c| *c >= self.config.min_confirmations) {
				slog!(TrackerCompleted, uuid, penalty_txid, confirmations: confs);
				completed.push(uuid);
			}
		}

		let completed = cleaner::delete_trackers(
			&self.db,
			&mut self.trackers,
			&mut self.unconfirmed,
			&mut self.missed_confirmations,
			&completed,
		).await.context("failed to delete completed trackers")?;
		self.flagged.retain(|id| self.trackers.contains_key(id));

		self.db.store_last_block(Component::Responder, block.hash()).await?;
		self.last_known_block = Some(block.block_ref);

		self.telemetry.set_block_height(Component::Responder.as_str(), height);
		self.update_metrics();
		slog!(ResponderProcessedBlock,
			block: block.block_ref,
			unconfirmed: self.unconfirmed.len(),
			completed,
			rebroadcast: due.len(),
			remaining: self.trackers.len(),
		);

		if self.trackers.is_empty() {
			self.go_asleep(height);
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
					warn!("Responder is awake without a last known block, ignoring tip {}", tip);
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
					warn!("Responder failed to fetch blocks up to {}: {}", tip, e);
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

	fn live_state(&self) -> ResponderState {
		ResponderState {
			trackers: self.trackers.iter().map(|(id, t)| (*id, t.summary())).collect(),
			unconfirmed: self.unconfirmed.iter().copied().collect(),
			missed_confirmations: self.missed_confirmations.clone(),
			flagged: self.flagged.iter().copied().collect(),
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
		let _worker = rtmgr.spawn_critical("Responder");

		info!("Starting responder with {} trackers", self.trackers.len());
		self.update_metrics();
		loop {
			tokio::select! {
				Some(ctrl) = ctrl_rx.recv() => {
					match ctrl {
						Ctrl::HandleBreach(breach, resp) => match self.handle_breach(breach).await {
							Ok(receipt) => { let _ = resp.send(Ok(receipt)); },
							Err(e) => {
								let _ = resp.send(Err(anyhow!("responder failed to handle breach")));
								slog!(WorkerFailed, name: "Responder".into(), error: format!("{:#}", e));
								break;
							},
						},
						Ctrl::GetTracker(uuid, resp) => {
							let _ = resp.send(self.trackers.get(&uuid).cloned());
						},
						Ctrl::LiveState(resp) => {
							let _ = resp.send(self.live_state());
						},
						Ctrl::Sync(resp) => {
							if let Err(e) = self.process_queued(&mut block_rx).await {
								slog!(WorkerFailed, name: "Responder".into(), error: format!("{:#}", e));
								break;
							}
							let _ = resp.send(());
						},
					}
				},
				Some(tip) = block_rx.recv(), if self.is_awake() => {
					if let Err(e) = self.process_tip(tip).await {
						slog!(WorkerFailed, name: "Responder".into(), error: format!("{:#}", e));
						break;
					}
				},
				_ = rtmgr.shutdown_signal() => {
					info!("Shutdown signal received. Exiting responder...");
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
	HandleBreach(Breach, oneshot::Sender<anyhow::Result<Receipt>>),
	GetTracker(AppointmentId, oneshot::Sender<Option<Tracker>>),
	LiveState(oneshot::Sender<ResponderState>),
	Sync(oneshot::Sender<()>),
}

/// Handle to the Responder task.
#[derive(Clone)]
pub struct Responder {
	ctrl_tx: mpsc::UnboundedSender<Ctrl>,
	block_tx: mpsc::UnboundedSender<BlockHash>,
	awake: Arc<AtomicBool>,
}

impl Responder {
	/// Spawn the Responder task.
	///
	/// It starts awake iff it was restored with trackers.
	pub fn start(
		rtmgr: RuntimeManager,
		config: Config,
		db: TowerDb,
		blocks: BlockProcessor,
		telemetry: TelemetryMetrics,
		state: InitialState,
	) -> Responder {
		let awake = Arc::new(AtomicBool::new(
			!state.trackers.is_empty() && state.last_known_block.is_some(),
		));
		let missed_confirmations = state.unconfirmed.iter().map(|txid| (*txid, 0)).collect();
		let proc = Process {
			config,
			db,
			carrier: Carrier::new(blocks.node().clone()),
			blocks,
			telemetry,
			trackers: state.trackers,
			unconfirmed: state.unconfirmed,
			missed_confirmations,
			flagged: state.flagged,
			last_known_block: state.last_known_block,
			receipts_block: None,
			awake: awake.clone(),
		};

		let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel();
		let (block_tx, block_rx) = mpsc::unbounded_channel();
		tokio::spawn(proc.run(rtmgr, ctrl_rx, block_rx));

		Responder { ctrl_tx, block_tx, awake }
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

	/// Broadcast the penalty of a breach and start tracking it if delivered.
	pub async fn handle_breach(&self, breach: Breach) -> anyhow::Result<Receipt> {
		let (resp_tx, resp_rx) = oneshot::channel();
		self.ctrl_tx.send(Ctrl::HandleBreach(breach, resp_tx)).context("process down")?;
		resp_rx.await.context("no response")?
	}

	pub async fn get_tracker(&self, uuid: AppointmentId) -> anyhow::Result<Option<Tracker>> {
		let (resp_tx, resp_rx) = oneshot::channel();
		self.ctrl_tx.send(Ctrl::GetTracker(uuid, resp_tx)).context("process down")?;
		Ok(resp_rx.await.context("no response")?)
	}

	pub async fn live_state(&self) -> anyhow::Result<ResponderState> {
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

	use crate::database::{self, MemoryStore};
	use crate::test_util::{dummy_tx, MockNode};

	struct Setup {
		node: Arc<MockNode>,
		store: Arc<MemoryStore>,
		db: TowerDb,
		rtmgr: RuntimeManager,
		responder: Responder,
	}

	fn setup() -> Setup {
		let node = Arc::new(MockNode::new(100));
		let store = Arc::new(MemoryStore::new());
		let db_cfg = database::Config { write_attempts: 2, write_backoff: Duration::from_millis(1) };
		let db = TowerDb::new(store.clone(), db_cfg);
		let rtmgr = RuntimeManager::new();
		let responder = Responder::start(
			rtmgr.clone(),
			Config::default(),
			db.clone(),
			BlockProcessor::new(node.clone()),
			TelemetryMetrics::disabled(),
			InitialState::default(),
		);
		Setup { node, store, db, rtmgr, responder }
	}

	/// Mine a block with the given txs and let the responder process it.
	async fn mine(s: &Setup, txs: Vec<Transaction>) -> BlockHash {
		let hash = s.node.mine_block(txs);
		if s.responder.is_awake() {
			s.responder.block_queue().send(hash).unwrap();
		}
		s.responder.sync().await.unwrap();
		hash
	}

	/// Mine the dispute and build the breach the watcher would hand over.
	fn breach(s: &Setup, n: u32, appointment_end: BlockHeight) -> Breach {
		let dispute = dummy_tx(n);
		let dispute_txid = dispute.compute_txid();
		s.node.mine_block(vec![dispute]);
		let penalty_tx = dummy_tx(1000 + n);
		Breach {
			uuid: AppointmentId::new_v4(),
			locator: Locator::from_txid(&dispute_txid),
			dispute_txid,
			penalty_txid: penalty_tx.compute_txid(),
			penalty_tx,
			appointment_end,
			chain_tip: s.node.best_block(),
		}
	}

	#[tokio::test]
	async fn breach_is_tracked_until_buried() {
		let s = setup();
		let b = breach(&s, 1, 103);
		let uuid = b.uuid;
		let penalty_txid = b.penalty_txid;

		assert_eq!(s.responder.handle_breach(b).await.unwrap(), Receipt::Broadcast);
		assert!(s.responder.is_awake());
		assert!(s.db.load_tracker(&uuid).unwrap().is_some());
		let state = s.responder.live_state().await.unwrap();
		assert_eq!(state.unconfirmed, vec![penalty_txid]);

		// penalty confirms in the next block
		let penalty = s.node.mempool_tx(&penalty_txid).unwrap();
		mine(&s, vec![penalty]).await;
		let state = s.responder.live_state().await.unwrap();
		assert!(state.unconfirmed.is_empty());
		assert!(state.trackers.contains_key(&uuid));

		for _ in 0..4 {
			mine(&s, vec![]).await;
		}
		assert!(s.responder.get_tracker(uuid).await.unwrap().is_some(), "only 5 confirmations");

		mine(&s, vec![]).await;
		assert!(s.responder.get_tracker(uuid).await.unwrap().is_none());
		assert!(s.db.load_tracker(&uuid).unwrap().is_none());
		assert!(!s.responder.is_awake());
		assert_eq!(s.db.load_last_block(Component::Responder).unwrap(), Some(s.node.best_block().hash));
	}

	#[tokio::test]
	async fn failed_broadcast_creates_no_tracker() {
		let s = setup();
		let b = breach(&s, 2, 110);
		s.node.reject(b.penalty_txid);
		let uuid = b.uuid;

		let receipt = s.responder.handle_breach(b).await.unwrap();
		assert!(!receipt.delivered());
		assert!(!s.responder.is_awake());
		assert!(s.responder.get_tracker(uuid).await.unwrap().is_none());
		assert!(s.db.load_tracker(&uuid).unwrap().is_none());
	}

	#[tokio::test]
	async fn already_confirmed_penalty_is_not_unconfirmed() {
		let s = setup();
		let b = breach(&s, 3, 110);
		s.node.mine_block(vec![b.penalty_tx.clone()]);

		let receipt = s.responder.handle_breach(b).await.unwrap();
		assert_eq!(receipt, Receipt::AlreadyConfirmed { confirmations: 1 });
		let state = s.responder.live_state().await.unwrap();
		assert_eq!(state.trackers.len(), 1);
		assert!(state.unconfirmed.is_empty());
	}

	#[tokio::test]
	async fn rebroadcast_after_missed_confirmations() {
		let s = setup();
		let b = breach(&s, 4, 200);
		let penalty_txid = b.penalty_txid;
		s.responder.handle_breach(b).await.unwrap();
		assert_eq!(s.node.broadcast_count(&penalty_txid), 1);

		for i in 1..6 {
			mine(&s, vec![]).await;
			let state = s.responder.live_state().await.unwrap();
			assert_eq!(state.missed_confirmations[&penalty_txid], i);
		}
		assert_eq!(s.node.broadcast_count(&penalty_txid), 1);

		mine(&s, vec![]).await;
		assert_eq!(s.node.broadcast_count(&penalty_txid), 2);
		let state = s.responder.live_state().await.unwrap();
		assert_eq!(state.missed_confirmations[&penalty_txid], 0);
		assert_eq!(state.unconfirmed, vec![penalty_txid]);

		// once confirmed it never comes back
		let penalty = s.node.mempool_tx(&penalty_txid).unwrap();
		mine(&s, vec![penalty]).await;
		for _ in 0..8 {
			mine(&s, vec![]).await;
			let state = s.responder.live_state().await.unwrap();
			assert!(state.unconfirmed.is_empty());
			assert!(!state.missed_confirmations.contains_key(&penalty_txid));
		}
		assert_eq!(s.node.broadcast_count(&penalty_txid), 2);
	}

	#[tokio::test]
	async fn shared_penalty_sent_once_per_block() {
		let s = setup();
		let b1 = breach(&s, 5, 200);
		let mut b2 = b1.clone();
		b2.uuid = AppointmentId::new_v4();
		let penalty_txid = b1.penalty_txid;

		s.responder.handle_breach(b1).await.unwrap();
		s.responder.handle_breach(b2).await.unwrap();
		assert_eq!(s.node.broadcast_count(&penalty_txid), 1);
		let state = s.responder.live_state().await.unwrap();
		assert_eq!(state.trackers.len(), 2);

		for _ in 0..6 {
			mine(&s, vec![]).await;
		}
		assert_eq!(s.node.broadcast_count(&penalty_txid), 2);
	}

	#[tokio::test]
	async fn vanished_dispute_is_flagged() {
		let s = setup();
		let b = breach(&s, 6, 200);
		let uuid = b.uuid;
		let penalty_txid = b.penalty_txid;
		s.responder.handle_breach(b).await.unwrap();
		let penalty = s.node.mempool_tx(&penalty_txid).unwrap();
		mine(&s, vec![penalty]).await;

		// both the dispute and the penalty are reorged out and forgotten
		let tip = s.node.reorg(2);
		s.responder.block_queue().send(tip).unwrap();
		s.responder.sync().await.unwrap();

		let state = s.responder.live_state().await.unwrap();
		assert_eq!(state.flagged, vec![uuid]);
		assert_eq!(s.db.load_flags().unwrap(), [uuid].into_iter().collect::<HashSet<_>>());
		assert!(state.trackers.contains_key(&uuid), "flagged trackers are kept");
		assert!(state.unconfirmed.is_empty());
		assert_eq!(s.node.broadcast_count(&penalty_txid), 1, "no rebroadcast without dispute");
		assert_eq!(state.last_known_block.unwrap().hash, tip);
	}

	#[tokio::test]
	async fn restored_flags_are_reported() {
		let node = Arc::new(MockNode::new(100));
		let db = TowerDb::new(Arc::new(MemoryStore::new()), database::Config::default());
		let uuid = AppointmentId::new_v4();
		let mut trackers = TrackerIndex::new();
		let dispute_txid = dummy_tx(9).compute_txid();
		trackers.insert(uuid, Tracker::new(Locator::from_txid(&dispute_txid), dispute_txid, dummy_tx(1009), 200));
		let responder = Responder::start(
			RuntimeManager::new(),
			Config::default(),
			db,
			BlockProcessor::new(node.clone()),
			TelemetryMetrics::disabled(),
			InitialState {
				trackers,
				flagged: [uuid].into_iter().collect(),
				last_known_block: Some(node.best_block()),
				..Default::default()
			},
		);

		let state = responder.live_state().await.unwrap();
		assert_eq!(state.flagged, vec![uuid]);
	}

	#[tokio::test]
	async fn reorg_rebroadcasts_penalty_of_surviving_dispute() {
		let s = setup();
		let b = breach(&s, 7, 200);
		let penalty_txid = b.penalty_txid;
		s.responder.handle_breach(b).await.unwrap();
		let penalty = s.node.mempool_tx(&penalty_txid).unwrap();
		mine(&s, vec![penalty]).await;

		// the reorg drops the penalty, the dispute stays confirmed
		let tip = s.node.reorg(1);
		s.responder.block_queue().send(tip).unwrap();
		s.responder.sync().await.unwrap();

		let state = s.responder.live_state().await.unwrap();
		assert!(state.flagged.is_empty());
		assert_eq!(state.unconfirmed, vec![penalty_txid]);
		assert_eq!(s.node.broadcast_count(&penalty_txid), 2);
	}

	#[tokio::test]
	async fn store_failure_stops_the_responder() {
		let s = setup();
		let b = breach(&s, 8, 200);
		let uuid = b.uuid;
		s.store.fail_next_writes(2);

		assert!(s.responder.handle_breach(b).await.is_err());
		assert!(s.db.load_tracker(&uuid).unwrap().is_none());
		tokio::time::timeout(Duration::from_secs(5), s.rtmgr.wait()).await
			.expect("responder did not stop");
		assert!(s.rtmgr.is_shutting_down());
	}
}
