//! Follows the node's best chain and fans new tips out to subscribers.
//!
//! Tips come from two sources: a poller that asks the node on an interval and
//! an optional push feed. Both go through [ChainMonitor::update_tip], which
//! deduplicates against the current tip and a ring of recent tips, so a tip
//! reported by both sources is only dispatched once.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use bitcoin::BlockHash;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::{Stream, StreamExt};

use crate::node::ChainSource;
use crate::system::RuntimeManager;


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
	/// Interval at which the node is asked for its best block.
	#[serde(with = "crate::serde_util::duration")]
	pub polling_interval: Duration,
	/// Number of previous tips remembered for deduplication.
	pub last_tips_size: usize,
}

impl Default for Config {
	fn default() -> Config {
		Config {
			polling_interval: Duration::from_secs(60),
			last_tips_size: 10,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TipSource {
	Poll,
	Feed,
}

impl fmt::Display for TipSource {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			TipSource::Poll => f.write_str("poll"),
			TipSource::Feed => f.write_str("feed"),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
	/// Created, no sources running yet.
	Idle,
	/// Sources are running, accepted tips are buffered.
	Listening,
	/// Accepted tips are dispatched to subscribers.
	Active,
	Terminated,
}

struct Subscriber {
	name: &'static str,
	queue: mpsc::UnboundedSender<BlockHash>,
	awake: Arc<AtomicBool>,
}

struct State {
	best_tip: BlockHash,
	last_tips: VecDeque<BlockHash>,
	subscribers: Vec<Subscriber>,
	status: Status,
	/// Tips accepted before activation.
	pending: Vec<BlockHash>,
}

impl State {
	fn dispatch(&self, tip: BlockHash) {
		for sub in &self.subscribers {
			if !sub.awake.load(Ordering::SeqCst) {
				continue;
			}
			if sub.queue.send(tip).is_err() {
				trace!("Subscriber {} is gone, not sending tip {}", sub.name, tip);
			}
		}
	}
}

#[derive(Clone)]
pub struct ChainMonitor {
	state: Arc<Mutex<State>>,
	node: Arc<dyn ChainSource>,
	config: Config,
}

impl ChainMonitor {
	/// Create a monitor that starts from the node's current best block.
	pub fn new(node: Arc<dyn ChainSource>, config: Config) -> anyhow::Result<ChainMonitor> {
		let best_tip = node.get_best_block_hash()
			.context("failed to fetch the best block from the node")?;
		Ok(ChainMonitor {
			state: Arc::new(Mutex::new(State {
				best_tip,
				last_tips: VecDeque::with_capacity(config.last_tips_size),
				subscribers: Vec::new(),
				status: Status::Idle,
				pending: Vec::new(),
			})),
			node,
			config,
		})
	}

	fn state(&self) -> MutexGuard<'_, State> {
		self.state.lock().unwrap_or_else(|e| e.into_inner())
	}

	pub fn best_tip(&self) -> BlockHash {
		self.state().best_tip
	}

	pub fn status(&self) -> Status {
		self.state().status
	}

	/// Register a subscriber.
	///
	/// It will only receive tips while `awake` is set.
	pub fn attach(
		&self,
		name: &'static str,
		queue: mpsc::UnboundedSender<BlockHash>,
		awake: Arc<AtomicBool>,
	) {
		self.state().subscribers.push(Subscriber { name, queue, awake });
	}

	/// Push a tip to every awake subscriber.
	pub fn notify_subscribers(&self, tip: BlockHash) {
		self.state().dispatch(tip);
	}

	/// Offer a candidate tip. Returns whether it was accepted as new.
	pub fn update_tip(&self, candidate: BlockHash, source: TipSource) -> bool {
		let mut state = self.state();
		if state.status == Status::Terminated {
			return false;
		}
		if candidate == state.best_tip || state.last_tips.contains(&candidate) {
			trace!("Ignoring known tip {} from {}", candidate, source);
			return false;
		}

		let previous = std::mem::replace(&mut state.best_tip, candidate);
		state.last_tips.push_back(previous);
		while state.last_tips.len() > self.config.last_tips_size {
			state.last_tips.pop_front();
		}
		slog!(NewChainTip, hash: candidate, previous: Some(previous), source: source.to_string());

		if state.status == Status::Active {
			state.dispatch(candidate);
		} else {
			state.pending.push(candidate);
		}
		true
	}

	/// Start the poller and, if given, the push feed listener.
	///
	/// Accepted tips are buffered until [ChainMonitor::activate].
	pub fn monitor_chain<S>(&self, rtmgr: RuntimeManager, feed: Option<S>)
	where
		S: Stream<Item = BlockHash> + Send + Unpin + 'static,
	{
		{
			let mut state = self.state();
			if state.status == Status::Idle {
				state.status = Status::Listening;
			}
			slog!(ChainMonitorListening, tip: state.best_tip);
		}

		tokio::spawn(self.clone().run_poller(rtmgr.clone()));
		if let Some(feed) = feed {
			tokio::spawn(self.clone().run_feed(rtmgr, feed));
		}
	}

	/// Dispatch the buffered tips in order and switch to direct dispatch.
	pub fn activate(&self) {
		let mut state = self.state();
		if state.status == Status::Terminated {
			return;
		}
		let pending = std::mem::take(&mut state.pending);
		for tip in &pending {
			state.dispatch(*tip);
		}
		state.status = Status::Active;
		slog!(ChainMonitorActivated, flushed: pending.len());
	}

	fn terminate(&self) {
		let mut state = self.state();
		state.status = Status::Terminated;
		state.pending.clear();
	}

	async fn run_poller(self, rtmgr: RuntimeManager) {
		let _worker = rtmgr.spawn("ChainMonitorPoller");

		let period = self.config.polling_interval;
		let mut interval = tokio::time::interval_at(Instant::now() + period, period);
		interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
		loop {
			if rtmgr.is_shutting_down() {
				break;
			}
			tokio::select! {
				_ = interval.tick() => {},
				_ = rtmgr.shutdown_signal() => break,
			}
			if rtmgr.is_shutting_down() {
				break;
			}

			match self.node.get_best_block_hash() {
				Ok(hash) => { self.update_tip(hash, TipSource::Poll); },
				Err(e) => slog!(ChainPollFailed, error: e.to_string()),
			}
		}

		self.terminate();
		info!("Chain monitor poller terminated gracefully.");
	}

	async fn run_feed<S>(self, rtmgr: RuntimeManager, mut feed: S)
	where
		S: Stream<Item = BlockHash> + Unpin,
	{
		let _worker = rtmgr.spawn("ChainMonitorFeed");
		loop {
			if rtmgr.is_shutting_down() {
				break;
			}
			tokio::select! {
				item = feed.next() => match item {
					Some(hash) => { self.update_tip(hash, TipSource::Feed); },
					None => {
						slog!(BlockFeedEnded);
						break;
					},
				},
				_ = rtmgr.shutdown_signal() => break,
			}
		}
		info!("Chain monitor feed listener terminated gracefully.");
	}
}
