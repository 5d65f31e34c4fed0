//! Rebuilds the in-memory state of the Watcher and the Responder from the
//! store at startup.

use std::collections::HashSet;

use anyhow::Context;
use bitcoin::{BlockHash, Txid};
use bitcoin_ext::BlockRef;

use crate::appointment::Locator;
use crate::block_processor::BlockProcessor;
use crate::database::{Component, TowerDb};
use crate::index::{AppointmentIndex, TrackerIndex};
use crate::node::NodeError;
use crate::{responder, watcher};


/// Blocks each component missed while the tower was offline, in height order.
#[derive(Debug, Default)]
pub struct Replay {
	pub watcher: Vec<BlockHash>,
	pub responder: Vec<BlockHash>,
}

#[derive(Debug)]
pub struct RestoredState {
	pub watcher: watcher::InitialState,
	pub responder: responder::InitialState,
	pub replay: Replay,
}

/// The block a component resumes from.
///
/// A component without a stored block, or with one the node doesn't know,
/// resumes from the tip.
async fn resume_block(
	db: &TowerDb,
	blocks: &BlockProcessor,
	component: Component,
	tip: BlockRef,
) -> anyhow::Result<BlockRef> {
	let hash = match db.load_last_block(component)? {
		Some(h) => h,
		None => {
			db.store_last_block(component, tip.hash).await
				.with_context(|| format!("failed to persist last block of {}", component))?;
			return Ok(tip);
		},
	};

	match blocks.get_block(&hash) {
		Ok(block) => Ok(block.block_ref),
		Err(NodeError::NotFound) => {
			warn!("Last known block {} of {} is unknown to the node, resuming from tip {}",
				hash, component, tip,
			);
			db.store_last_block(component, tip.hash).await
				.with_context(|| format!("failed to persist last block of {}", component))?;
			Ok(tip)
		},
		Err(e) => Err(e).with_context(|| format!("failed to fetch last block of {}", component)),
	}
}

fn missed_blocks(
	blocks: &BlockProcessor,
	component: Component,
	last: &BlockRef,
	tip: &BlockRef,
) -> anyhow::Result<Vec<BlockHash>> {
	let missed = blocks.get_all_missed_hashes(&last.hash, &tip.hash)
		.with_context(|| format!("failed to fetch blocks missed by {}", component))?;
	if !missed.is_empty() {
		slog!(ReplayingMissedBlocks,
			component: component.to_string(),
			last_known_block: last.hash,
			count: missed.len(),
		);
	}
	Ok(missed)
}

/// Load the tower state from the store.
///
/// `tip` is the node's best block. Every error is fatal to startup.
pub async fn restore(
	db: &TowerDb,
	blocks: &BlockProcessor,
	tip: BlockRef,
) -> anyhow::Result<RestoredState> {
	let mut appointments = db.load_appointments().context("failed to load appointments")?;
	let trackers = db.load_trackers().context("failed to load trackers")?;

	// a crash between handing a breach over and cleaning up the watcher
	// leaves the appointment behind
	let handed_over = appointments.iter()
		.filter(|(id, _)| trackers.contains_key(id))
		.map(|(id, a)| (*id, a.locator))
		.collect::<Vec<(_, Locator)>>();
	if !handed_over.is_empty() {
		debug!("Removing {} appointments that were already handed to the responder",
			handed_over.len(),
		);
		db.delete_appointments(handed_over.iter().copied()).await
			.context("failed to delete handed over appointments")?;
		for (id, _) in &handed_over {
			appointments.remove(id);
		}
	}

	let mut appointment_index = AppointmentIndex::new();
	for (id, appointment) in appointments {
		appointment_index.insert(id, appointment.summary());
	}

	let mut tracker_index = TrackerIndex::new();
	for (id, tracker) in trackers {
		tracker_index.insert(id, tracker);
	}

	let mut flagged = db.load_flags().context("failed to load flagged trackers")?;
	flagged.retain(|id| tracker_index.contains_key(id));
	if !flagged.is_empty() {
		warn!("{} trackers are still flagged for manual review", flagged.len());
	}

	let mut unconfirmed = HashSet::<Txid>::new();
	for txid in tracker_index.secondary_keys() {
		match blocks.node().get_raw_transaction(txid) {
			Ok(info) if info.confirmations == 0 => { unconfirmed.insert(*txid); },
			Ok(_) => {},
			Err(NodeError::NotFound) => { unconfirmed.insert(*txid); },
			Err(e) => return Err(e).with_context(|| format!("failed to look up penalty {}", txid)),
		}
	}

	let mut replay = Replay::default();

	let watcher_last = if appointment_index.is_empty() {
		None
	} else {
		Some(resume_block(db, blocks, Component::Watcher, tip).await?)
	};
	let responder_last = if tracker_index.is_empty() {
		None
	} else {
		Some(resume_block(db, blocks, Component::Responder, tip).await?)
	};

	match (watcher_last, responder_last) {
		(Some(w), Some(r)) if w == r => {
			let missed = missed_blocks(blocks, Component::Watcher, &w, &tip)?;
			replay.responder = missed.clone();
			replay.watcher = missed;
		},
		(w, r) => {
			if let Some(w) = w {
				replay.watcher = missed_blocks(blocks, Component::Watcher, &w, &tip)?;
			}
			if let Some(r) = r {
				replay.responder = missed_blocks(blocks, Component::Responder, &r, &tip)?;
			}
		},
	}

	slog!(StateRestored,
		appointments: appointment_index.len(),
		trackers: tracker_index.len(),
		unconfirmed: unconfirmed.len(),
	);

	Ok(RestoredState {
		watcher: watcher::InitialState {
			appointments: appointment_index,
			last_known_block: watcher_last,
		},
		responder: responder::InitialState {
			trackers: tracker_index,
			unconfirmed,
			flagged,
			last_known_block: responder_last,
		},
		replay,
	})
}
