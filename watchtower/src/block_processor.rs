//! Block level queries on top of a [ChainSource].

use std::collections::HashSet;
use std::sync::Arc;

use bitcoin::{BlockHash, Txid};
use bitcoin_ext::{BlockHeight, BlockRef};

use crate::appointment::Locator;
use crate::index::AppointmentIndex;
use crate::node::{BlockData, ChainSource, NodeError};


/// How far back we are willing to walk to find a block we know.
///
/// Reorgs deeper than this are not resolved, the walk gives up instead.
/// It also caps how many missed blocks are fetched at once.
pub const MAX_WALK_BACK: BlockHeight = 1008;

#[derive(Clone)]
pub struct BlockProcessor {
	node: Arc<dyn ChainSource>,
}

impl BlockProcessor {
	pub fn new(node: Arc<dyn ChainSource>) -> BlockProcessor {
		BlockProcessor { node }
	}

	pub fn node(&self) -> &Arc<dyn ChainSource> {
		&self.node
	}

	pub fn get_block(&self, hash: &BlockHash) -> Result<BlockData, NodeError> {
		self.node.get_block(hash)
	}

	pub fn get_best_block_hash(&self) -> Result<BlockHash, NodeError> {
		self.node.get_best_block_hash()
	}

	pub fn get_block_count(&self) -> Result<BlockHeight, NodeError> {
		self.node.get_block_count()
	}

	/// The node's current best block.
	pub fn get_best_block(&self) -> Result<BlockRef, NodeError> {
		let hash = self.node.get_best_block_hash()?;
		Ok(self.node.get_block(&hash)?.block_ref)
	}

	/// Match the txids of a block against the locators we watch.
	///
	/// Returns every `(locator, dispute_txid)` pair with at least one appointment.
	pub fn get_potential_matches(
		&self,
		txids: &[Txid],
		appointments: &AppointmentIndex,
	) -> Vec<(Locator, Txid)> {
		let mut seen = HashSet::new();
		txids.iter()
			.filter(|txid| seen.insert(**txid))
			.map(|txid| (Locator::from_txid(txid), *txid))
			.filter(|(locator, _)| appointments.contains_secondary(locator))
			.collect()
	}

	/// Number of blocks the node's tip is ahead of the given block.
	///
	/// None if the block is not in the best chain.
	pub fn get_distance_to_tip(&self, hash: &BlockHash) -> Result<Option<u32>, NodeError> {
		let block = self.node.get_block(hash)?;
		if !block.in_best_chain {
			return Ok(None);
		}
		let count = self.node.get_block_count()?;
		Ok(Some(count.saturating_sub(block.height())))
	}

	pub fn is_block_in_best_chain(&self, hash: &BlockHash) -> Result<bool, NodeError> {
		match self.node.get_block(hash) {
			Ok(block) => Ok(block.in_best_chain),
			Err(NodeError::NotFound) => Ok(false),
			Err(e) => Err(e),
		}
	}

	/// Every block after `last_known` up to `tip`, fetched batch by batch.
	///
	/// Only the hashes are kept, for gaps that can span weeks of blocks.
	pub fn get_all_missed_hashes(
		&self,
		last_known: &BlockHash,
		tip: &BlockHash,
	) -> Result<Vec<BlockHash>, NodeError> {
		let mut hashes = Vec::new();
		let mut last = *last_known;
		loop {
			let batch = self.get_missed_blocks(&last, tip)?;
			match batch.last() {
				Some(b) => last = b.hash(),
				None => break,
			}
			hashes.extend(batch.iter().map(|b| b.hash()));
			if last == *tip {
				break;
			}
		}
		Ok(hashes)
	}

	/// Walk back from a block until we hit the best chain.
	///
	/// Returns the common ancestor and the txids of every block that was
	/// dropped on the way, the given block included.
	pub fn find_last_common_ancestor(
		&self,
		hash: &BlockHash,
	) -> Result<(BlockRef, Vec<Txid>), NodeError> {
		let mut dropped = Vec::new();
		let mut block = self.node.get_block(hash)?;
		let mut steps = 0;
		while !block.in_best_chain {
			if steps >= MAX_WALK_BACK {
				return Err(NodeError::Rpc {
					code: 0,
					message: format!("no common ancestor within {} blocks of {}", MAX_WALK_BACK, hash),
				});
			}
			dropped.extend_from_slice(&block.txids);
			let prev = block.prev_hash.ok_or(NodeError::NotFound)?;
			block = self.node.get_block(&prev)?;
			steps += 1;
		}
		Ok((block.block_ref, dropped))
	}

	/// Blocks of the best chain after `last_known` towards `tip`.
	///
	/// If `last_known` got reorged out, the blocks start right after the last
	/// common ancestor. At most [MAX_WALK_BACK] blocks are returned, in height
	/// order. Larger gaps are caught up on by asking again from the last block
	/// returned. Empty if `tip` is not above the ancestor or no longer in the
	/// best chain.
	pub fn get_missed_blocks(
		&self,
		last_known: &BlockHash,
		tip: &BlockHash,
	) -> Result<Vec<BlockData>, NodeError> {
		let (ancestor, _) = self.find_last_common_ancestor(last_known)?;
		let tip = self.node.get_block(tip)?;
		if !tip.in_best_chain || tip.height() <= ancestor.height {
			return Ok(Vec::new());
		}
		let end = if tip.height() - ancestor.height > MAX_WALK_BACK {
			let hash = self.node.get_block_hash(ancestor.height + MAX_WALK_BACK)?;
			self.node.get_block(&hash)?
		} else {
			tip
		};

		let mut blocks = Vec::with_capacity((end.height() - ancestor.height) as usize);
		let mut block = end;
		while block.height() > ancestor.height + 1 {
			let prev = block.prev_hash.ok_or(NodeError::NotFound)?;
			let next = self.node.get_block(&prev)?;
			blocks.push(block);
			block = next;
		}
		if block.prev_hash != Some(ancestor.hash) {
			// the chain moved under our feet, try again on the next tip
			return Err(NodeError::Rpc {
				code: 0,
				message: format!("block {} does not build on {}", block.block_ref, ancestor),
			});
		}
		blocks.push(block);
		blocks.reverse();
		Ok(blocks)
	}
}
