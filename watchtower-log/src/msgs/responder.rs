use bitcoin::{BlockHash, Txid};
use bitcoin_ext::{BlockHeight, BlockRef};
use uuid::Uuid;


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PenaltyBroadcast {
	pub uuid: Uuid,
	pub penalty_txid: Txid,
	pub receipt: String,
}
impl_slog!(PenaltyBroadcast, Info, "penalty transaction delivered to the network");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PenaltyBroadcastFailed {
	pub uuid: Uuid,
	pub penalty_txid: Txid,
	pub reason: String,
	/// How many blocks the node tip is ahead of the block we processed.
	pub blocks_behind: Option<u32>,
}
impl_slog!(PenaltyBroadcastFailed, Warn, "could not deliver the penalty transaction");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PenaltyRebroadcast {
	pub penalty_txid: Txid,
	pub trackers: usize,
}
impl_slog!(PenaltyRebroadcast, Info, "penalty went too long without confirmation, rebroadcasting");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerCompleted {
	pub uuid: Uuid,
	pub penalty_txid: Txid,
	pub confirmations: u32,
}
impl_slog!(TrackerCompleted, Info, "penalty irrevocably resolved, tracker completed");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReorgDetected {
	pub last_known_block: BlockHash,
	pub new_block: BlockRef,
	pub common_ancestor: BlockRef,
}
impl_slog!(ReorgDetected, Warn, "chain reorganization detected, reconciling trackers");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisputeVanished {
	pub uuid: Uuid,
	pub dispute_txid: Txid,
	pub penalty_txid: Txid,
}
impl_slog!(DisputeVanished, Error, "dispute transaction vanished after a reorg, tracker flagged for review");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponderProcessedBlock {
	pub block: BlockRef,
	pub unconfirmed: usize,
	pub completed: usize,
	pub rebroadcast: usize,
	pub remaining: usize,
}
impl_slog!(ResponderProcessedBlock, Debug, "responder processed a block");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponderAwake {
	pub last_known_block: BlockRef,
}
impl_slog!(ResponderAwake, Debug, "responder woke up");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponderAsleep {
	pub height: BlockHeight,
}
impl_slog!(ResponderAsleep, Debug, "no more trackers, responder goes to sleep");
