use bitcoin::BlockHash;


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateRestored {
	pub appointments: usize,
	pub trackers: usize,
	pub unconfirmed: usize,
}
impl_slog!(StateRestored, Info, "restored watcher and responder state from the store");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayingMissedBlocks {
	pub component: String,
	pub last_known_block: BlockHash,
	pub count: usize,
}
impl_slog!(ReplayingMissedBlocks, Info, "replaying blocks missed while offline");
