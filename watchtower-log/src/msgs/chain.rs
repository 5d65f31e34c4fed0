use bitcoin::BlockHash;


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewChainTip {
	pub hash: BlockHash,
	pub previous: Option<BlockHash>,
	/// Either "poll" or "feed".
	pub source: String,
}
impl_slog!(NewChainTip, Debug, "the chain monitor accepted a new tip");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainMonitorListening {
	pub tip: BlockHash,
}
impl_slog!(ChainMonitorListening, Debug, "chain monitor is listening, new tips are buffered");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainMonitorActivated {
	pub flushed: usize,
}
impl_slog!(ChainMonitorActivated, Info, "chain monitor activated, dispatching tips to subscribers");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainPollFailed {
	pub error: String,
}
impl_slog!(ChainPollFailed, Warn, "failed to poll the node for the best block hash");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockFeedEnded {}
impl_slog!(BlockFeedEnded, Warn, "the block push feed ended, continuing with polling only");
