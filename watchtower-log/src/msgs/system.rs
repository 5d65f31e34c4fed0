use bitcoin_ext::BlockRef;


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TowerStarted {
	pub tip: BlockRef,
	pub appointments: usize,
	pub trackers: usize,
}
impl_slog!(TowerStarted, Info, "watchtower started and is following the chain");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TowerTerminated {}
impl_slog!(TowerTerminated, Info, "watchtower terminated: shutdown completed");


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStarted {
	pub name: String,
	pub critical: bool,
}
impl_slog!(WorkerStarted, Trace, "a worker task started");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStopped {
	pub name: String,
}
impl_slog!(WorkerStopped, Trace, "a worker task stopped");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticalWorkerStopped {
	pub name: String,
}
impl_slog!(CriticalWorkerStopped, Error, "a critical worker stopped unexpectedly");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerFailed {
	pub name: String,
	pub error: String,
}
impl_slog!(WorkerFailed, Error, "a worker task returned an error");
