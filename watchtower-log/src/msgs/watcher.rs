use bitcoin::Txid;
use bitcoin_ext::{BlockHeight, BlockRef};
use uuid::Uuid;


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentAccepted {
	pub uuid: Uuid,
	pub locator: String,
	pub end_time: BlockHeight,
	pub start_block: BlockHeight,
}
impl_slog!(AppointmentAccepted, Info, "accepted a new appointment");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentRejected {
	pub locator: String,
	pub max_appointments: usize,
}
impl_slog!(AppointmentRejected, Warn, "rejected appointment: maximum number of appointments reached");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreachDetected {
	pub uuid: Uuid,
	pub locator: String,
	pub dispute_txid: Txid,
}
impl_slog!(BreachDetected, Info, "breach detected, handing the penalty to the responder");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidPenaltyBlob {
	pub uuid: Uuid,
	pub dispute_txid: Txid,
	pub error: String,
}
impl_slog!(InvalidPenaltyBlob, Info, "appointment blob does not decrypt to a valid penalty transaction");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentsExpired {
	pub count: usize,
	pub height: BlockHeight,
}
impl_slog!(AppointmentsExpired, Debug, "appointments expired without a breach");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherProcessedBlock {
	pub block: BlockRef,
	pub breaches: usize,
	pub removed: usize,
	pub remaining: usize,
}
impl_slog!(WatcherProcessedBlock, Debug, "watcher processed a block");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherAwake {
	pub last_known_block: BlockRef,
}
impl_slog!(WatcherAwake, Debug, "watcher woke up");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherAsleep {}
impl_slog!(WatcherAsleep, Debug, "no more appointments, watcher goes to sleep");
