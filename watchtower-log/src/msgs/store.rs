

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreWriteRetry {
	pub attempt: usize,
	pub error: String,
}
impl_slog!(StoreWriteRetry, Warn, "store write failed, retrying");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreWriteFailed {
	pub attempts: usize,
	pub error: String,
}
impl_slog!(StoreWriteFailed, Error, "store write failed permanently");
