//! The tower's view of a bitcoin node.

use bitcoin::{BlockHash, Transaction, Txid};
use bitcoin_ext::{BlockHeight, BlockRef};
use bitcoin_ext::rpc::{BitcoinRpcClient, BitcoinRpcErrorExt, BitcoinRpcExt};
use bitcoin_ext::rpc::bitcoincore_rpc::{self, RpcApi};


/// Failure of a node query, classified by what the tower can do about it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeError {
	#[error("not found")]
	NotFound,
	#[error("transaction already in the chain")]
	AlreadyInChain,
	#[error("transaction rejected: {0}")]
	Rejected(String),
	#[error("transaction failed verification: {0}")]
	Verify(String),
	#[error("transaction could not be deserialized: {0}")]
	Deserialization(String),
	#[error("node unreachable: {0}")]
	Unreachable(String),
	#[error("rpc error {code}: {message}")]
	Rpc {
		code: i32,
		message: String,
	},
}

impl From<bitcoincore_rpc::Error> for NodeError {
	fn from(e: bitcoincore_rpc::Error) -> NodeError {
		if e.is_not_found() {
			NodeError::NotFound
		} else if e.is_in_utxo_set() {
			NodeError::AlreadyInChain
		} else if e.is_rejected() {
			NodeError::Rejected(e.to_string())
		} else if e.is_verify_error() {
			NodeError::Verify(e.to_string())
		} else if e.is_deserialization_error() {
			NodeError::Deserialization(e.to_string())
		} else if let Some(code) = e.rpc_error_code() {
			NodeError::Rpc { code, message: e.to_string() }
		} else if e.is_connection_error() {
			NodeError::Unreachable(e.to_string())
		} else {
			NodeError::Rpc { code: 0, message: e.to_string() }
		}
	}
}

/// A block as far as the tower is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockData {
	pub block_ref: BlockRef,
	/// None only for the genesis block.
	pub prev_hash: Option<BlockHash>,
	pub txids: Vec<Txid>,
	/// False when the block has been reorged out.
	pub in_best_chain: bool,
}

impl BlockData {
	pub fn hash(&self) -> BlockHash {
		self.block_ref.hash
	}

	pub fn height(&self) -> BlockHeight {
		self.block_ref.height
	}
}

/// What the node knows about a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxInfo {
	/// Zero while in the mempool.
	pub confirmations: u32,
}

/// The node operations the tower needs.
///
/// Calls are blocking, the tower's tasks make them from their own context.
pub trait ChainSource: Send + Sync + 'static {
	fn get_block(&self, hash: &BlockHash) -> Result<BlockData, NodeError>;
	fn get_best_block_hash(&self) -> Result<BlockHash, NodeError>;
	fn get_block_count(&self) -> Result<BlockHeight, NodeError>;
	/// Hash of the best chain block at the given height.
	fn get_block_hash(&self, height: BlockHeight) -> Result<BlockHash, NodeError>;
	fn send_raw_transaction(&self, tx: &Transaction) -> Result<Txid, NodeError>;
	/// Look up a transaction in the mempool or the best chain.
	fn get_raw_transaction(&self, txid: &Txid) -> Result<TxInfo, NodeError>;
}

impl ChainSource for BitcoinRpcClient {
	fn get_block(&self, hash: &BlockHash) -> Result<BlockData, NodeError> {
		let info = self.get_block_info(hash)?;
		Ok(BlockData {
			block_ref: BlockRef { height: info.height as BlockHeight, hash: info.hash },
			prev_hash: info.previousblockhash,
			txids: info.tx,
			// bitcoind reports -1 confirmations for stale blocks
			in_best_chain: info.confirmations >= 0,
		})
	}

	fn get_best_block_hash(&self) -> Result<BlockHash, NodeError> {
		Ok(RpcApi::get_best_block_hash(self)?)
	}

	fn get_block_count(&self) -> Result<BlockHeight, NodeError> {
		Ok(RpcApi::get_block_count(self)? as BlockHeight)
	}

	fn get_block_hash(&self, height: BlockHeight) -> Result<BlockHash, NodeError> {
		Ok(RpcApi::get_block_hash(self, height as u64)?)
	}

	fn send_raw_transaction(&self, tx: &Transaction) -> Result<Txid, NodeError> {
		match RpcApi::send_raw_transaction(self, tx) {
			Ok(txid) => Ok(txid),
			// resending a mempool tx is not an error for us
			Err(e) if e.is_already_in_mempool() => Ok(tx.compute_txid()),
			Err(e) => Err(e.into()),
		}
	}

	fn get_raw_transaction(&self, txid: &Txid) -> Result<TxInfo, NodeError> {
		match self.custom_get_raw_transaction_info(txid)? {
			Some(info) if info.in_active_chain == Some(false) => Err(NodeError::NotFound),
			Some(info) => Ok(TxInfo { confirmations: info.confirmations.unwrap_or(0) }),
			None => Err(NodeError::NotFound),
		}
	}
}
