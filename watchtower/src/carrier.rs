//! Delivers penalty transactions to the network.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bitcoin::{Transaction, Txid};

use crate::node::{ChainSource, NodeError, TxInfo};


/// Why a transaction could not be delivered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BroadcastFailure {
	#[error("rejected by the node's policy")]
	Rejected,
	#[error("failed consensus verification")]
	VerifyError,
	#[error("could not be deserialized")]
	Deserialization,
	#[error("was in the chain but got reorged out")]
	ReorgedAfterBroadcast,
	#[error("node unreachable")]
	Unreachable,
	#[error("the node doesn't know the transaction or its inputs")]
	NotFound,
	#[error("unknown rpc error {code}: {message}")]
	Unknown {
		code: i32,
		message: String,
	},
}

/// Outcome of handing a transaction to the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Receipt {
	/// Newly accepted, in the mempool.
	Broadcast,
	/// The transaction was already in the chain.
	AlreadyConfirmed {
		confirmations: u32,
	},
	Failed(BroadcastFailure),
}

impl Receipt {
	/// Whether the transaction is now known to the network.
	pub fn delivered(&self) -> bool {
		!matches!(self, Receipt::Failed(_))
	}

	pub fn confirmations(&self) -> u32 {
		match self {
			Receipt::AlreadyConfirmed { confirmations } => *confirmations,
			_ => 0,
		}
	}
}

impl fmt::Display for Receipt {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Receipt::Broadcast => f.write_str("broadcast"),
			Receipt::AlreadyConfirmed { confirmations } => {
				write!(f, "already confirmed ({} confirmations)", confirmations)
			},
			Receipt::Failed(e) => write!(f, "failed: {}", e),
		}
	}
}

/// Sends transactions and remembers what it told us.
///
/// Receipts are cached per txid until [Carrier::clear_receipts], so the same
/// transaction is never sent twice for one block.
pub struct Carrier {
	node: Arc<dyn ChainSource>,
	issued_receipts: HashMap<Txid, Receipt>,
}

impl Carrier {
	pub fn new(node: Arc<dyn ChainSource>) -> Carrier {
		Carrier {
			node,
			issued_receipts: HashMap::new(),
		}
	}

	pub fn send_transaction(&mut self, tx: &Transaction) -> Receipt {
		let txid = tx.compute_txid();
		if let Some(receipt) = self.issued_receipts.get(&txid) {
			trace!("Reusing receipt for {}: {}", txid, receipt);
			return receipt.clone();
		}

		let receipt = match self.node.send_raw_transaction(tx) {
			Ok(_) => Receipt::Broadcast,
			Err(NodeError::AlreadyInChain) => self.status_of_mined(&txid),
			Err(NodeError::Rejected(msg)) => {
				debug!("Penalty {} rejected: {}", txid, msg);
				Receipt::Failed(BroadcastFailure::Rejected)
			},
			Err(NodeError::Verify(msg)) => {
				debug!("Penalty {} failed verification: {}", txid, msg);
				Receipt::Failed(BroadcastFailure::VerifyError)
			},
			Err(NodeError::Deserialization(_)) => Receipt::Failed(BroadcastFailure::Deserialization),
			Err(NodeError::Unreachable(msg)) => {
				warn!("Node unreachable while sending {}: {}", txid, msg);
				// not cached, a later attempt may well succeed
				return Receipt::Failed(BroadcastFailure::Unreachable);
			},
			Err(NodeError::NotFound) => Receipt::Failed(BroadcastFailure::NotFound),
			Err(NodeError::Rpc { code, message }) => {
				Receipt::Failed(BroadcastFailure::Unknown { code, message })
			},
		};

		self.issued_receipts.insert(txid, receipt.clone());
		receipt
	}

	/// The node told us the tx is already in the chain, find out how deep.
	fn status_of_mined(&self, txid: &Txid) -> Receipt {
		match self.node.get_raw_transaction(txid) {
			Ok(TxInfo { confirmations: 0 }) => Receipt::Broadcast,
			Ok(TxInfo { confirmations }) => Receipt::AlreadyConfirmed { confirmations },
			// it was there a moment ago
			Err(NodeError::NotFound) => Receipt::Failed(BroadcastFailure::ReorgedAfterBroadcast),
			Err(NodeError::Unreachable(_)) => Receipt::Failed(BroadcastFailure::Unreachable),
			Err(e) => Receipt::Failed(BroadcastFailure::Unknown { code: 0, message: e.to_string() }),
		}
	}

	/// Look up a transaction, None if the node doesn't know it.
	pub fn get_transaction(&self, txid: &Txid) -> Result<Option<TxInfo>, NodeError> {
		match self.node.get_raw_transaction(txid) {
			Ok(info) => Ok(Some(info)),
			Err(NodeError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	pub fn clear_receipts(&mut self) {
		self.issued_receipts.clear();
	}
}
