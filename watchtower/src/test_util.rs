//! Helpers shared by the tests.

use std::collections::HashMap;
use std::sync::Mutex;

use bitcoin::{absolute, transaction, Amount, BlockHash, OutPoint, ScriptBuf, Sequence};
use bitcoin::{Transaction, TxIn, TxOut, Txid, Witness};
use bitcoin::hashes::Hash;
use bitcoin_ext::{BlockHeight, BlockRef};

use crate::node::{BlockData, ChainSource, NodeError, TxInfo};


/// A transaction that is unique for every `n`.
pub fn dummy_tx(n: u32) -> Transaction {
	Transaction {
		version: transaction::Version::TWO,
		lock_time: absolute::LockTime::ZERO,
		input: vec![TxIn {
			previous_output: OutPoint::new(Txid::all_zeros(), n),
			script_sig: ScriptBuf::new(),
			sequence: Sequence::MAX,
			witness: Witness::new(),
		}],
		output: vec![TxOut {
			value: Amount::from_sat(10_000 + n as u64),
			script_pubkey: ScriptBuf::new(),
		}],
	}
}

pub fn random_txid() -> Txid {
	Txid::from_byte_array(rand::random())
}

/// A recognizable block hash for the given fork and height.
pub fn dummy_block_hash(fork: u8, height: BlockHeight) -> BlockHash {
	let hash = format!("{:02x}000000000000000000000000000000000000000000000000000000{:08x}", fork, height);
	hash.parse().expect("Valid BlockHash")
}

#[derive(Debug, Clone)]
struct MockBlock {
	height: BlockHeight,
	prev: Option<BlockHash>,
	txs: Vec<Transaction>,
}

#[derive(Debug)]
struct Chain {
	blocks: HashMap<BlockHash, MockBlock>,
	/// Hash of the best chain block at every height.
	best: Vec<BlockHash>,
	mempool: HashMap<Txid, Transaction>,
	/// Errors returned when these txs are sent.
	send_errors: HashMap<Txid, NodeError>,
	broadcasts: HashMap<Txid, usize>,
	unreachable: bool,
	/// Incremented on every reorg, so new blocks get fresh hashes.
	fork: u8,
}

impl Chain {
	fn tip_height(&self) -> BlockHeight {
		(self.best.len() - 1) as BlockHeight
	}

	fn connect(&mut self, txs: Vec<Transaction>) -> BlockHash {
		let height = self.best.len() as BlockHeight;
		let hash = dummy_block_hash(self.fork, height);
		for tx in &txs {
			self.mempool.remove(&tx.compute_txid());
		}
		let prev = self.best.last().copied();
		self.blocks.insert(hash, MockBlock { height, prev, txs });
		self.best.push(hash);
		hash
	}

	/// Height of the best chain block that contains the tx.
	fn confirmed_height(&self, txid: &Txid) -> Option<BlockHeight> {
		self.best.iter()
			.filter_map(|h| self.blocks.get(h))
			.find(|b| b.txs.iter().any(|tx| tx.compute_txid() == *txid))
			.map(|b| b.height)
	}

	fn check_reachable(&self) -> Result<(), NodeError> {
		if self.unreachable {
			return Err(NodeError::Unreachable("connection refused".into()));
		}
		Ok(())
	}
}

/// An in-memory chain with a mempool that implements [ChainSource].
#[derive(Debug)]
pub struct MockNode {
	chain: Mutex<Chain>,
}

impl MockNode {
	/// A chain of empty blocks from genesis up to the given height.
	pub fn new(height: BlockHeight) -> MockNode {
		let mut chain = Chain {
			blocks: HashMap::new(),
			best: Vec::new(),
			mempool: HashMap::new(),
			send_errors: HashMap::new(),
			broadcasts: HashMap::new(),
			unreachable: false,
			fork: 0,
		};
		for _ in 0..=height {
			chain.connect(vec![]);
		}
		MockNode { chain: Mutex::new(chain) }
	}

	fn chain(&self) -> std::sync::MutexGuard<'_, Chain> {
		self.chain.lock().unwrap()
	}

	pub fn best_block(&self) -> BlockRef {
		let chain = self.chain();
		BlockRef { height: chain.tip_height(), hash: *chain.best.last().unwrap() }
	}

	/// Mine a block with exactly the given transactions.
	pub fn mine_block(&self, txs: Vec<Transaction>) -> BlockHash {
		self.chain().connect(txs)
	}

	/// Mine a block with everything in the mempool.
	pub fn mine_mempool(&self) -> BlockHash {
		let mut chain = self.chain();
		let txs = chain.mempool.values().cloned().collect();
		chain.connect(txs)
	}

	/// Replace the last `depth` blocks with `depth + 1` empty ones.
	///
	/// Transactions of the disconnected blocks are forgotten, they don't
	/// return to the mempool.
	pub fn reorg(&self, depth: usize) -> BlockHash {
		let mut chain = self.chain();
		let new_len = chain.best.len() - depth;
		chain.best.truncate(new_len);
		chain.fork += 1;
		for _ in 0..=depth {
			chain.connect(vec![]);
		}
		*chain.best.last().unwrap()
	}

	pub fn mempool_tx(&self, txid: &Txid) -> Option<Transaction> {
		self.chain().mempool.get(txid).cloned()
	}

	/// Number of times the tx was handed to [ChainSource::send_raw_transaction].
	pub fn broadcast_count(&self, txid: &Txid) -> usize {
		self.chain().broadcasts.get(txid).copied().unwrap_or(0)
	}

	/// Make the node reject the tx by policy.
	pub fn reject(&self, txid: Txid) {
		self.fail_send(txid, NodeError::Rejected("policy".into()));
	}

	/// Make sending the tx fail with the given error.
	pub fn fail_send(&self, txid: Txid, error: NodeError) {
		self.chain().send_errors.insert(txid, error);
	}

	pub fn set_unreachable(&self, unreachable: bool) {
		self.chain().unreachable = unreachable;
	}
}

impl ChainSource for MockNode {
	fn get_block(&self, hash: &BlockHash) -> Result<BlockData, NodeError> {
		let chain = self.chain();
		chain.check_reachable()?;
		let block = chain.blocks.get(hash).ok_or(NodeError::NotFound)?;
		Ok(BlockData {
			block_ref: BlockRef { height: block.height, hash: *hash },
			prev_hash: block.prev,
			txids: block.txs.iter().map(|tx| tx.compute_txid()).collect(),
			in_best_chain: chain.best.get(block.height as usize) == Some(hash),
		})
	}

	fn get_best_block_hash(&self) -> Result<BlockHash, NodeError> {
		let chain = self.chain();
		chain.check_reachable()?;
		Ok(*chain.best.last().unwrap())
	}

	fn get_block_count(&self) -> Result<BlockHeight, NodeError> {
		let chain = self.chain();
		chain.check_reachable()?;
		Ok(chain.tip_height())
	}

	fn get_block_hash(&self, height: BlockHeight) -> Result<BlockHash, NodeError> {
		let chain = self.chain();
		chain.check_reachable()?;
		chain.best.get(height as usize).copied().ok_or(NodeError::NotFound)
	}

	fn send_raw_transaction(&self, tx: &Transaction) -> Result<Txid, NodeError> {
		let mut chain = self.chain();
		chain.check_reachable()?;
		let txid = tx.compute_txid();
		*chain.broadcasts.entry(txid).or_insert(0) += 1;
		if let Some(e) = chain.send_errors.get(&txid) {
			return Err(e.clone());
		}
		if chain.confirmed_height(&txid).is_some() {
			return Err(NodeError::AlreadyInChain);
		}
		chain.mempool.insert(txid, tx.clone());
		Ok(txid)
	}

	fn get_raw_transaction(&self, txid: &Txid) -> Result<TxInfo, NodeError> {
		let chain = self.chain();
		chain.check_reachable()?;
		if let Some(height) = chain.confirmed_height(txid) {
			return Ok(TxInfo { confirmations: chain.tip_height() - height + 1 });
		}
		if chain.mempool.contains_key(txid) {
			return Ok(TxInfo { confirmations: 0 });
		}
		Err(NodeError::NotFound)
	}
}

#[test]
fn test_dummy_block_hash() {
	assert_eq!(
		dummy_block_hash(0xff, 0xabcdef).to_string(),
		"ff00000000000000000000000000000000000000000000000000000000abcdef",
	);
}

#[test]
fn mock_node_confirmations() {
	let node = MockNode::new(10);
	let tx = dummy_tx(1);
	let txid = tx.compute_txid();
	assert_eq!(node.get_raw_transaction(&txid), Err(NodeError::NotFound));

	node.send_raw_transaction(&tx).unwrap();
	assert_eq!(node.get_raw_transaction(&txid), Ok(TxInfo { confirmations: 0 }));

	node.mine_mempool();
	node.mine_block(vec![]);
	assert_eq!(node.get_raw_transaction(&txid), Ok(TxInfo { confirmations: 2 }));
	assert_eq!(node.send_raw_transaction(&tx), Err(NodeError::AlreadyInChain));

	node.reorg(2);
	assert_eq!(node.get_raw_transaction(&txid), Err(NodeError::NotFound));
}
