
pub mod rpc;
pub mod serde;

use std::fmt;

use bitcoin::BlockHash;


/// Type representing a block height in the bitcoin blockchain.
pub type BlockHeight = u32;

/// A block identified by both its height and its hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, ::serde::Serialize, ::serde::Deserialize)]
pub struct BlockRef {
	pub height: BlockHeight,
	pub hash: BlockHash,
}

impl BlockRef {
	pub fn new(height: BlockHeight, hash: BlockHash) -> BlockRef {
		BlockRef { height, hash }
	}
}

impl fmt::Display for BlockRef {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}:{}", self.height, self.hash)
	}
}
