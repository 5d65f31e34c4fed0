
use std::borrow::Borrow;

use bitcoin::{BlockHash, Txid};
use serde::{self, Deserialize, Serialize};

use bdk_bitcoind_rpc::bitcoincore_rpc::{jsonrpc, Auth, Client, Error, Result as RpcResult, RpcApi};

pub use bdk_bitcoind_rpc::bitcoincore_rpc;


/// Error code for RPC_INVALID_ADDRESS_OR_KEY, used when a tx is not found.
pub const RPC_INVALID_ADDRESS_OR_KEY: i32 = -5;

/// Error code for RPC_DESERIALIZATION_ERROR.
pub const RPC_DESERIALIZATION_ERROR: i32 = -22;

/// Error code for RPC_VERIFY_ERROR.
pub const RPC_VERIFY_ERROR: i32 = -25;

/// Error code for RPC_VERIFY_REJECTED.
pub const RPC_VERIFY_REJECTED: i32 = -26;

/// Error code for RPC_VERIFY_ALREADY_IN_UTXO_SET.
pub const RPC_VERIFY_ALREADY_IN_UTXO_SET: i32 = -27;

/// Clonable bitcoind rpc client.
#[derive(Debug)]
pub struct BitcoinRpcClient {
	client: Client,
	url: String,
	auth: Auth,
}

impl BitcoinRpcClient {
	pub fn new(url: &str, auth: Auth) -> Result<Self, Error> {
		Ok(BitcoinRpcClient {
			client: Client::new(url, auth.clone())?,
			url: url.to_owned(),
			auth: auth,
		})
	}
}

impl RpcApi for BitcoinRpcClient {
	fn call<T: for<'a> serde::de::Deserialize<'a>>(
		&self, cmd: &str, args: &[serde_json::Value],
	) -> Result<T, Error> {
		self.client.call(cmd, args)
	}
}

impl Clone for BitcoinRpcClient {
	fn clone(&self) -> Self {
		// Client::new only fails on a malformed cookie file, which we already read once.
		Self::new(&self.url, self.auth.clone()).expect("client was constructed before")
	}
}

/// The subset of `getrawtransaction` verbose output we care about.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct RawTransactionInfo {
	pub txid: Txid,
	pub blockhash: Option<BlockHash>,
	/// Absent for mempool transactions.
	pub confirmations: Option<u32>,
	pub in_active_chain: Option<bool>,
}

pub trait BitcoinRpcErrorExt: Borrow<Error> {
	/// The RPC error code, if this is an error returned by bitcoind.
	fn rpc_error_code(&self) -> Option<i32> {
		if let Error::JsonRpc(jsonrpc::Error::Rpc(e)) = self.borrow() {
			Some(e.code)
		} else {
			None
		}
	}

	/// Whether this error indicates that the tx was not found.
	fn is_not_found(&self) -> bool {
		self.rpc_error_code() == Some(RPC_INVALID_ADDRESS_OR_KEY)
	}

	/// Whether this error indicates that the tx is already in the utxo set.
	fn is_in_utxo_set(&self) -> bool {
		self.rpc_error_code() == Some(RPC_VERIFY_ALREADY_IN_UTXO_SET)
	}

	fn is_rejected(&self) -> bool {
		self.rpc_error_code() == Some(RPC_VERIFY_REJECTED)
	}

	fn is_verify_error(&self) -> bool {
		self.rpc_error_code() == Some(RPC_VERIFY_ERROR)
	}

	fn is_deserialization_error(&self) -> bool {
		self.rpc_error_code() == Some(RPC_DESERIALIZATION_ERROR)
	}

	fn is_already_in_mempool(&self) -> bool {
		if let Error::JsonRpc(jsonrpc::Error::Rpc(e)) = self.borrow() {
			e.message.contains("txn-already-in-mempool")
		} else {
			false
		}
	}

	/// Whether we failed to reach bitcoind at all.
	fn is_connection_error(&self) -> bool {
		match self.borrow() {
			Error::JsonRpc(jsonrpc::Error::Transport(_)) => true,
			Error::Io(_) => true,
			_ => false,
		}
	}
}
impl BitcoinRpcErrorExt for Error {}

pub trait BitcoinRpcExt: RpcApi {
	fn custom_get_raw_transaction_info(
		&self,
		txid: &Txid,
	) -> RpcResult<Option<RawTransactionInfo>> {
		let args = [serde_json::to_value(txid)?, serde_json::Value::Bool(true)];
		match self.call("getrawtransaction", &args) {
			Ok(ret) => Ok(Some(ret)),
			Err(e) if e.is_not_found() => Ok(None),
			Err(e) => Err(e),
		}
	}
}

impl <T: RpcApi> BitcoinRpcExt for T {}
