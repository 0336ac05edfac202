//!
//! JSON-RPC client for a bitcoind-compatible node.
//!
//! Wraps the handful of RPC methods the sync engine needs. All methods are async and designed
//! for use with Tokio; retries are layered on top by the caller.

use super::NodeRpc;
use super::types::*;

use bitcoin::{BlockHash, Transaction, Txid};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
	code: i64,
	message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
	result: Option<T>,
	error: Option<RpcErrorBody>,
}

/// bitcoind JSON-RPC client
pub struct BitcoindRpcClient {
	/// The underlying HTTP client.
	http_client: Client,
	rpc_url: String,
	user: Option<String>,
	password: Option<String>,
	next_id: AtomicU64,
}

impl BitcoindRpcClient {
	/// Create a new RPC client.
	///
	/// # Arguments
	/// * `rpc_url` - The HTTP endpoint of the node.
	/// * `user` / `password` - Optional basic auth credentials.
	pub fn new(
		rpc_url: String,
		user: Option<String>,
		password: Option<String>,
	) -> Result<Self, NodeError> {
		let http_client = Client::builder().timeout(Duration::from_secs(30)).build()?;

		Ok(Self {
			http_client,
			rpc_url,
			user,
			password,
			next_id: AtomicU64::new(0),
		})
	}

	/// Execute a JSON-RPC call and deserialize its `result`.
	pub async fn call<T: DeserializeOwned>(
		&self,
		method: &str,
		params: serde_json::Value,
	) -> Result<T, NodeError> {
		let request_body = json!({
			"jsonrpc": "1.0",
			"id": self.next_id.fetch_add(1, Ordering::Relaxed),
			"method": method,
			"params": params,
		});

		let mut request = self
			.http_client
			.post(&self.rpc_url)
			.header("Content-Type", "application/json")
			.json(&request_body);
		if let Some(user) = &self.user {
			request = request.basic_auth(user, self.password.as_ref());
		}

		debug!("RPC {} {}", method, params);
		let response = request.send().await?;
		let status = response.status();
		let body = response.text().await?;

		// bitcoind reports RPC failures with a JSON body and a non-2xx status
		match parse_response(method, &body) {
			Err(NodeError::JsonError(_)) if !status.is_success() => {
				Err(NodeError::HttpStatus(status.as_u16()))
			}
			other => other,
		}
	}
}

fn parse_response<T: DeserializeOwned>(method: &str, body: &str) -> Result<T, NodeError> {
	let response: RpcResponse<T> = serde_json::from_str(body)?;
	if let Some(error) = response.error {
		return Err(NodeError::RpcError {
			code: error.code,
			message: error.message,
		});
	}
	response
		.result
		.ok_or_else(|| NodeError::NoData(method.to_string()))
}

/// Decode a consensus-serialized transaction from hex
pub fn decode_transaction(raw_hex: &str) -> Result<Transaction, NodeError> {
	let bytes = hex::decode(raw_hex.trim()).map_err(|e| NodeError::DecodeError(e.to_string()))?;
	bitcoin::consensus::deserialize(&bytes).map_err(|e| NodeError::DecodeError(e.to_string()))
}

#[async_trait::async_trait]
impl NodeRpc for BitcoindRpcClient {
	async fn block_count(&self) -> Result<u64, NodeError> {
		self.call("getblockcount", json!([])).await
	}

	async fn block_hash(&self, height: u64) -> Result<BlockHash, NodeError> {
		self.call("getblockhash", json!([height])).await
	}

	async fn block(&self, hash: &BlockHash) -> Result<BlockInfo, NodeError> {
		self.call("getblock", json!([hash.to_string(), 1])).await
	}

	async fn raw_transaction(&self, txid: &Txid) -> Result<Transaction, NodeError> {
		let raw: String = self
			.call("getrawtransaction", json!([txid.to_string(), false]))
			.await?;
		decode_transaction(&raw)
	}

	async fn raw_mempool(&self) -> Result<Vec<Txid>, NodeError> {
		self.call("getrawmempool", json!([])).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_utils::plain_transaction;

	#[test]
	fn parses_result_and_error_bodies() {
		let count: u64 =
			parse_response("getblockcount", r#"{"result":620000,"error":null,"id":0}"#).unwrap();
		assert_eq!(count, 620_000);

		let err = parse_response::<String>(
			"getrawtransaction",
			r#"{"result":null,"error":{"code":-5,"message":"No such transaction"},"id":1}"#,
		)
		.unwrap_err();
		assert!(matches!(err, NodeError::RpcError { code: -5, .. }));

		let err = parse_response::<String>("getblockhash", r#"{"result":null,"error":null}"#)
			.unwrap_err();
		assert!(matches!(err, NodeError::NoData(method) if method == "getblockhash"));

		assert!(matches!(
			parse_response::<u64>("getblockcount", "<html>Unauthorized</html>"),
			Err(NodeError::JsonError(_))
		));
	}

	#[test]
	fn mempool_txids_parse_from_hex() {
		let txids: Vec<Txid> = parse_response(
			"getrawmempool",
			r#"{"result":["4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b"],"error":null}"#,
		)
		.unwrap();
		assert_eq!(txids.len(), 1);
	}

	#[test]
	fn raw_transactions_decode() {
		let tx = plain_transaction(7);
		let raw = bitcoin::consensus::encode::serialize_hex(&tx);
		assert_eq!(decode_transaction(&raw).unwrap(), tx);
		assert!(matches!(
			decode_transaction("zz"),
			Err(NodeError::DecodeError(_))
		));
		assert!(matches!(
			decode_transaction("0100"),
			Err(NodeError::DecodeError(_))
		));
	}
}
