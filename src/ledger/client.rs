//! JSON-RPC client for the ledger node.
//!
//! This module provides an async client for querying event logs and block
//! metadata from an Ethereum-style node. The client performs no local retry;
//! rescheduling after a failure is the sync engine's responsibility, which
//! keeps this boundary thin and testable via a fake implementation.

use super::types::{BlockHeight, LedgerError, RawLogEntry, quantity};
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

/// Capability the sync engine uses to observe the remote ledger.
#[async_trait::async_trait]
pub trait LedgerClient: Send + Sync {
	/// Fetch all events from `from_block` through the node's current head,
	/// inclusive, in the node-reported order.
	async fn fetch_events(&self, from_block: BlockHeight) -> Result<Vec<RawLogEntry>, LedgerError>;

	/// Fetch the timestamp of a block.
	async fn fetch_block_timestamp(
		&self,
		block: BlockHeight,
	) -> Result<DateTime<Utc>, LedgerError>;

	/// Fetch the node's current head block number.
	async fn fetch_head_block(&self) -> Result<BlockHeight, LedgerError>;
}

/// JSON-RPC implementation of [`LedgerClient`] backed by `reqwest`.
pub struct JsonRpcLedgerClient {
	/// The underlying HTTP client for JSON-RPC calls.
	http_client: Client,
	/// The node's JSON-RPC HTTP endpoint.
	rpc_url: String,
}

impl JsonRpcLedgerClient {
	/// Create a new client for the given RPC endpoint. Every call is bounded
	/// by `request_timeout` so a hung node cannot stall the engine.
	pub fn new(rpc_url: String, request_timeout: Duration) -> Self {
		let http_client = Client::builder()
			.timeout(request_timeout)
			.build()
			.expect("Failed to create HTTP client");

		Self {
			http_client,
			rpc_url,
		}
	}

	/// Execute a single JSON-RPC call and return its `result` field.
	async fn call(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
		let request_body = json!({
			"jsonrpc": "2.0",
			"id": 1,
			"method": method,
			"params": params,
		});

		debug!("Calling {} on {}", method, self.rpc_url);

		let response = self
			.http_client
			.post(&self.rpc_url)
			.json(&request_body)
			.send()
			.await?;

		if !response.status().is_success() {
			return Err(LedgerError::Node(format!(
				"HTTP error from node: {}",
				response.status()
			)));
		}

		let envelope: Value = response.json().await?;

		if let Some(error) = envelope.get("error") {
			return Err(LedgerError::Node(format!("RPC error: {error}")));
		}

		envelope
			.get("result")
			.cloned()
			.ok_or_else(|| LedgerError::Node("response is missing the result field".to_string()))
	}
}

#[async_trait::async_trait]
impl LedgerClient for JsonRpcLedgerClient {
	async fn fetch_events(&self, from_block: BlockHeight) -> Result<Vec<RawLogEntry>, LedgerError> {
		let result = self
			.call(
				"eth_getLogs",
				json!([{
					"fromBlock": format!("0x{from_block:x}"),
					"toBlock": "latest",
				}]),
			)
			.await?;

		serde_json::from_value(result)
			.map_err(|e| LedgerError::Node(format!("malformed log entries: {e}")))
	}

	async fn fetch_block_timestamp(
		&self,
		block: BlockHeight,
	) -> Result<DateTime<Utc>, LedgerError> {
		let result = self
			.call(
				"eth_getBlockByNumber",
				json!([format!("0x{block:x}"), false]),
			)
			.await?;

		if result.is_null() {
			return Err(LedgerError::BlockNotFound(block));
		}

		let raw_timestamp = result
			.get("timestamp")
			.and_then(|t| t.as_str())
			.ok_or_else(|| LedgerError::Node("block is missing a timestamp".to_string()))?;

		let seconds = quantity::parse(raw_timestamp).map_err(LedgerError::Node)?;

		Utc.timestamp_opt(seconds as i64, 0)
			.single()
			.ok_or_else(|| LedgerError::Node(format!("timestamp {seconds} is out of range")))
	}

	async fn fetch_head_block(&self) -> Result<BlockHeight, LedgerError> {
		let result = self.call("eth_blockNumber", json!([])).await?;

		let raw = result
			.as_str()
			.ok_or_else(|| LedgerError::Node("block number is not a string".to_string()))?;

		quantity::parse(raw).map_err(LedgerError::Node)
	}
}
