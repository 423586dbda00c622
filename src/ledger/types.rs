//! Types for the ledger node JSON-RPC adapter.

use alloy_primitives::{Address, B256, Bytes};
use serde::Deserialize;

/// Position in the ledger's canonical chain.
pub type BlockHeight = u64;

/// A raw log entry as reported by the ledger node.
///
/// `topics[0]` is the hash of the emitted event's signature; the remaining
/// topics hold the values of the event's indexed parameters. `data` carries
/// the ABI-encoded non-indexed parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLogEntry {
	/// Address of the contract that emitted the log.
	pub address: Address,
	/// Ordered topic words; empty for anonymous events.
	pub topics: Vec<B256>,
	/// ABI-encoded non-indexed argument payload.
	pub data: Bytes,
	/// Block the log was emitted in.
	#[serde(deserialize_with = "quantity::deserialize")]
	pub block_number: BlockHeight,
	/// Hash of the transaction that emitted the log.
	pub transaction_hash: B256,
}

/// Error types for ledger node operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
	/// Connectivity or timeout failure talking to the node. Retryable.
	#[error("network error: {0}")]
	Network(#[from] reqwest::Error),

	/// The node responded with an RPC error or data the client cannot parse.
	#[error("node error: {0}")]
	Node(String),

	/// The requested block is unknown to the node.
	#[error("block {0} not found on the node")]
	BlockNotFound(BlockHeight),
}

/// Serde support for the `0x`-prefixed hex quantities the node reports.
pub(crate) mod quantity {
	use serde::{Deserialize, Deserializer, de::Error};

	pub(crate) fn parse(value: &str) -> Result<u64, String> {
		let digits = value
			.strip_prefix("0x")
			.ok_or_else(|| format!("quantity '{value}' is missing the 0x prefix"))?;
		u64::from_str_radix(digits, 16).map_err(|e| format!("invalid quantity '{value}': {e}"))
	}

	pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
	where
		D: Deserializer<'de>,
	{
		let value = String::deserialize(deserializer)?;
		parse(&value).map_err(D::Error::custom)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_log_entry_from_node_json() {
		let json = r#"{
			"address": "0x5fbdb2315678afecb367f032d93f642f64180aa3",
			"topics": [
				"0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
			],
			"data": "0x0000000000000000000000000000000000000000000000000000000000000001",
			"blockNumber": "0x10",
			"transactionHash": "0x6c3ff22fcc8a9533e01b1b1d4e2e45eab8a87b2f1d2c68e077b1886537b973e2",
			"logIndex": "0x0",
			"removed": false
		}"#;

		let entry: RawLogEntry = serde_json::from_str(json).expect("log entry parses");
		assert_eq!(entry.block_number, 16);
		assert_eq!(entry.topics.len(), 1);
		assert_eq!(entry.data.len(), 32);
	}

	#[test]
	fn rejects_quantity_without_prefix() {
		assert!(quantity::parse("10").is_err());
		assert!(quantity::parse("0xzz").is_err());
		assert_eq!(quantity::parse("0x2a").unwrap(), 42);
	}
}
