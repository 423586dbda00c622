//! Service configuration loaded from the environment.
//!
//! Wiring values the event listener needs at startup: the node endpoint, the
//! monitored contract, where its interface description lives, and the polling
//! parameters. The fallback start block is an explicit value rather than a
//! baked-in constant so one build serves any deployment.

use alloy_primitives::Address;
use std::path::PathBuf;
use std::time::Duration;

/// Default inter-poll delay, matching the ledger's expected block time.
const DEFAULT_POLL_INTERVAL_MS: u64 = 15_000;

/// Default bound on each network call to the node.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Errors raised while loading configuration or interface descriptions.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("missing required variable {0}")]
	MissingVar(&'static str),

	#[error("invalid value for {name}: {message}")]
	InvalidVar {
		name: &'static str,
		message: String,
	},

	#[error("failed to read interface description: {0}")]
	Io(#[from] std::io::Error),

	#[error("malformed interface description: {0}")]
	MalformedInterface(String),

	#[error("unsupported parameter type '{0}' in interface description")]
	UnsupportedType(String),
}

/// Configuration for the event synchronization service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
	/// JSON-RPC endpoint of the ledger node.
	pub rpc_url: String,
	/// Address of the monitored contract.
	pub contract_address: Address,
	/// Path to the contract's interface description file.
	pub contract_abi_path: PathBuf,
	/// Directory holding the checkpoint file.
	pub data_dir: PathBuf,
	/// Delay between polls when no progress was made.
	pub poll_interval: Duration,
	/// Start block used when no valid checkpoint is stored.
	pub default_start_block: u64,
	/// Bound on each network call to the node.
	pub request_timeout: Duration,
}

impl ServiceConfig {
	/// Load the configuration from process environment variables.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_vars(|name| std::env::var(name).ok())
	}

	/// Load the configuration from an arbitrary variable lookup.
	pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
		let rpc_url = lookup("RPC_URL").ok_or(ConfigError::MissingVar("RPC_URL"))?;

		let contract_address = lookup("CONTRACT_ADDRESS")
			.ok_or(ConfigError::MissingVar("CONTRACT_ADDRESS"))?
			.parse::<Address>()
			.map_err(|e| ConfigError::InvalidVar {
				name: "CONTRACT_ADDRESS",
				message: e.to_string(),
			})?;

		let data_dir = lookup("DATA_DIR")
			.map(PathBuf::from)
			.unwrap_or_else(|| PathBuf::from("data"));

		// The interface description path defaults to a file named after the
		// contract address, the same convention the node tooling emits.
		let contract_abi_path = lookup("CONTRACT_ABI_PATH")
			.map(PathBuf::from)
			.unwrap_or_else(|| data_dir.join(format!("{contract_address}.json")));

		let poll_interval_ms = parse_or_default(&lookup, "POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)?;
		let default_start_block = parse_or_default(&lookup, "DEFAULT_START_BLOCK", 0)?;
		let request_timeout_secs =
			parse_or_default(&lookup, "REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?;

		Ok(Self {
			rpc_url,
			contract_address,
			contract_abi_path,
			data_dir,
			poll_interval: Duration::from_millis(poll_interval_ms),
			default_start_block,
			request_timeout: Duration::from_secs(request_timeout_secs),
		})
	}
}

fn parse_or_default(
	lookup: &impl Fn(&str) -> Option<String>,
	name: &'static str,
	default: u64,
) -> Result<u64, ConfigError> {
	match lookup(name) {
		Some(value) => value.parse::<u64>().map_err(|e| ConfigError::InvalidVar {
			name,
			message: e.to_string(),
		}),
		None => Ok(default),
	}
}
