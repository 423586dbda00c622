mod abi;
mod config;
mod ledger;
mod sync;

use crate::abi::{ContractInterfaceDescriptor, DecodedEvent};
use crate::config::ServiceConfig;
use crate::ledger::{JsonRpcLedgerClient, LedgerClient};
use crate::sync::{
	BlockParsedHook, ContractEventHandler, EngineConfig, EventSyncEngine, FileCheckpointStore,
	SyncError,
};
use alloy_primitives::Address;
use std::process;
use std::sync::Arc;
use tracing::{error, info};

/// Handler that logs every decoded event argument by argument, the default
/// sink when no application-specific handler is wired in.
struct DebugEventHandler;

#[async_trait::async_trait]
impl ContractEventHandler for DebugEventHandler {
	async fn handle(
		&self,
		event: &DecodedEvent,
		time: &str,
		contract: Address,
	) -> Result<(), SyncError> {
		info!("--------------------------------------------------");
		info!("Event:    {}", event.signature);
		info!("Contract: {}", contract);
		info!("Block:    {}", event.source_block);
		info!("Tx:       {}", event.source_tx);
		info!("Time:     {}", time);
		for (name, value) in &event.arguments {
			info!("  {}: {}", name, value);
		}
		Ok(())
	}

	fn name(&self) -> &'static str {
		"DebugEventHandler"
	}
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env()
				.add_directive(tracing::Level::INFO.into()),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	info!("Starting event sync service");

	let config = match ServiceConfig::from_env() {
		Ok(config) => config,
		Err(e) => {
			error!("Invalid configuration: {}", e);
			process::exit(1);
		}
	};

	let interface = match ContractInterfaceDescriptor::from_file(&config.contract_abi_path) {
		Ok(interface) => Arc::new(interface),
		Err(e) => {
			error!(
				"Failed to load interface description from {}: {}",
				config.contract_abi_path.display(),
				e
			);
			process::exit(1);
		}
	};

	info!(
		"Loaded {} event definitions for contract {}",
		interface.events().len(),
		config.contract_address
	);

	let client = Arc::new(JsonRpcLedgerClient::new(
		config.rpc_url.clone(),
		config.request_timeout,
	));

	// A dead node at startup is not fatal: the engine keeps polling and the
	// node may come up later.
	match client.fetch_head_block().await {
		Ok(head) => info!("Connected to {}, head block {}", config.rpc_url, head),
		Err(e) => error!("Ledger node unreachable at startup: {}", e),
	}

	let checkpoints = Arc::new(FileCheckpointStore::new(
		config.data_dir.join("checkpoints.json"),
	));

	let engine = Arc::new(EventSyncEngine::new(
		client,
		checkpoints,
		EngineConfig {
			poll_interval: config.poll_interval,
			default_start_block: config.default_start_block,
			..EngineConfig::default()
		},
	));

	engine.set_handler(
		config.contract_address,
		interface,
		Arc::new(DebugEventHandler),
	);

	let hook: BlockParsedHook = Arc::new(|block| {
		Box::pin(async move {
			info!("Checkpoint advanced to block {}", block);
			Ok(())
		})
	});
	engine.set_on_block_parsed(hook);

	let handle = match engine.start().await {
		Ok(handle) => handle,
		Err(e) => {
			error!("Failed to start event listener: {}", e);
			process::exit(1);
		}
	};

	info!(
		"Watching contract {} every {} ms",
		config.contract_address,
		config.poll_interval.as_millis()
	);

	if let Err(e) = tokio::signal::ctrl_c().await {
		error!("Failed to listen for shutdown signal: {}", e);
	}

	info!("Shutdown requested");
	engine.stop();
	if let Err(e) = handle.await {
		error!("Event listener task failed: {}", e);
	}
}
