//! Blockchain event synchronization engine.
//!
//! The engine is a single logical worker that repeatedly asks the ledger node
//! for events past its checkpoint, decodes and timestamps them, dispatches
//! each to the registered per-contract handler in ledger order, and persists
//! the new checkpoint. A non-empty batch triggers an almost immediate re-poll
//! to drain backlogs quickly; an empty batch or any failure reschedules after
//! the fixed inter-poll delay. The checkpoint only advances after a batch is
//! fully dispatched, so failed batches are re-fetched on the next poll and
//! delivery is at-least-once.

use super::checkpoint::{CheckpointStore, LAST_BLOCK_KEY};
use super::registry::{ContractEventHandler, EventRegistry};
use super::SyncError;
use crate::abi::{ContractInterfaceDescriptor, decode};
use crate::ledger::{BlockHeight, LedgerClient, RawLogEntry};
use alloy_primitives::Address;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Callback invoked with the new checkpoint value after each successful
/// persist. Failures are logged and never affect engine state.
pub type BlockParsedHook =
	Arc<dyn Fn(BlockHeight) -> BoxFuture<'static, Result<(), SyncError>> + Send + Sync>;

/// Observable engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
	/// Waiting for the next scheduled poll.
	Idle,
	/// Awaiting the ledger node's event response.
	Polling,
	/// Decoding and dispatching a batch.
	Processing,
	/// Shut down via [`EventSyncEngine::stop`].
	Stopped,
}

/// Engine tuning parameters.
#[derive(Debug, Clone)]
pub struct EngineConfig {
	/// Delay between polls when no progress was made, for both the
	/// empty-batch and the failure case. There is no exponential backoff.
	pub poll_interval: Duration,
	/// Delay before the next poll after a batch made progress.
	pub catchup_delay: Duration,
	/// Start block used when no valid checkpoint is stored.
	pub default_start_block: BlockHeight,
	/// Key the checkpoint is stored under.
	pub checkpoint_key: String,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			poll_interval: Duration::from_secs(15),
			catchup_delay: Duration::from_millis(1),
			default_start_block: 0,
			checkpoint_key: LAST_BLOCK_KEY.to_string(),
		}
	}
}

/// Outcome of one poll iteration, determining the next poll's delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollOutcome {
	/// At least one event was dispatched and the checkpoint advanced.
	Progress(BlockHeight),
	/// The node reported no events past the checkpoint.
	NoNewEvents,
	/// The iteration was aborted; the checkpoint was not persisted.
	Failed,
}

/// Long-running poll loop that mirrors contract events into the application.
pub struct EventSyncEngine {
	client: Arc<dyn LedgerClient>,
	checkpoints: Arc<dyn CheckpointStore>,
	registry: EventRegistry,
	config: EngineConfig,
	state: Mutex<EngineState>,
	running: AtomicBool,
	next_block: AtomicU64,
	on_block_parsed: Mutex<Option<BlockParsedHook>>,
	shutdown: watch::Sender<bool>,
}

impl EventSyncEngine {
	pub fn new(
		client: Arc<dyn LedgerClient>,
		checkpoints: Arc<dyn CheckpointStore>,
		config: EngineConfig,
	) -> Self {
		let (shutdown, _) = watch::channel(false);
		Self {
			client,
			checkpoints,
			registry: EventRegistry::new(),
			config,
			state: Mutex::new(EngineState::Idle),
			running: AtomicBool::new(false),
			next_block: AtomicU64::new(0),
			on_block_parsed: Mutex::new(None),
			shutdown,
		}
	}

	/// Register the handler for a contract. Replaces any previous
	/// registration for the same address.
	pub fn set_handler(
		&self,
		contract: Address,
		interface: Arc<ContractInterfaceDescriptor>,
		handler: Arc<dyn ContractEventHandler>,
	) {
		self.registry.register(contract, interface, handler);
	}

	/// Remove the handler for a contract.
	pub fn remove_handler(&self, contract: &Address) -> bool {
		self.registry.unregister(contract)
	}

	/// Set the callback invoked after each successful checkpoint persist.
	pub fn set_on_block_parsed(&self, hook: BlockParsedHook) {
		*self.on_block_parsed.lock().unwrap() = Some(hook);
	}

	/// Current engine state.
	pub fn state(&self) -> EngineState {
		*self.state.lock().unwrap()
	}

	/// Last fully-processed block as seen by this instance.
	pub fn next_block(&self) -> BlockHeight {
		self.next_block.load(Ordering::SeqCst)
	}

	/// Begin the poll loop. Loads the checkpoint, then spawns the loop task.
	///
	/// Rejected with [`SyncError::AlreadyRunning`] while a loop is active, so
	/// a second concurrent loop can never be spawned. A checkpoint read
	/// failure here is fatal: without a trusted resume point the engine must
	/// not start polling.
	pub async fn start(self: &Arc<Self>) -> Result<JoinHandle<()>, SyncError> {
		if self.running.swap(true, Ordering::SeqCst) {
			return Err(SyncError::AlreadyRunning);
		}
		self.shutdown.send_replace(false);

		let start_block = match self.load_start_block().await {
			Ok(block) => block,
			Err(e) => {
				self.running.store(false, Ordering::SeqCst);
				return Err(e);
			}
		};

		self.next_block.store(start_block, Ordering::SeqCst);
		*self.state.lock().unwrap() = EngineState::Idle;

		info!(
			"[Event listener] starting, resuming after block {}",
			start_block
		);

		let engine = Arc::clone(self);
		Ok(tokio::spawn(async move { engine.run(start_block).await }))
	}

	/// Request shutdown. Honored at the inter-poll wait; an in-flight batch
	/// finishes (or fails) normally, so a partial checkpoint is never
	/// persisted.
	pub fn stop(&self) {
		let _ = self.shutdown.send(true);
	}

	async fn load_start_block(&self) -> Result<BlockHeight, SyncError> {
		match self.checkpoints.get(&self.config.checkpoint_key).await? {
			Some(block) => Ok(block),
			None => {
				info!(
					"No stored checkpoint, falling back to configured start block {}",
					self.config.default_start_block
				);
				Ok(self.config.default_start_block)
			}
		}
	}

	async fn run(self: Arc<Self>, start_block: BlockHeight) {
		let mut shutdown = self.shutdown.subscribe();
		let mut next_block = start_block;

		loop {
			if *shutdown.borrow() {
				break;
			}

			let outcome = self.poll_once(&mut next_block).await;
			let delay = match outcome {
				PollOutcome::Progress(_) => self.config.catchup_delay,
				PollOutcome::NoNewEvents | PollOutcome::Failed => self.config.poll_interval,
			};

			self.set_state(EngineState::Idle);

			tokio::select! {
				_ = tokio::time::sleep(delay) => {}
				_ = shutdown.changed() => break,
			}
		}

		self.set_state(EngineState::Stopped);
		self.running.store(false, Ordering::SeqCst);
		info!("[Event listener] stopped, last event in block {}", next_block);
	}

	/// One full poll iteration: fetch, dispatch, persist.
	async fn poll_once(&self, next_block: &mut BlockHeight) -> PollOutcome {
		self.set_state(EngineState::Polling);

		let events = match self.client.fetch_events(*next_block + 1).await {
			Ok(events) => events,
			Err(e) => {
				error!("[Event listener] poll failed: {}", e);
				return PollOutcome::Failed;
			}
		};

		if events.is_empty() {
			info!(
				"[Event listener] no new events, last event in block {}",
				next_block
			);
			return PollOutcome::NoNewEvents;
		}

		self.set_state(EngineState::Processing);

		match self.process_batch(&events).await {
			Ok(Some(last_block)) => {
				// Advance in memory before persisting: if the write fails the
				// handlers' side effects already happened and only a restart
				// re-delivers the batch.
				*next_block = last_block;
				self.next_block.store(last_block, Ordering::SeqCst);

				if let Err(e) = self
					.checkpoints
					.set(&self.config.checkpoint_key, last_block)
					.await
				{
					error!(
						"[Event listener] checkpoint write failed after dispatch, \
						 blocks up to {} will be re-delivered on restart: {}",
						last_block, e
					);
					return PollOutcome::Failed;
				}

				self.notify_block_parsed(last_block).await;

				info!(
					"[Event listener] new events, last event in block {}",
					last_block
				);
				PollOutcome::Progress(last_block)
			}
			Ok(None) => {
				// Every entry came from an unmonitored contract.
				info!(
					"[Event listener] no new events, last event in block {}",
					next_block
				);
				PollOutcome::NoNewEvents
			}
			Err(e) => {
				error!(
					"[Event listener] batch aborted, will retry from block {}: {}",
					*next_block + 1,
					e
				);
				PollOutcome::Failed
			}
		}
	}

	/// Dispatch a batch in ledger order. Returns the highest source block
	/// among entries that had a registered handler, or `None` when the whole
	/// batch was unmonitored.
	async fn process_batch(
		&self,
		events: &[RawLogEntry],
	) -> Result<Option<BlockHeight>, SyncError> {
		let mut timestamps: HashMap<BlockHeight, String> = HashMap::new();
		let mut last_handled: Option<BlockHeight> = None;

		for entry in events {
			let Some(registration) = self.registry.lookup(&entry.address) else {
				debug!(
					"Skipping log from unmonitored contract {} in block {}",
					entry.address, entry.block_number
				);
				continue;
			};

			let time = match timestamps.get(&entry.block_number) {
				Some(time) => time.clone(),
				None => {
					let timestamp = self
						.client
						.fetch_block_timestamp(entry.block_number)
						.await?;
					let time = timestamp.to_rfc3339();
					timestamps.insert(entry.block_number, time.clone());
					time
				}
			};

			match decode(entry, &registration.interface) {
				Ok(Some(event)) => {
					debug!(
						"Dispatching {} from block {} to handler {}",
						event.signature,
						entry.block_number,
						registration.handler.name()
					);
					registration
						.handler
						.handle(&event, &time, entry.address)
						.await?;
				}
				Ok(None) => {
					debug!(
						"No declared event matches log in block {} from {}, skipping",
						entry.block_number, entry.address
					);
				}
				Err(e) => {
					warn!(
						"Failed to decode log in block {} from {}: {}; entry skipped",
						entry.block_number, entry.address, e
					);
				}
			}

			last_handled = Some(match last_handled {
				Some(block) => block.max(entry.block_number),
				None => entry.block_number,
			});
		}

		Ok(last_handled)
	}

	async fn notify_block_parsed(&self, block: BlockHeight) {
		let hook = self.on_block_parsed.lock().unwrap().clone();
		if let Some(hook) = hook {
			if let Err(e) = hook(block).await {
				error!("on_block_parsed hook failed: {}", e);
			}
		}
	}

	fn set_state(&self, state: EngineState) {
		*self.state.lock().unwrap() = state;
	}
}
