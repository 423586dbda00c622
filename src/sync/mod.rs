//! Blockchain event synchronization.
//!
//! This module contains the long-running service that mirrors contract events
//! from the ledger into the application:
//!
//! - `engine`: the poll loop that fetches, decodes, and dispatches events and
//!   advances the durable checkpoint.
//! - `registry`: the per-contract handler registry consulted for each entry.
//! - `checkpoint`: durable storage for the last fully-processed block.
//!
//! The engine never misses or duplicates an event relative to its checkpoint:
//! the checkpoint only advances after every handler in a batch has completed,
//! so a failed batch is naturally re-fetched on the next poll. Handlers must
//! therefore tolerate re-delivery of the same event.

/// Durable checkpoint storage
mod checkpoint;
/// The polling and dispatch engine
mod engine;
/// Per-contract handler registry
mod registry;

pub use checkpoint::{CheckpointStore, FileCheckpointStore, LAST_BLOCK_KEY, PersistenceError};
pub use engine::{BlockParsedHook, EngineConfig, EngineState, EventSyncEngine};
pub use registry::{ContractEventHandler, EventRegistry, HandlerRegistration};

use crate::ledger::LedgerError;

/// Errors surfaced by the sync engine and its handlers.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
	#[error("ledger error: {0}")]
	Ledger(#[from] LedgerError),

	#[error("checkpoint error: {0}")]
	Persistence(#[from] PersistenceError),

	#[error("handler error: {0}")]
	Handler(String),

	#[error("event listener is already running")]
	AlreadyRunning,
}
