//! Ledger node integration module.
//!
//! This module provides the client and types for talking to an Ethereum-style
//! ledger node over JSON-RPC. The node exposes historical event logs and block
//! lookups, which the sync engine consumes to mirror contract events into the
//! application.

/// JSON-RPC client for the ledger node
mod client;
/// Type definitions for ledger data structures
mod types;

pub use client::{JsonRpcLedgerClient, LedgerClient};
pub use types::*;
