//! Per-contract handler registry for event dispatch.
//!
//! The registry maps a contract address to the interface used to decode its
//! logs and the handler invoked for each decoded event. Registrations can be
//! added and removed at runtime; the last registration for an address wins.

use super::SyncError;
use crate::abi::{ContractInterfaceDescriptor, DecodedEvent};
use alloy_primitives::Address;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Trait for handling decoded contract events.
///
/// Handlers are invoked strictly sequentially by the engine and must be
/// idempotent: a batch whose checkpoint write failed is re-delivered after
/// the next restart.
#[async_trait::async_trait]
pub trait ContractEventHandler: Send + Sync {
	/// Handle one decoded event. `time` is the RFC 3339 timestamp of the
	/// event's source block.
	async fn handle(
		&self,
		event: &DecodedEvent,
		time: &str,
		contract: Address,
	) -> Result<(), SyncError>;

	/// Get the name of this handler for logging and diagnostics.
	fn name(&self) -> &'static str;
}

/// One registered contract: its address, decode interface, and handler.
#[derive(Clone)]
pub struct HandlerRegistration {
	pub address: Address,
	pub interface: Arc<ContractInterfaceDescriptor>,
	pub handler: Arc<dyn ContractEventHandler>,
}

/// In-memory mapping from contract address to handler registration.
#[derive(Default)]
pub struct EventRegistry {
	handlers: RwLock<HashMap<Address, HandlerRegistration>>,
}

impl EventRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Register a handler for a contract. Replaces any previous registration
	/// for the same address.
	pub fn register(
		&self,
		address: Address,
		interface: Arc<ContractInterfaceDescriptor>,
		handler: Arc<dyn ContractEventHandler>,
	) {
		let registration = HandlerRegistration {
			address,
			interface,
			handler,
		};
		self.handlers.write().unwrap().insert(address, registration);
	}

	/// Remove the registration for a contract. Returns whether one existed.
	pub fn unregister(&self, address: &Address) -> bool {
		self.handlers.write().unwrap().remove(address).is_some()
	}

	/// Look up the registration for a contract.
	pub fn lookup(&self, address: &Address) -> Option<HandlerRegistration> {
		self.handlers.read().unwrap().get(address).cloned()
	}

	pub fn len(&self) -> usize {
		self.handlers.read().unwrap().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	struct NamedHandler(&'static str);

	#[async_trait::async_trait]
	impl ContractEventHandler for NamedHandler {
		async fn handle(
			&self,
			_event: &DecodedEvent,
			_time: &str,
			_contract: Address,
		) -> Result<(), SyncError> {
			Ok(())
		}

		fn name(&self) -> &'static str {
			self.0
		}
	}

	fn empty_interface() -> Arc<ContractInterfaceDescriptor> {
		Arc::new(ContractInterfaceDescriptor::new(Vec::new()))
	}

	#[test]
	fn register_lookup_unregister() {
		let registry = EventRegistry::new();
		let address = Address::repeat_byte(0x01);

		assert!(registry.lookup(&address).is_none());

		registry.register(address, empty_interface(), Arc::new(NamedHandler("first")));
		assert_eq!(registry.len(), 1);
		assert_eq!(registry.lookup(&address).unwrap().handler.name(), "first");

		assert!(registry.unregister(&address));
		assert!(!registry.unregister(&address));
		assert!(registry.is_empty());
	}

	#[test]
	fn last_registration_wins() {
		let registry = EventRegistry::new();
		let address = Address::repeat_byte(0x02);

		registry.register(address, empty_interface(), Arc::new(NamedHandler("first")));
		registry.register(address, empty_interface(), Arc::new(NamedHandler("second")));

		assert_eq!(registry.len(), 1);
		assert_eq!(registry.lookup(&address).unwrap().handler.name(), "second");
	}
}
