//! Contract interface descriptions and event log decoding.
//!
//! A contract's interface description lists the events it can emit, each with
//! a name and an ordered, typed parameter list. The decoder matches raw log
//! entries against those declarations by signature hash and unpacks the typed
//! argument values.

/// Log entry decoding against a contract interface
mod decoder;
/// Interface descriptors and their parameter types
mod descriptor;

pub use decoder::{DecodeError, DecodedEvent, Value, decode};
pub use descriptor::{ContractInterfaceDescriptor, EventDescriptor, EventParam, ParamType};
