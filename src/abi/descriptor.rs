//! Contract interface descriptors loaded from ABI description files.
//!
//! The description file is the standard contract ABI format: a JSON array of
//! entries, where event entries carry `{name, type: "event", inputs:
//! [{name, type, indexed}]}`. Only event entries matter for log decoding;
//! function entries are ignored. Descriptors are immutable values passed per
//! handler registration, so one engine instance can monitor several contracts
//! with different interfaces.

use crate::config::ConfigError;
use alloy_primitives::{B256, keccak256};
use serde::Deserialize;
use std::path::Path;

/// A decoded parameter type from the interface description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
	Address,
	Bool,
	/// `uintN`, N in bits.
	Uint(usize),
	/// `intN`, N in bits.
	Int(usize),
	/// `bytesN`, N in bytes (1..=32).
	FixedBytes(usize),
	Bytes,
	String,
}

impl ParamType {
	/// Parse a solidity type name. Array and tuple types are not emitted by
	/// the monitored contracts and are rejected at load time.
	pub fn parse(name: &str) -> Result<Self, ConfigError> {
		let unsupported = || ConfigError::UnsupportedType(name.to_string());

		match name {
			"address" => Ok(ParamType::Address),
			"bool" => Ok(ParamType::Bool),
			"bytes" => Ok(ParamType::Bytes),
			"string" => Ok(ParamType::String),
			"uint" => Ok(ParamType::Uint(256)),
			"int" => Ok(ParamType::Int(256)),
			_ => {
				if let Some(bits) = name.strip_prefix("uint") {
					let bits: usize = bits.parse().map_err(|_| unsupported())?;
					if bits == 0 || bits > 256 || bits % 8 != 0 {
						return Err(unsupported());
					}
					Ok(ParamType::Uint(bits))
				} else if let Some(bits) = name.strip_prefix("int") {
					let bits: usize = bits.parse().map_err(|_| unsupported())?;
					if bits == 0 || bits > 256 || bits % 8 != 0 {
						return Err(unsupported());
					}
					Ok(ParamType::Int(bits))
				} else if let Some(size) = name.strip_prefix("bytes") {
					let size: usize = size.parse().map_err(|_| unsupported())?;
					if size == 0 || size > 32 {
						return Err(unsupported());
					}
					Ok(ParamType::FixedBytes(size))
				} else {
					Err(unsupported())
				}
			}
		}
	}

	/// Canonical name used in event signature strings.
	pub fn canonical(&self) -> String {
		match self {
			ParamType::Address => "address".to_string(),
			ParamType::Bool => "bool".to_string(),
			ParamType::Uint(bits) => format!("uint{bits}"),
			ParamType::Int(bits) => format!("int{bits}"),
			ParamType::FixedBytes(size) => format!("bytes{size}"),
			ParamType::Bytes => "bytes".to_string(),
			ParamType::String => "string".to_string(),
		}
	}

	/// Whether values of this type are length-prefixed in the data payload
	/// rather than stored inline in a single word.
	pub fn is_dynamic(&self) -> bool {
		matches!(self, ParamType::Bytes | ParamType::String)
	}
}

/// One declared event parameter.
#[derive(Debug, Clone)]
pub struct EventParam {
	pub name: String,
	pub kind: ParamType,
	pub indexed: bool,
}

/// One event declared by a contract interface.
#[derive(Debug, Clone)]
pub struct EventDescriptor {
	name: String,
	inputs: Vec<EventParam>,
	/// Hash of the canonical signature, precomputed for topic matching.
	topic0: B256,
}

impl EventDescriptor {
	pub fn new(name: impl Into<String>, inputs: Vec<EventParam>) -> Self {
		let name = name.into();
		let signature = Self::signature_of(&name, &inputs);
		let topic0 = keccak256(signature.as_bytes());
		Self {
			name,
			inputs,
			topic0,
		}
	}

	fn signature_of(name: &str, inputs: &[EventParam]) -> String {
		let types: Vec<String> = inputs.iter().map(|input| input.kind.canonical()).collect();
		format!("{}({})", name, types.join(","))
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn inputs(&self) -> &[EventParam] {
		&self.inputs
	}

	/// Canonical signature string, e.g. `Transfer(address,address,uint256)`.
	pub fn signature(&self) -> String {
		Self::signature_of(&self.name, &self.inputs)
	}

	/// Hash of the canonical signature, matched against `topics[0]`.
	pub fn topic0(&self) -> B256 {
		self.topic0
	}
}

/// The set of events a contract exposes, loaded once at startup.
#[derive(Debug, Clone)]
pub struct ContractInterfaceDescriptor {
	events: Vec<EventDescriptor>,
}

#[derive(Deserialize)]
struct RawAbiEntry {
	#[serde(rename = "type")]
	kind: String,
	name: Option<String>,
	#[serde(default)]
	inputs: Vec<RawAbiInput>,
	#[serde(default)]
	anonymous: bool,
}

#[derive(Deserialize)]
struct RawAbiInput {
	#[serde(default)]
	name: String,
	#[serde(rename = "type")]
	kind: String,
	#[serde(default)]
	indexed: bool,
}

impl ContractInterfaceDescriptor {
	pub fn new(events: Vec<EventDescriptor>) -> Self {
		Self { events }
	}

	/// Load an interface description file from disk.
	pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
		let content = std::fs::read_to_string(path)?;
		Self::from_json(&content)
	}

	/// Parse an interface description from its JSON text.
	pub fn from_json(json: &str) -> Result<Self, ConfigError> {
		let entries: Vec<RawAbiEntry> = serde_json::from_str(json)
			.map_err(|e| ConfigError::MalformedInterface(e.to_string()))?;

		let mut events = Vec::new();
		for entry in entries {
			if entry.kind != "event" {
				continue;
			}
			// Anonymous events carry no signature topic and cannot be matched.
			if entry.anonymous {
				continue;
			}
			let name = entry.name.ok_or_else(|| {
				ConfigError::MalformedInterface("event entry is missing a name".to_string())
			})?;
			let inputs = entry
				.inputs
				.into_iter()
				.map(|input| {
					Ok(EventParam {
						name: input.name,
						kind: ParamType::parse(&input.kind)?,
						indexed: input.indexed,
					})
				})
				.collect::<Result<Vec<_>, ConfigError>>()?;
			events.push(EventDescriptor::new(name, inputs));
		}

		Ok(Self::new(events))
	}

	pub fn events(&self) -> &[EventDescriptor] {
		&self.events
	}

	/// Find the declared event whose signature hash equals `topic0`.
	pub fn event_by_topic(&self, topic0: &B256) -> Option<&EventDescriptor> {
		self.events.iter().find(|event| event.topic0() == *topic0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const TRANSFER_ABI: &str = r#"[
		{
			"type": "function",
			"name": "transfer",
			"inputs": [
				{"name": "to", "type": "address"},
				{"name": "value", "type": "uint256"}
			]
		},
		{
			"type": "event",
			"name": "Transfer",
			"anonymous": false,
			"inputs": [
				{"name": "from", "type": "address", "indexed": true},
				{"name": "to", "type": "address", "indexed": true},
				{"name": "value", "type": "uint256", "indexed": false}
			]
		}
	]"#;

	#[test]
	fn loads_events_and_ignores_functions() {
		let iface = ContractInterfaceDescriptor::from_json(TRANSFER_ABI).unwrap();
		assert_eq!(iface.events().len(), 1);

		let event = &iface.events()[0];
		assert_eq!(event.name(), "Transfer");
		assert_eq!(event.signature(), "Transfer(address,address,uint256)");
	}

	#[test]
	fn topic_hash_matches_signature_hash() {
		let iface = ContractInterfaceDescriptor::from_json(TRANSFER_ABI).unwrap();
		let event = &iface.events()[0];
		assert_eq!(
			event.topic0(),
			keccak256("Transfer(address,address,uint256)".as_bytes())
		);
		assert!(iface.event_by_topic(&event.topic0()).is_some());
		assert!(iface.event_by_topic(&B256::ZERO).is_none());
	}

	#[test]
	fn skips_anonymous_events() {
		let json = r#"[
			{
				"type": "event",
				"name": "Ping",
				"anonymous": true,
				"inputs": []
			}
		]"#;
		let iface = ContractInterfaceDescriptor::from_json(json).unwrap();
		assert!(iface.events().is_empty());
	}

	#[test]
	fn rejects_array_parameter_types() {
		let json = r#"[
			{
				"type": "event",
				"name": "Batch",
				"inputs": [{"name": "ids", "type": "uint256[]", "indexed": false}]
			}
		]"#;
		let result = ContractInterfaceDescriptor::from_json(json);
		assert!(matches!(result, Err(ConfigError::UnsupportedType(_))));
	}

	#[test]
	fn rejects_malformed_json() {
		let result = ContractInterfaceDescriptor::from_json("{not json");
		assert!(matches!(result, Err(ConfigError::MalformedInterface(_))));
	}

	#[test]
	fn parses_parameter_types() {
		assert_eq!(ParamType::parse("uint256").unwrap(), ParamType::Uint(256));
		assert_eq!(ParamType::parse("uint").unwrap(), ParamType::Uint(256));
		assert_eq!(ParamType::parse("int64").unwrap(), ParamType::Int(64));
		assert_eq!(
			ParamType::parse("bytes32").unwrap(),
			ParamType::FixedBytes(32)
		);
		assert!(ParamType::parse("uint7").is_err());
		assert!(ParamType::parse("bytes33").is_err());
		assert!(ParamType::parse("tuple").is_err());
	}
}
