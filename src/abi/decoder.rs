//! Log entry decoding against a contract interface.
//!
//! Decoding is a pure function of the log entry and the interface descriptor:
//! the entry's signature topic is matched against every declared event, and on
//! a match the indexed values are taken from the remaining topics while the
//! non-indexed values are unpacked from the word-aligned data payload. An
//! entry whose signature matches no declared event is not an error; the
//! caller simply did not ask to decode it.

use super::descriptor::{ContractInterfaceDescriptor, EventDescriptor, EventParam, ParamType};
use crate::ledger::{BlockHeight, RawLogEntry};
use alloy_primitives::{Address, B256, Bytes, I256, U256};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// A decoded event argument value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
	Address(Address),
	Bool(bool),
	Uint(U256),
	Int(I256),
	/// `bytesN` values, and the topic hash standing in for a dynamic
	/// indexed argument.
	FixedBytes(Bytes),
	Bytes(Bytes),
	String(String),
}

impl fmt::Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Value::Address(address) => write!(f, "{address}"),
			Value::Bool(value) => write!(f, "{value}"),
			Value::Uint(value) => write!(f, "{value}"),
			Value::Int(value) => write!(f, "{value}"),
			Value::FixedBytes(bytes) => write!(f, "{bytes}"),
			Value::Bytes(bytes) => write!(f, "{bytes}"),
			Value::String(value) => write!(f, "{value}"),
		}
	}
}

/// A structured event decoded from a raw log entry.
#[derive(Debug, Clone, Serialize)]
pub struct DecodedEvent {
	/// Address of the emitting contract.
	pub contract: Address,
	/// Declared event name, e.g. `Transfer`.
	pub name: String,
	/// Canonical signature string, e.g. `Transfer(address,address,uint256)`.
	pub signature: String,
	/// Decoded argument values keyed by declared parameter name.
	pub arguments: BTreeMap<String, Value>,
	/// Block the event was emitted in.
	pub source_block: BlockHeight,
	/// Hash of the emitting transaction.
	pub source_tx: B256,
	/// When this process observed the event.
	pub observed_at: DateTime<Utc>,
}

/// Errors raised while decoding a single matching log entry. Per-entry only;
/// the caller logs the entry and continues with the rest of the batch.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
	#[error("expected {expected} indexed topics, found {found}")]
	TopicCountMismatch { expected: usize, found: usize },

	#[error("data payload too short: need {needed} bytes, have {have}")]
	DataOutOfBounds { needed: usize, have: usize },

	#[error("dynamic value offset or length does not fit in the payload")]
	InvalidDynamicWord,

	#[error("invalid utf-8 in string argument: {0}")]
	InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// Decode a raw log entry against a contract interface.
///
/// Returns `Ok(None)` when the entry's signature topic matches no event
/// declared by `iface`, and `Err` when a matching entry is malformed. Either
/// way the entry is skipped by the caller; only a successful decode reaches a
/// handler.
pub fn decode(
	entry: &RawLogEntry,
	iface: &ContractInterfaceDescriptor,
) -> Result<Option<DecodedEvent>, DecodeError> {
	// Anonymous logs carry no signature topic and cannot match anything.
	let Some(topic0) = entry.topics.first() else {
		return Ok(None);
	};

	match iface.event_by_topic(topic0) {
		Some(event) => decode_event(entry, event).map(Some),
		None => Ok(None),
	}
}

fn decode_event(entry: &RawLogEntry, event: &EventDescriptor) -> Result<DecodedEvent, DecodeError> {
	let indexed: Vec<&EventParam> = event.inputs().iter().filter(|p| p.indexed).collect();
	let non_indexed: Vec<&EventParam> = event.inputs().iter().filter(|p| !p.indexed).collect();

	let found = entry.topics.len() - 1;
	if found != indexed.len() {
		return Err(DecodeError::TopicCountMismatch {
			expected: indexed.len(),
			found,
		});
	}

	let mut arguments = BTreeMap::new();

	for (param, topic) in indexed.iter().zip(&entry.topics[1..]) {
		arguments.insert(param.name.clone(), decode_topic(&param.kind, topic));
	}

	let data = entry.data.as_ref();
	for (slot, param) in non_indexed.iter().enumerate() {
		let head = word(data, slot * 32)?;
		let value = if param.kind.is_dynamic() {
			let offset = word_to_usize(&head)?;
			decode_dynamic(&param.kind, data, offset)?
		} else {
			decode_static(&param.kind, &head)
		};
		arguments.insert(param.name.clone(), value);
	}

	Ok(DecodedEvent {
		contract: entry.address,
		name: event.name().to_string(),
		signature: event.signature(),
		arguments,
		source_block: entry.block_number,
		source_tx: entry.transaction_hash,
		observed_at: Utc::now(),
	})
}

/// Decode an indexed argument from its topic word. Dynamic indexed values are
/// stored on chain as their hash, so the 32-byte topic is surfaced verbatim.
fn decode_topic(kind: &ParamType, topic: &B256) -> Value {
	if kind.is_dynamic() {
		Value::FixedBytes(Bytes::copy_from_slice(topic.as_slice()))
	} else {
		decode_static(kind, &topic.0)
	}
}

fn decode_static(kind: &ParamType, word: &[u8; 32]) -> Value {
	match kind {
		ParamType::Address => Value::Address(Address::from_slice(&word[12..])),
		ParamType::Bool => Value::Bool(word[31] != 0),
		ParamType::Uint(_) => Value::Uint(U256::from_be_bytes(*word)),
		ParamType::Int(_) => Value::Int(I256::from_raw(U256::from_be_bytes(*word))),
		ParamType::FixedBytes(size) => Value::FixedBytes(Bytes::copy_from_slice(&word[..*size])),
		// Dynamic kinds never reach here; decode_event routes them through
		// decode_dynamic or decode_topic.
		ParamType::Bytes | ParamType::String => Value::Bytes(Bytes::copy_from_slice(word)),
	}
}

fn decode_dynamic(kind: &ParamType, data: &[u8], offset: usize) -> Result<Value, DecodeError> {
	let length = word_to_usize(&word(data, offset)?)?;
	let start = offset + 32;
	let end = start
		.checked_add(length)
		.ok_or(DecodeError::InvalidDynamicWord)?;
	let bytes = data.get(start..end).ok_or(DecodeError::DataOutOfBounds {
		needed: end,
		have: data.len(),
	})?;

	match kind {
		ParamType::String => Ok(Value::String(String::from_utf8(bytes.to_vec())?)),
		_ => Ok(Value::Bytes(Bytes::copy_from_slice(bytes))),
	}
}

fn word(data: &[u8], offset: usize) -> Result<[u8; 32], DecodeError> {
	let end = offset
		.checked_add(32)
		.ok_or(DecodeError::InvalidDynamicWord)?;
	let slice = data.get(offset..end).ok_or(DecodeError::DataOutOfBounds {
		needed: end,
		have: data.len(),
	})?;
	let mut word = [0u8; 32];
	word.copy_from_slice(slice);
	Ok(word)
}

fn word_to_usize(word: &[u8; 32]) -> Result<usize, DecodeError> {
	let value = U256::from_be_bytes(*word);
	let value: u64 = value
		.try_into()
		.map_err(|_| DecodeError::InvalidDynamicWord)?;
	usize::try_from(value).map_err(|_| DecodeError::InvalidDynamicWord)
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::keccak256;

	fn transfer_interface() -> ContractInterfaceDescriptor {
		ContractInterfaceDescriptor::new(vec![EventDescriptor::new(
			"Transfer",
			vec![
				EventParam {
					name: "from".to_string(),
					kind: ParamType::Address,
					indexed: true,
				},
				EventParam {
					name: "to".to_string(),
					kind: ParamType::Address,
					indexed: true,
				},
				EventParam {
					name: "value".to_string(),
					kind: ParamType::Uint(256),
					indexed: false,
				},
			],
		)])
	}

	fn address_topic(address: Address) -> B256 {
		let mut word = [0u8; 32];
		word[12..].copy_from_slice(address.as_slice());
		B256::from(word)
	}

	fn transfer_entry(from: Address, to: Address, value: u64) -> RawLogEntry {
		RawLogEntry {
			address: Address::repeat_byte(0xaa),
			topics: vec![
				keccak256("Transfer(address,address,uint256)".as_bytes()),
				address_topic(from),
				address_topic(to),
			],
			data: Bytes::from(U256::from(value).to_be_bytes::<32>().to_vec()),
			block_number: 42,
			transaction_hash: B256::repeat_byte(0x11),
		}
	}

	#[test]
	fn decodes_transfer_round_trip() {
		let iface = transfer_interface();
		let from = Address::repeat_byte(0x01);
		let to = Address::repeat_byte(0x02);
		let entry = transfer_entry(from, to, 1000);

		let event = decode(&entry, &iface).unwrap().expect("event matches");
		assert_eq!(event.name, "Transfer");
		assert_eq!(event.signature, "Transfer(address,address,uint256)");
		assert_eq!(event.source_block, 42);
		assert_eq!(event.arguments["from"], Value::Address(from));
		assert_eq!(event.arguments["to"], Value::Address(to));
		assert_eq!(event.arguments["value"], Value::Uint(U256::from(1000u64)));
	}

	#[test]
	fn unknown_signature_is_not_an_error() {
		let iface = transfer_interface();
		let mut entry = transfer_entry(Address::ZERO, Address::ZERO, 1);
		entry.topics[0] = keccak256("Approval(address,address,uint256)".as_bytes());

		assert!(decode(&entry, &iface).unwrap().is_none());
	}

	#[test]
	fn anonymous_log_is_not_an_error() {
		let iface = transfer_interface();
		let mut entry = transfer_entry(Address::ZERO, Address::ZERO, 1);
		entry.topics.clear();

		assert!(decode(&entry, &iface).unwrap().is_none());
	}

	#[test]
	fn topic_count_mismatch_is_a_decode_error() {
		let iface = transfer_interface();
		let mut entry = transfer_entry(Address::ZERO, Address::ZERO, 1);
		entry.topics.pop();

		let result = decode(&entry, &iface);
		assert!(matches!(
			result,
			Err(DecodeError::TopicCountMismatch {
				expected: 2,
				found: 1
			})
		));
	}

	#[test]
	fn truncated_data_is_a_decode_error() {
		let iface = transfer_interface();
		let mut entry = transfer_entry(Address::ZERO, Address::ZERO, 1);
		entry.data = Bytes::from(vec![0u8; 16]);

		assert!(matches!(
			decode(&entry, &iface),
			Err(DecodeError::DataOutOfBounds { .. })
		));
	}

	#[test]
	fn decodes_dynamic_string_argument() {
		let iface = ContractInterfaceDescriptor::new(vec![EventDescriptor::new(
			"ClaimRegistered",
			vec![
				EventParam {
					name: "id".to_string(),
					kind: ParamType::Uint(256),
					indexed: false,
				},
				EventParam {
					name: "topic".to_string(),
					kind: ParamType::String,
					indexed: false,
				},
			],
		)]);

		// head: id word, offset word; tail: length word + padded bytes
		let mut data = Vec::new();
		data.extend_from_slice(&U256::from(7u64).to_be_bytes::<32>());
		data.extend_from_slice(&U256::from(64u64).to_be_bytes::<32>());
		data.extend_from_slice(&U256::from(5u64).to_be_bytes::<32>());
		let mut text = b"hello".to_vec();
		text.resize(32, 0);
		data.extend_from_slice(&text);

		let entry = RawLogEntry {
			address: Address::repeat_byte(0xaa),
			topics: vec![iface.events()[0].topic0()],
			data: Bytes::from(data),
			block_number: 9,
			transaction_hash: B256::repeat_byte(0x22),
		};

		let event = decode(&entry, &iface).unwrap().expect("event matches");
		assert_eq!(event.arguments["id"], Value::Uint(U256::from(7u64)));
		assert_eq!(event.arguments["topic"], Value::String("hello".to_string()));
	}

	#[test]
	fn indexed_dynamic_argument_surfaces_the_topic_hash() {
		let iface = ContractInterfaceDescriptor::new(vec![EventDescriptor::new(
			"Tagged",
			vec![EventParam {
				name: "tag".to_string(),
				kind: ParamType::String,
				indexed: true,
			}],
		)]);

		let tag_hash = keccak256(b"some tag value");
		let entry = RawLogEntry {
			address: Address::repeat_byte(0xaa),
			topics: vec![iface.events()[0].topic0(), tag_hash],
			data: Bytes::new(),
			block_number: 3,
			transaction_hash: B256::repeat_byte(0x33),
		};

		let event = decode(&entry, &iface).unwrap().expect("event matches");
		assert_eq!(
			event.arguments["tag"],
			Value::FixedBytes(Bytes::copy_from_slice(tag_hash.as_slice()))
		);
	}

	#[test]
	fn decodes_bool_and_fixed_bytes() {
		let iface = ContractInterfaceDescriptor::new(vec![EventDescriptor::new(
			"StatusChanged",
			vec![
				EventParam {
					name: "active".to_string(),
					kind: ParamType::Bool,
					indexed: false,
				},
				EventParam {
					name: "digest".to_string(),
					kind: ParamType::FixedBytes(32),
					indexed: false,
				},
			],
		)]);

		let digest = B256::repeat_byte(0x5a);
		let mut data = Vec::new();
		data.extend_from_slice(&U256::from(1u64).to_be_bytes::<32>());
		data.extend_from_slice(digest.as_slice());

		let entry = RawLogEntry {
			address: Address::repeat_byte(0xaa),
			topics: vec![iface.events()[0].topic0()],
			data: Bytes::from(data),
			block_number: 1,
			transaction_hash: B256::repeat_byte(0x44),
		};

		let event = decode(&entry, &iface).unwrap().expect("event matches");
		assert_eq!(event.arguments["active"], Value::Bool(true));
		assert_eq!(
			event.arguments["digest"],
			Value::FixedBytes(Bytes::copy_from_slice(digest.as_slice()))
		);
	}
}
