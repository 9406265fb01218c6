//! Contract-call input encoding.
//!
//! Produces the hex `input` for `contract_call`: a 4-byte function selector
//! followed by the standard head/tail argument layout (32-byte words,
//! dynamic values referenced by offset from the start of the enclosing
//! tuple). Values wider than 128 bits are not representable here.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

const WORD: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbiError {
	#[error("invalid hex: {0}")]
	InvalidHex(String),

	#[error("selector must be exactly 4 bytes, got {0}")]
	InvalidSelector(usize),

	#[error("call targets selector {found}, expected {expected}")]
	SelectorMismatch { expected: Selector, found: Selector },

	#[error("unknown ABI type {0:?}")]
	UnknownType(String),

	#[error("cannot parse {value:?} as {ty}")]
	InvalidValue { ty: String, value: String },

	#[error("value does not fit in {0}")]
	OutOfRange(String),

	#[error("expected {expected} arguments, got {found}")]
	ArityMismatch { expected: usize, found: usize },

	#[error("expected a {expected} value, got {found}")]
	TypeMismatch { expected: String, found: String },

	#[error("input ended at byte {0}")]
	TooShort(usize),

	#[error("offset or length {0} points outside the input")]
	OutOfBounds(u128),

	#[error("invalid encoding for {0}")]
	BadPadding(String),

	#[error("string is not valid UTF-8")]
	InvalidUtf8,
}

pub type Result<T> = std::result::Result<T, AbiError>;

// -- Selector --

/// The first four bytes of a call's input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Selector(pub [u8; 4]);

impl FromStr for Selector {
	type Err = AbiError;

	fn from_str(s: &str) -> Result<Self> {
		let bytes = decode_hex(s)?;
		let arr: [u8; 4] = bytes
			.as_slice()
			.try_into()
			.map_err(|_| AbiError::InvalidSelector(bytes.len()))?;
		Ok(Self(arr))
	}
}

impl fmt::Display for Selector {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x{}", hex::encode(self.0))
	}
}

// -- Types --

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiType {
	/// `uintN`, N a multiple of 8 in 8..=256.
	Uint(usize),
	Address,
	Bool,
	/// `bytesN`, N in 1..=32.
	FixedBytes(usize),
	Bytes,
	String,
	/// `T[]`
	Array(Box<AbiType>),
}

impl AbiType {
	pub fn is_dynamic(&self) -> bool {
		matches!(self, Self::Bytes | Self::String | Self::Array(_))
	}
}

impl FromStr for AbiType {
	type Err = AbiError;

	fn from_str(s: &str) -> Result<Self> {
		let s = s.trim();
		let unknown = || AbiError::UnknownType(s.to_owned());

		if let Some(inner) = s.strip_suffix("[]") {
			return Ok(Self::Array(Box::new(inner.parse()?)));
		}

		match s {
			"address" => return Ok(Self::Address),
			"bool" => return Ok(Self::Bool),
			"bytes" => return Ok(Self::Bytes),
			"string" => return Ok(Self::String),
			"uint" => return Ok(Self::Uint(256)),
			_ => {}
		}

		if let Some(bits) = s.strip_prefix("uint") {
			let bits: usize = bits.parse().map_err(|_| unknown())?;
			if bits == 0 || bits > 256 || bits % 8 != 0 {
				return Err(unknown());
			}
			return Ok(Self::Uint(bits));
		}
		if let Some(len) = s.strip_prefix("bytes") {
			let len: usize = len.parse().map_err(|_| unknown())?;
			if len == 0 || len > WORD {
				return Err(unknown());
			}
			return Ok(Self::FixedBytes(len));
		}
		Err(unknown())
	}
}

impl fmt::Display for AbiType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Uint(bits) => write!(f, "uint{bits}"),
			Self::Address => f.write_str("address"),
			Self::Bool => f.write_str("bool"),
			Self::FixedBytes(n) => write!(f, "bytes{n}"),
			Self::Bytes => f.write_str("bytes"),
			Self::String => f.write_str("string"),
			Self::Array(inner) => write!(f, "{inner}[]"),
		}
	}
}

// -- Values --

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiValue {
	Uint(u128),
	Address([u8; 20]),
	Bool(bool),
	FixedBytes(Vec<u8>),
	Bytes(Vec<u8>),
	String(String),
	Array(Vec<AbiValue>),
}

impl AbiValue {
	pub fn is_dynamic(&self) -> bool {
		matches!(self, Self::Bytes(_) | Self::String(_) | Self::Array(_))
	}

	/// Short description of the value's shape, for error messages.
	fn describe(&self) -> String {
		match self {
			Self::Uint(_) => "uint".into(),
			Self::Address(_) => "address".into(),
			Self::Bool(_) => "bool".into(),
			Self::FixedBytes(b) => format!("{}-byte fixed bytes", b.len()),
			Self::Bytes(_) => "bytes".into(),
			Self::String(_) => "string".into(),
			Self::Array(_) => "array".into(),
		}
	}

	/// Parse a `0x`-prefixed 20-byte address.
	pub fn address(s: &str) -> Result<Self> {
		let bytes = decode_hex(s)?;
		let arr: [u8; 20] = bytes.as_slice().try_into().map_err(|_| AbiError::InvalidValue {
			ty: "address".into(),
			value: s.to_owned(),
		})?;
		Ok(Self::Address(arr))
	}

	/// Parse a textual argument as the given type.
	///
	/// Integers accept decimal or `0x` hex; arrays are written
	/// `[a,b,c]` and do not nest. Strings are taken verbatim.
	pub fn parse(ty: &AbiType, text: &str) -> Result<Self> {
		let raw = text;
		let text = text.trim();
		let invalid = || AbiError::InvalidValue {
			ty: ty.to_string(),
			value: text.to_owned(),
		};

		match ty {
			AbiType::Uint(bits) => {
				let v = match text.strip_prefix("0x") {
					Some(h) => u128::from_str_radix(h, 16),
					None => text.parse::<u128>(),
				}
				.map_err(|_| invalid())?;
				check_uint(*bits, v)?;
				Ok(Self::Uint(v))
			}
			AbiType::Address => Self::address(text),
			AbiType::Bool => match text {
				"true" => Ok(Self::Bool(true)),
				"false" => Ok(Self::Bool(false)),
				_ => Err(invalid()),
			},
			AbiType::FixedBytes(n) => {
				let bytes = decode_hex(text)?;
				if bytes.len() != *n {
					return Err(invalid());
				}
				Ok(Self::FixedBytes(bytes))
			}
			AbiType::Bytes => Ok(Self::Bytes(decode_hex(text)?)),
			AbiType::String => Ok(Self::String(raw.to_owned())),
			AbiType::Array(inner) => {
				let body = text
					.strip_prefix('[')
					.and_then(|t| t.strip_suffix(']'))
					.ok_or_else(invalid)?;
				if body.trim().is_empty() {
					return Ok(Self::Array(Vec::new()));
				}
				body.split(',')
					.map(|item| Self::parse(inner, item))
					.collect::<Result<Vec<_>>>()
					.map(Self::Array)
			}
		}
	}

	/// Convert a JSON value captured from a response into an argument.
	pub fn from_json(ty: &AbiType, value: &serde_json::Value) -> Result<Self> {
		use serde_json::Value;
		match (ty, value) {
			(AbiType::Uint(bits), Value::Number(n)) => {
				let v = n.as_u64().ok_or_else(|| AbiError::InvalidValue {
					ty: ty.to_string(),
					value: n.to_string(),
				})?;
				check_uint(*bits, v as u128)?;
				Ok(Self::Uint(v as u128))
			}
			(AbiType::Bool, Value::Bool(b)) => Ok(Self::Bool(*b)),
			(AbiType::Array(inner), Value::Array(items)) => items
				.iter()
				.map(|item| Self::from_json(inner, item))
				.collect::<Result<Vec<_>>>()
				.map(Self::Array),
			(_, Value::String(s)) => Self::parse(ty, s),
			(_, other) => Err(AbiError::InvalidValue {
				ty: ty.to_string(),
				value: other.to_string(),
			}),
		}
	}
}

fn check_uint(bits: usize, v: u128) -> Result<()> {
	if bits < 128 && v >> bits != 0 {
		return Err(AbiError::OutOfRange(format!("uint{bits}")));
	}
	Ok(())
}

// -- Encoding --

/// Encode a call: selector followed by the arguments, as bare lowercase hex.
///
/// Every argument is checked against its type first, so the result always
/// decodes back to `args` under `types`.
pub fn encode(selector: Selector, types: &[AbiType], args: &[AbiValue]) -> Result<String> {
	check_all(types, args)?;
	let mut out = selector.0.to_vec();
	out.extend(encode_tuple(args));
	Ok(hex::encode(out))
}

/// Encode arguments without a selector, e.g. for return data.
pub fn encode_args(types: &[AbiType], args: &[AbiValue]) -> Result<String> {
	check_all(types, args)?;
	Ok(hex::encode(encode_tuple(args)))
}

fn check_all(types: &[AbiType], args: &[AbiValue]) -> Result<()> {
	if types.len() != args.len() {
		return Err(AbiError::ArityMismatch {
			expected: types.len(),
			found: args.len(),
		});
	}
	types.iter().zip(args).try_for_each(|(ty, v)| check(ty, v))
}

/// Check that `value` is representable as `ty`.
pub fn check(ty: &AbiType, value: &AbiValue) -> Result<()> {
	match (ty, value) {
		(AbiType::Uint(bits), AbiValue::Uint(v)) => check_uint(*bits, *v),
		(AbiType::Address, AbiValue::Address(_))
		| (AbiType::Bool, AbiValue::Bool(_))
		| (AbiType::Bytes, AbiValue::Bytes(_))
		| (AbiType::String, AbiValue::String(_)) => Ok(()),
		(AbiType::FixedBytes(n), AbiValue::FixedBytes(bytes)) if bytes.len() == *n => Ok(()),
		(AbiType::Array(inner), AbiValue::Array(items)) => {
			items.iter().try_for_each(|item| check(inner, item))
		}
		_ => Err(AbiError::TypeMismatch {
			expected: ty.to_string(),
			found: value.describe(),
		}),
	}
}

fn encode_tuple(values: &[AbiValue]) -> Vec<u8> {
	let head_len = values.len() * WORD;
	let mut head = Vec::with_capacity(head_len);
	let mut tail = Vec::new();

	for value in values {
		if value.is_dynamic() {
			head.extend(uint_word((head_len + tail.len()) as u128));
			tail.extend(encode_dynamic(value));
		} else {
			head.extend(encode_static(value));
		}
	}

	head.extend(tail);
	head
}

fn encode_static(value: &AbiValue) -> [u8; WORD] {
	match value {
		AbiValue::Uint(v) => uint_word(*v),
		AbiValue::Bool(b) => uint_word(*b as u128),
		AbiValue::Address(addr) => {
			let mut word = [0u8; WORD];
			word[12..].copy_from_slice(addr);
			word
		}
		AbiValue::FixedBytes(bytes) => {
			// Length already checked against bytesN, N <= 32.
			let mut word = [0u8; WORD];
			word[..bytes.len()].copy_from_slice(bytes);
			word
		}
		AbiValue::Bytes(_) | AbiValue::String(_) | AbiValue::Array(_) => {
			unreachable!("dynamic values are encoded in the tail")
		}
	}
}

fn encode_dynamic(value: &AbiValue) -> Vec<u8> {
	match value {
		AbiValue::Bytes(bytes) => encode_byte_string(bytes),
		AbiValue::String(s) => encode_byte_string(s.as_bytes()),
		AbiValue::Array(items) => {
			let mut out = uint_word(items.len() as u128).to_vec();
			out.extend(encode_tuple(items));
			out
		}
		_ => encode_static(value).to_vec(),
	}
}

fn encode_byte_string(bytes: &[u8]) -> Vec<u8> {
	let padded = bytes.len().div_ceil(WORD) * WORD;
	let mut out = Vec::with_capacity(WORD + padded);
	out.extend(uint_word(bytes.len() as u128));
	out.extend_from_slice(bytes);
	out.resize(WORD + padded, 0);
	out
}

fn uint_word(v: u128) -> [u8; WORD] {
	let mut word = [0u8; WORD];
	word[16..].copy_from_slice(&v.to_be_bytes());
	word
}

// -- Decoding --

/// Decode call input produced by [`encode`], checking the selector.
pub fn decode_call(expected: Selector, types: &[AbiType], input: &str) -> Result<Vec<AbiValue>> {
	let bytes = decode_hex(input)?;
	if bytes.len() < 4 {
		return Err(AbiError::TooShort(bytes.len()));
	}
	let found = Selector([bytes[0], bytes[1], bytes[2], bytes[3]]);
	if found != expected {
		return Err(AbiError::SelectorMismatch { expected, found });
	}
	decode_tuple(types, &bytes[4..])
}

/// Decode selector-less data such as a call's return value.
pub fn decode_args(types: &[AbiType], data: &str) -> Result<Vec<AbiValue>> {
	decode_tuple(types, &decode_hex(data)?)
}

fn decode_tuple(types: &[AbiType], data: &[u8]) -> Result<Vec<AbiValue>> {
	types
		.iter()
		.enumerate()
		.map(|(i, ty)| {
			let head = read_word(data, i * WORD)?;
			if ty.is_dynamic() {
				let offset = word_to_usize(&head)?;
				let region = data
					.get(offset..)
					.ok_or(AbiError::OutOfBounds(offset as u128))?;
				decode_dynamic(ty, region)
			} else {
				decode_static(ty, &head)
			}
		})
		.collect()
}

fn decode_static(ty: &AbiType, word: &[u8; WORD]) -> Result<AbiValue> {
	let bad = || AbiError::BadPadding(ty.to_string());
	match ty {
		AbiType::Uint(bits) => {
			if word[..16].iter().any(|b| *b != 0) {
				return Err(AbiError::OutOfRange(ty.to_string()));
			}
			let mut low = [0u8; 16];
			low.copy_from_slice(&word[16..]);
			let v = u128::from_be_bytes(low);
			check_uint(*bits, v)?;
			Ok(AbiValue::Uint(v))
		}
		AbiType::Bool => match word_to_usize(word) {
			Ok(0) => Ok(AbiValue::Bool(false)),
			Ok(1) => Ok(AbiValue::Bool(true)),
			_ => Err(bad()),
		},
		AbiType::Address => {
			if word[..12].iter().any(|b| *b != 0) {
				return Err(bad());
			}
			let mut addr = [0u8; 20];
			addr.copy_from_slice(&word[12..]);
			Ok(AbiValue::Address(addr))
		}
		AbiType::FixedBytes(n) => {
			if word[*n..].iter().any(|b| *b != 0) {
				return Err(bad());
			}
			Ok(AbiValue::FixedBytes(word[..*n].to_vec()))
		}
		AbiType::Bytes | AbiType::String | AbiType::Array(_) => {
			unreachable!("dynamic types are decoded through their offset")
		}
	}
}

fn decode_dynamic(ty: &AbiType, data: &[u8]) -> Result<AbiValue> {
	let len = word_to_usize(&read_word(data, 0)?)?;
	let body = &data[WORD..];

	match ty {
		AbiType::Bytes | AbiType::String => {
			let bytes = body.get(..len).ok_or(AbiError::OutOfBounds(len as u128))?;
			if matches!(ty, AbiType::Bytes) {
				Ok(AbiValue::Bytes(bytes.to_vec()))
			} else {
				String::from_utf8(bytes.to_vec())
					.map(AbiValue::String)
					.map_err(|_| AbiError::InvalidUtf8)
			}
		}
		AbiType::Array(inner) => {
			// Every element occupies at least one head word.
			if len > body.len() / WORD {
				return Err(AbiError::OutOfBounds(len as u128));
			}
			let types = vec![(**inner).clone(); len];
			decode_tuple(&types, body).map(AbiValue::Array)
		}
		_ => decode_static(ty, &read_word(data, 0)?),
	}
}

fn read_word(data: &[u8], at: usize) -> Result<[u8; WORD]> {
	data.get(at..at + WORD)
		.and_then(|w| w.try_into().ok())
		.ok_or(AbiError::TooShort(data.len()))
}

fn word_to_usize(word: &[u8; WORD]) -> Result<usize> {
	let mut low = [0u8; 16];
	low.copy_from_slice(&word[16..]);
	let v = u128::from_be_bytes(low);
	if word[..16].iter().any(|b| *b != 0) || v > usize::MAX as u128 {
		return Err(AbiError::OutOfBounds(v));
	}
	Ok(v as usize)
}

fn decode_hex(s: &str) -> Result<Vec<u8>> {
	let clean = s.strip_prefix("0x").unwrap_or(s);
	hex::decode(clean).map_err(|e| AbiError::InvalidHex(e.to_string()))
}
