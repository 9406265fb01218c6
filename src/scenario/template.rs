use std::collections::BTreeMap;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::abi::{self, AbiError, AbiType, AbiValue, Selector};

/// Values captured from earlier steps, by binding name.
pub type Bindings = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
	#[error("binding {0:?} has not been captured")]
	Unresolved(String),

	#[error("binding {binding:?} cannot be used as an ABI argument: {source}")]
	Abi {
		binding: String,
		#[source]
		source: AbiError,
	},

	#[error("call input cannot be encoded: {0}")]
	Encode(#[source] AbiError),
}

impl ResolveError {
	/// The binding at fault, if any.
	pub fn binding(&self) -> Option<&str> {
		match self {
			Self::Unresolved(b) | Self::Abi { binding: b, .. } => Some(b),
			Self::Encode(_) => None,
		}
	}
}

/// A request parameter that may refer to values captured earlier.
#[derive(Debug, Clone, PartialEq)]
pub enum Template {
	Literal(Value),
	/// Replaced by the captured value, unchanged.
	Binding(String),
	Object(BTreeMap<String, Template>),
	Array(Vec<Template>),
	/// Contract-call input encoded at run time, so arguments may be bindings.
	AbiCall { selector: Selector, args: Vec<AbiArg> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum AbiArg {
	Value { ty: AbiType, value: AbiValue },
	Binding { name: String, ty: AbiType },
}

impl AbiArg {
	/// A literal argument, checked against its type.
	pub fn value(ty: AbiType, value: AbiValue) -> Result<Self, AbiError> {
		abi::check(&ty, &value)?;
		Ok(Self::Value { ty, value })
	}

	/// A literal parsed from text, e.g. an address string.
	pub fn parse(ty: AbiType, text: &str) -> Result<Self, AbiError> {
		let value = AbiValue::parse(&ty, text)?;
		Ok(Self::Value { ty, value })
	}

	pub fn bound(name: impl Into<String>, ty: AbiType) -> Self {
		Self::Binding {
			name: name.into(),
			ty,
		}
	}

	pub fn ty(&self) -> &AbiType {
		match self {
			Self::Value { ty, .. } | Self::Binding { ty, .. } => ty,
		}
	}
}

impl Template {
	pub fn binding(name: impl Into<String>) -> Self {
		Self::Binding(name.into())
	}

	pub fn abi_call(selector: Selector, args: impl IntoIterator<Item = AbiArg>) -> Self {
		Self::AbiCall {
			selector,
			args: args.into_iter().collect(),
		}
	}

	/// Every binding this template reads, in order of appearance.
	pub fn bindings(&self) -> Vec<&str> {
		let mut out = Vec::new();
		self.collect_bindings(&mut out);
		out
	}

	fn collect_bindings<'a>(&'a self, out: &mut Vec<&'a str>) {
		match self {
			Self::Literal(_) => {}
			Self::Binding(name) => out.push(name),
			Self::Object(fields) => fields.values().for_each(|t| t.collect_bindings(out)),
			Self::Array(items) => items.iter().for_each(|t| t.collect_bindings(out)),
			Self::AbiCall { args, .. } => {
				for arg in args {
					if let AbiArg::Binding { name, .. } = arg {
						out.push(name);
					}
				}
			}
		}
	}

	pub fn resolve(&self, bindings: &Bindings) -> Result<Value, ResolveError> {
		match self {
			Self::Literal(v) => Ok(v.clone()),
			Self::Binding(name) => lookup(bindings, name).cloned(),
			Self::Object(fields) => resolve_fields(fields, bindings).map(Value::Object),
			Self::Array(items) => items
				.iter()
				.map(|t| t.resolve(bindings))
				.collect::<Result<Vec<_>, _>>()
				.map(Value::Array),
			Self::AbiCall { selector, args } => {
				let types: Vec<AbiType> = args.iter().map(|arg| arg.ty().clone()).collect();
				let values = args
					.iter()
					.map(|arg| match arg {
						AbiArg::Value { value, .. } => Ok(value.clone()),
						AbiArg::Binding { name, ty } => {
							let captured = lookup(bindings, name)?;
							AbiValue::from_json(ty, captured).map_err(|source| ResolveError::Abi {
								binding: name.clone(),
								source,
							})
						}
					})
					.collect::<Result<Vec<_>, _>>()?;
				abi::encode(*selector, &types, &values)
					.map(Value::String)
					.map_err(ResolveError::Encode)
			}
		}
	}
}

/// Resolve a step's parameter object.
pub fn resolve_fields(
	fields: &BTreeMap<String, Template>,
	bindings: &Bindings,
) -> Result<Map<String, Value>, ResolveError> {
	fields
		.iter()
		.map(|(k, t)| Ok((k.clone(), t.resolve(bindings)?)))
		.collect()
}

fn lookup<'a>(bindings: &'a Bindings, name: &str) -> Result<&'a Value, ResolveError> {
	bindings
		.get(name)
		.ok_or_else(|| ResolveError::Unresolved(name.to_owned()))
}

impl From<&str> for Template {
	fn from(s: &str) -> Self {
		Self::Literal(Value::String(s.to_owned()))
	}
}

impl From<String> for Template {
	fn from(s: String) -> Self {
		Self::Literal(Value::String(s))
	}
}

impl From<Value> for Template {
	fn from(v: Value) -> Self {
		Self::Literal(v)
	}
}
