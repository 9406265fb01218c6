//! Declarative multi-step RPC scenarios.
//!
//! A [`Scenario`] is an ordered list of [`ScenarioStep`]s. A step may
//! capture values out of its result into named bindings, and later steps
//! may use those bindings in their parameters. The builder checks that
//! every binding is captured by an earlier step before anything runs.

pub mod runner;
pub mod template;

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::abi::AbiError;
use crate::codec;
use crate::methods::Method;

pub use runner::{
	cancel_pair, CancelHandle, CancelToken, NotRunReason, ScenarioReport, ScenarioRunner,
	StepOutcome, StepResult,
};
pub use template::{AbiArg, Bindings, ResolveError, Template};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScenarioError {
	#[error("step {step} ({label}) uses binding {binding:?}, which no earlier step captures")]
	UnknownBinding {
		step: usize,
		label: String,
		binding: String,
	},

	#[error("step {step} ({label}) captures binding {binding:?} a second time")]
	DuplicateBinding {
		step: usize,
		label: String,
		binding: String,
	},

	#[error("step {step} ({label}) has an invalid argument: {source}")]
	InvalidArgument {
		step: usize,
		label: String,
		#[source]
		source: AbiError,
	},

	#[error("step {step} ({label}) has invalid method name {method:?}")]
	InvalidMethod {
		step: usize,
		label: String,
		method: String,
	},
}

/// What a failed step does to the rest of its scenario.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
	/// Stop; every later step is not run.
	#[default]
	Abort,
	/// Keep going, but steps that need this step's bindings are not run.
	Skip,
	/// Keep going; steps that need this step's bindings fail to resolve.
	Continue,
}

/// Captures a value out of a successful result into a binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extractor {
	pub binding: String,
	/// JSON pointer into the result; empty selects the whole result.
	pub pointer: String,
}

impl Extractor {
	pub fn new(binding: impl Into<String>, pointer: impl Into<String>) -> Self {
		Self {
			binding: binding.into(),
			pointer: pointer.into(),
		}
	}

	pub fn extract(&self, result: &Value) -> Option<Value> {
		result.pointer(&self.pointer).cloned()
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioStep {
	pub label: String,
	pub method: String,
	pub params: BTreeMap<String, Template>,
	pub captures: Vec<Extractor>,
	pub on_failure: FailurePolicy,
	/// Extra attempts after a network failure.
	pub retries: u32,
	/// Overrides the client timeout for this step.
	pub timeout: Option<Duration>,
}

impl ScenarioStep {
	pub fn new(label: impl Into<String>, method: Method) -> Self {
		Self::raw(label, method.as_str())
	}

	/// A step for a method outside the known vocabulary.
	pub fn raw(label: impl Into<String>, method: impl Into<String>) -> Self {
		Self {
			label: label.into(),
			method: method.into(),
			params: BTreeMap::new(),
			captures: Vec::new(),
			on_failure: FailurePolicy::default(),
			retries: 0,
			timeout: None,
		}
	}

	pub fn param(mut self, name: impl Into<String>, value: impl Into<Template>) -> Self {
		self.params.insert(name.into(), value.into());
		self
	}

	pub fn capture(mut self, binding: impl Into<String>, pointer: impl Into<String>) -> Self {
		self.captures.push(Extractor::new(binding, pointer));
		self
	}

	pub fn on_failure(mut self, policy: FailurePolicy) -> Self {
		self.on_failure = policy;
		self
	}

	pub fn retries(mut self, retries: u32) -> Self {
		self.retries = retries;
		self
	}

	pub fn timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);
		self
	}

	/// Bindings this step reads.
	pub fn required_bindings(&self) -> BTreeSet<&str> {
		self.params.values().flat_map(Template::bindings).collect()
	}
}

/// A validated, ready-to-run scenario. Only obtainable through
/// [`ScenarioBuilder::build`].
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
	name: String,
	description: String,
	steps: Vec<ScenarioStep>,
}

impl Scenario {
	pub fn builder(name: impl Into<String>) -> ScenarioBuilder {
		ScenarioBuilder {
			name: name.into(),
			description: String::new(),
			steps: Vec::new(),
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn description(&self) -> &str {
		&self.description
	}

	pub fn steps(&self) -> &[ScenarioStep] {
		&self.steps
	}
}

pub struct ScenarioBuilder {
	name: String,
	description: String,
	steps: Vec<ScenarioStep>,
}

impl ScenarioBuilder {
	pub fn description(mut self, description: impl Into<String>) -> Self {
		self.description = description.into();
		self
	}

	pub fn step(mut self, step: ScenarioStep) -> Self {
		self.steps.push(step);
		self
	}

	pub fn build(self) -> Result<Scenario, ScenarioError> {
		let mut captured = BTreeSet::new();

		for (index, step) in self.steps.iter().enumerate() {
			if codec::validate_method(&step.method).is_err() {
				return Err(ScenarioError::InvalidMethod {
					step: index,
					label: step.label.clone(),
					method: step.method.clone(),
				});
			}
			if let Some(missing) = step
				.required_bindings()
				.into_iter()
				.find(|b| !captured.contains(*b))
			{
				return Err(ScenarioError::UnknownBinding {
					step: index,
					label: step.label.clone(),
					binding: missing.to_owned(),
				});
			}
			for extractor in &step.captures {
				if !captured.insert(extractor.binding.as_str()) {
					return Err(ScenarioError::DuplicateBinding {
						step: index,
						label: step.label.clone(),
						binding: extractor.binding.clone(),
					});
				}
			}
		}

		Ok(Scenario {
			name: self.name,
			description: self.description,
			steps: self.steps,
		})
	}
}
