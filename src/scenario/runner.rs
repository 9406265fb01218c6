use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::template::{resolve_fields, Bindings};
use super::{FailurePolicy, Scenario, ScenarioStep};
use crate::codec::{FailureCode, RpcOutcome, RpcRequest};
use crate::methods::{ContractHandle, Method};
use crate::rpc::RpcClient;

/// Why a step never sent its request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotRunReason {
	/// An earlier step with the Abort policy failed.
	Aborted { by: usize },
	/// A binding this step needs belongs to a step that was skipped.
	DependencySkipped { binding: String, by: usize },
	Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
	Success { result: Value },
	Failed { code: FailureCode, message: String },
	UnresolvedBinding { binding: String, reason: String },
	/// The parameters resolved but could not be encoded into a request.
	InvalidInput { reason: String },
	/// The call succeeded but a capture found nothing at its pointer.
	ExtractionFailed {
		binding: String,
		pointer: String,
		result: Value,
	},
	NotRun { reason: NotRunReason },
}

impl StepOutcome {
	pub fn is_success(&self) -> bool {
		matches!(self, Self::Success { .. })
	}

	pub fn is_not_run(&self) -> bool {
		matches!(self, Self::NotRun { .. })
	}
}

impl fmt::Display for StepOutcome {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Success { result } => write!(f, "ok {}", abbreviate(&result.to_string(), 96)),
			Self::Failed { code, message } => write!(f, "failed ({code:?}) {message}"),
			Self::UnresolvedBinding { reason, .. } => write!(f, "unresolved: {reason}"),
			Self::InvalidInput { reason } => write!(f, "invalid input: {reason}"),
			Self::ExtractionFailed {
				binding, pointer, ..
			} => write!(f, "nothing at {pointer:?} for binding {binding:?}"),
			Self::NotRun { reason } => match reason {
				NotRunReason::Aborted { by } => write!(f, "not run (aborted by step {by})"),
				NotRunReason::DependencySkipped { binding, by } => {
					write!(f, "not run ({binding:?} skipped at step {by})")
				}
				NotRunReason::Cancelled => f.write_str("not run (cancelled)"),
			},
		}
	}
}

/// The log entry for one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
	pub index: usize,
	pub label: String,
	pub method: String,
	pub on_failure: FailurePolicy,
	/// The resolved request, when one was built.
	pub request: Option<RpcRequest>,
	pub outcome: StepOutcome,
	/// Bindings this step captured.
	pub bindings: Bindings,
	pub attempts: u32,
}

impl StepResult {
	fn new(index: usize, step: &ScenarioStep, outcome: StepOutcome) -> Self {
		Self {
			index,
			label: step.label.clone(),
			method: step.method.clone(),
			on_failure: step.on_failure,
			request: None,
			outcome,
			bindings: Bindings::new(),
			attempts: 0,
		}
	}

	/// Whether this step counts against the scenario. Failures under the
	/// Continue policy are informative only; steps that never ran always
	/// count.
	pub fn is_tolerated(&self) -> bool {
		match &self.outcome {
			StepOutcome::Success { .. } => true,
			StepOutcome::NotRun { .. } => false,
			_ => self.on_failure == FailurePolicy::Continue,
		}
	}
}

/// Everything a scenario run produced, in step order.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
	pub scenario: String,
	pub started_at: DateTime<Utc>,
	pub elapsed_ms: u64,
	pub steps: Vec<StepResult>,
}

impl ScenarioReport {
	pub fn step(&self, label: &str) -> Option<&StepResult> {
		self.steps.iter().find(|s| s.label == label)
	}

	pub fn succeeded(&self) -> usize {
		self.steps.iter().filter(|s| s.outcome.is_success()).count()
	}

	pub fn passed(&self) -> bool {
		self.steps.iter().all(StepResult::is_tolerated)
	}

	/// Contracts deployed during the run, named after the binding that
	/// captured their address, or after the step when nothing did.
	pub fn contracts(&self) -> Vec<ContractHandle> {
		self.steps
			.iter()
			.filter(|s| s.method == Method::ContractDeploy.as_str())
			.filter_map(|s| {
				let StepOutcome::Success { result } = &s.outcome else {
					return None;
				};
				let mut handle = ContractHandle::from_deploy_result(&s.label, s.index, result)?;
				if let Some(name) = s
					.bindings
					.iter()
					.find(|(_, v)| v.as_str() == Some(handle.address.as_str()))
					.map(|(name, _)| name.clone())
				{
					handle.name = name;
				}
				Some(handle)
			})
			.collect()
	}
}

impl fmt::Display for ScenarioReport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		writeln!(
			f,
			"{}: {}/{} steps succeeded in {} ms{}",
			self.scenario,
			self.succeeded(),
			self.steps.len(),
			self.elapsed_ms,
			if self.passed() { "" } else { " [FAILED]" }
		)?;
		for step in &self.steps {
			writeln!(
				f,
				"  [{}] {:<20} {:<16} {}",
				step.index, step.label, step.method, step.outcome
			)?;
		}
		Ok(())
	}
}

fn abbreviate(s: &str, max: usize) -> String {
	if s.chars().count() <= max {
		return s.to_owned();
	}
	let head: String = s.chars().take(max).collect();
	format!("{head}...")
}

// -- Cancellation --

/// Cancels the runs holding the matching [`CancelToken`]s.
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
	pub fn cancel(&self) {
		self.0.send_replace(true);
	}
}

#[derive(Debug, Clone)]
pub struct CancelToken(watch::Receiver<bool>);

impl CancelToken {
	pub fn is_cancelled(&self) -> bool {
		*self.0.borrow()
	}

	/// Resolves once cancelled; never resolves if the handle is dropped
	/// without cancelling.
	pub async fn cancelled(&mut self) {
		loop {
			if *self.0.borrow_and_update() {
				return;
			}
			if self.0.changed().await.is_err() {
				std::future::pending::<()>().await;
			}
		}
	}
}

pub fn cancel_pair() -> (CancelHandle, CancelToken) {
	let (tx, rx) = watch::channel(false);
	(CancelHandle(tx), CancelToken(rx))
}

// -- Runner --

/// Executes scenarios against an [`RpcClient`], one step at a time.
#[derive(Clone)]
pub struct ScenarioRunner {
	client: RpcClient,
	min_retries: u32,
}

impl ScenarioRunner {
	pub fn new(client: RpcClient) -> Self {
		Self {
			client,
			min_retries: 0,
		}
	}

	/// Retry network failures at least `retries` times on every step.
	pub fn with_min_retries(mut self, retries: u32) -> Self {
		self.min_retries = retries;
		self
	}

	pub async fn run(&self, scenario: &Scenario) -> ScenarioReport {
		let (_handle, token) = cancel_pair();
		self.run_with_cancel(scenario, token).await
	}

	pub async fn run_with_cancel(
		&self,
		scenario: &Scenario,
		mut cancel: CancelToken,
	) -> ScenarioReport {
		let started_at = Utc::now();
		let clock = Instant::now();
		info!(
			scenario = scenario.name(),
			steps = scenario.steps().len(),
			"running scenario"
		);

		let mut table = Bindings::new();
		// binding -> index of the skipped step it traces back to
		let mut poisoned: BTreeMap<String, usize> = BTreeMap::new();
		let mut halted: Option<NotRunReason> = None;
		let mut steps = Vec::with_capacity(scenario.steps().len());

		for (index, step) in scenario.steps().iter().enumerate() {
			if halted.is_none() && cancel.is_cancelled() {
				halted = Some(NotRunReason::Cancelled);
			}
			if let Some(reason) = &halted {
				steps.push(StepResult::new(
					index,
					step,
					StepOutcome::NotRun {
						reason: reason.clone(),
					},
				));
				continue;
			}

			let skipped_by = step
				.required_bindings()
				.into_iter()
				.find_map(|b| poisoned.get(b).map(|by| (b.to_owned(), *by)));
			if let Some((binding, by)) = skipped_by {
				debug!(scenario = scenario.name(), step = index, %binding, "dependency skipped");
				for capture in &step.captures {
					poisoned.insert(capture.binding.clone(), by);
				}
				steps.push(StepResult::new(
					index,
					step,
					StepOutcome::NotRun {
						reason: NotRunReason::DependencySkipped { binding, by },
					},
				));
				continue;
			}

			let result = self.run_step(index, step, &table, &mut cancel).await;
			match &result.outcome {
				StepOutcome::Success { .. } => {
					info!(scenario = scenario.name(), step = index, label = %step.label, "step succeeded");
					table.extend(result.bindings.clone());
				}
				StepOutcome::NotRun { reason } => {
					warn!(scenario = scenario.name(), step = index, "scenario cancelled");
					halted = Some(reason.clone());
				}
				outcome => {
					warn!(
						scenario = scenario.name(),
						step = index,
						label = %step.label,
						policy = ?step.on_failure,
						%outcome,
						"step failed"
					);
					match step.on_failure {
						FailurePolicy::Abort => halted = Some(NotRunReason::Aborted { by: index }),
						FailurePolicy::Skip => {
							for capture in &step.captures {
								poisoned.insert(capture.binding.clone(), index);
							}
						}
						FailurePolicy::Continue => {}
					}
				}
			}
			steps.push(result);
		}

		ScenarioReport {
			scenario: scenario.name().to_owned(),
			started_at,
			elapsed_ms: clock.elapsed().as_millis() as u64,
			steps,
		}
	}

	async fn run_step(
		&self,
		index: usize,
		step: &ScenarioStep,
		table: &Bindings,
		cancel: &mut CancelToken,
	) -> StepResult {
		let params = match resolve_fields(&step.params, table) {
			Ok(params) => params,
			Err(e) => {
				let reason = e.to_string();
				let outcome = match e.binding() {
					Some(binding) => StepOutcome::UnresolvedBinding {
						binding: binding.to_owned(),
						reason,
					},
					None => StepOutcome::InvalidInput { reason },
				};
				return StepResult::new(index, step, outcome);
			}
		};

		let request = RpcRequest {
			method: step.method.clone(),
			params,
		};
		let timeout = step.timeout.unwrap_or(self.client.timeout());
		let max_attempts = 1 + step.retries.max(self.min_retries);
		let mut attempts = 0;

		let outcome = loop {
			attempts += 1;
			let outcome = tokio::select! {
				outcome = self.client.call(&request, timeout) => Some(outcome),
				_ = cancel.cancelled() => None,
			};
			match outcome {
				Some(RpcOutcome::Failure {
					code: FailureCode::Network,
					message,
				}) if attempts < max_attempts => {
					warn!(step = index, attempt = attempts, %message, "network failure, retrying");
				}
				other => break other,
			}
		};

		let mut result = StepResult::new(index, step, StepOutcome::NotRun {
			reason: NotRunReason::Cancelled,
		});
		result.request = Some(request);
		result.attempts = attempts;

		result.outcome = match outcome {
			None => return result,
			Some(RpcOutcome::Failure { code, message }) => StepOutcome::Failed { code, message },
			Some(RpcOutcome::Success { result: value }) => match capture_all(step, &value) {
				Ok(bindings) => {
					result.bindings = bindings;
					StepOutcome::Success { result: value }
				}
				Err((binding, pointer)) => StepOutcome::ExtractionFailed {
					binding,
					pointer,
					result: value,
				},
			},
		};
		result
	}

	/// Run several scenarios, optionally as concurrent tasks. Reports come
	/// back in input order either way.
	pub async fn run_all(&self, scenarios: Vec<Scenario>, parallel: bool) -> Vec<ScenarioReport> {
		if !parallel {
			let mut reports = Vec::with_capacity(scenarios.len());
			for scenario in &scenarios {
				reports.push(self.run(scenario).await);
			}
			return reports;
		}

		let mut tasks = JoinSet::new();
		for (i, scenario) in scenarios.into_iter().enumerate() {
			let runner = self.clone();
			tasks.spawn(async move { (i, runner.run(&scenario).await) });
		}

		let mut reports = Vec::with_capacity(tasks.len());
		while let Some(joined) = tasks.join_next().await {
			match joined {
				Ok(report) => reports.push(report),
				Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
				Err(e) => warn!(error = %e, "scenario task did not finish"),
			}
		}
		reports.sort_by_key(|(i, _)| *i);
		reports.into_iter().map(|(_, report)| report).collect()
	}
}

fn capture_all(step: &ScenarioStep, result: &Value) -> Result<Bindings, (String, String)> {
	step.captures
		.iter()
		.map(|ex| match ex.extract(result) {
			Some(v) => Ok((ex.binding.clone(), v)),
			None => Err((ex.binding.clone(), ex.pointer.clone())),
		})
		.collect()
}
