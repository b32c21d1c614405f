use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tessera_agent::{Agent, Services};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Failed,
    Skipped,
}

/// Recorded outcome of one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub status: StepStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default)]
    pub duration_ms: u64,
}

impl StepResult {
    pub fn success(payload: Value) -> Self {
        Self {
            status: StepStatus::Success,
            payload: Some(payload),
            error: None,
            duration_ms: 0,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Failed,
            payload: None,
            error: Some(error.into()),
            duration_ms: 0,
        }
    }

    pub fn skipped() -> Self {
        Self {
            status: StepStatus::Skipped,
            payload: None,
            error: None,
            duration_ms: 0,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }
}

/// What a step can see while it runs
#[derive(Clone)]
pub struct StepContext {
    pub run_id: String,
    /// Input the workflow was started with
    pub trigger: Value,
    /// Results of the steps that ran before this one, keyed by step id
    pub results: BTreeMap<String, StepResult>,
    /// Id of the most recently recorded step
    pub last_step: Option<String>,
    pub agents: BTreeMap<String, Arc<Agent>>,
    pub services: Arc<Services>,
}

impl StepContext {
    pub fn new(run_id: impl Into<String>, trigger: Value) -> Self {
        Self {
            run_id: run_id.into(),
            trigger,
            results: BTreeMap::new(),
            last_step: None,
            agents: BTreeMap::new(),
            services: Arc::new(Services::default()),
        }
    }

    pub fn with_agents(mut self, agents: BTreeMap<String, Arc<Agent>>) -> Self {
        self.agents = agents;
        self
    }

    pub fn with_services(mut self, services: Arc<Services>) -> Self {
        self.services = services;
        self
    }

    pub fn result(&self, step_id: &str) -> Option<&StepResult> {
        self.results.get(step_id)
    }

    /// Payload of a step that succeeded
    pub fn payload(&self, step_id: &str) -> Option<&Value> {
        self.results
            .get(step_id)
            .filter(|r| r.is_success())
            .and_then(|r| r.payload.as_ref())
    }

    /// Payload of the most recent step, if it succeeded
    pub fn previous_payload(&self) -> Option<&Value> {
        self.last_step.as_deref().and_then(|id| self.payload(id))
    }

    pub(crate) fn record(&mut self, step_id: &str, result: StepResult) {
        self.results.insert(step_id.to_string(), result);
        self.last_step = Some(step_id.to_string());
    }
}

impl fmt::Debug for StepContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepContext")
            .field("run_id", &self.run_id)
            .field("trigger", &self.trigger)
            .field("results", &self.results)
            .field("agents", &self.agents.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Core abstraction for a unit of work in a workflow
#[async_trait]
pub trait Step: Send + Sync {
    fn id(&self) -> &str;

    async fn execute(&self, ctx: &StepContext) -> Result<Value>;
}

/// Step backed by a synchronous closure
pub struct FnStep<F> {
    id: String,
    f: F,
}

impl<F> FnStep<F>
where
    F: Fn(&StepContext) -> Result<Value> + Send + Sync,
{
    pub fn new(id: impl Into<String>, f: F) -> Self {
        Self { id: id.into(), f }
    }
}

#[async_trait]
impl<F> Step for FnStep<F>
where
    F: Fn(&StepContext) -> Result<Value> + Send + Sync,
{
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, ctx: &StepContext) -> Result<Value> {
        (self.f)(ctx)
    }
}
