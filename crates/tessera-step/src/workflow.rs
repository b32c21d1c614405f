use crate::condition::Condition;
use crate::step::{Step, StepContext, StepResult, StepStatus};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tessera_agent::{Agent, Services};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Duplicate step id '{step}' in workflow {workflow}")]
    DuplicateStep { workflow: String, step: String },

    #[error("Workflow {0} has no steps")]
    Empty(String),

    #[error("max_steps must be at least 1")]
    InvalidMaxSteps,
}

struct GatedStep {
    step: Arc<dyn Step>,
    condition: Condition,
}

/// Ordered list of gated steps
pub struct Workflow {
    name: String,
    steps: Vec<GatedStep>,
    max_steps: usize,
}

/// Outcome of one workflow run
#[derive(Debug, Clone)]
pub struct WorkflowRun {
    pub run_id: String,
    pub workflow: String,
    pub results: BTreeMap<String, StepResult>,
    /// Step ids in the order they were recorded
    pub order: Vec<String>,
    /// True when the `max_steps` guardrail stopped the run early
    pub truncated: bool,
    pub total_duration_ms: u64,
}

impl WorkflowRun {
    pub fn result(&self, step_id: &str) -> Option<&StepResult> {
        self.results.get(step_id)
    }

    pub fn payload(&self, step_id: &str) -> Option<&Value> {
        self.results.get(step_id).and_then(|r| r.payload.as_ref())
    }

    /// Payload of the last step that succeeded
    pub fn output(&self) -> Option<&Value> {
        self.order
            .iter()
            .rev()
            .filter_map(|id| self.results.get(id))
            .find(|r| r.is_success())
            .and_then(|r| r.payload.as_ref())
    }

    pub fn count(&self, status: StepStatus) -> usize {
        self.results.values().filter(|r| r.status == status).count()
    }
}

impl Workflow {
    pub fn builder(name: impl Into<String>) -> WorkflowBuilder {
        WorkflowBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn step_ids(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.step.id()).collect()
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Run standalone, without agents or shared services
    pub async fn run(&self, trigger: Value) -> WorkflowRun {
        self.run_with(StepContext::new(Uuid::new_v4().to_string(), trigger))
            .await
    }

    /// Run with the agents and services of the owning registry
    pub async fn run_in(
        &self,
        trigger: Value,
        agents: BTreeMap<String, Arc<Agent>>,
        services: Arc<Services>,
        run_id: Option<String>,
    ) -> WorkflowRun {
        let run_id = run_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let ctx = StepContext::new(run_id, trigger)
            .with_agents(agents)
            .with_services(services);
        self.run_with(ctx).await
    }

    async fn run_with(&self, mut ctx: StepContext) -> WorkflowRun {
        let start_time = Instant::now();
        let mut order = Vec::with_capacity(self.steps.len());
        let mut truncated = false;

        tracing::info!(run_id = %ctx.run_id, workflow = %self.name, "Workflow started");

        for (index, gated) in self.steps.iter().enumerate() {
            // Guardrail: max steps
            if index >= self.max_steps {
                tracing::warn!(
                    run_id = %ctx.run_id,
                    workflow = %self.name,
                    "Max steps ({}) reached, {} step(s) not run",
                    self.max_steps,
                    self.steps.len() - index
                );
                truncated = true;
                break;
            }

            let id = gated.step.id().to_string();
            let result = if !gated.condition.evaluate(&ctx.results) {
                tracing::debug!(run_id = %ctx.run_id, step = %id, "Condition not met, skipping step");
                StepResult::skipped()
            } else {
                let step_start = Instant::now();
                let outcome = gated.step.execute(&ctx).await;
                let duration = step_start.elapsed().as_millis() as u64;

                match outcome {
                    Ok(payload) => {
                        tracing::debug!(run_id = %ctx.run_id, step = %id, duration_ms = duration, "Step succeeded");
                        StepResult::success(payload).with_duration(duration)
                    }
                    Err(e) => {
                        tracing::error!(run_id = %ctx.run_id, step = %id, "Step failed: {:#}", e);
                        StepResult::failed(format!("{:#}", e)).with_duration(duration)
                    }
                }
            };

            ctx.record(&id, result);
            order.push(id);
        }

        let total_duration = start_time.elapsed().as_millis() as u64;
        tracing::info!(
            run_id = %ctx.run_id,
            workflow = %self.name,
            total_duration_ms = total_duration,
            "Workflow finished"
        );

        WorkflowRun {
            run_id: ctx.run_id,
            workflow: self.name.clone(),
            results: ctx.results,
            order,
            truncated,
            total_duration_ms: total_duration,
        }
    }
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.name)
            .field("steps", &self.step_ids())
            .field("max_steps", &self.max_steps)
            .finish()
    }
}

/// Builder for constructing a Workflow
pub struct WorkflowBuilder {
    name: String,
    steps: Vec<GatedStep>,
    max_steps: usize,
}

impl WorkflowBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            max_steps: 50,
        }
    }

    /// Append a step that always runs
    pub fn step(self, step: Arc<dyn Step>) -> Self {
        self.step_when(step, Condition::Always)
    }

    /// Append a step gated by `condition`
    pub fn step_when(mut self, step: Arc<dyn Step>, condition: Condition) -> Self {
        self.steps.push(GatedStep { step, condition });
        self
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn build(self) -> Result<Workflow, WorkflowError> {
        if self.steps.is_empty() {
            return Err(WorkflowError::Empty(self.name));
        }
        if self.max_steps == 0 {
            return Err(WorkflowError::InvalidMaxSteps);
        }

        let mut seen = HashSet::new();
        for gated in &self.steps {
            if !seen.insert(gated.step.id()) {
                return Err(WorkflowError::DuplicateStep {
                    workflow: self.name.clone(),
                    step: gated.step.id().to_string(),
                });
            }
        }

        Ok(Workflow {
            name: self.name,
            steps: self.steps,
            max_steps: self.max_steps,
        })
    }
}
