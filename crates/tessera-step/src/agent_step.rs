use crate::step::{Step, StepContext};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tessera_agent::{Agent, AgentInput, AgentOutput, GenerateOptions};

/// Builds an agent prompt from the step context
pub type PromptFn = Arc<dyn Fn(&StepContext) -> AgentInput + Send + Sync>;

/// Runs one agent turn as a workflow step
///
/// The payload is `{"text": ...}` for text output and `{"object": ...}` for
/// structured output.
pub struct AgentStep {
    id: String,
    agent: Arc<Agent>,
    prompt: PromptFn,
    options: GenerateOptions,
}

impl AgentStep {
    /// Prompt with the previous step's payload, falling back to the trigger
    pub fn new(id: impl Into<String>, agent: Arc<Agent>) -> Self {
        Self {
            id: id.into(),
            agent,
            prompt: Arc::new(default_prompt),
            options: GenerateOptions::default(),
        }
    }

    pub fn with_prompt<F>(mut self, prompt: F) -> Self
    where
        F: Fn(&StepContext) -> AgentInput + Send + Sync + 'static,
    {
        self.prompt = Arc::new(prompt);
        self
    }

    pub fn with_options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }
}

/// Text of a payload: its `text` field, a bare string, or the JSON itself
fn payload_text(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        Value::Object(map) => match map.get("text") {
            Some(Value::String(text)) => text.clone(),
            _ => payload.to_string(),
        },
        other => other.to_string(),
    }
}

pub fn default_prompt(ctx: &StepContext) -> AgentInput {
    let source = ctx.previous_payload().unwrap_or(&ctx.trigger);
    AgentInput::Text(payload_text(source))
}

#[async_trait]
impl Step for AgentStep {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, ctx: &StepContext) -> Result<Value> {
        let input = (self.prompt)(ctx);
        let options = self.options.clone().run_id(ctx.run_id.clone());

        tracing::debug!(run_id = %ctx.run_id, step = %self.id, agent = %self.agent.name(), "Running agent step");
        let response = self.agent.generate(input, options).await?;

        Ok(match response.output {
            AgentOutput::Text(text) => json!({ "text": text }),
            AgentOutput::Structured { object, .. } => json!({ "object": object }),
        })
    }
}
