use crate::streaming::EventStream;
use crate::types::{Message, ToolCall, ToolResult, ToolSet};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Invoked after every internal model step with the serialized step summary
pub type StepFinishCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Invoked exactly once when a stream completes, with the serialized [`Generation`]
pub type FinishCallback = Box<dyn FnOnce(String) -> BoxFuture<'static, ()> + Send>;

/// Trait for the model surface an agent generates against
///
/// Implementations own tool-call iteration (bounded by `max_steps`), retries
/// and provider transport. Every entry point receives the full message list
/// and the flat tool map built for the turn.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Plain-text generation
    async fn generate_text(&self, request: GenerateRequest) -> Result<Generation>;

    /// Schema-constrained generation, the object lands in [`Generation::object`]
    async fn generate_object(&self, request: GenerateRequest, schema: Value) -> Result<Generation>;

    /// Streaming text generation
    async fn stream_text(
        &self,
        request: GenerateRequest,
        on_finish: FinishCallback,
    ) -> Result<EventStream>;

    /// Streaming schema-constrained generation
    async fn stream_object(
        &self,
        request: GenerateRequest,
        schema: Value,
        on_finish: FinishCallback,
    ) -> Result<EventStream>;
}

#[derive(Clone)]
pub struct GenerateRequest {
    pub messages: Vec<Message>,
    pub tools: ToolSet,
    pub max_steps: u32,
    pub run_id: Option<String>,
    pub on_step_finish: Option<StepFinishCallback>,
}

impl GenerateRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            tools: ToolSet::new(),
            max_steps: 1,
            run_id: None,
            on_step_finish: None,
        }
    }

    pub fn with_tools(mut self, tools: ToolSet) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_step_callback(mut self, callback: Option<StepFinishCallback>) -> Self {
        self.on_step_finish = callback;
        self
    }
}

impl fmt::Debug for GenerateRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerateRequest")
            .field("messages", &self.messages)
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .field("max_steps", &self.max_steps)
            .field("run_id", &self.run_id)
            .field("on_step_finish", &self.on_step_finish.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

/// One internal step of a multi-step generation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepSummary {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub tool_results: Vec<ToolResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Raw messages the model produced during a generation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseMessages {
    pub messages: Vec<Message>,
}

/// Result of one generate/stream call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Generation {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<Value>,
    pub tool_calls: Vec<ToolCall>,
    pub tool_results: Vec<ToolResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    pub steps: Vec<StepSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    pub response: ResponseMessages,
}

impl Generation {
    /// Text-only generation answered by a single assistant message
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            response: ResponseMessages {
                messages: vec![Message::ai(text.clone())],
            },
            steps: vec![StepSummary {
                text: text.clone(),
                finish_reason: Some("stop".to_string()),
                ..Default::default()
            }],
            finish_reason: Some("stop".to_string()),
            text,
            ..Default::default()
        }
    }

    /// Output text used for logging and metric hooks
    ///
    /// Structured generations report their serialized object.
    pub fn output_text(&self) -> String {
        match &self.object {
            Some(object) => object.to_string(),
            None => self.text.clone(),
        }
    }
}

/// Run a schema-constrained generation and decode the object into `T`
pub async fn generate_typed<T: DeserializeOwned>(
    gateway: &dyn ModelGateway,
    request: GenerateRequest,
    schema: Value,
) -> Result<T> {
    let generation = gateway.generate_object(request, schema).await?;
    let object = generation
        .object
        .context("Model returned no object for a structured request")?;
    serde_json::from_value(object).context("Structured output did not match the requested shape")
}
