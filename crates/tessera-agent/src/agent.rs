use crate::config::AgentSettings;
use crate::error::{AgentError, Result};
use crate::metrics::Metric;
use crate::options::{AgentInput, GenerateOptions, OutputMode, StreamOptions};
use crate::pipeline::{TurnPhase, TurnRequest};
use crate::services::Services;
use crate::tools::{ToolDefinition, ToolMap};
use anyhow::anyhow;
use futures::{FutureExt, Stream, StreamExt};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tessera_llm::{
    EventStream, FinishCallback, GenerateRequest, Generation, Message, ModelGateway, StreamEvent,
    ToolSet,
};
use uuid::Uuid;

/// Final output of a turn
#[derive(Debug, Clone, PartialEq)]
pub enum AgentOutput {
    Text(String),
    Structured { object: Value, schema: Value },
}

#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub output: AgentOutput,
    /// Thread the turn was stored in, absent when memory was inactive
    pub thread_id: Option<String>,
    pub run_id: String,
    pub generation: Generation,
}

impl AgentResponse {
    /// Text output, or the serialized object in structured mode
    pub fn text(&self) -> String {
        match &self.output {
            AgentOutput::Text(text) => text.clone(),
            AgentOutput::Structured { object, .. } => object.to_string(),
        }
    }

    pub fn object(&self) -> Option<&Value> {
        match &self.output {
            AgentOutput::Structured { object, .. } => Some(object),
            AgentOutput::Text(_) => None,
        }
    }
}

/// Live stream of a turn; persistence runs when it completes
pub struct AgentStream {
    events: EventStream,
    pub thread_id: Option<String>,
    pub run_id: String,
}

impl Stream for AgentStream {
    type Item = anyhow::Result<StreamEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_next_unpin(cx)
    }
}

impl AgentStream {
    pub fn into_events(self) -> EventStream {
        self.events
    }
}

pub struct Agent {
    pub(crate) name: String,
    pub(crate) instructions: String,
    pub(crate) model: Arc<dyn ModelGateway>,
    pub(crate) tools: ToolMap,
    pub(crate) metrics: BTreeMap<String, Arc<dyn Metric>>,
    pub(crate) services: Arc<Services>,
    pub(crate) settings: AgentSettings,
}

impl Agent {
    pub fn builder() -> AgentBuilder {
        AgentBuilder::new()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn tools(&self) -> &ToolMap {
        &self.tools
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    /// Late-bind the shared services bundle
    pub fn bind_services(&mut self, services: Arc<Services>) {
        tracing::debug!(agent = %self.name, "Services bound: {:?}", services);
        self.services = services;
    }

    fn request(
        &self,
        messages: Vec<Message>,
        tools: ToolSet,
        options: &GenerateOptions,
        run_id: &str,
    ) -> GenerateRequest {
        GenerateRequest::new(messages)
            .with_tools(tools)
            .with_max_steps(options.max_steps.unwrap_or(self.settings.max_steps))
            .with_run_id(run_id)
            .with_step_callback(options.on_step_finish.clone())
    }

    /// Run one turn and wait for the complete response
    pub async fn generate(
        &self,
        input: impl Into<AgentInput>,
        options: GenerateOptions,
    ) -> Result<AgentResponse> {
        let run_id = options
            .run_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let messages = input.into().into_messages();

        let prepared = self
            .before(TurnRequest {
                messages,
                context: options.context.clone(),
                resource_id: options.resource_id.as_deref(),
                thread_id: options.thread_id.as_deref(),
                toolsets: &options.toolsets,
                run_id: &run_id,
            })
            .await?;

        let mut after = prepared.after;
        after.advance(TurnPhase::Generating)?;
        let request = self.request(prepared.messages, prepared.tools, &options, &run_id);

        let (generation, output) = match &options.output {
            OutputMode::Text => {
                tracing::debug!(run_id = %run_id, agent = %self.name, "Starting llm text call");
                let generation = self
                    .model
                    .generate_text(request)
                    .await
                    .map_err(AgentError::Model)?;
                let text = generation.text.clone();
                (generation, AgentOutput::Text(text))
            }
            OutputMode::Structured(schema) => {
                tracing::debug!(run_id = %run_id, agent = %self.name, "Starting llm object call");
                let generation = self
                    .model
                    .generate_object(request, schema.clone())
                    .await
                    .map_err(AgentError::Model)?;
                let object = generation
                    .object
                    .clone()
                    .ok_or_else(|| AgentError::Model(anyhow!("Model returned no object")))?;
                (
                    generation,
                    AgentOutput::Structured {
                        object,
                        schema: schema.clone(),
                    },
                )
            }
        };

        after.run(&generation, &generation.output_text()).await?;
        tracing::info!(run_id = %run_id, agent = %self.name, "Generation finished");

        Ok(AgentResponse {
            output,
            thread_id: prepared.thread_id,
            run_id,
            generation,
        })
    }

    /// Open a streamed turn
    ///
    /// Returns as soon as the model stream is open. Sanitization, persistence
    /// and metric hooks run once the stream completes, before the caller's
    /// own `on_finish` is invoked with the raw payload.
    pub async fn stream(
        &self,
        input: impl Into<AgentInput>,
        options: StreamOptions,
    ) -> Result<AgentStream> {
        let StreamOptions {
            base: options,
            on_finish: caller_finish,
        } = options;
        let run_id = options
            .run_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let messages = input.into().into_messages();

        let prepared = self
            .before(TurnRequest {
                messages,
                context: options.context.clone(),
                resource_id: options.resource_id.as_deref(),
                thread_id: options.thread_id.as_deref(),
                toolsets: &options.toolsets,
                run_id: &run_id,
            })
            .await?;

        let mut after = prepared.after;
        after.advance(TurnPhase::Generating)?;
        after.advance(TurnPhase::StreamOpen)?;
        let request = self.request(prepared.messages, prepared.tools, &options, &run_id);

        let finish_run_id = run_id.clone();
        let on_finish: FinishCallback = Box::new(move |payload: String| {
            async move {
                match serde_json::from_str::<Generation>(&payload) {
                    Ok(generation) => {
                        let output_text = generation.output_text();
                        if let Err(e) = after.run(&generation, &output_text).await {
                            tracing::error!(run_id = %finish_run_id, "Error saving memory on finish: {}", e);
                        }
                    }
                    Err(e) => {
                        tracing::error!(run_id = %finish_run_id, "Error saving memory on finish: {}", e);
                    }
                }

                if let Some(callback) = caller_finish {
                    callback(payload).await;
                }
            }
            .boxed()
        });

        let events = match &options.output {
            OutputMode::Text => {
                tracing::debug!(run_id = %run_id, agent = %self.name, "Starting llm stream call");
                self.model.stream_text(request, on_finish).await
            }
            OutputMode::Structured(schema) => {
                tracing::debug!(run_id = %run_id, agent = %self.name, "Starting llm streamObject call");
                self.model
                    .stream_object(request, schema.clone(), on_finish)
                    .await
            }
        }
        .map_err(AgentError::Model)?;

        Ok(AgentStream {
            events,
            thread_id: prepared.thread_id,
            run_id,
        })
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .field("metrics", &self.metrics.keys().collect::<Vec<_>>())
            .field("services", &self.services)
            .finish()
    }
}

/// Builder for constructing an Agent
pub struct AgentBuilder {
    name: Option<String>,
    instructions: String,
    model: Option<Arc<dyn ModelGateway>>,
    tools: ToolMap,
    metrics: BTreeMap<String, Arc<dyn Metric>>,
    services: Services,
    settings: AgentSettings,
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            name: None,
            instructions: String::new(),
            model: None,
            tools: ToolMap::new(),
            metrics: BTreeMap::new(),
            services: Services::default(),
            settings: AgentSettings::default(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn model(mut self, model: Arc<dyn ModelGateway>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn tool(mut self, name: impl Into<String>, tool: ToolDefinition) -> Self {
        self.tools.insert(name.into(), tool);
        self
    }

    pub fn metric(mut self, name: impl Into<String>, metric: Arc<dyn Metric>) -> Self {
        self.metrics.insert(name.into(), metric);
        self
    }

    pub fn services(mut self, services: Services) -> Self {
        self.services = services;
        self
    }

    pub fn settings(mut self, settings: AgentSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Result<Agent> {
        let name = self
            .name
            .ok_or_else(|| AgentError::Config("Agent name is required".to_string()))?;
        let model = self
            .model
            .ok_or_else(|| AgentError::Config(format!("Model is required for agent {}", name)))?;
        if self.settings.max_steps == 0 {
            return Err(AgentError::Config("max_steps must be at least 1".to_string()));
        }

        Ok(Agent {
            name,
            instructions: self.instructions,
            model,
            tools: self.tools,
            metrics: self.metrics,
            services: Arc::new(self.services),
            settings: self.settings,
        })
    }
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}
