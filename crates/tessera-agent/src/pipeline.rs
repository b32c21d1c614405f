//! Two-phase turn shape shared by `generate` and `stream`
//!
//! `before` builds the system message, resolves memory and binds tools.
//! [`AfterPhase`] sanitizes and persists the response and fires metric hooks.
//! It owns everything it needs so it can run inside a stream's completion
//! callback, long after the call that opened the stream returned.

use crate::agent::Agent;
use crate::config::MetricFailurePolicy;
use crate::error::{AgentError, Result};
use crate::metrics::{fire_hooks, GenerationHook, Metric, MetricEvaluator, TurnText};
use crate::resolver::MemoryResolver;
use crate::sanitize::sanitize_response_messages;
use crate::tools::{ToolAdapter, Toolset};
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::sync::Arc;
use tessera_llm::{ContentPart, Generation, Message, Role, ToolSet};
use tessera_memory::{MemoryGateway, MessageType, StoredMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Start,
    MemoryResolved,
    ToolsBound,
    Generating,
    StreamOpen,
    Sanitizing,
    Persisted,
}

impl TurnPhase {
    fn can_advance_to(self, next: TurnPhase) -> bool {
        use TurnPhase::*;
        matches!(
            (self, next),
            (Start, MemoryResolved)
                | (MemoryResolved, ToolsBound)
                | (ToolsBound, Generating)
                | (Generating, StreamOpen)
                | (Generating, Sanitizing)
                | (StreamOpen, Sanitizing)
                | (Sanitizing, Persisted)
        )
    }
}

#[derive(Debug, Clone)]
pub struct TurnState {
    phase: TurnPhase,
    run_id: String,
}

impl TurnState {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            phase: TurnPhase::Start,
            run_id: run_id.into(),
        }
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn advance(&mut self, next: TurnPhase) -> Result<()> {
        if !self.phase.can_advance_to(next) {
            return Err(AgentError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        tracing::trace!(run_id = %self.run_id, "Turn {:?} -> {:?}", self.phase, next);
        self.phase = next;
        Ok(())
    }
}

/// Build a storage row for `message`, deriving its type tag and audit columns
pub fn to_stored(message: &Message, thread_id: &str, id: String) -> StoredMessage {
    let mut message_type = MessageType::Text;
    let mut tool_call_ids: Vec<String> = Vec::new();
    let mut tool_call_args: Vec<Value> = Vec::new();
    let mut tool_names: Vec<String> = Vec::new();

    match message.role() {
        Role::Tool => {
            tool_call_ids = message
                .content()
                .tool_results()
                .filter_map(|part| part.tool_call_id().map(str::to_string))
                .collect();
            message_type = MessageType::ToolResult;
        }
        Role::Assistant => {
            for part in message.content().tool_calls() {
                if let ContentPart::ToolCall {
                    tool_call_id,
                    tool_name,
                    args,
                } = part
                {
                    tool_call_ids.push(tool_call_id.clone());
                    tool_call_args.push(args.clone());
                    tool_names.push(tool_name.clone());
                }
            }
            if let Some(first) = message.content().parts().and_then(|parts| parts.first()) {
                message_type = MessageType::from_part_kind(first.kind());
            }
        }
        Role::System | Role::User => {}
    }

    let mut stored = StoredMessage::new(id, thread_id, message, message_type);
    stored.tool_call_ids = non_empty(tool_call_ids);
    stored.tool_call_args = non_empty(tool_call_args);
    stored.tool_names = non_empty(tool_names);
    stored
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

/// What `before` hands to the dispatch code
pub struct Prepared {
    pub messages: Vec<Message>,
    /// Tools to send to the model: the converted set, or own tools bound directly
    pub tools: ToolSet,
    pub thread_id: Option<String>,
    pub after: AfterPhase,
}

/// Inputs of one turn's `before`
pub(crate) struct TurnRequest<'a> {
    pub messages: Vec<Message>,
    pub context: Vec<Message>,
    pub resource_id: Option<&'a str>,
    pub thread_id: Option<&'a str>,
    pub toolsets: &'a [Toolset],
    pub run_id: &'a str,
}

impl Agent {
    pub(crate) fn system_message(&self) -> Message {
        let today = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        Message::system(format!("{}. Today's date is {}", self.instructions, today))
    }

    pub(crate) async fn before(&self, turn: TurnRequest<'_>) -> Result<Prepared> {
        let run_id = turn.run_id;
        let mut state = TurnState::new(run_id);
        tracing::debug!(run_id, agent = %self.name, "Starting generation");

        let system = self.system_message();
        let memory = self.services.memory.clone();
        let active_memory = match (&memory, turn.resource_id) {
            (Some(memory), Some(resource_id)) => Some((Arc::clone(memory), resource_id)),
            _ => None,
        };

        let (window, thread_id) = match &active_memory {
            Some((memory, resource_id)) => {
                tracing::info!(run_id, agent = %self.name, "Saving user messages in memory");
                let resolver = MemoryResolver {
                    agent_name: &self.name,
                    model: self.model.as_ref(),
                    memory: memory.as_ref(),
                    settings: &self.settings,
                };
                let resolved = resolver
                    .resolve(turn.thread_id, resource_id, &turn.messages, run_id)
                    .await?;
                (resolved.messages, Some(resolved.thread_id))
            }
            None => {
                tracing::debug!(
                    run_id,
                    agent = %self.name,
                    "No memory store or resource id found. Skipping memory persistence."
                );
                (turn.messages.clone(), None)
            }
        };
        state.advance(TurnPhase::MemoryResolved)?;

        let adapter = ToolAdapter::new(
            Arc::clone(&self.services),
            active_memory.as_ref().map(|(memory, _)| Arc::clone(memory)),
            thread_id.clone(),
            run_id,
        );
        let convert = !turn.toolsets.is_empty()
            || active_memory.is_some()
            || self.services.engine.is_some()
            || self.services.syncs.is_some();
        let tools = if convert {
            adapter.convert(&self.tools, turn.toolsets)
        } else {
            tracing::debug!(run_id, agent = %self.name, "Skipping tool conversion");
            adapter.bind_direct(&self.tools)
        };
        state.advance(TurnPhase::ToolsBound)?;

        let mut messages = Vec::with_capacity(1 + turn.context.len() + window.len());
        messages.push(system);
        messages.extend(turn.context);
        messages.extend(window);

        let input = turn
            .messages
            .iter()
            .map(|m| m.content().to_plain_text())
            .collect::<Vec<_>>()
            .join("\n");

        let after = AfterPhase {
            agent_name: self.name.clone(),
            memory: active_memory.map(|(memory, _)| memory),
            hook: self
                .services
                .hooks
                .clone()
                .unwrap_or_else(|| Arc::new(MetricEvaluator)),
            metrics: self
                .metrics
                .iter()
                .map(|(name, metric)| (name.clone(), Arc::clone(metric)))
                .collect(),
            metric_failure: self.settings.metric_failure,
            input,
            thread_id: thread_id.clone(),
            run_id: run_id.to_string(),
            state,
        };

        Ok(Prepared {
            messages,
            tools,
            thread_id,
            after,
        })
    }
}

/// Post-generation work of one turn
pub struct AfterPhase {
    agent_name: String,
    /// Present only when memory is active for this turn
    memory: Option<Arc<dyn MemoryGateway>>,
    hook: Arc<dyn GenerationHook>,
    metrics: Vec<(String, Arc<dyn Metric>)>,
    metric_failure: MetricFailurePolicy,
    input: String,
    thread_id: Option<String>,
    run_id: String,
    state: TurnState,
}

impl AfterPhase {
    pub fn advance(&mut self, next: TurnPhase) -> Result<()> {
        self.state.advance(next)
    }

    pub async fn run(mut self, generation: &Generation, output_text: &str) -> Result<()> {
        self.state.advance(TurnPhase::Sanitizing)?;
        tracing::debug!(
            run_id = %self.run_id,
            thread_id = ?self.thread_id,
            finish_reason = ?generation.finish_reason,
            "Post processing LLM response"
        );

        match (&self.memory, &self.thread_id) {
            (Some(memory), Some(thread_id)) => {
                self.save_response(memory.as_ref(), thread_id, generation).await;
            }
            _ => tracing::debug!(
                run_id = %self.run_id,
                agent = %self.agent_name,
                "No memory store or resource id found. Skipping memory persistence."
            ),
        }
        self.state.advance(TurnPhase::Persisted)?;

        if !self.metrics.is_empty() {
            let turn = TurnText {
                input: &self.input,
                output: output_text,
                run_id: &self.run_id,
                agent_name: &self.agent_name,
            };
            fire_hooks(self.hook.as_ref(), &self.metrics, turn, self.metric_failure).await?;
        }

        Ok(())
    }

    async fn save_response(&self, memory: &dyn MemoryGateway, thread_id: &str, generation: &Generation) {
        let sanitized = sanitize_response_messages(generation.response.messages.clone());
        let dropped = generation.response.messages.len() - sanitized.len();
        if dropped > 0 {
            tracing::debug!(run_id = %self.run_id, "Dropped {} incomplete response messages", dropped);
        }

        let records: Vec<StoredMessage> = sanitized
            .iter()
            .map(|m| to_stored(m, thread_id, memory.generate_id()))
            .collect();

        tracing::debug!(run_id = %self.run_id, thread_id, "Saving response to memory");
        if let Err(e) = memory.save_messages(records).await {
            tracing::error!(
                run_id = %self.run_id,
                thread_id,
                "Failed to save assistant response: {}",
                e
            );
        }
    }
}
