//! Scripted in-process [`ModelGateway`] for tests and demos
//!
//! Replies are queued per entry point family: text replies answer
//! `generate_text`/`stream_text`, object replies answer
//! `generate_object`/`stream_object`. An empty queue is reported as a model
//! error, which is how callers exercise their fallback paths.

use crate::streaming::{EventStream, StreamEvent};
use crate::traits::{
    FinishCallback, GenerateRequest, Generation, ModelGateway, ResponseMessages, StepSummary,
    TokenUsage,
};
use crate::types::{ContentPart, Message, Tool, ToolCall, ToolResult};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

/// One scripted model turn
#[derive(Debug, Clone)]
pub enum Reply {
    /// Plain assistant text
    Text(String),

    /// Call a tool from the request's tool map, then answer with `follow_up`
    ToolCall {
        id: String,
        name: String,
        args: Value,
        follow_up: String,
    },

    /// Output cut off right after a tool call, leaving it unanswered
    Truncated {
        text: Option<String>,
        id: String,
        name: String,
        args: Value,
    },

    /// Structured object
    Object(Value),

    /// Gateway failure
    Error(String),

    /// Streams `text` normally but hands an unparseable payload to `on_finish`
    CorruptFinish(String),

    /// Fully specified generation, returned as is
    Raw(Generation),
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        args: Value,
        follow_up: impl Into<String>,
    ) -> Self {
        Self::ToolCall {
            id: id.into(),
            name: name.into(),
            args,
            follow_up: follow_up.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Text,
    Object,
    StreamText,
    StreamObject,
}

/// Snapshot of a request the model received
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub kind: RequestKind,
    pub messages: Vec<Message>,
    pub tool_names: Vec<String>,
    /// Tools as a provider would advertise them, in name order
    pub tools: Vec<Tool>,
    pub schema: Option<Value>,
    pub max_steps: u32,
    pub run_id: Option<String>,
}

#[derive(Default)]
pub struct ScriptedModel {
    text_replies: Mutex<VecDeque<Reply>>,
    object_replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for the text entry points
    pub fn push_text(&self, reply: Reply) -> &Self {
        lock(&self.text_replies).push_back(reply);
        self
    }

    /// Queue a reply for the object entry points
    pub fn push_object(&self, reply: Reply) -> &Self {
        lock(&self.object_replies).push_back(reply);
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    pub fn requests_of(&self, kind: RequestKind) -> Vec<RecordedRequest> {
        lock(&self.requests)
            .iter()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect()
    }

    /// Queued replies not yet consumed
    pub fn pending_replies(&self) -> usize {
        lock(&self.text_replies).len() + lock(&self.object_replies).len()
    }

    fn record(&self, kind: RequestKind, request: &GenerateRequest, schema: Option<&Value>) {
        lock(&self.requests).push(RecordedRequest {
            kind,
            messages: request.messages.clone(),
            tool_names: request.tools.keys().cloned().collect(),
            tools: request
                .tools
                .iter()
                .map(|(name, tool)| tool.describe(name.as_str()))
                .collect(),
            schema: schema.cloned(),
            max_steps: request.max_steps,
            run_id: request.run_id.clone(),
        });
    }

    fn next_reply(&self, kind: RequestKind) -> Result<Reply> {
        let queue = match kind {
            RequestKind::Text | RequestKind::StreamText => &self.text_replies,
            RequestKind::Object | RequestKind::StreamObject => &self.object_replies,
        };
        lock(queue)
            .pop_front()
            .ok_or_else(|| anyhow!("No scripted reply left for {:?} request", kind))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn usage_for(request: &GenerateRequest, output: &str) -> TokenUsage {
    let input_tokens = request
        .messages
        .iter()
        .map(|m| m.content().to_plain_text().split_whitespace().count() as u32)
        .sum::<u32>();
    let output_tokens = output.split_whitespace().count() as u32;
    TokenUsage {
        input_tokens,
        output_tokens,
        total_tokens: input_tokens + output_tokens,
    }
}

fn notify_step(request: &GenerateRequest, step: &StepSummary) {
    if let Some(callback) = &request.on_step_finish {
        match serde_json::to_string(step) {
            Ok(payload) => callback(payload),
            Err(e) => tracing::warn!("Failed to serialize step summary: {}", e),
        }
    }
}

/// Play a reply against a request, executing tools where the script says so
async fn play(reply: Reply, request: &GenerateRequest, structured: bool) -> Result<Generation> {
    let mut generation = match reply {
        Reply::Error(message) => bail!(message),

        Reply::Raw(generation) => generation,

        Reply::Text(text) | Reply::CorruptFinish(text) => {
            if structured {
                let object: Value = serde_json::from_str(&text)
                    .context("Scripted text reply is not a valid object")?;
                object_generation(object)
            } else {
                Generation::from_text(text)
            }
        }

        Reply::Object(object) => {
            if structured {
                object_generation(object)
            } else {
                Generation::from_text(object.to_string())
            }
        }

        Reply::ToolCall {
            id,
            name,
            args,
            follow_up,
        } => {
            if request.max_steps < 2 {
                tracing::debug!("max_steps {} stops after the tool call", request.max_steps);
            }

            let tool = request
                .tools
                .get(&name)
                .ok_or_else(|| anyhow!("Tool '{}' not found", name))?;
            let result = tool.execute(args.clone()).await?;

            let call = ToolCall {
                tool_call_id: id.clone(),
                tool_name: name.clone(),
                args: args.clone(),
            };
            let tool_result = ToolResult {
                tool_call_id: id.clone(),
                tool_name: name.clone(),
                result: result.clone(),
            };

            let first = StepSummary {
                text: String::new(),
                tool_calls: vec![call.clone()],
                tool_results: vec![tool_result.clone()],
                finish_reason: Some("tool-calls".to_string()),
            };
            notify_step(request, &first);

            let mut messages = vec![
                Message::ai_with_parts(vec![ContentPart::tool_call(&id, &name, args)]),
                Message::tool_result(&id, &name, result),
            ];
            let mut steps = vec![first];
            let mut text = String::new();

            if request.max_steps >= 2 {
                messages.push(Message::ai(follow_up.clone()));
                steps.push(StepSummary {
                    text: follow_up.clone(),
                    finish_reason: Some("stop".to_string()),
                    ..Default::default()
                });
                text = follow_up;
            }

            let finish_reason = steps.last().and_then(|s| s.finish_reason.clone());
            Generation {
                text,
                tool_calls: vec![call],
                tool_results: vec![tool_result],
                steps,
                finish_reason,
                response: ResponseMessages { messages },
                ..Default::default()
            }
        }

        Reply::Truncated {
            text,
            id,
            name,
            args,
        } => {
            let mut parts = Vec::new();
            if let Some(text) = &text {
                parts.push(ContentPart::text(text.clone()));
            }
            parts.push(ContentPart::tool_call(&id, &name, args.clone()));

            Generation {
                text: text.unwrap_or_default(),
                tool_calls: vec![ToolCall {
                    tool_call_id: id,
                    tool_name: name,
                    args,
                }],
                finish_reason: Some("length".to_string()),
                response: ResponseMessages {
                    messages: vec![Message::ai_with_parts(parts)],
                },
                ..Default::default()
            }
        }
    };

    if generation.usage.is_none() {
        generation.usage = Some(usage_for(request, &generation.output_text()));
    }
    if let Some(last) = generation.steps.last() {
        if last.finish_reason.as_deref() != Some("tool-calls") {
            notify_step(request, last);
        }
    }

    Ok(generation)
}

fn object_generation(object: Value) -> Generation {
    let text = object.to_string();
    Generation {
        object: Some(object),
        ..Generation::from_text(text)
    }
}

/// Split text into word-sized deltas, keeping the separators
fn deltas(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if ch.is_whitespace() {
            out.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn into_stream(generation: Generation, payload: String, on_finish: FinishCallback) -> EventStream {
    let stream = async_stream::stream! {
        for call in &generation.tool_calls {
            yield Ok(StreamEvent::ToolCall {
                id: call.tool_call_id.clone(),
                name: call.tool_name.clone(),
                args: call.args.clone(),
            });
        }
        for result in &generation.tool_results {
            yield Ok(StreamEvent::ToolResult {
                id: result.tool_call_id.clone(),
                name: result.tool_name.clone(),
                result: result.result.clone(),
            });
        }

        match &generation.object {
            Some(object) => yield Ok(StreamEvent::Object { partial: object.clone() }),
            None => {
                for delta in deltas(&generation.text) {
                    yield Ok(StreamEvent::Message { content: delta });
                }
            }
        }

        // Completion work finishes before the consumer observes Done
        on_finish(payload).await;

        yield Ok(StreamEvent::Done {
            finish_reason: generation.finish_reason.clone(),
        });
    };

    Box::pin(stream)
}

impl ScriptedModel {
    async fn open_stream(
        &self,
        kind: RequestKind,
        request: GenerateRequest,
        schema: Option<Value>,
        on_finish: FinishCallback,
    ) -> Result<EventStream> {
        self.record(kind, &request, schema.as_ref());
        let reply = self.next_reply(kind)?;
        let corrupt = matches!(reply, Reply::CorruptFinish(_));

        let generation = play(reply, &request, schema.is_some()).await?;
        let payload = if corrupt {
            // Cut the serialized generation short so it no longer parses
            let full = serde_json::to_string(&generation)?;
            let keep = full.chars().count() / 2;
            full.chars().take(keep).collect()
        } else {
            serde_json::to_string(&generation)?
        };

        Ok(into_stream(generation, payload, on_finish))
    }
}

#[async_trait]
impl ModelGateway for ScriptedModel {
    async fn generate_text(&self, request: GenerateRequest) -> Result<Generation> {
        self.record(RequestKind::Text, &request, None);
        let reply = self.next_reply(RequestKind::Text)?;
        play(reply, &request, false).await
    }

    async fn generate_object(&self, request: GenerateRequest, schema: Value) -> Result<Generation> {
        self.record(RequestKind::Object, &request, Some(&schema));
        let reply = self.next_reply(RequestKind::Object)?;
        play(reply, &request, true).await
    }

    async fn stream_text(
        &self,
        request: GenerateRequest,
        on_finish: FinishCallback,
    ) -> Result<EventStream> {
        self.open_stream(RequestKind::StreamText, request, None, on_finish)
            .await
    }

    async fn stream_object(
        &self,
        request: GenerateRequest,
        schema: Value,
        on_finish: FinishCallback,
    ) -> Result<EventStream> {
        self.open_stream(RequestKind::StreamObject, request, Some(schema), on_finish)
            .await
    }
}
