use anyhow::{bail, Result};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;

/// Live stream handed to the caller of a streaming generation
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Text delta
    Message {
        content: String,
    },

    /// Partial object for structured streams
    Object {
        partial: Value,
    },

    ToolCall {
        id: String,
        name: String,
        args: Value,
    },

    ToolResult {
        id: String,
        name: String,
        result: Value,
    },

    Done {
        #[serde(skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
    },
}

/// Drain a stream and concatenate its text deltas
///
/// The stream is polled to exhaustion so completion callbacks attached by the
/// gateway get to run. Fails on the first error event or if no `Done` arrived.
pub async fn collect_text(mut stream: EventStream) -> Result<String> {
    let mut text = String::new();
    let mut done = false;

    while let Some(event) = stream.next().await {
        match event? {
            StreamEvent::Message { content } => text.push_str(&content),
            StreamEvent::Done { .. } => done = true,
            _ => {}
        }
    }

    if !done {
        bail!("Stream ended without a Done event");
    }
    Ok(text)
}
