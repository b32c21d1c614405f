use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tessera_llm::{Content, Message, Role};

/// Storage/filtering tag derived from a message's content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageType {
    Text,
    ToolCall,
    ToolResult,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::ToolCall => "tool-call",
            Self::ToolResult => "tool-result",
        }
    }

    /// Map a content part kind (`text`, `tool-call`, `tool-result`) to a type tag
    pub fn from_part_kind(kind: &str) -> Self {
        match kind {
            "tool-call" => Self::ToolCall,
            "tool-result" => Self::ToolResult,
            _ => Self::Text,
        }
    }
}

/// Message row as persisted by a memory gateway
///
/// The audit columns (`tool_call_ids`, `tool_call_args`, `tool_names`) are
/// filled for assistant and tool messages and back cached tool lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub thread_id: String,
    pub role: Role,
    pub content: Content,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub message_type: MessageType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_ids: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_args: Option<Vec<Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_names: Option<Vec<String>>,
}

impl StoredMessage {
    /// Plain row without audit columns
    pub fn new(
        id: impl Into<String>,
        thread_id: impl Into<String>,
        message: &Message,
        message_type: MessageType,
    ) -> Self {
        Self {
            id: id.into(),
            thread_id: thread_id.into(),
            role: message.role(),
            content: message.content().clone(),
            created_at: Utc::now(),
            message_type,
            tool_call_ids: None,
            tool_call_args: None,
            tool_names: None,
        }
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn to_message(&self) -> Message {
        Message::from_parts(self.role, self.content.clone())
    }
}

impl From<&StoredMessage> for Message {
    fn from(stored: &StoredMessage) -> Self {
        stored.to_message()
    }
}
