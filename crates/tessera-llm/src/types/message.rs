use serde::{Deserialize, Serialize};
use std::fmt;

use super::content::{Content, ContentPart};

/// Message role as it appears on the wire and in storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tessera message types (high-level, provider-agnostic)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    /// System prompt (instructions)
    System {
        content: Content,

        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },

    /// User/Human message
    #[serde(rename = "user")]
    Human {
        content: Content,

        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },

    /// Assistant/AI message, text and/or tool-call parts
    #[serde(rename = "assistant")]
    AI {
        content: Content,

        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },

    /// Tool result message, one or more tool-result parts
    Tool { content: Content },
}

impl Message {
    /// Create system message
    pub fn system(content: impl Into<Content>) -> Self {
        Self::System {
            content: content.into(),
            name: None,
        }
    }

    /// Create human message
    pub fn human(content: impl Into<Content>) -> Self {
        Self::Human {
            content: content.into(),
            name: None,
        }
    }

    /// Create AI message with text
    pub fn ai(content: impl Into<Content>) -> Self {
        Self::AI {
            content: content.into(),
            name: None,
        }
    }

    /// Create AI message from structured parts (text and tool calls)
    pub fn ai_with_parts(parts: Vec<ContentPart>) -> Self {
        Self::AI {
            content: Content::Parts(parts),
            name: None,
        }
    }

    /// Create tool message from tool-result parts
    pub fn tool(parts: Vec<ContentPart>) -> Self {
        Self::Tool {
            content: Content::Parts(parts),
        }
    }

    /// Create tool message carrying a single result
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        result: serde_json::Value,
    ) -> Self {
        Self::tool(vec![ContentPart::tool_result(tool_call_id, tool_name, result)])
    }

    /// Rebuild a message from its stored role and content
    pub fn from_parts(role: Role, content: Content) -> Self {
        match role {
            Role::System => Self::System { content, name: None },
            Role::User => Self::Human { content, name: None },
            Role::Assistant => Self::AI { content, name: None },
            Role::Tool => Self::Tool { content },
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Self::System { .. } => Role::System,
            Self::Human { .. } => Role::User,
            Self::AI { .. } => Role::Assistant,
            Self::Tool { .. } => Role::Tool,
        }
    }

    pub fn content(&self) -> &Content {
        match self {
            Self::System { content, .. }
            | Self::Human { content, .. }
            | Self::AI { content, .. }
            | Self::Tool { content } => content,
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Self::Human { .. })
    }
}
