//! Message types and the model gateway contract used by tessera agents

pub mod mock;
pub mod streaming;
pub mod traits;
pub mod types;

pub use traits::{
    generate_typed, FinishCallback, GenerateRequest, Generation, ModelGateway, ResponseMessages,
    StepFinishCallback, StepSummary, TokenUsage,
};

pub use mock::{RecordedRequest, Reply, RequestKind, ScriptedModel};
pub use streaming::{collect_text, EventStream, StreamEvent};
pub use types::{Content, ContentPart, CoreTool, Message, Role, Tool, ToolCall, ToolInvoke, ToolResult, ToolSet};
