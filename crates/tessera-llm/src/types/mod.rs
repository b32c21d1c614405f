pub mod content;
pub mod message;
pub mod tool;

pub use content::{Content, ContentPart};
pub use message::{Message, Role};
pub use tool::{CoreTool, Tool, ToolCall, ToolInvoke, ToolResult, ToolSet};
