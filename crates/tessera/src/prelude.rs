//! Common imports
//!
//! ```rust
//! use tessera::prelude::*;
//! ```

pub use crate::{Config, Registry, RegistryBuilder, RegistryError};

pub use tessera_agent::{
    Agent, AgentBuilder, AgentOutput, AgentResponse, GenerateOptions, Metric, MetricResult,
    StreamOptions, ToolContext, ToolDefinition, Toolset,
};

pub use tessera_llm::{
    collect_text, Content, ContentPart, Message, ModelGateway, Reply, ScriptedModel, StreamEvent,
};

pub use tessera_memory::{InMemoryStore, MemoryGateway};

pub use tessera_step::{AgentStep, Condition, Step, StepContext, Workflow};

pub use anyhow::Result;
pub use futures::StreamExt;
pub use serde_json::{json, Value};
pub use std::sync::Arc;
