//! # Tessera
//!
//! Agent framework where every model turn runs through the same pipeline:
//!
//! - **Memory**: resolve or create the conversation thread, title it, and
//!   read a context window, optionally bounded by a date range the user
//!   referred to
//! - **Tools**: bind agent tools and call-time toolsets, serving cached
//!   results from persisted tool calls when a tool opts in
//! - **Persistence**: sanitize the model's response messages and save them
//!   with tool-call audit columns
//! - **Metrics**: fire one hook per registered metric after each turn
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tessera::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let model = Arc::new(ScriptedModel::new());
//!     model.push_text(Reply::text("Hello!"));
//!
//!     let agent = Agent::builder()
//!         .name("assistant")
//!         .instructions("You are a helpful assistant")
//!         .model(model)
//!         .build()?;
//!
//!     let registry = Registry::builder()
//!         .agent(agent)
//!         .memory(Arc::new(InMemoryStore::new()))
//!         .build()?;
//!
//!     let response = registry
//!         .agent("assistant")?
//!         .generate("Hi there", GenerateOptions::new().resource_id("user-1"))
//!         .await?;
//!     println!("{}", response.text());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **`tessera-llm`**: message model and the model gateway seam
//! - **`tessera-memory`**: threads, stored messages and the memory gateway seam
//! - **`tessera-agent`**: the agent pipeline
//! - **`tessera-step`**: steps and sequential workflows
//! - **`tessera`**: registry, configuration and logging

pub mod config;
pub mod error;
pub mod logging;
pub mod prelude;
pub mod registry;

pub use config::{AgentConfig, Config, LoggingConfig, MemoryConfig};
pub use error::{RegistryError, Result};
pub use logging::init_logging;
pub use registry::{Registry, RegistryBuilder};

pub use tessera_agent::{
    Agent, AgentBuilder, AgentError, AgentInput, AgentOutput, AgentResponse, AgentSettings,
    AgentStream, Engine, GenerateOptions, GenerationEvent, GenerationHook, Metric,
    MetricFailurePolicy, MetricResult, OutputMode, Services, StreamOptions, SyncAction,
    SyncContext, SyncRegistry, ToolContext, ToolDefinition, ToolExecutor, Toolset,
};

pub use tessera_llm::{
    Content, ContentPart, FinishCallback, Generation, Message, ModelGateway, Role, StreamEvent,
};

pub use tessera_memory::{DateRange, InMemoryStore, MemoryError, MemoryGateway, StoredMessage, Thread};

pub use tessera_step::{AgentStep, Condition, FnStep, Step, StepContext, StepResult, StepStatus, Workflow, WorkflowRun};
