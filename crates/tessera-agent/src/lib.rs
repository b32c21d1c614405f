//! Agent execution pipeline
//!
//! An [`Agent`] wraps one model turn in a before/after shape: resolve the
//! conversation thread and message window, bind tools with cache-aware
//! wrappers, call the model, then sanitize and persist the response and fire
//! metric hooks.

pub mod agent;
pub mod config;
pub mod error;
pub mod metrics;
pub mod options;
pub mod pipeline;
pub mod prompts;
pub mod resolver;
pub mod sanitize;
pub mod services;
pub mod tools;

pub use agent::{Agent, AgentBuilder, AgentOutput, AgentResponse, AgentStream};
pub use config::{AgentSettings, MetricFailurePolicy};
pub use error::{AgentError, Result};
pub use metrics::{GenerationEvent, GenerationHook, Metric, MetricEvaluator, MetricResult};
pub use options::{AgentInput, GenerateOptions, OutputMode, StreamOptions};
pub use pipeline::{to_stored, AfterPhase, Prepared, TurnPhase, TurnState};
pub use resolver::{ContextReference, MemoryResolver, ResolvedMemory};
pub use sanitize::sanitize_response_messages;
pub use services::{Engine, Services, SyncAction, SyncContext, SyncRegistry};
pub use tools::{ToolAdapter, ToolContext, ToolDefinition, ToolExecutor, ToolMap, Toolset};
