use crate::services::Services;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tessera_llm::{CoreTool, ToolInvoke, ToolSet};
use tessera_memory::MemoryGateway;

/// Ambient context handed to agent-owned tools
#[derive(Clone, Default)]
pub struct ToolContext {
    pub services: Option<Arc<Services>>,
    pub run_id: Option<String>,
    pub thread_id: Option<String>,
}

impl ToolContext {
    /// Context without any ambient services, as toolset tools receive
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Trait for executing tools
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, args: Value, ctx: ToolContext) -> Result<Value>;
}

struct FnExecutor<F>(F);

#[async_trait]
impl<F, Fut> ToolExecutor for FnExecutor<F>
where
    F: Fn(Value, ToolContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    async fn execute(&self, args: Value, ctx: ToolContext) -> Result<Value> {
        (self.0)(args, ctx).await
    }
}

/// Declared tool, before adaptation
#[derive(Clone)]
pub struct ToolDefinition {
    pub description: String,
    pub input_schema: Value,
    pub enable_cache: bool,
    executor: Arc<dyn ToolExecutor>,
}

impl ToolDefinition {
    pub fn new(
        description: impl Into<String>,
        input_schema: Value,
        executor: Arc<dyn ToolExecutor>,
    ) -> Self {
        Self {
            description: description.into(),
            input_schema,
            enable_cache: false,
            executor,
        }
    }

    pub fn from_fn<F, Fut>(description: impl Into<String>, input_schema: Value, f: F) -> Self
    where
        F: Fn(Value, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self::new(description, input_schema, Arc::new(FnExecutor(f)))
    }

    pub fn with_cache(mut self, enable_cache: bool) -> Self {
        self.enable_cache = enable_cache;
        self
    }

    pub async fn execute(&self, args: Value, ctx: ToolContext) -> Result<Value> {
        self.executor.execute(args, ctx).await
    }
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("description", &self.description)
            .field("enable_cache", &self.enable_cache)
            .finish_non_exhaustive()
    }
}

pub type ToolMap = BTreeMap<String, ToolDefinition>;

/// Externally supplied tools layered over an agent's own tools for one call
#[derive(Clone, Debug, Default)]
pub struct Toolset {
    pub name: String,
    pub tools: ToolMap,
}

impl Toolset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tools: ToolMap::new(),
        }
    }

    pub fn tool(mut self, name: impl Into<String>, tool: ToolDefinition) -> Self {
        self.tools.insert(name.into(), tool);
        self
    }
}

/// Cache-check-then-execute wrapper behind every converted tool
struct CachedInvoke {
    name: String,
    definition: ToolDefinition,
    memory: Option<Arc<dyn MemoryGateway>>,
    thread_id: Option<String>,
    run_id: String,
    context: ToolContext,
}

#[async_trait]
impl ToolInvoke for CachedInvoke {
    async fn invoke(&self, args: Value) -> Result<Value> {
        if let (Some(thread_id), true, Some(memory)) =
            (&self.thread_id, self.definition.enable_cache, &self.memory)
        {
            match memory.get_tool_result(thread_id, &self.name, &args).await {
                Ok(Some(cached)) if !cached.is_null() => {
                    tracing::debug!(run_id = %self.run_id, "Cached result for tool {}", self.name);
                    return Ok(cached);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(run_id = %self.run_id, "Cache lookup for tool {} failed: {}", self.name, e);
                }
            }
        }

        tracing::debug!(
            run_id = %self.run_id,
            "Cache not found or not enabled, executing tool {}",
            self.name
        );
        self.definition.execute(args, self.context.clone()).await
    }
}

struct DirectInvoke {
    definition: ToolDefinition,
    context: ToolContext,
}

#[async_trait]
impl ToolInvoke for DirectInvoke {
    async fn invoke(&self, args: Value) -> Result<Value> {
        self.definition.execute(args, self.context.clone()).await
    }
}

/// Turns declared tools into the flat [`ToolSet`] a model gateway consumes
pub struct ToolAdapter {
    memory: Option<Arc<dyn MemoryGateway>>,
    context: ToolContext,
    run_id: String,
}

impl ToolAdapter {
    /// `memory` is the gateway active for this turn; cache lookups are
    /// skipped without it, whatever `services` carries
    pub fn new(
        services: Arc<Services>,
        memory: Option<Arc<dyn MemoryGateway>>,
        thread_id: Option<String>,
        run_id: impl Into<String>,
    ) -> Self {
        let run_id = run_id.into();
        Self {
            memory,
            context: ToolContext {
                services: Some(services),
                run_id: Some(run_id.clone()),
                thread_id,
            },
            run_id,
        }
    }

    /// Convert own tools then toolsets; a later entry replaces an earlier one
    /// with the same name
    pub fn convert(&self, own: &ToolMap, toolsets: &[Toolset]) -> ToolSet {
        tracing::debug!(run_id = %self.run_id, "Assigning tools");

        let mut converted = ToolSet::new();
        for (name, definition) in own {
            converted.insert(name.clone(), self.wrap(name, definition, self.context.clone()));
        }

        if !toolsets.is_empty() {
            let names: Vec<&str> = toolsets.iter().map(|t| t.name.as_str()).collect();
            tracing::debug!(run_id = %self.run_id, "Adding tools from toolsets {}", names.join(", "));
        }
        for toolset in toolsets {
            for (name, definition) in &toolset.tools {
                converted.insert(name.clone(), self.wrap(name, definition, ToolContext::empty()));
            }
        }

        converted
    }

    /// Bind own tools without the cache wrapper
    pub fn bind_direct(&self, own: &ToolMap) -> ToolSet {
        own.iter()
            .map(|(name, definition)| {
                let invoke = DirectInvoke {
                    definition: definition.clone(),
                    context: self.context.clone(),
                };
                let tool = CoreTool::new(
                    definition.description.clone(),
                    definition.input_schema.clone(),
                    Arc::new(invoke),
                );
                (name.clone(), tool)
            })
            .collect()
    }

    fn wrap(&self, name: &str, definition: &ToolDefinition, context: ToolContext) -> CoreTool {
        let invoke = CachedInvoke {
            name: name.to_string(),
            definition: definition.clone(),
            memory: self.memory.clone(),
            thread_id: self.context.thread_id.clone(),
            run_id: self.run_id.clone(),
            context,
        };
        CoreTool::new(
            definition.description.clone(),
            definition.input_schema.clone(),
            Arc::new(invoke),
        )
    }
}
