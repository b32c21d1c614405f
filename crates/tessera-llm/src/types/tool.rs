use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Tool description as advertised to a model provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON Schema for parameters
    pub parameters: Value,
}

impl Tool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            parameters,
        }
    }
}

/// Callable body behind a [`CoreTool`]
#[async_trait]
pub trait ToolInvoke: Send + Sync {
    async fn invoke(&self, args: Value) -> Result<Value>;
}

struct FnInvoke<F>(F);

#[async_trait]
impl<F, Fut> ToolInvoke for FnInvoke<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    async fn invoke(&self, args: Value) -> Result<Value> {
        (self.0)(args).await
    }
}

/// Uniform invocable tool handed to the model gateway
#[derive(Clone)]
pub struct CoreTool {
    pub description: String,
    pub parameters: Value,
    invoker: Arc<dyn ToolInvoke>,
}

impl CoreTool {
    pub fn new(
        description: impl Into<String>,
        parameters: Value,
        invoker: Arc<dyn ToolInvoke>,
    ) -> Self {
        Self {
            description: description.into(),
            parameters,
            invoker,
        }
    }

    pub fn from_fn<F, Fut>(description: impl Into<String>, parameters: Value, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self::new(description, parameters, Arc::new(FnInvoke(f)))
    }

    pub async fn execute(&self, args: Value) -> Result<Value> {
        self.invoker.invoke(args).await
    }

    /// Provider-facing description of this tool
    pub fn describe(&self, name: impl Into<String>) -> Tool {
        Tool::new(name, self.description.clone(), self.parameters.clone())
    }
}

impl fmt::Debug for CoreTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreTool")
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

/// Flat mapping from tool name to invocable tool
pub type ToolSet = BTreeMap<String, CoreTool>;

/// Tool call made by the model during generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool_call_id: String,
    pub tool_name: String,
    pub args: Value,
}

/// Result produced for a [`ToolCall`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub tool_name: String,
    pub result: Value,
}
