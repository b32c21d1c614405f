//! Ambient services shared by agents
//!
//! Agents receive one immutable [`Services`] bundle, either at construction or
//! through a single late [`Agent::bind_services`](crate::Agent::bind_services)
//! call made by the owning registry. Every field is optional and every call
//! site handles the absent case explicitly.

use crate::agent::Agent;
use crate::metrics::GenerationHook;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tessera_memory::MemoryGateway;

/// Generic compute backend that syncs and tools can dispatch work to
#[async_trait]
pub trait Engine: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, task: &str, payload: Value) -> Result<Value>;
}

/// Everything a sync action may touch while it runs
#[derive(Clone)]
pub struct SyncContext {
    pub engine: Arc<dyn Engine>,
    pub memory: Option<Arc<dyn MemoryGateway>>,
    pub agents: BTreeMap<String, Arc<Agent>>,
    pub run_id: String,
}

/// Named cross-service synchronization routine
#[async_trait]
pub trait SyncAction: Send + Sync {
    async fn run(&self, params: Value, ctx: SyncContext) -> Result<Value>;
}

#[derive(Clone, Default)]
pub struct SyncRegistry {
    actions: BTreeMap<String, Arc<dyn SyncAction>>,
}

impl SyncRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, key: impl Into<String>, action: Arc<dyn SyncAction>) -> Self {
        self.actions.insert(key.into(), action);
        self
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn SyncAction>> {
        self.actions.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.actions.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl fmt::Debug for SyncRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.actions.keys()).finish()
    }
}

#[derive(Clone, Default)]
pub struct Services {
    pub memory: Option<Arc<dyn MemoryGateway>>,
    pub engine: Option<Arc<dyn Engine>>,
    pub syncs: Option<Arc<SyncRegistry>>,
    pub hooks: Option<Arc<dyn GenerationHook>>,
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryGateway>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_engine(mut self, engine: Arc<dyn Engine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_syncs(mut self, syncs: SyncRegistry) -> Self {
        self.syncs = Some(Arc::new(syncs));
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn GenerationHook>) -> Self {
        self.hooks = Some(hooks);
        self
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("memory", &self.memory.is_some())
            .field("engine", &self.engine.as_ref().map(|e| e.name().to_string()))
            .field("syncs", &self.syncs)
            .field("hooks", &self.hooks.is_some())
            .finish()
    }
}
