//! Named agents and workflows sharing one services bundle
//!
//! [`RegistryBuilder::build`] assembles the shared [`Services`], binds them to
//! every agent exactly once and then freezes the agents behind `Arc`. After
//! that the registry is read-only and can be shared across tasks.

use crate::error::{RegistryError, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tessera_agent::{Agent, Engine, GenerationHook, Services, SyncContext, SyncRegistry};
use tessera_memory::MemoryGateway;
use tessera_step::{Workflow, WorkflowRun};
use uuid::Uuid;

pub struct Registry {
    agents: BTreeMap<String, Arc<Agent>>,
    workflows: BTreeMap<String, Arc<Workflow>>,
    services: Arc<Services>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn agent(&self, name: &str) -> Result<Arc<Agent>> {
        self.agents
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                kind: "Agent",
                name: name.to_string(),
            })
    }

    pub fn workflow(&self, name: &str) -> Result<Arc<Workflow>> {
        self.workflows
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                kind: "Workflow",
                name: name.to_string(),
            })
    }

    pub fn agents(&self) -> Vec<&str> {
        self.agents.keys().map(String::as_str).collect()
    }

    pub fn workflows(&self) -> Vec<&str> {
        self.workflows.keys().map(String::as_str).collect()
    }

    /// Registered sync action keys
    pub fn syncs(&self) -> Vec<String> {
        self.services
            .syncs
            .as_ref()
            .map(|syncs| syncs.keys())
            .unwrap_or_default()
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    pub fn memory(&self) -> Option<&Arc<dyn MemoryGateway>> {
        self.services.memory.as_ref()
    }

    /// Run a registered sync action against the engine
    pub async fn sync(&self, key: &str, params: Value, run_id: Option<String>) -> Result<Value> {
        let engine = self
            .services
            .engine
            .clone()
            .ok_or(RegistryError::EngineRequired)?;
        let action = self
            .services
            .syncs
            .as_ref()
            .and_then(|syncs| syncs.get(key))
            .ok_or_else(|| RegistryError::NotFound {
                kind: "Sync",
                name: key.to_string(),
            })?;

        let run_id = run_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        tracing::debug!(run_id = %run_id, sync = %key, engine = %engine.name(), "Running sync");

        let ctx = SyncContext {
            engine,
            memory: self.services.memory.clone(),
            agents: self.agents.clone(),
            run_id,
        };
        action.run(params, ctx).await.map_err(|error| RegistryError::Sync {
            key: key.to_string(),
            error,
        })
    }

    /// Run a registered workflow with this registry's agents and services
    pub async fn run_workflow(
        &self,
        name: &str,
        trigger: Value,
        run_id: Option<String>,
    ) -> Result<WorkflowRun> {
        let workflow = self.workflow(name)?;
        Ok(workflow
            .run_in(trigger, self.agents.clone(), self.services.clone(), run_id)
            .await)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("agents", &self.agents())
            .field("workflows", &self.workflows())
            .field("services", &self.services)
            .finish()
    }
}

/// Builder for constructing a Registry
#[derive(Default)]
pub struct RegistryBuilder {
    agents: Vec<Agent>,
    workflows: Vec<Workflow>,
    memory: Option<Arc<dyn MemoryGateway>>,
    engine: Option<Arc<dyn Engine>>,
    syncs: Option<SyncRegistry>,
    hooks: Option<Arc<dyn GenerationHook>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn agent(mut self, agent: Agent) -> Self {
        self.agents.push(agent);
        self
    }

    pub fn workflow(mut self, workflow: Workflow) -> Self {
        self.workflows.push(workflow);
        self
    }

    pub fn memory(mut self, memory: Arc<dyn MemoryGateway>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn engine(mut self, engine: Arc<dyn Engine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn syncs(mut self, syncs: SyncRegistry) -> Self {
        self.syncs = Some(syncs);
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn GenerationHook>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn build(self) -> Result<Registry> {
        let syncs = self.syncs.filter(|syncs| !syncs.is_empty());
        if syncs.is_some() && self.engine.is_none() {
            return Err(RegistryError::EngineRequired);
        }

        let services = Arc::new(Services {
            memory: self.memory,
            engine: self.engine,
            syncs: syncs.map(Arc::new),
            hooks: self.hooks,
        });

        let mut agents = BTreeMap::new();
        for mut agent in self.agents {
            let name = agent.name().to_string();
            if agents.contains_key(&name) {
                return Err(RegistryError::DuplicateAgent(name));
            }
            agent.bind_services(services.clone());
            agents.insert(name, Arc::new(agent));
        }

        let mut workflows = BTreeMap::new();
        for workflow in self.workflows {
            let name = workflow.name().to_string();
            if workflows.contains_key(&name) {
                return Err(RegistryError::DuplicateWorkflow(name));
            }
            workflows.insert(name, Arc::new(workflow));
        }

        tracing::info!(
            agents = agents.len(),
            workflows = workflows.len(),
            "Registry built"
        );

        Ok(Registry {
            agents,
            workflows,
            services,
        })
    }
}
