use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Agent '{0}' is already registered")]
    DuplicateAgent(String),

    #[error("Workflow '{0}' is already registered")]
    DuplicateWorkflow(String),

    #[error("Engine is required when syncs are configured")]
    EngineRequired,

    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("Sync '{key}' failed: {error:#}")]
    Sync { key: String, error: anyhow::Error },
}

pub type Result<T> = std::result::Result<T, RegistryError>;
