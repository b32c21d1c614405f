use crate::pipeline::TurnPhase;
use tessera_memory::MemoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("Model error: {0}")]
    Model(anyhow::Error),

    #[error("Metric hook failed: {0}")]
    Metric(anyhow::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid turn transition from {from:?} to {to:?}")]
    InvalidTransition { from: TurnPhase, to: TurnPhase },
}

pub type Result<T> = std::result::Result<T, AgentError>;
