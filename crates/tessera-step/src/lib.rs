//! Steps and sequential workflows built on top of Tessera agents
//!
//! A [`Workflow`] runs its steps in declaration order. Each step may be gated
//! by a [`Condition`] over the results recorded so far; a failing step is
//! recorded and the run moves on.

pub mod agent_step;
pub mod condition;
pub mod step;
pub mod workflow;

pub use agent_step::{AgentStep, PromptFn};
pub use condition::Condition;
pub use step::{FnStep, Step, StepContext, StepResult, StepStatus};
pub use workflow::{Workflow, WorkflowBuilder, WorkflowError, WorkflowRun};
