use crate::step::{StepResult, StepStatus};
use std::collections::BTreeMap;

/// Gate deciding whether a step runs, evaluated against earlier results
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Condition {
    #[default]
    Always,
    StepSucceeded(String),
    StepFailed(String),
    All(Vec<Condition>),
    Any(Vec<Condition>),
}

impl Condition {
    pub fn succeeded(step_id: impl Into<String>) -> Self {
        Self::StepSucceeded(step_id.into())
    }

    pub fn failed(step_id: impl Into<String>) -> Self {
        Self::StepFailed(step_id.into())
    }

    /// A step that has not run yet satisfies neither `StepSucceeded` nor `StepFailed`
    pub fn evaluate(&self, results: &BTreeMap<String, StepResult>) -> bool {
        match self {
            Self::Always => true,
            Self::StepSucceeded(id) => status_of(results, id) == Some(StepStatus::Success),
            Self::StepFailed(id) => status_of(results, id) == Some(StepStatus::Failed),
            Self::All(conditions) => conditions.iter().all(|c| c.evaluate(results)),
            Self::Any(conditions) => conditions.iter().any(|c| c.evaluate(results)),
        }
    }
}

fn status_of(results: &BTreeMap<String, StepResult>, id: &str) -> Option<StepStatus> {
    results.get(id).map(|r| r.status)
}
