use serde::{Deserialize, Serialize};

/// What to do when a metric hook fails after a turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricFailurePolicy {
    /// Surface the error to the caller of `generate`
    #[default]
    Propagate,
    /// Log and keep the turn's result
    Log,
}

/// Per-agent pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Default bound on model tool-call iterations per turn
    pub max_steps: u32,
    /// Title used when title generation fails or has nothing to summarize
    pub default_title: String,
    pub title_max_chars: usize,
    pub metric_failure: MetricFailurePolicy,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_steps: 5,
            default_title: "New Thread".to_string(),
            title_max_chars: 80,
            metric_failure: MetricFailurePolicy::Propagate,
        }
    }
}
