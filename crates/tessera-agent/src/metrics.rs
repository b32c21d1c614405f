use crate::config::MetricFailurePolicy;
use crate::error::{AgentError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<Value>,
}

/// Scores one turn's output against its input
#[async_trait]
pub trait Metric: Send + Sync {
    async fn measure(&self, input: &str, output: &str) -> anyhow::Result<MetricResult>;
}

/// Payload of the after-generation hook, one per registered metric per turn
#[derive(Clone)]
pub struct GenerationEvent {
    pub input: String,
    pub output: String,
    pub run_id: String,
    pub metric_name: String,
    pub metric: Arc<dyn Metric>,
    pub agent_name: String,
}

#[async_trait]
pub trait GenerationHook: Send + Sync {
    async fn on_generation(&self, event: GenerationEvent) -> anyhow::Result<()>;
}

/// Hook used when no other is configured: run the metric and log its score
pub struct MetricEvaluator;

#[async_trait]
impl GenerationHook for MetricEvaluator {
    async fn on_generation(&self, event: GenerationEvent) -> anyhow::Result<()> {
        let result = event.metric.measure(&event.input, &event.output).await?;
        tracing::info!(
            agent = %event.agent_name,
            run_id = %event.run_id,
            metric = %event.metric_name,
            score = result.score,
            "Metric evaluated"
        );
        Ok(())
    }
}

/// Turn text handed to every metric hook
pub(crate) struct TurnText<'a> {
    pub input: &'a str,
    pub output: &'a str,
    pub run_id: &'a str,
    pub agent_name: &'a str,
}

/// Fire `hook` once for every metric, applying the failure policy
pub(crate) async fn fire_hooks(
    hook: &dyn GenerationHook,
    metrics: &[(String, Arc<dyn Metric>)],
    turn: TurnText<'_>,
    policy: MetricFailurePolicy,
) -> Result<()> {
    for (name, metric) in metrics {
        let event = GenerationEvent {
            input: turn.input.to_string(),
            output: turn.output.to_string(),
            run_id: turn.run_id.to_string(),
            metric_name: name.clone(),
            metric: Arc::clone(metric),
            agent_name: turn.agent_name.to_string(),
        };

        if let Err(e) = hook.on_generation(event).await {
            match policy {
                MetricFailurePolicy::Propagate => return Err(AgentError::Metric(e)),
                MetricFailurePolicy::Log => {
                    tracing::warn!(run_id = %turn.run_id, "Metric {} failed: {}", name, e);
                }
            }
        }
    }
    Ok(())
}
