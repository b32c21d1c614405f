use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use tessera_agent::{AgentBuilder, AgentSettings};
use tessera_memory::InMemoryStore;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_agent_name")]
    pub name: String,
    #[serde(default)]
    pub instructions: String,
    #[serde(flatten)]
    pub settings: AgentSettings,
}

fn default_agent_name() -> String {
    "assistant".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            instructions: String::new(),
            settings: AgentSettings::default(),
        }
    }
}

impl AgentConfig {
    /// Builder pre-filled with name, instructions and settings
    pub fn builder(&self) -> AgentBuilder {
        AgentBuilder::new()
            .name(&self.name)
            .instructions(&self.instructions)
            .settings(self.settings.clone())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemoryConfig {
    /// Cap on context window size, unlimited when absent
    #[serde(default)]
    pub last_messages: Option<usize>,
}

impl MemoryConfig {
    pub fn in_memory_store(&self) -> InMemoryStore {
        match self.last_messages {
            Some(n) => InMemoryStore::new().with_last_messages(n),
            None => InMemoryStore::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// `json` or `pretty`
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

impl Config {
    /// Load configuration from TOML files and environment variables
    ///
    /// Hierarchy (weakest to strongest):
    /// 1. config/default.toml
    /// 2. config/{ENV}.toml (if ENV is set)
    /// 3. Environment variables with the TESSERA prefix, e.g.
    ///    `TESSERA_AGENT__MAX_STEPS=3` or `TESSERA_LOGGING__LEVEL=debug`
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("ENV").unwrap_or_else(|_| "dev".to_string());

        let builder = ConfigLoader::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                Environment::with_prefix("TESSERA")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Load config from a specific path (useful for testing)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let builder = ConfigLoader::builder().add_source(File::from(path.as_ref()));

        let config = builder.build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_agent::MetricFailurePolicy;

    #[test]
    fn test_config_structure() {
        let toml = r#"
            [agent]
            name = "tutor"
            instructions = "You are a helpful tutor"
            max_steps = 3
            metric_failure = "log"

            [memory]
            last_messages = 20

            [logging]
            level = "debug"
            format = "json"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.agent.name, "tutor");
        assert_eq!(config.agent.settings.max_steps, 3);
        assert_eq!(config.agent.settings.metric_failure, MetricFailurePolicy::Log);
        assert_eq!(config.agent.settings.default_title, "New Thread");
        assert_eq!(config.memory.last_messages, Some(20));
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.agent.name, "assistant");
        assert_eq!(config.agent.settings.max_steps, 5);
        assert_eq!(config.memory.last_messages, None);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_agent_builder_from_config() {
        let config = AgentConfig {
            name: "tutor".into(),
            instructions: "Be brief".into(),
            settings: AgentSettings::default(),
        };
        let model = std::sync::Arc::new(tessera_llm::ScriptedModel::new());
        let agent = config.builder().model(model).build().unwrap();
        assert_eq!(agent.name(), "tutor");
        assert_eq!(agent.instructions(), "Be brief");
    }
}
