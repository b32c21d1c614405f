use crate::tools::Toolset;
use serde_json::Value;
use tessera_llm::{FinishCallback, Message, StepFinishCallback};

/// Requested output shape of a turn
#[derive(Debug, Clone, Default, PartialEq)]
pub enum OutputMode {
    #[default]
    Text,
    /// JSON schema the model's object must satisfy
    Structured(Value),
}

/// Messages accepted by `generate`/`stream`
#[derive(Debug, Clone, PartialEq)]
pub enum AgentInput {
    /// One user message
    Text(String),
    /// One user message per entry
    Texts(Vec<String>),
    Messages(Vec<Message>),
}

impl AgentInput {
    pub fn into_messages(self) -> Vec<Message> {
        match self {
            Self::Text(text) => vec![Message::human(text)],
            Self::Texts(texts) => texts.into_iter().map(Message::human).collect(),
            Self::Messages(messages) => messages,
        }
    }
}

impl From<&str> for AgentInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for AgentInput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<String>> for AgentInput {
    fn from(texts: Vec<String>) -> Self {
        Self::Texts(texts)
    }
}

impl From<Vec<&str>> for AgentInput {
    fn from(texts: Vec<&str>) -> Self {
        Self::Texts(texts.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<Message>> for AgentInput {
    fn from(messages: Vec<Message>) -> Self {
        Self::Messages(messages)
    }
}

impl From<Message> for AgentInput {
    fn from(message: Message) -> Self {
        Self::Messages(vec![message])
    }
}

/// Options for [`Agent::generate`](crate::Agent::generate)
#[derive(Clone, Default)]
pub struct GenerateOptions {
    pub resource_id: Option<String>,
    pub thread_id: Option<String>,
    /// Messages placed between the system message and the resolved window
    pub context: Vec<Message>,
    /// Falls back to the agent's configured default
    pub max_steps: Option<u32>,
    pub on_step_finish: Option<StepFinishCallback>,
    pub run_id: Option<String>,
    pub toolsets: Vec<Toolset>,
    pub output: OutputMode,
}

impl GenerateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn context(mut self, context: Vec<Message>) -> Self {
        self.context = context;
        self
    }

    pub fn max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    pub fn on_step_finish(mut self, callback: StepFinishCallback) -> Self {
        self.on_step_finish = Some(callback);
        self
    }

    pub fn run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn toolset(mut self, toolset: Toolset) -> Self {
        self.toolsets.push(toolset);
        self
    }

    pub fn output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    pub fn structured(self, schema: Value) -> Self {
        self.output(OutputMode::Structured(schema))
    }
}

/// Options for [`Agent::stream`](crate::Agent::stream)
#[derive(Default)]
pub struct StreamOptions {
    pub base: GenerateOptions,
    /// Receives the raw serialized completion payload, after persistence
    pub on_finish: Option<FinishCallback>,
}

impl StreamOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_finish(mut self, callback: FinishCallback) -> Self {
        self.on_finish = Some(callback);
        self
    }

    pub fn resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.base = self.base.resource_id(resource_id);
        self
    }

    pub fn thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.base = self.base.thread_id(thread_id);
        self
    }

    pub fn run_id(mut self, run_id: impl Into<String>) -> Self {
        self.base = self.base.run_id(run_id);
        self
    }

    pub fn context(mut self, context: Vec<Message>) -> Self {
        self.base = self.base.context(context);
        self
    }

    pub fn on_step_finish(mut self, callback: StepFinishCallback) -> Self {
        self.base = self.base.on_step_finish(callback);
        self
    }

    pub fn output(mut self, output: OutputMode) -> Self {
        self.base = self.base.output(output);
        self
    }

    pub fn max_steps(mut self, max_steps: u32) -> Self {
        self.base = self.base.max_steps(max_steps);
        self
    }

    pub fn toolset(mut self, toolset: Toolset) -> Self {
        self.base = self.base.toolset(toolset);
        self
    }

    pub fn structured(mut self, schema: Value) -> Self {
        self.base = self.base.structured(schema);
        self
    }
}

impl From<GenerateOptions> for StreamOptions {
    fn from(base: GenerateOptions) -> Self {
        Self {
            base,
            on_finish: None,
        }
    }
}
