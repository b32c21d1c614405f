use crate::config::AgentSettings;
use crate::error::Result;
use crate::pipeline::to_stored;
use crate::prompts::{context_prompt, TITLE_PROMPT};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tessera_llm::{generate_typed, GenerateRequest, Message, ModelGateway};
use tessera_memory::{DateRange, MemoryGateway, Thread};

/// Classification of whether a message refers back to an earlier conversation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextReference {
    pub uses_context: bool,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

impl ContextReference {
    /// Date range to bound the context window with, if a reference was found
    pub fn range(&self) -> Option<DateRange> {
        if !self.uses_context {
            return None;
        }
        let start = self.start_date.as_deref().and_then(parse_date);
        let end = self.end_date.as_deref().and_then(parse_date);
        Some(DateRange::new(start, end))
    }
}

#[derive(Debug, Deserialize)]
struct TitleReply {
    title: String,
}

/// Accept RFC 3339 timestamps and bare `YYYY-MM-DD` dates (midnight UTC)
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Drop double quotes and colons, collapse whitespace and cap the length
///
/// Apostrophes inside the title are kept; a single-quote pair wrapping the
/// whole title is removed.
pub fn sanitize_title(raw: &str, max_chars: usize) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '"' | ':' | '`' | '\u{201c}' | '\u{201d}'))
        .collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let unwrapped = [('\'', '\''), ('\u{2018}', '\u{2019}')]
        .into_iter()
        .find_map(|(open, close)| collapsed.strip_prefix(open)?.strip_suffix(close))
        .map(str::trim)
        .unwrap_or(&collapsed);
    unwrapped.chars().take(max_chars).collect::<String>().trim_end().to_string()
}

pub fn most_recent_user_message(messages: &[Message]) -> Option<&Message> {
    messages.iter().rev().find(|m| m.is_user())
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Outcome of resolving memory for a turn
#[derive(Debug, Clone)]
pub struct ResolvedMemory {
    pub thread_id: String,
    /// Prior window followed by the newest message(s)
    pub messages: Vec<Message>,
}

/// Decides thread identity and assembles the message window
pub struct MemoryResolver<'a> {
    pub agent_name: &'a str,
    pub model: &'a dyn ModelGateway,
    pub memory: &'a dyn MemoryGateway,
    pub settings: &'a AgentSettings,
}

impl<'a> MemoryResolver<'a> {
    pub async fn resolve(
        &self,
        thread_id: Option<&str>,
        resource_id: &str,
        messages: &[Message],
        run_id: &str,
    ) -> Result<ResolvedMemory> {
        let user_message = most_recent_user_message(messages);

        let thread = match thread_id {
            None => {
                tracing::debug!(run_id, "No thread id, creating new thread for agent {}", self.agent_name);
                self.create_thread(resource_id, None, user_message).await?
            }
            Some(id) => match self.memory.get_thread_by_id(id).await? {
                Some(thread) => thread,
                None => {
                    tracing::debug!(run_id, "Thread {} not found, creating it for agent {}", id, self.agent_name);
                    self.create_thread(resource_id, Some(id), user_message).await?
                }
            },
        };

        let new_messages: Vec<Message> = match user_message {
            Some(message) => vec![message.clone()],
            None => messages.to_vec(),
        };
        let records = new_messages
            .iter()
            .map(|m| to_stored(m, &thread.id, self.memory.generate_id()))
            .collect::<Vec<_>>();

        let range = match self.classify_context(&new_messages).await {
            Ok(reference) => {
                tracing::debug!(run_id, thread_id = %thread.id, "Context classification: {:?}", reference);
                reference.range()
            }
            Err(e) => {
                tracing::debug!(run_id, thread_id = %thread.id, "No context found: {}", e);
                None
            }
        };

        let window = match self.memory.get_context_window(&thread.id, range).await {
            Ok(window) => window,
            Err(e) => {
                tracing::error!(run_id, thread_id = %thread.id, "Failed to read context window: {}", e);
                Vec::new()
            }
        };

        match self.memory.save_messages(records).await {
            Ok(()) => tracing::debug!(run_id, thread_id = %thread.id, "Saved messages to memory"),
            Err(e) => tracing::error!(run_id, thread_id = %thread.id, "Failed to save messages: {}", e),
        }

        let mut combined = window;
        combined.extend(new_messages);
        Ok(ResolvedMemory {
            thread_id: thread.id,
            messages: combined,
        })
    }

    async fn create_thread(
        &self,
        resource_id: &str,
        thread_id: Option<&str>,
        user_message: Option<&Message>,
    ) -> Result<Thread> {
        let title = self.gen_title(user_message).await;
        Ok(self.memory.create_thread(resource_id, thread_id, &title).await?)
    }

    /// Summarize the user's message into a thread title, never failing
    pub async fn gen_title(&self, user_message: Option<&Message>) -> String {
        let Some(message) = user_message else {
            return self.settings.default_title.clone();
        };

        match self.request_title(message).await {
            Ok(title) if !title.is_empty() => title,
            Ok(_) => self.settings.default_title.clone(),
            Err(e) => {
                tracing::error!("Error generating title: {:#}", e);
                self.settings.default_title.clone()
            }
        }
    }

    async fn request_title(&self, message: &Message) -> anyhow::Result<String> {
        let request = GenerateRequest::new(vec![
            Message::system(TITLE_PROMPT),
            Message::human(serde_json::to_string(message)?),
        ]);
        let schema = json!({
            "type": "object",
            "properties": { "title": { "type": "string" } },
            "required": ["title"]
        });

        let reply: TitleReply = generate_typed(self.model, request, schema).await?;
        Ok(sanitize_title(&reply.title, self.settings.title_max_chars))
    }

    /// Ask the model whether `messages` reference a prior conversation
    pub async fn classify_context(&self, messages: &[Message]) -> anyhow::Result<ContextReference> {
        let mut prompt = vec![Message::system(context_prompt(&now_iso()))];
        prompt.extend(messages.iter().cloned());

        let schema = json!({
            "type": "object",
            "properties": {
                "usesContext": { "type": "boolean" },
                "startDate": { "type": "string", "format": "date-time" },
                "endDate": { "type": "string", "format": "date-time" }
            },
            "required": ["usesContext"]
        });

        generate_typed(self.model, GenerateRequest::new(prompt), schema).await
    }
}
