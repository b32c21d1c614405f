use crate::error::{MemoryError, Result};
use crate::gateway::{CacheKey, DateRange, MemoryGateway};
use crate::models::{StoredMessage, Thread};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use tessera_llm::{ContentPart, Message, Role};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    threads: HashMap<String, Thread>,
    messages: HashMap<String, Vec<StoredMessage>>,
}

/// In-process [`MemoryGateway`] backed by hash maps
///
/// Suitable for tests, demos and single-process deployments. Cached tool
/// results are served from persisted assistant/tool message pairs.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
    last_messages: Option<usize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap context windows to the most recent `n` messages
    pub fn with_last_messages(mut self, n: usize) -> Self {
        self.last_messages = Some(n);
        self
    }

    /// All stored rows of a thread in insertion order
    pub async fn messages(&self, thread_id: &str) -> Vec<StoredMessage> {
        let inner = self.inner.read().await;
        inner.messages.get(thread_id).cloned().unwrap_or_default()
    }

    /// Threads owned by a resource, oldest first
    pub async fn threads_for(&self, resource_id: &str) -> Vec<Thread> {
        let inner = self.inner.read().await;
        let mut threads: Vec<Thread> = inner
            .threads
            .values()
            .filter(|t| t.resource_id == resource_id)
            .cloned()
            .collect();
        threads.sort_by_key(|t| t.created_at);
        threads
    }
}

/// Find the result part answering `call_id` among tool messages
fn find_result(rows: &[StoredMessage], call_id: &str) -> Option<Value> {
    rows.iter()
        .filter(|row| row.role == Role::Tool)
        .filter_map(|row| row.content.parts())
        .flatten()
        .find_map(|part| match part {
            ContentPart::ToolResult {
                tool_call_id,
                result,
                is_error: false,
                ..
            } if tool_call_id == call_id => Some(result.clone()),
            _ => None,
        })
}

#[async_trait]
impl MemoryGateway for InMemoryStore {
    async fn create_thread(
        &self,
        resource_id: &str,
        thread_id: Option<&str>,
        title: &str,
    ) -> Result<Thread> {
        let id = thread_id
            .map(str::to_string)
            .unwrap_or_else(|| self.generate_id());
        let thread = Thread::new(id, resource_id, title);

        let mut inner = self.inner.write().await;
        inner.threads.insert(thread.id.clone(), thread.clone());
        inner.messages.entry(thread.id.clone()).or_default();

        tracing::debug!("Created thread {} for resource {}", thread.id, resource_id);
        Ok(thread)
    }

    async fn get_thread_by_id(&self, thread_id: &str) -> Result<Option<Thread>> {
        let inner = self.inner.read().await;
        Ok(inner.threads.get(thread_id).cloned())
    }

    async fn save_messages(&self, messages: Vec<StoredMessage>) -> Result<()> {
        let mut inner = self.inner.write().await;

        if let Some(missing) = messages
            .iter()
            .find(|m| !inner.threads.contains_key(&m.thread_id))
        {
            return Err(MemoryError::ThreadNotFound(missing.thread_id.clone()));
        }

        let now = Utc::now();
        for message in messages {
            if let Some(thread) = inner.threads.get_mut(&message.thread_id) {
                thread.updated_at = now;
            }
            inner
                .messages
                .entry(message.thread_id.clone())
                .or_default()
                .push(message);
        }

        Ok(())
    }

    async fn get_context_window(
        &self,
        thread_id: &str,
        range: Option<DateRange>,
    ) -> Result<Vec<Message>> {
        let inner = self.inner.read().await;
        let range = range.unwrap_or_default();

        let mut rows: Vec<&StoredMessage> = inner
            .messages
            .get(thread_id)
            .map(|rows| rows.iter().filter(|r| range.contains(r.created_at)).collect())
            .unwrap_or_default();
        // Stable: rows sharing a timestamp keep insertion order
        rows.sort_by_key(|r| r.created_at);

        if let Some(n) = self.last_messages {
            let skip = rows.len().saturating_sub(n);
            rows = rows.split_off(skip);
        }

        Ok(rows.into_iter().map(StoredMessage::to_message).collect())
    }

    async fn get_tool_result(
        &self,
        thread_id: &str,
        tool_name: &str,
        args: &Value,
    ) -> Result<Option<Value>> {
        let inner = self.inner.read().await;
        let Some(rows) = inner.messages.get(thread_id) else {
            return Ok(None);
        };
        let wanted = CacheKey::new(thread_id, tool_name, args);

        for row in rows.iter().filter(|r| r.role == Role::Assistant) {
            let (Some(ids), Some(names), Some(call_args)) =
                (&row.tool_call_ids, &row.tool_names, &row.tool_call_args)
            else {
                continue;
            };

            for ((id, name), call_args) in ids.iter().zip(names).zip(call_args) {
                if CacheKey::new(thread_id, name, call_args) == wanted {
                    if let Some(result) = find_result(rows, id) {
                        tracing::debug!("Cache hit for tool {} in thread {}", tool_name, thread_id);
                        return Ok(Some(result));
                    }
                }
            }
        }

        Ok(None)
    }

    fn generate_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}
