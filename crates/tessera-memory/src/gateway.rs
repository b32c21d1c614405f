use crate::error::Result;
use crate::models::{StoredMessage, Thread};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tessera_llm::Message;

/// Trait for conversation memory backends
///
/// Owns thread identity, message persistence, context-window retrieval and
/// the tool-result cache. The agent pipeline only ever reads the cache.
#[async_trait]
pub trait MemoryGateway: Send + Sync {
    /// Create a thread for `resource_id`, reusing `thread_id` when supplied
    async fn create_thread(
        &self,
        resource_id: &str,
        thread_id: Option<&str>,
        title: &str,
    ) -> Result<Thread>;

    async fn get_thread_by_id(&self, thread_id: &str) -> Result<Option<Thread>>;

    /// Append messages to their threads
    async fn save_messages(&self, messages: Vec<StoredMessage>) -> Result<()>;

    /// Prior messages of a thread in chronological order, optionally bounded
    async fn get_context_window(
        &self,
        thread_id: &str,
        range: Option<DateRange>,
    ) -> Result<Vec<Message>>;

    /// Cached result of an earlier call to `tool_name` with equivalent `args`
    async fn get_tool_result(
        &self,
        thread_id: &str,
        tool_name: &str,
        args: &Value,
    ) -> Result<Option<Value>>;

    fn generate_id(&self) -> String;
}

/// Half-open date range `[start, end)`
///
/// Either bound may be absent, in which case that side is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| at >= start) && self.end.map_or(true, |end| at < end)
    }
}

/// Rebuild a JSON value with every object's keys in sorted order
///
/// Two argument objects that differ only in key order canonicalize to the
/// same value and the same serialized string.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Key identifying a cached tool result
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub thread_id: String,
    pub tool_name: String,
    pub args: String,
}

impl CacheKey {
    pub fn new(thread_id: &str, tool_name: &str, args: &Value) -> Self {
        Self {
            thread_id: thread_id.to_string(),
            tool_name: tool_name.to_string(),
            args: canonicalize(args).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_canonical_key_ignores_key_order() {
        let a: Value = serde_json::from_str(r#"{"b": 1, "a": {"y": 2, "x": [ {"q": 1, "p": 2} ]}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a": {"x": [ {"p": 2, "q": 1} ], "y": 2}, "b": 1}"#).unwrap();

        assert_eq!(CacheKey::new("t", "lookup", &a), CacheKey::new("t", "lookup", &b));
    }

    #[test]
    fn test_canonical_key_distinguishes_values() {
        let a = json!({"id": 1});
        let b = json!({"id": 2});
        assert_ne!(CacheKey::new("t", "lookup", &a), CacheKey::new("t", "lookup", &b));
        assert_ne!(CacheKey::new("t1", "lookup", &a), CacheKey::new("t2", "lookup", &a));
    }

    #[test]
    fn test_date_range_is_half_open() {
        let start = Utc::now() - Duration::days(8);
        let end = start + Duration::days(7);
        let range = DateRange::new(Some(start), Some(end));

        assert!(range.contains(start));
        assert!(range.contains(end - Duration::seconds(1)));
        assert!(!range.contains(end));
        assert!(!range.contains(start - Duration::seconds(1)));
        assert!(DateRange::default().contains(Utc::now()));
    }
}
