use async_trait::async_trait;
use chrono::{Duration, SecondsFormat, Utc};
use futures::{FutureExt, StreamExt};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tessera_agent::{
    to_stored, Agent, AgentError, AgentOutput, AgentSettings, GenerateOptions, GenerationEvent,
    GenerationHook, MemoryResolver, Metric, MetricFailurePolicy, MetricResult, Services,
    StreamOptions, ToolDefinition, Toolset,
};
use tessera_llm::{
    collect_text, ContentPart, Generation, Message, Reply, RequestKind, Role, ScriptedModel,
    StreamEvent,
};
use tessera_memory::{
    DateRange, InMemoryStore, MemoryError, MemoryGateway, MessageType, StoredMessage, Thread,
};

/// Memory gateway that records window ranges and can fail on demand
#[derive(Default)]
struct RecordingMemory {
    inner: InMemoryStore,
    ranges: Mutex<Vec<Option<DateRange>>>,
    saves: AtomicUsize,
    fail_saves: bool,
}

impl RecordingMemory {
    fn failing_saves() -> Self {
        Self {
            fail_saves: true,
            ..Default::default()
        }
    }

    fn ranges(&self) -> Vec<Option<DateRange>> {
        self.ranges.lock().unwrap().clone()
    }
}

#[async_trait]
impl MemoryGateway for RecordingMemory {
    async fn create_thread(
        &self,
        resource_id: &str,
        thread_id: Option<&str>,
        title: &str,
    ) -> tessera_memory::Result<Thread> {
        self.inner.create_thread(resource_id, thread_id, title).await
    }

    async fn get_thread_by_id(&self, thread_id: &str) -> tessera_memory::Result<Option<Thread>> {
        self.inner.get_thread_by_id(thread_id).await
    }

    async fn save_messages(&self, messages: Vec<StoredMessage>) -> tessera_memory::Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.fail_saves {
            return Err(MemoryError::Storage("disk full".to_string()));
        }
        self.inner.save_messages(messages).await
    }

    async fn get_context_window(
        &self,
        thread_id: &str,
        range: Option<DateRange>,
    ) -> tessera_memory::Result<Vec<Message>> {
        self.ranges.lock().unwrap().push(range);
        self.inner.get_context_window(thread_id, range).await
    }

    async fn get_tool_result(
        &self,
        thread_id: &str,
        tool_name: &str,
        args: &Value,
    ) -> tessera_memory::Result<Option<Value>> {
        self.inner.get_tool_result(thread_id, tool_name, args).await
    }

    fn generate_id(&self) -> String {
        self.inner.generate_id()
    }
}

fn agent(model: &Arc<ScriptedModel>, services: Services) -> Agent {
    Agent::builder()
        .name("tutor")
        .instructions("You are a helpful tutor")
        .model(model.clone())
        .services(services)
        .build()
        .unwrap()
}

fn texts(messages: &[Message]) -> Vec<String> {
    messages.iter().map(|m| m.content().to_plain_text()).collect()
}

fn counting_lookup(calls: Arc<AtomicUsize>) -> ToolDefinition {
    ToolDefinition::from_fn(
        "Look up a value",
        json!({"type": "object", "properties": {"key": {"type": "string"}}}),
        move |_args, _ctx| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!({"value": 7}))
            }
        },
    )
}

#[tokio::test]
async fn test_new_conversation_creates_titled_thread() {
    let model = Arc::new(ScriptedModel::new());
    model.push_object(Reply::Object(json!({"title": "\"Explain: Photosynthesis\""})));
    model.push_object(Reply::Object(json!({"usesContext": false})));
    model.push_text(Reply::text("Plants turn light into chemical energy."));

    let store = Arc::new(InMemoryStore::new());
    let agent = agent(&model, Services::new().with_memory(store.clone()));

    let response = agent
        .generate("Explain photosynthesis", GenerateOptions::new().resource_id("u1"))
        .await
        .unwrap();

    let threads = store.threads_for("u1").await;
    assert_eq!(threads.len(), 1);
    assert_eq!(threads[0].title, "Explain Photosynthesis");
    assert_eq!(response.thread_id.as_deref(), Some(threads[0].id.as_str()));

    let main = &model.requests_of(RequestKind::Text)[0];
    assert_eq!(main.messages.len(), 2);
    assert_eq!(main.messages[0].role(), Role::System);
    let system = main.messages[0].content().to_plain_text();
    assert!(system.starts_with("You are a helpful tutor. Today's date is "));
    assert_eq!(main.messages[1], Message::human("Explain photosynthesis"));
    assert_eq!(main.max_steps, 5);

    // Title request carries the user message serialized as JSON
    let title_request = &model.requests_of(RequestKind::Object)[0];
    let sent = title_request.messages[1].content().to_plain_text();
    assert!(sent.contains("\"role\":\"user\""));

    let stored = store.messages(&threads[0].id).await;
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].role, Role::User);
    assert_eq!(stored[1].role, Role::Assistant);
    assert_eq!(response.output, AgentOutput::Text("Plants turn light into chemical energy.".into()));
}

#[tokio::test]
async fn test_title_failure_falls_back() {
    let model = Arc::new(ScriptedModel::new());
    model.push_object(Reply::Error("title model down".into()));
    model.push_text(Reply::text("Hi!"));

    let store = Arc::new(InMemoryStore::new());
    let agent = agent(&model, Services::new().with_memory(store.clone()));
    agent
        .generate("hello", GenerateOptions::new().resource_id("u1"))
        .await
        .unwrap();

    let threads = store.threads_for("u1").await;
    assert_eq!(threads[0].title, "New Thread");
}

#[tokio::test]
async fn test_unknown_thread_id_is_created_with_that_id() {
    let model = Arc::new(ScriptedModel::new());
    model.push_object(Reply::Object(json!({"title": "Greeting"})));
    model.push_text(Reply::text("Hi!"));

    let store = Arc::new(InMemoryStore::new());
    let agent = agent(&model, Services::new().with_memory(store.clone()));
    let response = agent
        .generate(
            "hello",
            GenerateOptions::new().resource_id("u1").thread_id("my-thread"),
        )
        .await
        .unwrap();

    assert_eq!(response.thread_id.as_deref(), Some("my-thread"));
    let thread = store.get_thread_by_id("my-thread").await.unwrap().unwrap();
    assert_eq!(thread.title, "Greeting");
}

#[tokio::test]
async fn test_context_reference_bounds_the_window() {
    let memory = Arc::new(RecordingMemory::default());
    let thread = memory.create_thread("u1", Some("t1"), "Chat").await.unwrap();
    let now = Utc::now();
    let old = StoredMessage::new("m1", &thread.id, &Message::human("ancient question"), MessageType::Text)
        .with_created_at(now - Duration::days(20));
    let recent = StoredMessage::new("m2", &thread.id, &Message::human("how do tides work?"), MessageType::Text)
        .with_created_at(now - Duration::days(6));
    memory.save_messages(vec![old, recent]).await.unwrap();

    let start = (now - Duration::days(8)).to_rfc3339_opts(SecondsFormat::Millis, true);
    let end = (now - Duration::days(1)).to_rfc3339_opts(SecondsFormat::Millis, true);

    let model = Arc::new(ScriptedModel::new());
    model.push_object(Reply::Object(json!({
        "usesContext": true,
        "startDate": start,
        "endDate": end,
    })));
    model.push_text(Reply::text("You asked how tides work."));

    let agent = agent(&model, Services::new().with_memory(memory.clone()));
    agent
        .generate(
            "what did I ask last week?",
            GenerateOptions::new().resource_id("u1").thread_id("t1"),
        )
        .await
        .unwrap();

    let ranges = memory.ranges();
    assert_eq!(ranges.len(), 1);
    let range = ranges[0].expect("window should be bounded");
    let start = range.start.unwrap();
    let end = range.end.unwrap();
    assert!(now - start >= Duration::days(7) && now - start <= Duration::days(9));
    assert!(end < now);

    // Classification prompt carries today's date
    let classify = &model.requests_of(RequestKind::Object)[0];
    assert!(classify.messages[0]
        .content()
        .to_plain_text()
        .contains("Today's date is"));

    let main = &model.requests_of(RequestKind::Text)[0];
    assert_eq!(
        texts(&main.messages[1..]),
        vec!["how do tides work?", "what did I ask last week?"]
    );
}

#[tokio::test]
async fn test_classification_failure_uses_unbounded_window() {
    let memory = Arc::new(RecordingMemory::default());
    memory.create_thread("u1", Some("t1"), "Chat").await.unwrap();

    let model = Arc::new(ScriptedModel::new());
    model.push_object(Reply::Error("bad json".into()));
    model.push_text(Reply::text("ok"));

    let agent = agent(&model, Services::new().with_memory(memory.clone()));
    agent
        .generate("hi", GenerateOptions::new().resource_id("u1").thread_id("t1"))
        .await
        .unwrap();

    assert_eq!(memory.ranges(), vec![None]);
}

#[tokio::test]
async fn test_window_excludes_newest_message_and_is_prefixed() {
    let store = Arc::new(InMemoryStore::new());
    let model = Arc::new(ScriptedModel::new());
    let agent = agent(&model, Services::new().with_memory(store.clone()));

    model.push_text(Reply::text("first answer"));
    agent
        .generate("first", GenerateOptions::new().resource_id("u1").thread_id("t1"))
        .await
        .unwrap();

    model.push_text(Reply::text("second answer"));
    agent
        .generate(
            "second",
            GenerateOptions::new()
                .resource_id("u1")
                .thread_id("t1")
                .context(vec![Message::human("pinned context")]),
        )
        .await
        .unwrap();

    let second = &model.requests_of(RequestKind::Text)[1];
    assert_eq!(
        texts(&second.messages[1..]),
        vec!["pinned context", "first", "first answer", "second"]
    );
}

#[tokio::test]
async fn test_without_memory_messages_pass_through() {
    let model = Arc::new(ScriptedModel::new());
    model.push_text(Reply::text("ok"));
    let store = Arc::new(InMemoryStore::new());

    // Memory configured but no resource id: still a pass-through
    let agent = agent(&model, Services::new().with_memory(store.clone()));
    let input = vec![Message::human("a"), Message::ai("b"), Message::human("c")];
    let response = agent
        .generate(input.clone(), GenerateOptions::new())
        .await
        .unwrap();

    assert!(response.thread_id.is_none());
    let main = &model.requests_of(RequestKind::Text)[0];
    assert_eq!(main.messages[1..].to_vec(), input);
    assert!(store.threads_for("u1").await.is_empty());
    assert!(model.requests_of(RequestKind::Object).is_empty());
}

#[tokio::test]
async fn test_answered_tool_calls_are_persisted_with_audit_columns() {
    let calls = Arc::new(AtomicUsize::new(0));
    let model = Arc::new(ScriptedModel::new());
    model.push_text(Reply::tool_call("c1", "lookup", json!({"key": "a"}), "The value is 7"));

    let store = Arc::new(InMemoryStore::new());
    let agent = Agent::builder()
        .name("tutor")
        .instructions("Use tools")
        .model(model.clone())
        .tool("lookup", counting_lookup(calls.clone()))
        .services(Services::new().with_memory(store.clone()))
        .build()
        .unwrap();

    let response = agent
        .generate("look up a", GenerateOptions::new().resource_id("u1").thread_id("t1"))
        .await
        .unwrap();
    assert_eq!(response.text(), "The value is 7");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let stored = store.messages("t1").await;
    let kinds: Vec<MessageType> = stored.iter().map(|m| m.message_type).collect();
    assert_eq!(
        kinds,
        vec![
            MessageType::Text,
            MessageType::ToolCall,
            MessageType::ToolResult,
            MessageType::Text
        ]
    );
    assert_eq!(stored[1].tool_call_ids, Some(vec!["c1".to_string()]));
    assert_eq!(stored[1].tool_names, Some(vec!["lookup".to_string()]));
    assert_eq!(stored[1].tool_call_args, Some(vec![json!({"key": "a"})]));
    assert_eq!(stored[2].tool_call_ids, Some(vec!["c1".to_string()]));
}

#[tokio::test]
async fn test_dangling_tool_call_is_not_persisted() {
    let model = Arc::new(ScriptedModel::new());
    model.push_text(Reply::Truncated {
        text: None,
        id: "c2".into(),
        name: "lookup".into(),
        args: json!({}),
    });
    model.push_text(Reply::Truncated {
        text: Some("Let me check".into()),
        id: "c3".into(),
        name: "lookup".into(),
        args: json!({}),
    });

    let store = Arc::new(InMemoryStore::new());
    let agent = agent(&model, Services::new().with_memory(store.clone()));
    let options = GenerateOptions::new().resource_id("u1").thread_id("t1");

    agent.generate("first", options.clone()).await.unwrap();
    let stored = store.messages("t1").await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].role, Role::User);

    agent.generate("second", options).await.unwrap();
    let stored = store.messages("t1").await;
    assert_eq!(stored.len(), 3);
    assert_eq!(
        stored[2].to_message(),
        Message::ai_with_parts(vec![ContentPart::text("Let me check")])
    );
    assert_eq!(stored[2].tool_call_ids, None);
}

#[tokio::test]
async fn test_cached_tool_result_skips_execution() {
    let store = Arc::new(InMemoryStore::new());
    let thread = store.create_thread("u1", Some("t1"), "Chat").await.unwrap();

    // A previous turn already answered lookup with these args
    let prior_args: Value = serde_json::from_str(r#"{"key": "a", "scope": "all"}"#).unwrap();
    let prior = vec![
        Message::ai_with_parts(vec![ContentPart::tool_call("c0", "lookup", prior_args)]),
        Message::tool_result("c0", "lookup", json!({"value": 42})),
    ];
    let rows = prior
        .iter()
        .map(|m| to_stored(m, &thread.id, store.generate_id()))
        .collect();
    store.save_messages(rows).await.unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let model = Arc::new(ScriptedModel::new());
    let reordered: Value = serde_json::from_str(r#"{"scope": "all", "key": "a"}"#).unwrap();
    model.push_text(Reply::tool_call("c1", "lookup", reordered, "Still 42"));

    let agent = Agent::builder()
        .name("tutor")
        .model(model.clone())
        .tool("lookup", counting_lookup(calls.clone()).with_cache(true))
        .services(Services::new().with_memory(store.clone()))
        .build()
        .unwrap();

    let response = agent
        .generate("look up a", GenerateOptions::new().resource_id("u1").thread_id("t1"))
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(response.generation.tool_results[0].result, json!({"value": 42}));
}

#[tokio::test]
async fn test_thread_id_without_resource_id_does_not_reach_memory() {
    // Another resource's thread already holds an answer for this call
    let store = Arc::new(InMemoryStore::new());
    let thread = store.create_thread("other-user", Some("t1"), "Private").await.unwrap();
    let rows = vec![
        Message::ai_with_parts(vec![ContentPart::tool_call("c0", "lookup", json!({"key": "a"}))]),
        Message::tool_result("c0", "lookup", json!({"value": 42})),
    ]
    .iter()
    .map(|m| to_stored(m, &thread.id, store.generate_id()))
    .collect();
    store.save_messages(rows).await.unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let model = Arc::new(ScriptedModel::new());
    model.push_text(Reply::tool_call("c1", "lookup", json!({"key": "a"}), "done"));

    let agent = agent(&model, Services::new().with_memory(store.clone()));
    let toolset = Toolset::new("extra").tool("lookup", counting_lookup(calls.clone()).with_cache(true));
    let response = agent
        .generate(
            "look up a",
            GenerateOptions::new().thread_id("t1").toolset(toolset),
        )
        .await
        .unwrap();

    assert!(response.thread_id.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(response.generation.tool_results[0].result, json!({"value": 7}));
    assert_eq!(store.messages("t1").await.len(), 2);
}

#[tokio::test]
async fn test_cache_disabled_tool_always_executes() {
    let store = Arc::new(InMemoryStore::new());
    let thread = store.create_thread("u1", Some("t1"), "Chat").await.unwrap();
    let rows = vec![
        Message::ai_with_parts(vec![ContentPart::tool_call("c0", "lookup", json!({"key": "a"}))]),
        Message::tool_result("c0", "lookup", json!({"value": 42})),
    ]
    .iter()
    .map(|m| to_stored(m, &thread.id, store.generate_id()))
    .collect();
    store.save_messages(rows).await.unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let model = Arc::new(ScriptedModel::new());
    model.push_text(Reply::tool_call("c1", "lookup", json!({"key": "a"}), "7"));

    let agent = Agent::builder()
        .name("tutor")
        .model(model.clone())
        .tool("lookup", counting_lookup(calls.clone()))
        .services(Services::new().with_memory(store.clone()))
        .build()
        .unwrap();
    let response = agent
        .generate("look up a", GenerateOptions::new().resource_id("u1").thread_id("t1"))
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(response.generation.tool_results[0].result, json!({"value": 7}));
}

#[tokio::test]
async fn test_toolset_overrides_own_tool_and_enables_conversion() {
    let own_calls = Arc::new(AtomicUsize::new(0));
    let toolset_calls = Arc::new(AtomicUsize::new(0));
    let model = Arc::new(ScriptedModel::new());
    model.push_text(Reply::tool_call("c1", "lookup", json!({"key": "a"}), "done"));

    let agent = Agent::builder()
        .name("tutor")
        .model(model.clone())
        .tool("lookup", counting_lookup(own_calls.clone()))
        .build()
        .unwrap();

    let toolset = Toolset::new("external").tool("lookup", counting_lookup(toolset_calls.clone()));
    agent
        .generate("go", GenerateOptions::new().toolset(toolset))
        .await
        .unwrap();

    assert_eq!(own_calls.load(Ordering::SeqCst), 0);
    assert_eq!(toolset_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_own_tools_bound_directly_without_services() {
    let calls = Arc::new(AtomicUsize::new(0));
    let model = Arc::new(ScriptedModel::new());
    model.push_text(Reply::tool_call("c1", "lookup", json!({"key": "a"}), "done"));

    let agent = Agent::builder()
        .name("tutor")
        .model(model.clone())
        .tool("lookup", counting_lookup(calls.clone()).with_cache(true))
        .build()
        .unwrap();

    agent
        .generate("go", GenerateOptions::new().max_steps(3))
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let request = &model.requests_of(RequestKind::Text)[0];
    assert_eq!(request.tool_names, vec!["lookup".to_string()]);
    assert_eq!(request.tools[0].description.as_deref(), Some("Look up a value"));
    assert_eq!(request.max_steps, 3);
}

#[tokio::test]
async fn test_model_and_tool_errors_propagate() {
    let model = Arc::new(ScriptedModel::new());
    model.push_text(Reply::Error("rate limited".into()));
    model.push_text(Reply::tool_call("c1", "broken", json!({}), "unused"));

    let agent = Agent::builder()
        .name("tutor")
        .model(model.clone())
        .tool(
            "broken",
            ToolDefinition::from_fn("fails", json!({}), |_args, _ctx| async move {
                Err::<Value, _>(anyhow::anyhow!("tool exploded"))
            }),
        )
        .build()
        .unwrap();

    let err = agent.generate("x", GenerateOptions::new()).await.unwrap_err();
    assert!(matches!(err, AgentError::Model(_)));
    assert!(err.to_string().contains("rate limited"));

    let err = agent.generate("x", GenerateOptions::new()).await.unwrap_err();
    assert!(format!("{:?}", err).contains("tool exploded"));
}

#[tokio::test]
async fn test_persistence_failure_does_not_fail_turn() {
    let memory = Arc::new(RecordingMemory::failing_saves());
    let model = Arc::new(ScriptedModel::new());
    model.push_text(Reply::text("still answered"));

    let agent = agent(&model, Services::new().with_memory(memory.clone()));
    let response = agent
        .generate("hi", GenerateOptions::new().resource_id("u1").thread_id("t1"))
        .await
        .unwrap();

    assert_eq!(response.text(), "still answered");
    // One save in before, one in after
    assert_eq!(memory.saves.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_structured_output() {
    let model = Arc::new(ScriptedModel::new());
    model.push_object(Reply::Object(json!({"answer": 4})));
    let agent = agent(&model, Services::new());

    let schema = json!({"type": "object", "properties": {"answer": {"type": "integer"}}});
    let response = agent
        .generate("2+2?", GenerateOptions::new().structured(schema.clone()))
        .await
        .unwrap();

    assert_eq!(
        response.output,
        AgentOutput::Structured {
            object: json!({"answer": 4}),
            schema: schema.clone()
        }
    );
    assert_eq!(response.text(), r#"{"answer":4}"#);
    assert_eq!(model.requests_of(RequestKind::Object)[0].schema, Some(schema));
}

struct LengthMetric;

#[async_trait]
impl Metric for LengthMetric {
    async fn measure(&self, _input: &str, output: &str) -> anyhow::Result<MetricResult> {
        Ok(MetricResult {
            score: output.len() as f64,
            info: None,
        })
    }
}

#[derive(Default)]
struct RecordingHook {
    events: Mutex<Vec<(String, String, String, String, String)>>,
    fail: bool,
}

#[async_trait]
impl GenerationHook for RecordingHook {
    async fn on_generation(&self, event: GenerationEvent) -> anyhow::Result<()> {
        self.events.lock().unwrap().push((
            event.input,
            event.output,
            event.run_id,
            event.metric_name,
            event.agent_name,
        ));
        if self.fail {
            anyhow::bail!("metric backend unavailable");
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_metric_hook_fires_once_per_metric() {
    let hook = Arc::new(RecordingHook::default());
    let model = Arc::new(ScriptedModel::new());
    model.push_text(Reply::text("answer"));

    let agent = Agent::builder()
        .name("tutor")
        .model(model.clone())
        .metric("length", Arc::new(LengthMetric))
        .metric("length_again", Arc::new(LengthMetric))
        .services(Services::new().with_hooks(hook.clone()))
        .build()
        .unwrap();

    agent
        .generate(vec!["one", "two"], GenerateOptions::new().run_id("run-9"))
        .await
        .unwrap();

    let events = hook.events.lock().unwrap().clone();
    assert_eq!(events.len(), 2);
    assert_eq!(
        events[0],
        (
            "one\ntwo".to_string(),
            "answer".to_string(),
            "run-9".to_string(),
            "length".to_string(),
            "tutor".to_string()
        )
    );
    assert_eq!(events[1].3, "length_again");
}

#[tokio::test]
async fn test_metric_failure_policy() {
    let model = Arc::new(ScriptedModel::new());
    model.push_text(Reply::text("a"));
    model.push_text(Reply::text("b"));
    let store = Arc::new(InMemoryStore::new());

    let build = |policy| {
        Agent::builder()
            .name("tutor")
            .model(model.clone())
            .metric("length", Arc::new(LengthMetric))
            .services(
                Services::new()
                    .with_memory(store.clone())
                    .with_hooks(Arc::new(RecordingHook {
                        fail: true,
                        ..Default::default()
                    })),
            )
            .settings(AgentSettings {
                metric_failure: policy,
                ..Default::default()
            })
            .build()
            .unwrap()
    };

    let options = GenerateOptions::new().resource_id("u1").thread_id("t1");
    let err = build(MetricFailurePolicy::Propagate)
        .generate("x", options.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Metric(_)));
    // Persistence ran before the hook failed
    assert_eq!(store.messages("t1").await.len(), 2);

    let response = build(MetricFailurePolicy::Log)
        .generate("y", options)
        .await
        .unwrap();
    assert_eq!(response.text(), "b");
}

#[tokio::test]
async fn test_stream_persists_on_completion() {
    let model = Arc::new(ScriptedModel::new());
    model.push_text(Reply::text("streamed answer here"));
    let store = Arc::new(InMemoryStore::new());
    let agent = agent(&model, Services::new().with_memory(store.clone()));

    let received = Arc::new(Mutex::new(None));
    let slot = received.clone();
    let stream = agent
        .stream(
            "tell me",
            StreamOptions::new()
                .resource_id("u1")
                .thread_id("t1")
                .on_finish(Box::new(move |payload: String| {
                    async move {
                        *slot.lock().unwrap() = Some(payload);
                    }
                    .boxed()
                })),
        )
        .await
        .unwrap();
    assert_eq!(stream.thread_id.as_deref(), Some("t1"));

    let text = collect_text(stream.into_events()).await.unwrap();
    assert_eq!(text, "streamed answer here");

    let payload = received.lock().unwrap().clone().unwrap();
    let generation: Generation = serde_json::from_str(&payload).unwrap();
    assert_eq!(generation.text, "streamed answer here");

    let stored = store.messages("t1").await;
    assert_eq!(texts(&stored.iter().map(|m| m.to_message()).collect::<Vec<_>>()), vec![
        "tell me",
        "streamed answer here"
    ]);
}

#[tokio::test]
async fn test_stream_with_corrupt_payload_skips_persistence() {
    let model = Arc::new(ScriptedModel::new());
    model.push_text(Reply::CorruptFinish("partial".into()));
    let store = Arc::new(InMemoryStore::new());
    let agent = agent(&model, Services::new().with_memory(store.clone()));

    let calls = Arc::new(AtomicUsize::new(0));
    let raw = Arc::new(Mutex::new(String::new()));
    let (counter, slot) = (calls.clone(), raw.clone());

    let mut stream = agent
        .stream(
            "hi",
            StreamOptions::new()
                .resource_id("u1")
                .thread_id("t1")
                .on_finish(Box::new(move |payload: String| {
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        *slot.lock().unwrap() = payload;
                    }
                    .boxed()
                })),
        )
        .await
        .unwrap();

    let mut saw_done = false;
    while let Some(event) = stream.next().await {
        if let StreamEvent::Done { .. } = event.unwrap() {
            saw_done = true;
        }
    }
    assert!(saw_done);

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(serde_json::from_str::<Generation>(&raw.lock().unwrap()).is_err());

    // Only the user message from before() was saved
    let stored = store.messages("t1").await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].role, Role::User);
}

#[tokio::test]
async fn test_structured_stream() {
    let model = Arc::new(ScriptedModel::new());
    model.push_object(Reply::Object(json!({"city": "Lisbon"})));
    let hook = Arc::new(RecordingHook::default());
    let agent = Agent::builder()
        .name("tutor")
        .model(model.clone())
        .metric("length", Arc::new(LengthMetric))
        .services(Services::new().with_hooks(hook.clone()))
        .build()
        .unwrap();

    let mut stream = agent
        .stream("where?", StreamOptions::new().structured(json!({"type": "object"})))
        .await
        .unwrap();

    let mut object = None;
    while let Some(event) = stream.next().await {
        if let StreamEvent::Object { partial } = event.unwrap() {
            object = Some(partial);
        }
    }
    assert_eq!(object, Some(json!({"city": "Lisbon"})));

    let events = hook.events.lock().unwrap().clone();
    assert_eq!(events[0].1, r#"{"city":"Lisbon"}"#);
}

#[tokio::test]
async fn test_resolving_twice_yields_same_window() {
    let store = InMemoryStore::new();
    let thread = store.create_thread("u1", Some("t1"), "Chat").await.unwrap();
    let rows = vec![Message::human("q"), Message::ai("a")]
        .iter()
        .map(|m| to_stored(m, &thread.id, store.generate_id()))
        .collect();
    store.save_messages(rows).await.unwrap();

    let model = ScriptedModel::new();
    let settings = AgentSettings::default();
    let resolver = MemoryResolver {
        agent_name: "tutor",
        model: &model,
        memory: &store,
        settings: &settings,
    };

    let first = resolver.resolve(Some("t1"), "u1", &[], "r1").await.unwrap();
    let second = resolver.resolve(Some("t1"), "u1", &[], "r2").await.unwrap();
    assert_eq!(first.thread_id, "t1");
    assert_eq!(first.messages, second.messages);
    assert_eq!(texts(&first.messages), vec!["q", "a"]);
}

#[tokio::test]
async fn test_missing_name_or_model_is_config_error() {
    let err = Agent::builder().build().unwrap_err();
    assert!(matches!(err, AgentError::Config(_)));

    let err = Agent::builder().name("x").build().unwrap_err();
    assert!(err.to_string().contains("Model is required"));
}
