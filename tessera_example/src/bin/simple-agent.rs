use anyhow::Result;
use futures::{FutureExt, StreamExt};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tessera::prelude::{Reply, ScriptedModel};
use tessera::{
    init_logging, Config, GenerateOptions, Registry, StreamEvent, StreamOptions, ToolDefinition,
};

const MARATHON_KM: f64 = 42.195;

/// Offline model playing back a three-turn conversation
fn script() -> Arc<ScriptedModel> {
    let model = ScriptedModel::new();

    // Turn 1: title and context classification, then the answer
    model
        .push_object(Reply::Object(json!({ "title": "Marathon Distance" })))
        .push_object(Reply::Object(json!({ "usesContext": false })))
        .push_text(Reply::text("A marathon is 42.195 kilometers."));

    // Turn 2: the model reaches for the conversion tool
    model
        .push_object(Reply::Object(json!({ "usesContext": false })))
        .push_text(Reply::tool_call(
            "call_1",
            "convert_units",
            json!({ "km": MARATHON_KM }),
            "That is about 26.22 miles.",
        ));

    // Turn 3: same call again, answered from the thread's stored result
    model
        .push_object(Reply::Object(json!({ "usesContext": true })))
        .push_text(Reply::tool_call(
            "call_2",
            "convert_units",
            json!({ "km": MARATHON_KM }),
            "Still about 26.22 miles.",
        ));

    Arc::new(model)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    init_logging(&config.logging)?;

    println!("Tessera - Simple Agent");
    println!("======================\n");

    let store = Arc::new(config.memory.in_memory_store());
    let model = script();

    let conversions = Arc::new(AtomicUsize::new(0));
    let counter = conversions.clone();
    let convert = ToolDefinition::from_fn(
        "Convert kilometers to miles",
        json!({
            "type": "object",
            "properties": { "km": { "type": "number" } },
            "required": ["km"]
        }),
        move |args, _ctx| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                let km = args["km"].as_f64().unwrap_or_default();
                Ok(json!({ "miles": (km * 0.621371 * 100.0).round() / 100.0 }))
            }
        },
    )
    .with_cache(true);

    let agent = config
        .agent
        .builder()
        .model(model.clone())
        .tool("convert_units", convert)
        .build()?;

    let registry = Registry::builder()
        .agent(agent)
        .memory(store.clone())
        .build()?;
    let agent = registry.agent(&config.agent.name)?;

    // 1. First turn opens a new thread
    println!("1. Asking a fresh question...");
    let first = agent
        .generate(
            "How far is a marathon?",
            GenerateOptions::new().resource_id("user_123"),
        )
        .await?;
    let thread_id = first.thread_id.clone().unwrap_or_default();
    println!("   Thread: {}", thread_id);
    println!("   Assistant: {}\n", first.text());

    // 2. Second turn uses a tool
    println!("2. Asking for a conversion...");
    let second = agent
        .generate(
            "And in miles?",
            GenerateOptions::new()
                .resource_id("user_123")
                .thread_id(&thread_id),
        )
        .await?;
    println!("   Assistant: {}", second.text());
    println!("   Tool executions so far: {}\n", conversions.load(Ordering::SeqCst));

    // 3. Streamed turn repeats the same tool call and is served from memory
    println!("3. Streaming a follow-up...");
    let mut stream = agent
        .stream(
            "Remind me, how many miles?",
            StreamOptions::new()
                .resource_id("user_123")
                .thread_id(&thread_id)
                .on_finish(Box::new(|payload: String| {
                    async move {
                        tracing::info!(bytes = payload.len(), "Stream finished");
                    }
                    .boxed()
                })),
        )
        .await?;

    print!("   Assistant: ");
    while let Some(event) = stream.next().await {
        match event? {
            StreamEvent::Message { content } => print!("{}", content),
            StreamEvent::ToolResult { name, result, .. } => {
                print!("[{} -> {}] ", name, result)
            }
            StreamEvent::Done { .. } => println!(),
            _ => {}
        }
    }
    println!(
        "   Tool executions so far: {} (cached result reused)\n",
        conversions.load(Ordering::SeqCst)
    );

    // 4. Print the stored thread
    println!("4. Stored thread:");
    if let Some(thread) = store.threads_for("user_123").await.first() {
        println!("   Title: {}", thread.title);
    }
    for message in store.messages(&thread_id).await {
        println!(
            "   [{}:{}] {}",
            message.role,
            message.message_type.as_str(),
            message.content.to_plain_text()
        );
    }

    if model.pending_replies() > 0 {
        tracing::warn!(left = model.pending_replies(), "Script not fully consumed");
    }

    Ok(())
}
