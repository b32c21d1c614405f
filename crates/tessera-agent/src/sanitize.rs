use std::collections::HashSet;
use tessera_llm::{Content, ContentPart, Message};

/// Strip unanswered tool calls and empty shells from a model response
///
/// A tool-call part survives only if some tool message in the same batch
/// carries a result for its id. Empty text parts are dropped. A message whose
/// structured content ends up empty is removed; plain-text content is never
/// filtered.
pub fn sanitize_response_messages(messages: Vec<Message>) -> Vec<Message> {
    let answered: HashSet<String> = messages
        .iter()
        .filter(|m| matches!(m, Message::Tool { .. }))
        .flat_map(|m| m.content().tool_results())
        .filter_map(|part| part.tool_call_id().map(str::to_string))
        .collect();

    messages
        .into_iter()
        .map(|message| match message {
            Message::AI {
                content: Content::Parts(parts),
                name,
            } => {
                let parts = parts
                    .into_iter()
                    .filter(|part| match part {
                        ContentPart::ToolCall { tool_call_id, .. } => answered.contains(tool_call_id),
                        ContentPart::Text { text } => !text.is_empty(),
                        _ => true,
                    })
                    .collect();
                Message::AI {
                    content: Content::Parts(parts),
                    name,
                }
            }
            other => other,
        })
        .filter(|message| !matches!(message.content(), Content::Parts(parts) if parts.is_empty()))
        .collect()
}
